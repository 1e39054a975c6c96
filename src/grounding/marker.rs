//! Incremental recognizer for the inline `[BBOX:x1,y1,x2,y2]` marker.
//!
//! The scanner is fed the growing response buffer after every chunk and only
//! inspects bytes it has not seen yet, so a whole response is scanned once.
//! While a `[` could still turn into a marker, its offset is remembered as the
//! candidate start and everything from there on is withheld from display.

use crate::grounding::types::BBox;

const PREFIX: &[u8] = b"[BBOX:";

/// A complete marker located in the scanned text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Marker {
    /// Byte offset of the opening `[`.
    pub start: usize,
    /// Byte offset just past the closing `]`.
    pub end: usize,
    pub bbox: BBox,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Normal,
    /// `n` bytes of `[BBOX:` matched so far (1..PREFIX.len()).
    Keyword(usize),
    /// Inside coordinate `index`, having read `digits` digits of it.
    Coordinate { index: usize, digits: usize },
    Complete,
}

#[derive(Debug, Clone)]
pub struct MarkerScanner {
    state: ScanState,
    scanned: usize,
    candidate_start: Option<usize>,
    coords: [i64; 4],
}

impl Default for MarkerScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl MarkerScanner {
    pub fn new() -> Self {
        Self {
            state: ScanState::Normal,
            scanned: 0,
            candidate_start: None,
            coords: [0; 4],
        }
    }

    /// Scans the unseen suffix of `text`. `text` must be the same buffer as on
    /// previous calls, only ever appended to.
    ///
    /// Returns the first complete marker, once. After that the scanner is
    /// finished and ignores further input.
    pub fn feed(&mut self, text: &str) -> Option<Marker> {
        let bytes = text.as_bytes();
        while self.scanned < bytes.len() {
            if self.state == ScanState::Complete {
                return None;
            }
            let pos = self.scanned;
            self.scanned += 1;
            if let Some(marker) = self.step(bytes[pos], pos) {
                return Some(marker);
            }
        }
        None
    }

    /// Length of the prefix of a `len`-byte buffer that is safe to show.
    pub fn visible_len(&self, len: usize) -> usize {
        self.candidate_start.map_or(len, |start| start.min(len))
    }

    fn step(&mut self, b: u8, pos: usize) -> Option<Marker> {
        match self.state {
            ScanState::Normal => self.maybe_open(b, pos),
            ScanState::Keyword(n) => {
                if b == PREFIX[n] {
                    self.state = if n + 1 == PREFIX.len() {
                        self.coords = [0; 4];
                        ScanState::Coordinate { index: 0, digits: 0 }
                    } else {
                        ScanState::Keyword(n + 1)
                    };
                } else {
                    self.abandon(b, pos);
                }
            }
            ScanState::Coordinate { index, digits } => match b {
                b'0'..=b'9' => {
                    let next = self.coords[index]
                        .checked_mul(10)
                        .and_then(|v| v.checked_add(i64::from(b - b'0')));
                    match next {
                        Some(v) => {
                            self.coords[index] = v;
                            self.state = ScanState::Coordinate {
                                index,
                                digits: digits + 1,
                            };
                        }
                        None => self.abandon(b, pos),
                    }
                }
                b',' if digits > 0 && index < 3 => {
                    self.state = ScanState::Coordinate {
                        index: index + 1,
                        digits: 0,
                    };
                }
                b']' if digits > 0 && index == 3 => {
                    self.state = ScanState::Complete;
                    let start = self.candidate_start.unwrap_or(pos);
                    return Some(Marker {
                        start,
                        end: pos + 1,
                        bbox: BBox(self.coords),
                    });
                }
                _ => self.abandon(b, pos),
            },
            ScanState::Complete => {}
        }
        None
    }

    fn maybe_open(&mut self, b: u8, pos: usize) {
        if b == b'[' {
            self.candidate_start = Some(pos);
            self.state = ScanState::Keyword(1);
        }
    }

    /// The candidate failed at `b`. A candidate holds no `[` past its first
    /// byte, so the only place a new marker can start is `b` itself.
    fn abandon(&mut self, b: u8, pos: usize) {
        self.candidate_start = None;
        self.state = ScanState::Normal;
        self.maybe_open(b, pos);
    }
}

/// First complete marker anywhere in `text`.
pub fn find_marker(text: &str) -> Option<Marker> {
    MarkerScanner::new().feed(text)
}

/// Display form of `text`: everything before the first marker (or before a
/// trailing half-written one), trimmed.
pub fn sanitize(text: &str) -> &str {
    let mut scanner = MarkerScanner::new();
    let end = match scanner.feed(text) {
        Some(marker) => marker.start,
        None => scanner.visible_len(text.len()),
    };
    text[..end].trim()
}
