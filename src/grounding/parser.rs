use crate::grounding::fallback::{self, Extraction};
use crate::grounding::marker::MarkerScanner;
use crate::grounding::types::{AnswerEvent, BBox, TextMode};

/// Folds model chunks, in arrival order, into answer events.
///
/// One parser serves exactly one request. `push` yields at most one event per
/// chunk; once it yields a terminal event the parser is finished and ignores
/// further input. If the stream ends first, `finish` produces the terminal
/// event from the whole response.
#[derive(Debug)]
pub struct StreamParser {
    /// Every chunk so far. Also the full response for post-stream fallback.
    accumulated: String,
    scanner: MarkerScanner,
    /// Bytes of visible text already sent to the client.
    last_emitted: usize,
    mode: TextMode,
    finished: bool,
}

impl StreamParser {
    pub fn new(mode: TextMode) -> Self {
        Self {
            accumulated: String::new(),
            scanner: MarkerScanner::new(),
            last_emitted: 0,
            mode,
            finished: false,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn response_len(&self) -> usize {
        self.accumulated.len()
    }

    pub fn push(&mut self, chunk: &str) -> Option<AnswerEvent> {
        if self.finished || chunk.is_empty() {
            return None;
        }
        self.accumulated.push_str(chunk);

        if let Some(marker) = self.scanner.feed(&self.accumulated) {
            self.finished = true;
            return Some(self.terminal_before(marker.start, Some(marker.bbox)));
        }

        let visible = self.scanner.visible_len(self.accumulated.len());
        if visible <= self.last_emitted {
            return None;
        }
        let text = match self.mode {
            TextMode::Cumulative => &self.accumulated[..visible],
            TextMode::Delta => &self.accumulated[self.last_emitted..visible],
        };
        let event = AnswerEvent::partial(text);
        self.last_emitted = visible;
        Some(event)
    }

    /// Terminal event for a stream that ended without an inline marker.
    pub fn finish(self) -> AnswerEvent {
        match fallback::extract(&self.accumulated) {
            Extraction::Found { text, bbox } => {
                tracing::debug!(bbox = ?bbox.0, "bbox recovered after stream end");
                AnswerEvent::terminal(text, Some(bbox))
            }
            Extraction::TextOnly(text) => AnswerEvent::terminal(text.trim(), None),
            Extraction::NotFound => {
                let end = self.scanner.visible_len(self.accumulated.len());
                self.terminal_before(end, None)
            }
        }
    }

    fn terminal_before(&self, end: usize, bbox: Option<BBox>) -> AnswerEvent {
        let shown = &self.accumulated[..end];
        let text = match self.mode {
            TextMode::Cumulative => shown,
            TextMode::Delta => shown.get(self.last_emitted..).unwrap_or_default(),
        };
        AnswerEvent::terminal(text.trim(), bbox)
    }
}
