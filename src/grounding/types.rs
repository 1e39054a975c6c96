use serde::{Deserialize, Serialize};

use crate::perception::types::ScreenshotMeta;

/// Pixel rectangle `[x1, y1, x2, y2]` (top-left, bottom-right) in screenshot space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BBox(pub [i64; 4]);

impl BBox {
    pub fn fits(&self, meta: &ScreenshotMeta) -> bool {
        let [x1, y1, x2, y2] = self.0;
        let (w, h) = (i64::from(meta.width), i64::from(meta.height));
        x1 >= 0 && y1 >= 0 && x1 < x2 && y1 < y2 && x2 <= w && y2 <= h
    }

    pub fn clamped(&self, meta: &ScreenshotMeta) -> BBox {
        let [x1, y1, x2, y2] = self.0;
        let (w, h) = (i64::from(meta.width), i64::from(meta.height));
        BBox([x1.clamp(0, w), y1.clamp(0, h), x2.clamp(0, w), y2.clamp(0, h)])
    }
}

/// One update relayed to the client. `bbox` is only ever set on the terminal event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerEvent {
    pub text: String,
    pub bbox: Option<BBox>,
    pub streaming: bool,
}

impl AnswerEvent {
    pub fn partial(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            bbox: None,
            streaming: true,
        }
    }

    pub fn terminal(text: impl Into<String>, bbox: Option<BBox>) -> Self {
        Self {
            text: text.into(),
            bbox,
            streaming: false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !self.streaming
    }
}

/// How much text each event carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TextMode {
    /// Full visible text so far.
    #[default]
    Cumulative,
    /// Only text that became visible since the previous event.
    Delta,
}

/// What to do with a bbox that falls outside the screenshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BoundsPolicy {
    /// Pass coordinates through untouched.
    #[default]
    Off,
    /// Clamp every coordinate into `[0, width] x [0, height]`.
    Clamp,
    /// Drop the bbox, keep the text.
    Reject,
}

impl BoundsPolicy {
    /// Applies the policy. Without screenshot dimensions there is nothing to check against.
    pub fn apply(self, bbox: BBox, meta: Option<&ScreenshotMeta>) -> Option<BBox> {
        let Some(meta) = meta else {
            return Some(bbox);
        };
        match self {
            BoundsPolicy::Off => Some(bbox),
            BoundsPolicy::Clamp => Some(bbox.clamped(meta)),
            BoundsPolicy::Reject if bbox.fits(meta) => Some(bbox),
            BoundsPolicy::Reject => {
                tracing::warn!(
                    bbox = ?bbox.0,
                    width = meta.width,
                    height = meta.height,
                    "bbox outside screenshot; dropped"
                );
                None
            }
        }
    }
}
