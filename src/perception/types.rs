use serde::{Deserialize, Serialize};

/// Pixel dimensions of the screenshot that came with a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenshotMeta {
    pub width: u32,
    pub height: u32,
}
