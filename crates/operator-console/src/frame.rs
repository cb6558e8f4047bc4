//! Live frames pushed by the server as base64 JPEG.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::RgbaImage;
use tracing::debug;

use crate::error::{ConsoleError, Result};

const DATA_URL_PREFIX: &str = "base64,";

#[derive(Debug, Clone)]
pub struct DecodedFrame {
    pub image: RgbaImage,
}

impl DecodedFrame {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Decodes a base64 image payload. A `data:` URL prefix is tolerated.
pub fn decode_frame(payload: &str) -> Result<DecodedFrame> {
    let encoded = match payload.find(DATA_URL_PREFIX) {
        Some(pos) if payload.starts_with("data:") => &payload[pos + DATA_URL_PREFIX.len()..],
        _ => payload,
    };
    let bytes = STANDARD.decode(encoded.trim())?;
    if bytes.is_empty() {
        return Err(ConsoleError::Frame("empty frame".to_string()));
    }
    let image = image::load_from_memory(&bytes)?.to_rgba8();
    Ok(DecodedFrame { image })
}

/// The dashboard's video surface: the last painted frame, or a
/// placeholder while the system is stopped.
#[derive(Debug, Default)]
pub struct FrameSurface {
    latest: Option<DecodedFrame>,
    visible: bool,
    painted: u64,
}

impl FrameSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn paint(&mut self, payload: &str) -> Result<&DecodedFrame> {
        let frame = decode_frame(payload)?;
        self.painted += 1;
        self.visible = true;
        debug!(
            width = frame.width(),
            height = frame.height(),
            painted = self.painted,
            "frame painted"
        );
        Ok(self.latest.insert(frame))
    }

    /// Shows the placeholder. The last frame is kept but no longer shown.
    pub fn hide(&mut self) {
        self.visible = false;
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn latest(&self) -> Option<&DecodedFrame> {
        self.latest.as_ref()
    }

    pub fn painted(&self) -> u64 {
        self.painted
    }
}
