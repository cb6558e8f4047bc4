//! Backing-store and display sizes of the zone canvas.
//!
//! The backing store follows the native frame size; the display size
//! follows the container. Clicks arrive in display pixels and are mapped
//! to native pixels through the current ratio.

use common::zones::Point;
use tracing::debug;

/// Horizontal room kept free around the canvas inside its container.
pub const CONTAINER_MARGIN: u32 = 40;

/// Backing size before any frame has arrived.
pub const DEFAULT_CANVAS_SIZE: (u32, u32) = (640, 480);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CanvasGeometry {
    width: u32,
    height: u32,
    display_width: f64,
    display_height: f64,
}

impl Default for CanvasGeometry {
    fn default() -> Self {
        let (width, height) = DEFAULT_CANVAS_SIZE;
        Self::new(width, height)
    }
}

impl CanvasGeometry {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            display_width: width as f64,
            display_height: height as f64,
        }
    }

    pub fn backing_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn display_size(&self) -> (f64, f64) {
        (self.display_width, self.display_height)
    }

    /// Adopts a frame's native size. Returns true if the backing store changed.
    ///
    /// The display size is reset to the natural size; callers refit it to
    /// the container afterwards.
    pub fn adopt_frame_size(&mut self, width: u32, height: u32) -> bool {
        if width == 0 || height == 0 || (width, height) == (self.width, self.height) {
            return false;
        }
        debug!(width, height, "canvas resized to frame");
        *self = Self::new(width, height);
        true
    }

    /// Shrinks the display size to fit `container_width` minus the margin,
    /// keeping the aspect ratio. Never enlarges past the natural size.
    pub fn fit_to_container(&mut self, container_width: u32) {
        let max_width = container_width.saturating_sub(CONTAINER_MARGIN) as f64;
        if max_width > 0.0 && max_width < self.width as f64 {
            let aspect = self.height as f64 / self.width as f64;
            self.display_width = max_width;
            self.display_height = max_width * aspect;
        } else {
            self.display_width = self.width as f64;
            self.display_height = self.height as f64;
        }
    }

    /// Sets the displayed size directly, as a layout engine would.
    pub fn set_display_size(&mut self, width: f64, height: f64) {
        if width > 0.0 && height > 0.0 {
            self.display_width = width;
            self.display_height = height;
        }
    }

    /// Maps a click in display pixels to native frame pixels.
    pub fn map_click(&self, x: f64, y: f64) -> Point {
        let scale_x = self.width as f64 / self.display_width;
        let scale_y = self.height as f64 / self.display_height;
        Point::new((x * scale_x).round() as i32, (y * scale_y).round() as i32)
    }
}
