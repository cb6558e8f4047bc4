//! Zone overlay: a display list built from editor state, and a
//! rasterizer that paints it over the latest frame.

use std::path::Path;

use ab_glyph::{FontVec, PxScale};
use common::zones::{Point, Zone, MIN_ZONE_POINTS};
use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use imageproc::drawing::{
    draw_filled_circle_mut, draw_line_segment_mut, draw_polygon_mut, draw_text_mut, text_size,
    Blend,
};
use imageproc::point::Point as PixelPoint;
use tracing::debug;

use crate::error::{ConsoleError, Result};

pub const SAVED_FILL: Rgba<u8> = Rgba([255, 0, 0, 77]);
pub const SAVED_BORDER: Rgba<u8> = Rgba([255, 0, 0, 255]);
pub const DRAFT_FILL: Rgba<u8> = Rgba([0, 255, 0, 128]);
pub const DRAFT_BORDER: Rgba<u8> = Rgba([0, 255, 0, 255]);
pub const VERTEX_COLOR: Rgba<u8> = Rgba([0, 255, 255, 255]);
pub const LABEL_COLOR: Rgba<u8> = Rgba([255, 255, 255, 255]);
pub const FALLBACK_BACKGROUND: Rgba<u8> = Rgba([0, 0, 0, 255]);

pub const BORDER_WIDTH: u32 = 2;
pub const SELECTED_BORDER_WIDTH: u32 = 4;
pub const VERTEX_RADIUS: i32 = 5;
pub const LABEL_SIZE: f32 = 16.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Background {
    /// Latest frame stretched to the canvas.
    Frame,
    Solid(Rgba<u8>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Primitive {
    /// Closed and filled; always at least three points.
    Polygon {
        points: Vec<Point>,
        fill: Rgba<u8>,
        stroke: Rgba<u8>,
        stroke_width: u32,
    },
    /// Open polyline for sequences too short to close.
    Path {
        points: Vec<Point>,
        stroke: Rgba<u8>,
        stroke_width: u32,
    },
    Marker {
        center: Point,
        radius: i32,
        color: Rgba<u8>,
    },
    /// Text centred horizontally on `anchor`, which sits on the baseline.
    Label {
        text: String,
        anchor: (f32, f32),
        color: Rgba<u8>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Scene {
    pub width: u32,
    pub height: u32,
    pub background: Background,
    pub primitives: Vec<Primitive>,
}

impl Scene {
    pub fn labels(&self) -> impl Iterator<Item = (&str, (f32, f32))> {
        self.primitives.iter().filter_map(|p| match p {
            Primitive::Label { text, anchor, .. } => Some((text.as_str(), *anchor)),
            _ => None,
        })
    }
}

/// Arithmetic mean of the vertices.
pub fn centroid(points: &[Point]) -> Option<(f32, f32)> {
    if points.is_empty() {
        return None;
    }
    let n = points.len() as f32;
    let (sx, sy) = points
        .iter()
        .fold((0f32, 0f32), |(sx, sy), p| (sx + p.x as f32, sy + p.y as f32));
    Some((sx / n, sy / n))
}

fn outline(points: &[Point], fill: Rgba<u8>, stroke: Rgba<u8>, stroke_width: u32) -> Option<Primitive> {
    if points.len() >= MIN_ZONE_POINTS {
        Some(Primitive::Polygon {
            points: points.to_vec(),
            fill,
            stroke,
            stroke_width,
        })
    } else if points.len() == 2 {
        Some(Primitive::Path {
            points: points.to_vec(),
            stroke,
            stroke_width,
        })
    } else {
        None
    }
}

/// Builds the overlay for the current editor state, back to front.
pub fn build_scene(
    size: (u32, u32),
    has_frame: bool,
    zones: &[Zone],
    selected: Option<usize>,
    draft: &[Point],
) -> Scene {
    let mut primitives = Vec::new();

    for (idx, zone) in zones.iter().enumerate() {
        let width = if selected == Some(idx) {
            SELECTED_BORDER_WIDTH
        } else {
            BORDER_WIDTH
        };
        primitives.extend(outline(&zone.points, SAVED_FILL, SAVED_BORDER, width));
        if zone.is_closed() {
            if let Some(anchor) = centroid(&zone.points) {
                primitives.push(Primitive::Label {
                    text: format!("Z{}", idx + 1),
                    anchor,
                    color: LABEL_COLOR,
                });
            }
        }
    }

    primitives.extend(outline(draft, DRAFT_FILL, DRAFT_BORDER, BORDER_WIDTH));
    primitives.extend(draft.iter().map(|p| Primitive::Marker {
        center: *p,
        radius: VERTEX_RADIUS,
        color: VERTEX_COLOR,
    }));

    Scene {
        width: size.0,
        height: size.1,
        background: if has_frame {
            Background::Frame
        } else {
            Background::Solid(FALLBACK_BACKGROUND)
        },
        primitives,
    }
}

/// Paints scenes onto RGBA images. Labels need a font; without one they
/// are skipped.
#[derive(Default)]
pub struct Rasterizer {
    font: Option<FontVec>,
}

impl Rasterizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_font_file(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .map_err(|e| ConsoleError::config(format!("cannot read font {}: {}", path.display(), e)))?;
        let font = FontVec::try_from_vec(bytes)
            .map_err(|e| ConsoleError::config(format!("invalid font {}: {}", path.display(), e)))?;
        Ok(Self { font: Some(font) })
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    pub fn render(&self, scene: &Scene, frame: Option<&RgbaImage>) -> RgbaImage {
        let mut canvas = match (scene.background, frame) {
            (Background::Frame, Some(frame)) => {
                if frame.dimensions() == (scene.width, scene.height) {
                    frame.clone()
                } else {
                    imageops::resize(frame, scene.width, scene.height, FilterType::Triangle)
                }
            }
            (Background::Solid(color), _) => RgbaImage::from_pixel(scene.width, scene.height, color),
            (Background::Frame, None) => {
                RgbaImage::from_pixel(scene.width, scene.height, FALLBACK_BACKGROUND)
            }
        };

        for primitive in &scene.primitives {
            match primitive {
                Primitive::Polygon {
                    points,
                    fill,
                    stroke,
                    stroke_width,
                } => {
                    canvas = fill_polygon(canvas, points, *fill);
                    stroke_path(&mut canvas, points, true, *stroke, *stroke_width);
                }
                Primitive::Path {
                    points,
                    stroke,
                    stroke_width,
                } => stroke_path(&mut canvas, points, false, *stroke, *stroke_width),
                Primitive::Marker {
                    center,
                    radius,
                    color,
                } => draw_filled_circle_mut(&mut canvas, (center.x, center.y), *radius, *color),
                Primitive::Label {
                    text,
                    anchor,
                    color,
                } => {
                    if let Some(font) = &self.font {
                        let scale = PxScale::from(LABEL_SIZE);
                        let (w, h) = text_size(scale, font, text);
                        let x = anchor.0.round() as i32 - (w / 2) as i32;
                        let y = anchor.1.round() as i32 - h as i32;
                        draw_text_mut(&mut canvas, *color, x, y, scale, font, text);
                    }
                }
            }
        }

        debug!(
            width = scene.width,
            height = scene.height,
            primitives = scene.primitives.len(),
            "overlay rendered"
        );
        canvas
    }
}

/// Translucent fill. The polygon routine rejects an explicitly closed
/// ring, so a repeated final vertex is dropped first.
fn fill_polygon(canvas: RgbaImage, points: &[Point], color: Rgba<u8>) -> RgbaImage {
    let mut ring: Vec<PixelPoint<i32>> = points.iter().map(|p| PixelPoint::new(p.x, p.y)).collect();
    while ring.len() > 1 && ring.first() == ring.last() {
        ring.pop();
    }
    if ring.len() < MIN_ZONE_POINTS {
        return canvas;
    }
    let mut blend = Blend(canvas);
    draw_polygon_mut(&mut blend, &ring, color);
    blend.0
}

fn stroke_path(canvas: &mut RgbaImage, points: &[Point], closed: bool, color: Rgba<u8>, width: u32) {
    for pair in points.windows(2) {
        thick_line(canvas, pair[0], pair[1], color, width);
    }
    if closed && points.len() >= MIN_ZONE_POINTS {
        if let (Some(first), Some(last)) = (points.first(), points.last()) {
            thick_line(canvas, *last, *first, color, width);
        }
    }
}

/// Draws `width` parallel one-pixel segments, one of them on the centre line.
fn thick_line(canvas: &mut RgbaImage, from: Point, to: Point, color: Rgba<u8>, width: u32) {
    let (x0, y0) = (from.x as f32, from.y as f32);
    let (x1, y1) = (to.x as f32, to.y as f32);
    let (dx, dy) = (x1 - x0, y1 - y0);
    let len = (dx * dx + dy * dy).sqrt();
    if len == 0.0 {
        return;
    }
    let (nx, ny) = (-dy / len, dx / len);
    let width = width.max(1);
    for step in 0..width {
        let offset = step as f32 - (width / 2) as f32;
        draw_line_segment_mut(
            canvas,
            (x0 + nx * offset, y0 + ny * offset),
            (x1 + nx * offset, y1 + ny * offset),
            color,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(offset: i32) -> Vec<Point> {
        vec![
            Point::new(offset, offset),
            Point::new(offset + 20, offset),
            Point::new(offset + 20, offset + 20),
            Point::new(offset, offset + 20),
        ]
    }

    #[test]
    fn centroid_is_vertex_mean() {
        assert_eq!(centroid(&square(10)), Some((20.0, 20.0)));
        assert_eq!(centroid(&[]), None);
    }

    #[test]
    fn scene_labels_follow_zone_order() {
        let zones = vec![Zone::new(square(0), "a"), Zone::new(square(40), "b")];
        let scene = build_scene((100, 100), false, &zones, Some(1), &[]);

        let labels: Vec<_> = scene.labels().collect();
        assert_eq!(labels, vec![("Z1", (10.0, 10.0)), ("Z2", (50.0, 50.0))]);
        assert_eq!(scene.background, Background::Solid(FALLBACK_BACKGROUND));

        let widths: Vec<u32> = scene
            .primitives
            .iter()
            .filter_map(|p| match p {
                Primitive::Polygon { stroke_width, .. } => Some(*stroke_width),
                _ => None,
            })
            .collect();
        assert_eq!(widths, vec![BORDER_WIDTH, SELECTED_BORDER_WIDTH]);
    }

    #[test]
    fn short_drafts_stay_open() {
        let one = build_scene((50, 50), true, &[], None, &[Point::new(5, 5)]);
        assert_eq!(one.primitives.len(), 1);
        assert!(matches!(one.primitives[0], Primitive::Marker { .. }));

        let two = build_scene((50, 50), true, &[], None, &[Point::new(5, 5), Point::new(30, 5)]);
        assert!(matches!(two.primitives[0], Primitive::Path { .. }));
        assert_eq!(two.primitives.len(), 3);

        let three = build_scene((50, 50), true, &[], None, &square(5)[..3]);
        assert!(matches!(three.primitives[0], Primitive::Polygon { .. }));
    }

    #[test]
    fn rasterizes_fill_border_and_markers() {
        let zones = vec![Zone::new(square(10), "a")];
        let draft = vec![Point::new(70, 70)];
        let scene = build_scene((100, 100), false, &zones, None, &draft);
        let image = Rasterizer::new().render(&scene, None);

        assert_eq!(image.dimensions(), (100, 100));
        assert_eq!(image.get_pixel(90, 10), &FALLBACK_BACKGROUND);
        // Interior is a blend of red over black.
        let inside = image.get_pixel(20, 20);
        assert!(inside[0] > 0 && inside[0] < 255);
        assert_eq!(inside[1], 0);
        assert_eq!(image.get_pixel(10, 15), &SAVED_BORDER);
        assert_eq!(image.get_pixel(70, 70), &VERTEX_COLOR);
    }

    #[test]
    fn frame_background_is_stretched() {
        let frame = RgbaImage::from_pixel(10, 10, Rgba([0, 0, 200, 255]));
        let scene = build_scene((40, 30), true, &[], None, &[]);
        let image = Rasterizer::new().render(&scene, Some(&frame));
        assert_eq!(image.dimensions(), (40, 30));
        let corner = image.get_pixel(39, 29);
        assert!((199..=201).contains(&corner[2]));
        assert_eq!(corner[0], 0);
    }

    #[test]
    fn closed_ring_input_does_not_panic() {
        let mut ring = square(10);
        ring.push(ring[0]);
        let scene = build_scene((50, 50), false, &[Zone::new(ring, "r")], None, &[]);
        let image = Rasterizer::new().render(&scene, None);
        assert_eq!(image.dimensions(), (50, 50));
    }
}
