//! Overlay burn-in: skeleton lines, landmark points and the pose label
//!
//! Drawing happens synchronously into the caller's raster on the capture
//! path. The annotator never touches the raster handed to the inference
//! engine; callers pass the streaming copy.

use super::raster::RgbaRaster;
use crate::landmarks::{NormalizedLandmark, SkeletonKind, HEAD_LANDMARKS};

/// Overlay colors and metrics
#[derive(Debug, Clone)]
pub struct OverlayStyle {
    pub line_color: [u8; 4],
    pub point_color: [u8; 4],
    pub label_color: [u8; 4],
    pub line_width: f32,
    /// Vertical gap between the label baseline and the topmost head point
    pub label_margin: f32,
    /// Integer scale applied to the 5x7 glyph grid
    pub text_scale: u32,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            line_color: [0x00, 0xE6, 0x76, 0xFF],
            point_color: [0xFF, 0x52, 0x52, 0xFF],
            label_color: [0xFF, 0xFF, 0xFF, 0xFF],
            line_width: 4.0,
            label_margin: 12.0,
            text_scale: 3,
        }
    }
}

/// One detected subject's landmarks plus the graph they belong to
#[derive(Debug, Clone, Copy)]
pub struct SkeletonOverlay<'a> {
    pub kind: SkeletonKind,
    pub landmarks: &'a [NormalizedLandmark],
}

/// Map a normalized landmark into canvas pixels.
///
/// Cover/fill scaling: the image is scaled by `max(cw/iw, ch/ih)` and
/// centered, preserving aspect ratio and allowing overflow. Mirroring flips
/// x after scaling.
pub fn project(
    nx: f32,
    ny: f32,
    image_w: u32,
    image_h: u32,
    canvas_w: u32,
    canvas_h: u32,
    mirror: bool,
) -> (f32, f32) {
    let scale = f32::max(
        canvas_w as f32 / image_w as f32,
        canvas_h as f32 / image_h as f32,
    );
    let offset_x = (canvas_w as f32 - image_w as f32 * scale) / 2.0;
    let offset_y = (canvas_h as f32 - image_h as f32 * scale) / 2.0;
    let mut x = nx * image_w as f32 * scale + offset_x;
    let y = ny * image_h as f32 * scale + offset_y;
    if mirror {
        x = canvas_w as f32 - x;
    }
    (x, y)
}

/// Burns skeleton overlays and an optional label into a raster
#[derive(Debug, Clone, Default)]
pub struct FrameAnnotator {
    style: OverlayStyle,
    mirror: bool,
}

impl FrameAnnotator {
    pub fn new(style: OverlayStyle, mirror: bool) -> Self {
        Self { style, mirror }
    }

    pub fn set_mirror(&mut self, mirror: bool) {
        self.mirror = mirror;
    }

    pub fn mirror(&self) -> bool {
        self.mirror
    }

    /// Draw every confident landmark and connection, then the label.
    ///
    /// A landmark below the confidence gate is absent: neither its point nor
    /// any line touching it is drawn. With no skeletons and no label the
    /// raster is left untouched.
    pub fn annotate(
        &self,
        canvas: &mut RgbaRaster,
        image_w: u32,
        image_h: u32,
        skeletons: &[SkeletonOverlay<'_>],
        label: Option<&str>,
    ) {
        if image_w == 0 || image_h == 0 {
            return;
        }
        let (cw, ch) = (canvas.width(), canvas.height());

        for skeleton in skeletons {
            let points: Vec<Option<(f32, f32)>> = skeleton
                .landmarks
                .iter()
                .map(|lm| {
                    lm.is_confident()
                        .then(|| project(lm.x, lm.y, image_w, image_h, cw, ch, self.mirror))
                })
                .collect();

            for &(a, b) in skeleton.kind.connections() {
                if let (Some(Some(start)), Some(Some(end))) = (points.get(a), points.get(b)) {
                    self.draw_line(canvas, *start, *end);
                }
            }
            let radius = skeleton.kind.point_radius();
            for point in points.iter().flatten() {
                draw_disc(canvas, point.0, point.1, radius, self.style.point_color);
            }
        }

        if let Some(text) = label {
            if !text.is_empty() {
                self.draw_label(canvas, image_w, image_h, skeletons, text);
            }
        }
    }

    fn draw_line(&self, canvas: &mut RgbaRaster, start: (f32, f32), end: (f32, f32)) {
        let radius = self.style.line_width / 2.0;
        let dx = end.0 - start.0;
        let dy = end.1 - start.1;
        let steps = dx.abs().max(dy.abs()).ceil() as u32 + 1;
        for i in 0..steps {
            let t = i as f32 / steps.max(2) as f32;
            draw_disc(
                canvas,
                start.0 + dx * t,
                start.1 + dy * t,
                radius,
                self.style.line_color,
            );
        }
        draw_disc(canvas, end.0, end.1, radius, self.style.line_color);
    }

    /// Place the label centered on the centroid x of the confident head
    /// landmarks, above their topmost point, clamped into the canvas.
    fn draw_label(
        &self,
        canvas: &mut RgbaRaster,
        image_w: u32,
        image_h: u32,
        skeletons: &[SkeletonOverlay<'_>],
        text: &str,
    ) {
        let pose = skeletons
            .iter()
            .find(|s| s.kind == SkeletonKind::Pose)
            .map(|s| s.landmarks);
        let Some(landmarks) = pose else { return };

        let (cw, ch) = (canvas.width(), canvas.height());
        let mut sum_x = 0.0f32;
        let mut min_y = f32::MAX;
        let mut count = 0u32;
        for &index in HEAD_LANDMARKS {
            let Some(lm) = landmarks.get(index) else { continue };
            if !lm.is_confident() {
                continue;
            }
            let (x, y) = project(lm.x, lm.y, image_w, image_h, cw, ch, self.mirror);
            sum_x += x;
            min_y = min_y.min(y);
            count += 1;
        }
        if count == 0 {
            return;
        }

        let scale = self.style.text_scale.max(1);
        let text_w = (text.chars().count() as u32 * GLYPH_ADVANCE * scale) as f32;
        let text_h = (GLYPH_ROWS * scale) as f32;
        let centroid_x = sum_x / count as f32;

        let x = (centroid_x - text_w / 2.0)
            .clamp(0.0, (cw as f32 - text_w).max(0.0));
        let y = (min_y - self.style.label_margin - text_h).max(0.0);

        draw_text(canvas, x as i32, y as i32, text, scale, self.style.label_color);
    }
}

#[inline]
fn draw_disc(canvas: &mut RgbaRaster, cx: f32, cy: f32, radius: f32, color: [u8; 4]) {
    let r = radius.max(0.5);
    let x0 = (cx - r).floor() as i64;
    let x1 = (cx + r).ceil() as i64;
    let y0 = (cy - r).floor() as i64;
    let y1 = (cy + r).ceil() as i64;
    for py in y0..=y1 {
        if py < 0 || py >= canvas.height() as i64 {
            continue;
        }
        for px in x0..=x1 {
            if px < 0 || px >= canvas.width() as i64 {
                continue;
            }
            let dx = px as f32 - cx;
            let dy = py as f32 - cy;
            if dx * dx + dy * dy <= r * r {
                canvas.put_pixel(px as u32, py as u32, color);
            }
        }
    }
}

const GLYPH_ROWS: u32 = 7;
const GLYPH_COLS: u32 = 5;
const GLYPH_ADVANCE: u32 = GLYPH_COLS + 1;

/// 5x7 bitmap glyphs; each byte is one row, bit 4 is the leftmost column.
/// Lowercase input is folded to uppercase; unmapped characters advance
/// without marking pixels.
fn glyph(c: char) -> Option<[u8; 7]> {
    let rows = match c.to_ascii_uppercase() {
        'A' => [0x0E, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'B' => [0x1E, 0x11, 0x11, 0x1E, 0x11, 0x11, 0x1E],
        'C' => [0x0E, 0x11, 0x10, 0x10, 0x10, 0x11, 0x0E],
        'D' => [0x1E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x1E],
        'E' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x1F],
        'F' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x10],
        'G' => [0x0E, 0x11, 0x10, 0x17, 0x11, 0x11, 0x0F],
        'H' => [0x11, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'I' => [0x0E, 0x04, 0x04, 0x04, 0x04, 0x04, 0x0E],
        'J' => [0x07, 0x02, 0x02, 0x02, 0x02, 0x12, 0x0C],
        'K' => [0x11, 0x12, 0x14, 0x18, 0x14, 0x12, 0x11],
        'L' => [0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x1F],
        'M' => [0x11, 0x1B, 0x15, 0x15, 0x11, 0x11, 0x11],
        'N' => [0x11, 0x19, 0x15, 0x13, 0x11, 0x11, 0x11],
        'O' => [0x0E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'P' => [0x1E, 0x11, 0x11, 0x1E, 0x10, 0x10, 0x10],
        'Q' => [0x0E, 0x11, 0x11, 0x11, 0x15, 0x12, 0x0D],
        'R' => [0x1E, 0x11, 0x11, 0x1E, 0x14, 0x12, 0x11],
        'S' => [0x0F, 0x10, 0x10, 0x0E, 0x01, 0x01, 0x1E],
        'T' => [0x1F, 0x04, 0x04, 0x04, 0x04, 0x04, 0x04],
        'U' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'V' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x0A, 0x04],
        'W' => [0x11, 0x11, 0x11, 0x15, 0x15, 0x1B, 0x11],
        'X' => [0x11, 0x11, 0x0A, 0x04, 0x0A, 0x11, 0x11],
        'Y' => [0x11, 0x11, 0x0A, 0x04, 0x04, 0x04, 0x04],
        'Z' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x10, 0x1F],
        '0' => [0x0E, 0x11, 0x13, 0x15, 0x19, 0x11, 0x0E],
        '1' => [0x04, 0x0C, 0x04, 0x04, 0x04, 0x04, 0x0E],
        '2' => [0x0E, 0x11, 0x01, 0x06, 0x08, 0x10, 0x1F],
        '3' => [0x0E, 0x11, 0x01, 0x06, 0x01, 0x11, 0x0E],
        '4' => [0x02, 0x06, 0x0A, 0x12, 0x1F, 0x02, 0x02],
        '5' => [0x1F, 0x10, 0x1E, 0x01, 0x01, 0x11, 0x0E],
        '6' => [0x06, 0x08, 0x10, 0x1E, 0x11, 0x11, 0x0E],
        '7' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08],
        '8' => [0x0E, 0x11, 0x11, 0x0E, 0x11, 0x11, 0x0E],
        '9' => [0x0E, 0x11, 0x11, 0x0F, 0x01, 0x02, 0x0C],
        '-' => [0x00, 0x00, 0x00, 0x0E, 0x00, 0x00, 0x00],
        ':' => [0x00, 0x04, 0x00, 0x00, 0x04, 0x00, 0x00],
        ' ' => [0x00; 7],
        _ => return None,
    };
    Some(rows)
}

fn draw_text(canvas: &mut RgbaRaster, x: i32, y: i32, text: &str, scale: u32, color: [u8; 4]) {
    let mut pen_x = x;
    for c in text.chars() {
        if let Some(rows) = glyph(c) {
            for (row, bits) in rows.iter().enumerate() {
                for col in 0..GLYPH_COLS {
                    if bits & (1 << (GLYPH_COLS - 1 - col)) == 0 {
                        continue;
                    }
                    for sy in 0..scale {
                        for sx in 0..scale {
                            let px = pen_x + (col * scale + sx) as i32;
                            let py = y + (row as u32 * scale + sy) as i32;
                            if px >= 0
                                && py >= 0
                                && (px as u32) < canvas.width()
                                && (py as u32) < canvas.height()
                            {
                                canvas.put_pixel(px as u32, py as u32, color);
                            }
                        }
                    }
                }
            }
        }
        pen_x += (GLYPH_ADVANCE * scale) as i32;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::SkeletonKind;

    fn blank_canvas(w: u32, h: u32) -> RgbaRaster {
        RgbaRaster::new(w, h).unwrap()
    }

    #[test]
    fn test_empty_annotation_is_noop() {
        let mut canvas = blank_canvas(64, 64);
        let before = canvas.data().to_vec();
        let annotator = FrameAnnotator::default();
        annotator.annotate(&mut canvas, 64, 64, &[], None);
        assert_eq!(canvas.data(), before.as_slice());
    }

    #[test]
    fn test_mirror_is_involution() {
        let cases = [(0.1f32, 0.4f32), (0.5, 0.5), (0.93, 0.02)];
        for (nx, ny) in cases {
            let (x, _) = project(nx, ny, 640, 480, 640, 480, false);
            let (mx, _) = project(nx, ny, 640, 480, 640, 480, true);
            let remirrored = 640.0 - mx;
            assert!((x - remirrored).abs() < 1e-3);
        }
    }

    #[test]
    fn test_project_identity_when_canvas_matches_image() {
        let (x, y) = project(0.5, 0.5, 640, 480, 640, 480, false);
        assert!((x - 320.0).abs() < 1e-3);
        assert!((y - 240.0).abs() < 1e-3);
    }

    #[test]
    fn test_project_cover_scaling_centers_overflow() {
        // Wider canvas than image aspect: scale = 2, image spills vertically
        let (x, y) = project(0.0, 0.0, 100, 100, 200, 100, false);
        assert!((x - 0.0).abs() < 1e-3);
        assert!((y - (-50.0)).abs() < 1e-3);
    }

    #[test]
    fn test_confidence_gate_boundary() {
        let annotator = FrameAnnotator::default();

        let at_threshold = [NormalizedLandmark::with_confidence(0.5, 0.5, 0.0, 0.5, 0.0)];
        let mut canvas = blank_canvas(64, 64);
        annotator.annotate(
            &mut canvas,
            64,
            64,
            &[SkeletonOverlay {
                kind: SkeletonKind::Pose,
                landmarks: &at_threshold,
            }],
            None,
        );
        assert!(canvas.data().iter().any(|&b| b != 0), "0.5 must be drawn");

        let below = [NormalizedLandmark::with_confidence(0.5, 0.5, 0.0, 0.4999, 0.0)];
        let mut canvas = blank_canvas(64, 64);
        annotator.annotate(
            &mut canvas,
            64,
            64,
            &[SkeletonOverlay {
                kind: SkeletonKind::Pose,
                landmarks: &below,
            }],
            None,
        );
        assert!(canvas.data().iter().all(|&b| b == 0), "below 0.5 must be absent");
    }

    #[test]
    fn test_gated_landmark_suppresses_connections() {
        // Pose connection (0, 1): confident 0, gated 1 -> only the point of 0
        let landmarks = [
            NormalizedLandmark::with_confidence(0.2, 0.2, 0.0, 0.9, 0.0),
            NormalizedLandmark::with_confidence(0.8, 0.8, 0.0, 0.1, 0.0),
        ];
        let mut canvas = blank_canvas(100, 100);
        let annotator = FrameAnnotator::default();
        annotator.annotate(
            &mut canvas,
            100,
            100,
            &[SkeletonOverlay {
                kind: SkeletonKind::Pose,
                landmarks: &landmarks,
            }],
            None,
        );
        // Midpoint of the would-be line stays untouched
        assert_eq!(canvas.pixel(50, 50), [0, 0, 0, 0]);
        // The confident point is drawn
        assert_ne!(canvas.pixel(20, 20), [0, 0, 0, 0]);
    }

    #[test]
    fn test_label_requires_confident_head_point() {
        let mut canvas = blank_canvas(64, 64);
        let gated = [NormalizedLandmark::with_confidence(0.5, 0.5, 0.0, 0.1, 0.1)];
        let annotator = FrameAnnotator::default();
        annotator.annotate(
            &mut canvas,
            64,
            64,
            &[SkeletonOverlay {
                kind: SkeletonKind::Pose,
                landmarks: &gated,
            }],
            Some("up"),
        );
        assert!(canvas.data().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_label_clamps_to_canvas_top() {
        // Head at the very top: the label must not clip above y = 0
        let landmarks = [NormalizedLandmark::with_confidence(0.5, 0.0, 0.0, 1.0, 1.0)];
        let mut canvas = blank_canvas(200, 200);
        let annotator = FrameAnnotator::default();
        annotator.annotate(
            &mut canvas,
            200,
            200,
            &[SkeletonOverlay {
                kind: SkeletonKind::Pose,
                landmarks: &landmarks,
            }],
            Some("standing"),
        );
        let label = annotator.style.label_color;
        let mut found = false;
        'rows: for y in 0..21 {
            for x in 0..200 {
                if canvas.pixel(x, y) == label {
                    found = true;
                    break 'rows;
                }
            }
        }
        assert!(found, "label pixels must land inside the canvas");
    }
}
