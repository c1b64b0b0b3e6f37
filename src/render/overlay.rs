use std::collections::HashMap;
use std::sync::Mutex;

use super::font::{glyph, GLYPH_HEIGHT, GLYPH_WIDTH};
use super::skeleton::{
    topology, BACKGROUND_COLOR, JOINT_COLOR, LABEL_COLOR, SKELETON_COLOR, UNKNOWN_DEPTH_COLOR,
};
use super::PacketRenderer;
use crate::packet::{BodyPartDepth, RemoteFrame, SkeletonPacket};

const JOINT_RADIUS: i32 = 4;
const LABEL_SCALE: i32 = 2;

/// "Cover" fit of a frame onto a canvas: fills the canvas, cropping the
/// overflowing axis evenly on both sides.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoverFit {
    pub scale: f32,
    pub offset_x: f32,
    pub offset_y: f32,
}

impl CoverFit {
    /// `None` for a degenerate frame size
    pub fn new(canvas_w: f32, canvas_h: f32, frame_w: f32, frame_h: f32) -> Option<Self> {
        if frame_w <= 0.0 || frame_h <= 0.0 {
            return None;
        }
        let scale = (canvas_w / frame_w).max(canvas_h / frame_h);
        Some(Self {
            scale,
            offset_x: (canvas_w - frame_w * scale) / 2.0,
            offset_y: (canvas_h - frame_h * scale) / 2.0,
        })
    }

    pub fn map(&self, x: f32, y: f32) -> (f32, f32) {
        (x * self.scale + self.offset_x, y * self.scale + self.offset_y)
    }
}

/// 0xRRGGBB pixel buffer with the primitives the overlay needs
#[derive(Debug, Clone)]
pub struct FrameBuffer {
    width: usize,
    height: usize,
    pixels: Vec<u32>,
}

impl FrameBuffer {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; width * height],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn pixels(&self) -> &[u32] {
        &self.pixels
    }

    pub fn pixel(&self, x: usize, y: usize) -> Option<u32> {
        (x < self.width && y < self.height).then(|| self.pixels[y * self.width + x])
    }

    pub fn clear(&mut self, color: u32) {
        self.pixels.fill(color);
    }

    /// Bresenham line. The walk visits every step between the endpoints,
    /// so callers keep them near the canvas.
    pub fn draw_line(&mut self, x0: i32, y0: i32, x1: i32, y1: i32, color: u32) {
        // Widened so the error terms cannot overflow
        let (x0, y0, x1, y1) = (i64::from(x0), i64::from(y0), i64::from(x1), i64::from(y1));
        let dx = (x1 - x0).abs();
        let dy = -(y1 - y0).abs();
        let sx = if x0 < x1 { 1 } else { -1 };
        let sy = if y0 < y1 { 1 } else { -1 };
        let mut err = dx + dy;

        let mut x = x0;
        let mut y = y0;

        loop {
            self.plot(x, y, color);

            if x == x1 && y == y1 {
                break;
            }

            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x += sx;
            }
            if e2 <= dx {
                err += dx;
                y += sy;
            }
        }
    }

    /// Filled circle
    pub fn draw_circle(&mut self, cx: i32, cy: i32, radius: i32, color: u32) {
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                if dx * dx + dy * dy <= radius * radius {
                    self.set_pixel(cx.saturating_add(dx), cy.saturating_add(dy), color);
                }
            }
        }
    }

    /// Text in the built-in 3x5 font; unknown characters advance blank.
    pub fn draw_text(&mut self, x: i32, y: i32, text: &str, scale: i32, color: u32) {
        let scale = i64::from(scale);
        let advance = i64::from(GLYPH_WIDTH + 1) * scale;
        for (i, c) in text.chars().enumerate() {
            let Some(rows) = glyph(c) else { continue };
            let left = i64::from(x) + i as i64 * advance;
            for (row, bits) in rows.iter().enumerate() {
                for col in 0..GLYPH_WIDTH {
                    if bits & (1 << (GLYPH_WIDTH - 1 - col)) == 0 {
                        continue;
                    }
                    let px = left + i64::from(col) * scale;
                    let py = i64::from(y) + row as i64 * scale;
                    for sy in 0..scale {
                        for sx in 0..scale {
                            self.plot(px + sx, py + sy, color);
                        }
                    }
                }
            }
        }
    }

    /// Bounds-checked
    pub fn set_pixel(&mut self, x: i32, y: i32, color: u32) {
        self.plot(i64::from(x), i64::from(y), color);
    }

    fn plot(&mut self, x: i64, y: i64, color: u32) {
        if x >= 0 && x < self.width as i64 && y >= 0 && y < self.height as i64 {
            self.pixels[y as usize * self.width + x as usize] = color;
        }
    }
}

pub fn depth_label(part: &BodyPartDepth) -> String {
    if part.has_distance() {
        format!("{:.0}cm", part.distance_cm)
    } else {
        "?".to_string()
    }
}

/// Draws body parts (pixel coordinates of the source frame) onto a canvas.
#[derive(Debug, Clone)]
pub struct OverlayRenderer {
    edges: Vec<[usize; 2]>,
}

impl Default for OverlayRenderer {
    fn default() -> Self {
        Self::new(topology())
    }
}

impl OverlayRenderer {
    pub fn new(edges: Vec<[usize; 2]>) -> Self {
        Self { edges }
    }

    /// Returns the number of edges drawn.
    pub fn render(
        &self,
        fb: &mut FrameBuffer,
        parts: &[BodyPartDepth],
        frame_width: u32,
        frame_height: u32,
    ) -> usize {
        render_with_edges(fb, &self.edges, parts, frame_width, frame_height)
    }

    /// Remote frames bring their own topology; fall back to ours when absent.
    pub fn render_remote(&self, fb: &mut FrameBuffer, frame: &RemoteFrame) -> usize {
        let edges = if frame.skeleton.is_empty() {
            &self.edges
        } else {
            &frame.skeleton
        };
        let packet = &frame.packet;
        render_with_edges(
            fb,
            edges,
            &packet.body_part_depths,
            packet.camera_width,
            packet.camera_height,
        )
    }
}

fn render_with_edges(
    fb: &mut FrameBuffer,
    edges: &[[usize; 2]],
    parts: &[BodyPartDepth],
    frame_width: u32,
    frame_height: u32,
) -> usize {
    let Some(fit) = CoverFit::new(
        fb.width() as f32,
        fb.height() as f32,
        frame_width as f32,
        frame_height as f32,
    ) else {
        return 0;
    };

    let (w, h) = (fb.width() as f32, fb.height() as f32);
    let mapped: HashMap<usize, (i32, i32)> = parts
        .iter()
        .filter_map(|p| {
            let (x, y) = fit.map(p.x, p.y);
            to_canvas(x, y, w, h).map(|point| (p.id, point))
        })
        .collect();

    let mut drawn = 0;
    for [a, b] in edges {
        // Missing endpoint: skip this edge only
        let (Some(&(x0, y0)), Some(&(x1, y1))) = (mapped.get(a), mapped.get(b)) else {
            continue;
        };
        fb.draw_line(x0, y0, x1, y1, SKELETON_COLOR);
        drawn += 1;
    }

    for part in parts {
        let Some(&(x, y)) = mapped.get(&part.id) else { continue };
        let color = if part.has_distance() {
            JOINT_COLOR
        } else {
            UNKNOWN_DEPTH_COLOR
        };
        fb.draw_circle(x, y, JOINT_RADIUS, color);
        fb.draw_text(
            x + JOINT_RADIUS + 2,
            y - GLYPH_HEIGHT * LABEL_SCALE / 2,
            &depth_label(part),
            LABEL_SCALE,
            LABEL_COLOR,
        );
    }
    drawn
}

/// Pixel position for a mapped point, pinned to one canvas size around the
/// visible area. Non-finite input is dropped.
fn to_canvas(x: f32, y: f32, width: f32, height: f32) -> Option<(i32, i32)> {
    if !x.is_finite() || !y.is_finite() {
        return None;
    }
    Some((
        x.clamp(-width, 2.0 * width).round() as i32,
        y.clamp(-height, 2.0 * height).round() as i32,
    ))
}

/// Overlay behind a lock, so the pipeline can draw and a window can read.
pub struct SharedOverlay {
    renderer: OverlayRenderer,
    buffer: Mutex<FrameBuffer>,
}

impl SharedOverlay {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            renderer: OverlayRenderer::default(),
            buffer: Mutex::new(FrameBuffer::new(width, height)),
        }
    }

    /// Copy of the current buffer
    pub fn snapshot(&self) -> FrameBuffer {
        self.buffer.lock().unwrap().clone()
    }
}

impl PacketRenderer for SharedOverlay {
    fn render_packet(&self, packet: &SkeletonPacket) {
        let mut fb = self.buffer.lock().unwrap();
        fb.clear(BACKGROUND_COLOR);
        self.renderer.render(
            &mut fb,
            &packet.body_part_depths,
            packet.camera_width,
            packet.camera_height,
        );
    }
}
