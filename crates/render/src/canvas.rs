//! RGB pixel buffer with the handful of primitives the graph engine
//! needs: alpha-blended fills, stroked polylines with round joins, dots,
//! and bitmap text.

use strata_chart::Color;

use crate::font;

pub struct Canvas {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl Canvas {
    pub fn new(width: u32, height: u32, background: Color) -> Self {
        let mut pixels = Vec::with_capacity((width * height * 3) as usize);
        for _ in 0..width * height {
            pixels.extend_from_slice(&[background.r, background.g, background.b]);
        }
        Self {
            width,
            height,
            pixels,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn into_rgb(self) -> Vec<u8> {
        self.pixels
    }

    /// Source-over blend of `color` at `(x, y)`; out-of-bounds writes are
    /// silently dropped.
    pub fn blend(&mut self, x: i64, y: i64, color: Color) {
        if x < 0 || y < 0 || x >= i64::from(self.width) || y >= i64::from(self.height) {
            return;
        }
        let idx = ((y as u32 * self.width + x as u32) * 3) as usize;
        let a = u32::from(color.a);
        for (offset, src) in [color.r, color.g, color.b].into_iter().enumerate() {
            let dst = u32::from(self.pixels[idx + offset]);
            // Rounded integer source-over: (src*a + dst*(255-a)) / 255.
            let out = (u32::from(src) * a + dst * (255 - a) + 127) / 255;
            self.pixels[idx + offset] = out as u8;
        }
    }

    pub fn fill_rect(&mut self, x: i64, y: i64, w: i64, h: i64, color: Color) {
        for py in y..y + h {
            for px in x..x + w {
                self.blend(px, py, color);
            }
        }
    }

    /// Filled disc of the given diameter; a diameter of 1 is a single
    /// pixel. Used for line joins and isolated samples.
    pub fn dot(&mut self, cx: i64, cy: i64, diameter: u32, color: Color) {
        if diameter <= 1 {
            self.blend(cx, cy, color);
            return;
        }
        let r = i64::from(diameter) / 2;
        let r2 = i64::from(diameter) * i64::from(diameter) / 4;
        for dy in -r..=r {
            for dx in -r..=r {
                if dx * dx + dy * dy <= r2 {
                    self.blend(cx + dx, cy + dy, color);
                }
            }
        }
    }

    /// Bresenham stroke from `(x0, y0)` to `(x1, y1)`. Widths above one
    /// stamp a disc at every step, which gives the round joins.
    pub fn line(&mut self, x0: i64, y0: i64, x1: i64, y1: i64, width: u32, color: Color) {
        let dx = (x1 - x0).abs();
        let dy = -(y1 - y0).abs();
        let sx = if x0 < x1 { 1 } else { -1 };
        let sy = if y0 < y1 { 1 } else { -1 };
        let mut err = dx + dy;
        let (mut x, mut y) = (x0, y0);
        loop {
            if width <= 1 {
                self.blend(x, y, color);
            } else {
                self.dot(x, y, width, color);
            }
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

    /// Draw `text` with its top-left corner at `(x, y)`.
    pub fn draw_text(&mut self, x: i64, y: i64, text: &str, color: Color, scale: u32) {
        let scale = scale.max(1) as i64;
        let mut pen_x = x;
        for c in text.chars() {
            let columns = font::glyph(c);
            for (col, bits) in columns.iter().enumerate() {
                for row in 0..font::GLYPH_HEIGHT {
                    if bits & (1 << row) != 0 {
                        self.fill_block(
                            pen_x + col as i64 * scale,
                            y + i64::from(row) * scale,
                            scale,
                            color,
                        );
                    }
                }
            }
            pen_x += i64::from(font::ADVANCE) * scale;
        }
    }

    /// Draw `text` rotated 90° counter-clockwise, reading bottom-to-top,
    /// with `(x, y)` the top-left of the rotated block.
    pub fn draw_text_up(&mut self, x: i64, y: i64, text: &str, color: Color, scale: u32) {
        let scale = scale.max(1) as i64;
        let total = i64::from(font::text_width(text, 1)) * scale;
        let mut pen = total;
        for c in text.chars() {
            pen -= i64::from(font::GLYPH_WIDTH) * scale;
            let columns = font::glyph(c);
            for (col, bits) in columns.iter().enumerate() {
                for row in 0..font::GLYPH_HEIGHT {
                    if bits & (1 << row) != 0 {
                        // (col, row) -> rotated: x' = row, y' = width-1-col
                        self.fill_block(
                            x + i64::from(row) * scale,
                            y + pen + (i64::from(font::GLYPH_WIDTH) - 1 - col as i64) * scale,
                            scale,
                            color,
                        );
                    }
                }
            }
            pen -= scale; // inter-glyph spacing
        }
    }

    fn fill_block(&mut self, x: i64, y: i64, scale: i64, color: Color) {
        for dy in 0..scale {
            for dx in 0..scale {
                self.blend(x + dx, y + dy, color);
            }
        }
    }
}
