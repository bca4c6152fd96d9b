//! Filled heart: the region `(u² + v² - 1)³ - u²v³ <= 0`.
//!
//! With `u = x / s` and `v = y / s` for a scale of `s` pixels per unit, the
//! test becomes `(x² + y² - s²)³ - s·x²·y³ <= 0`, which is exact in integers.
//! The shape spans `|u| < 1.14`, `-1 <= v < 1.25`.

use crate::framebuffer::{Color, Framebuffer};

/// Whether the point `(x, y)` (y pointing up) lies inside a heart of scale
/// `s`, centered on the origin.
pub fn contains(x: i64, y: i64, s: i64) -> bool {
    let (x, y, s) = (i128::from(x), i128::from(y), i128::from(s));
    let r = x * x + y * y - s * s;
    r * r * r - s * x * x * y * y * y <= 0
}

/// Draws the heart centered on the screen, as large as fits.
pub fn draw(fb: &mut Framebuffer, color: Color) {
    let (width, height) = (fb.width() as i64, fb.height() as i64);
    let s = width.min(height) * 2 / 5;
    if s == 0 {
        return;
    }
    let (cx, cy) = (width / 2, height / 2);

    // Bounding box with a pixel of margin: u in [-1.2, 1.2], v in [-1.1, 1.3].
    let (x0, x1) = ((cx - s * 6 / 5).max(0), (cx + s * 6 / 5).min(width - 1));
    let (y0, y1) = ((cy - s * 13 / 10).max(0), (cy + s * 11 / 10).min(height - 1));

    for py in y0..=y1 {
        for px in x0..=x1 {
            if contains(px - cx, cy - py, s) {
                // In bounds by construction of the box.
                let _ = fb.put_pixel(px as usize, py as usize, color);
            }
        }
    }
}
