use anyhow::Result;
use ndarray as nd;
use rerun::{RecordingStream, RecordingStreamBuilder};

use crate::image::RgbImage;
use crate::my_types::*;
use crate::track::Track;

/// Polyline color for track histories.
pub const TRACK_COLOR: Rgb = [0, 255, 0];
/// Radius of the depth-colored endpoint marker.
pub const MARKER_RADIUS: usize = 3;

/// Display sink for the annotated stream, plus the user's way out.
/// `should_close` covers both an explicit quit signal and the surface
/// ceasing to exist.
pub trait RenderSurface {
    fn present(&mut self, image: &RgbImage) -> Result<()>;

    fn should_close(&mut self) -> bool;
}

/// Logs annotated frames into a Rerun recording. Has no window of its
/// own, so it never asks to close; replay runs end with the stream.
pub struct RerunSurface {
    recorder: RecordingStream,
}

impl RerunSurface {
    pub fn new(application_id: &str, path: &str) -> Result<Self> {
        if let Some(parent) = std::path::Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let recorder = RecordingStreamBuilder::new(application_id).save(path)?;
        Ok(RerunSurface { recorder })
    }
}

impl RenderSurface for RerunSurface {
    fn present(&mut self, image: &RgbImage) -> Result<()> {
        let array = nd::Array3::from_shape_vec(
            (image.height, image.width, 3),
            image.data.clone(),
        )?;
        self.recorder
            .log("camera/annotated", &rerun::Image::try_from(array)?)?;
        Ok(())
    }

    fn should_close(&mut self) -> bool {
        false
    }
}

/// Draw one track: its point history as a polyline and a filled marker at
/// the current endpoint in the caller-chosen (depth-derived) color.
pub fn draw_track(image: &mut RgbImage, track: &Track, marker_color: Rgb) {
    let points: Vec<&Vector2d> = track.points().collect();
    for pair in points.windows(2) {
        draw_line(image, *pair[0], *pair[1], TRACK_COLOR);
    }
    draw_filled_circle(image, track.last(), MARKER_RADIUS, marker_color);
}

/// Bresenham line, clipped per pixel.
pub fn draw_line(image: &mut RgbImage, a: Vector2d, b: Vector2d, color: Rgb) {
    let mut x = a.x.round() as i64;
    let mut y = a.y.round() as i64;
    let x1 = b.x.round() as i64;
    let y1 = b.y.round() as i64;

    let dx = (x1 - x).abs();
    let dy = -(y1 - y).abs();
    let sx = if x < x1 { 1 } else { -1 };
    let sy = if y < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        put_pixel_clipped(image, x, y, color);
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

pub fn draw_filled_circle(image: &mut RgbImage, center: Vector2d, radius: usize, color: Rgb) {
    let cx = center.x.round() as i64;
    let cy = center.y.round() as i64;
    let r = radius as i64;
    for dy in -r..=r {
        for dx in -r..=r {
            if dx * dx + dy * dy <= r * r {
                put_pixel_clipped(image, cx + dx, cy + dy, color);
            }
        }
    }
}

#[inline(always)]
fn put_pixel_clipped(image: &mut RgbImage, x: i64, y: i64, color: Rgb) {
    if x < 0 || y < 0 || x >= image.width as i64 || y >= image.height as i64 {
        return;
    }
    image.set_pixel(x as usize, y as usize, color);
}
