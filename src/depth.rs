use crate::my_types::*;

/// A 2D field of raw 16-bit depth samples, aligned pixel-for-pixel with
/// the color frame it was captured with.
#[derive(Clone, Debug)]
pub struct DepthFrame {
    pub data: Vec<u16>,
    pub width: usize,
    pub height: usize,
}

impl DepthFrame {
    #[inline(always)]
    pub fn value(&self, x: usize, y: usize) -> u16 {
        self.data[y * self.width + x]
    }

    /// Raw sample at a sub-pixel position, rounded and clamped to the
    /// frame. Used to look depth up under a track endpoint.
    pub fn sample(&self, point: Vector2d) -> u16 {
        let x = (point.x.round() as i64).clamp(0, self.width as i64 - 1) as usize;
        let y = (point.y.round() as i64).clamp(0, self.height as i64 - 1) as usize;
        self.value(x, y)
    }
}

/// "No data" marker, distinct from every colormap entry.
pub const INVALID_DEPTH_COLOR: Rgb = [0, 0, 0];

/// Maps metric depth readings to display colors through a fixed 256-entry
/// jet table. Near readings land at the hot end (index 255), far readings
/// at the cold end (index 0), linear in between.
pub struct DepthAnnotator {
    lut: [Rgb; 256],
    depth_scale: f64,
    valid_min: u16,
    near: f64,
    far: f64,
}

impl DepthAnnotator {
    pub fn new(depth_scale: f64, valid_min: u16, near: f64, far: f64) -> Self {
        assert!(far > near);
        Self {
            lut: jet_colormap(),
            depth_scale,
            valid_min,
            near,
            far,
        }
    }

    /// Color for a raw sensor sample. Samples at or below the validity
    /// floor have no depth information and get the sentinel color rather
    /// than a "far away" one.
    pub fn color_for_raw(&self, raw: u16) -> Rgb {
        if raw <= self.valid_min {
            return INVALID_DEPTH_COLOR;
        }
        self.color_for_meters(self.depth_scale * raw as f64)
    }

    /// Color for a metric depth reading.
    pub fn color_for_meters(&self, depth: f64) -> Rgb {
        self.lut[self.index_for(depth)]
    }

    fn index_for(&self, depth: f64) -> usize {
        let m = -255. / (self.far - self.near);
        let b = 255. - m * self.near;
        let i = (m * depth + b) as i32;
        i.clamp(0, 255) as usize
    }
}

/// The classic jet ramp, blue at index 0 to red at index 255, as
/// piecewise-linear channel ramps.
fn jet_colormap() -> [Rgb; 256] {
    let channel = |v: f64| -> u8 {
        (v.clamp(0., 1.) * 255.).round() as u8
    };
    let mut lut = [[0u8; 3]; 256];
    for (i, entry) in lut.iter_mut().enumerate() {
        let x = i as f64 / 255.;
        let r = 1.5 - (4. * x - 3.).abs();
        let g = 1.5 - (4. * x - 2.).abs();
        let b = 1.5 - (4. * x - 1.).abs();
        *entry = [channel(r), channel(g), channel(b)];
    }
    lut
}
