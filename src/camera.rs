use anyhow::Result;

use crate::depth::DepthFrame;
use crate::image::RgbImage;

/// Stream geometry and the raw-to-meters depth factor, fixed once the
/// camera has started.
#[derive(Clone, Debug)]
pub struct StreamProfile {
    pub width: usize,
    pub height: usize,
    pub fps: usize,
    /// Multiplying a raw u16 depth sample by this yields meters.
    pub depth_scale: f64,
}

/// One synchronized capture: a color frame and a depth frame sharing the
/// same pixel grid and timestamp.
#[derive(Clone, Debug)]
pub struct AlignedFrameSet {
    pub color: RgbImage,
    pub depth: DepthFrame,
}

/// Source of aligned color+depth frame pairs. Construction performs the
/// fatal startup handshake; per-tick acquisition blocks until a frame set
/// is available.
///
/// `Ok(None)` means the stream ended cleanly (a replay ran out of frames);
/// `Err` is a fault the loop must not track through.
pub trait DepthCamera {
    fn profile(&self) -> &StreamProfile;

    fn wait_for_frames(&mut self) -> Result<Option<AlignedFrameSet>>;
}
