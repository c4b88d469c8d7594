use nalgebra as na;

pub type Vector2d = na::Vector2::<f64>;

pub type Matrix2d = na::Matrix2::<f64>;
pub type Matrixd = nalgebra::DMatrix::<f64>;

/// Interleaved 8-bit RGB triple.
pub type Rgb = [u8; 3];

/// Stable identity of one track, assigned at creation and never reused
/// within a run. Slot indices into the track set are only valid for the
/// current frame; this is the cross-frame handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TrackId(pub usize);
