use std::sync::OnceLock;
use clap::Parser;

pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// All tunables of the tracking pipeline. The defaults are the values the
/// system is designed around; the flags exist so a recording can be replayed
/// with different parameters without recompiling.
#[derive(Debug, Clone)]
#[derive(clap::Parser)]
pub struct Config {
    /// Color and depth stream width in pixels.
    #[clap(long, default_value = "640")]
    pub frame_width: usize,

    /// Color and depth stream height in pixels.
    #[clap(long, default_value = "480")]
    pub frame_height: usize,

    /// Stream frame rate.
    #[clap(long, default_value = "30")]
    pub fps: usize,

    /// Maximum number of points kept per track. Appending beyond this
    /// evicts the oldest point.
    #[clap(long, default_value = "10")]
    pub track_len: usize,

    /// Reseed from the corner detector every this many frames.
    #[clap(long, default_value = "5")]
    pub detect_interval: usize,

    /// Hard cap on the total number of live tracks.
    #[clap(long, default_value = "2000")]
    pub max_tracks: usize,

    /// Upper bound on corners returned by one detector query.
    #[clap(long, default_value = "500")]
    pub max_corners: usize,

    /// Corner quality floor, relative to the strongest corner in the frame.
    #[clap(long, default_value = "0.3")]
    pub quality_level: f64,

    /// Minimum pairwise distance between returned corners, in pixels.
    #[clap(long, default_value = "7.0")]
    pub min_distance: f64,

    /// Side length of the corner response summation window.
    #[clap(long, default_value = "7")]
    pub block_size: usize,

    /// Radius of the exclusion disk cleared around every live track
    /// endpoint before detection.
    #[clap(long, default_value = "5")]
    pub mask_radius: usize,

    /// Side length of the Lucas-Kanade integration window.
    #[clap(long, default_value = "15")]
    pub lk_win_size: usize,

    /// Number of pyramid levels above full resolution.
    #[clap(long, default_value = "3")]
    pub lk_levels: usize,

    /// Iteration cap per pyramid level.
    #[clap(long, default_value = "10")]
    pub lk_iters: usize,

    /// Stop iterating once the flow increment norm falls below this.
    #[clap(long, default_value = "0.03")]
    pub lk_eps: f64,

    /// A track survives a frame iff its forward-backward round trip
    /// returns within this many pixels of its origin.
    #[clap(long, default_value = "1.0")]
    pub fb_max_dist: f64,

    /// Raw depth samples at or below this are treated as "no data".
    #[clap(long, default_value = "20")]
    pub depth_valid_min: u16,

    /// Depth mapped to the hot end of the colormap.
    #[clap(long, default_value = "0.3")]
    pub depth_near: f64,

    /// Depth mapped to the cold end of the colormap.
    #[clap(long, default_value = "3.0")]
    pub depth_far: f64,
}

impl Default for Config {
    fn default() -> Self {
        // clap fills in every default_value above.
        Config::parse_from(["lktrack-rust"])
    }
}
