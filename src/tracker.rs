use log::debug;

use crate::config::Config;
use crate::detector::{CornerDetector, DetectionMask};
use crate::frame::PyramidFrame;
use crate::image::Image;
use crate::my_types::*;
use crate::optical_flow::FlowOracle;
use crate::track::TrackSet;

/// Owns the track set and drives its lifecycle: the forward-backward
/// consistency pass that decides which tracks survive a frame, and the
/// periodic reseed pass that births new tracks away from live endpoints.
pub struct Tracker {
    optical_flow: Box<dyn FlowOracle>,
    detector: Box<dyn CornerDetector>,
    tracks: TrackSet,
    fb_max_dist: f64,
    max_corners: usize,
    max_tracks: usize,
    mask_radius: usize,
}

impl Tracker {
    pub fn new(
        optical_flow: Box<dyn FlowOracle>,
        detector: Box<dyn CornerDetector>,
        config: &Config,
    ) -> Self {
        Tracker {
            optical_flow,
            detector,
            tracks: TrackSet::new(config.track_len),
            fb_max_dist: config.fb_max_dist,
            max_corners: config.max_corners,
            max_tracks: config.max_tracks,
            mask_radius: config.mask_radius,
        }
    }

    pub fn tracks(&self) -> &TrackSet {
        &self.tracks
    }

    /// Forward-backward consistency pass. Every track endpoint is tracked
    /// from the previous frame to the current one and back again; a track
    /// survives iff the round trip returns within `fb_max_dist` of its
    /// origin and the oracle reported success on both passes. Survivors
    /// get the forward point appended (oldest point evicted at the window
    /// limit), everything else is pruned.
    ///
    /// Skipped entirely when no tracks are alive.
    pub fn track_frame(&mut self, prev: &PyramidFrame, current: &PyramidFrame) {
        if self.tracks.is_empty() {
            return;
        }

        let p0 = self.tracks.latest_points();
        let forward = self.optical_flow.compute_flow(prev, current, &p0);
        let backward = self
            .optical_flow
            .compute_flow(current, prev, &forward.points);

        let mut surviving = vec![];
        for i in 0..p0.len() {
            let d = (p0[i] - backward.points[i]).norm();
            if d < self.fb_max_dist && forward.status[i] && backward.status[i] {
                self.tracks.append_and_trim(i, forward.points[i]);
                surviving.push(i);
            }
        }
        debug!(
            "consistency pass kept {} of {} tracks",
            surviving.len(),
            p0.len()
        );
        self.tracks.prune(&surviving);
    }

    /// Reseed pass: detect fresh corners away from live track endpoints
    /// and start a singleton track for each, up to the track cap. The
    /// caller invokes this on its detect-interval cadence.
    pub fn reseed(&mut self, image: &Image) {
        let headroom = self.max_tracks.saturating_sub(self.tracks.len());
        if headroom == 0 {
            debug!("track cap reached, skipping reseed");
            return;
        }

        let mut mask = DetectionMask::allow_all(image.width, image.height);
        for point in self.tracks.latest_points() {
            mask.clear_disk(point, self.mask_radius);
        }

        let limit = usize::min(self.max_corners, headroom);
        let corners = self.detector.detect(image, &mask, limit);
        debug!("reseed injected {} tracks", corners.len());
        self.tracks.inject_new_tracks(&corners);
    }
}
