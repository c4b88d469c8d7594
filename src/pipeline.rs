use anyhow::{Context as AnyhowContext, Result};
use log::info;
use tracing::Span;
use tracing_indicatif::span_ext::IndicatifSpanExt;

use crate::camera::DepthCamera;
use crate::config::Config;
use crate::depth::DepthAnnotator;
use crate::detector::ShiTomasi;
use crate::frame::PyramidFrame;
use crate::optical_flow::PyramidalLk;
use crate::tracker::Tracker;
use crate::visualization::{draw_track, RenderSurface};

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PipelineState {
    /// No frame captured yet; nothing to track against.
    AwaitFirstFrame,
    SteadyState,
    Terminated,
}

/// Per-tick orchestrator. Pulls an aligned frame pair, drives the
/// forward-backward filter over the track set, renders the annotated
/// color frame and evaluates the single per-tick termination check.
pub struct Pipeline {
    camera: Box<dyn DepthCamera>,
    render: Box<dyn RenderSurface>,
    tracker: Tracker,
    annotator: DepthAnnotator,
    state: PipelineState,
    prev: Option<PyramidFrame>,
    frame_idx: usize,
    detect_interval: usize,
    lk_levels: usize,
}

impl Pipeline {
    pub fn new(
        camera: Box<dyn DepthCamera>,
        render: Box<dyn RenderSurface>,
        config: &Config,
    ) -> Pipeline {
        let optical_flow = PyramidalLk::new(
            config.lk_win_size,
            config.lk_levels,
            config.lk_iters,
            config.lk_eps,
        );
        let detector = ShiTomasi::new(config.quality_level, config.min_distance, config.block_size);
        let tracker = Tracker::new(Box::new(optical_flow), Box::new(detector), config);
        Pipeline::with_tracker(camera, render, tracker, config)
    }

    /// Assemble a pipeline around an existing tracker. This is the seam
    /// the end-to-end tests use to substitute oracle fakes.
    pub fn with_tracker(
        camera: Box<dyn DepthCamera>,
        render: Box<dyn RenderSurface>,
        tracker: Tracker,
        config: &Config,
    ) -> Pipeline {
        let annotator = DepthAnnotator::new(
            camera.profile().depth_scale,
            config.depth_valid_min,
            config.depth_near,
            config.depth_far,
        );
        Pipeline {
            camera,
            render,
            tracker,
            annotator,
            state: PipelineState::AwaitFirstFrame,
            prev: None,
            frame_idx: 0,
            detect_interval: config.detect_interval,
            lk_levels: config.lk_levels,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn tracker(&self) -> &Tracker {
        &self.tracker
    }

    /// Drive ticks until termination. A tick error terminates the loop
    /// and propagates; the loop never proceeds on a stale frame.
    pub fn run(&mut self) -> Result<()> {
        while self.state != PipelineState::Terminated {
            self.tick()?;
        }
        Ok(())
    }

    fn tick(&mut self) -> Result<()> {
        let frames = self
            .camera
            .wait_for_frames()
            .context("frame acquisition failed")?;
        let frames = match frames {
            Some(frames) => frames,
            None => {
                info!("end of stream after {} frames", self.frame_idx);
                self.state = PipelineState::Terminated;
                return Ok(());
            }
        };

        let gray = frames.color.to_grayscale();
        let current = PyramidFrame::compute(gray, self.lk_levels)?;
        if self.prev.is_none() {
            // Seed the previous-frame slot from the first capture.
            self.prev = Some(current.clone());
            self.state = PipelineState::SteadyState;
        }

        let mut annotated = frames.color;
        if !self.tracker.tracks().is_empty() {
            let prev = self.prev.as_ref().unwrap();
            self.tracker.track_frame(prev, &current);
            for track in self.tracker.tracks().iter() {
                let raw = frames.depth.sample(track.last());
                let marker = self.annotator.color_for_raw(raw);
                draw_track(&mut annotated, track, marker);
            }
        }

        if self.frame_idx % self.detect_interval == 0 {
            self.tracker.reseed(&current.image);
        }

        self.frame_idx += 1;
        self.prev = Some(current);
        Span::current().pb_inc(1);

        self.render.present(&annotated)?;
        if self.render.should_close() {
            info!("render surface closed, terminating");
            self.state = PipelineState::Terminated;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{AlignedFrameSet, StreamProfile};
    use crate::depth::DepthFrame;
    use crate::detector::{CornerDetector, DetectionMask};
    use crate::image::{Image, RgbImage};
    use crate::my_types::*;
    use crate::optical_flow::{FlowOracle, FlowResult};
    use std::cell::Cell;
    use std::rc::Rc;

    struct FakeCamera {
        profile: StreamProfile,
        frames: Vec<AlignedFrameSet>,
        served: usize,
    }

    impl FakeCamera {
        /// Identical frames with uniform color and a uniform raw depth.
        fn constant(count: usize, raw_depth: u16) -> FakeCamera {
            let width = 32;
            let height = 32;
            let mut color = RgbImage::new(width, height);
            color.data.fill(90);
            let depth = DepthFrame {
                data: vec![raw_depth; width * height],
                width,
                height,
            };
            FakeCamera {
                profile: StreamProfile {
                    width,
                    height,
                    fps: 30,
                    depth_scale: 0.001,
                },
                frames: vec![AlignedFrameSet { color, depth }; count],
                served: 0,
            }
        }
    }

    impl DepthCamera for FakeCamera {
        fn profile(&self) -> &StreamProfile {
            &self.profile
        }

        fn wait_for_frames(&mut self) -> Result<Option<AlignedFrameSet>> {
            if self.served == self.frames.len() {
                return Ok(None);
            }
            self.served += 1;
            Ok(Some(self.frames[self.served - 1].clone()))
        }
    }

    /// Identity flow that counts its invocations.
    struct CountingFlow {
        calls: Rc<Cell<usize>>,
    }

    impl FlowOracle for CountingFlow {
        fn compute_flow(
            &mut self,
            _from: &PyramidFrame,
            _to: &PyramidFrame,
            points: &[Vector2d],
        ) -> FlowResult {
            self.calls.set(self.calls.get() + 1);
            FlowResult {
                points: points.to_vec(),
                status: vec![true; points.len()],
                err: vec![0.; points.len()],
            }
        }
    }

    struct FixedDetector {
        candidates: Vec<Vector2d>,
    }

    impl CornerDetector for FixedDetector {
        fn detect(
            &mut self,
            _image: &Image,
            mask: &DetectionMask,
            max_corners: usize,
        ) -> Vec<Vector2d> {
            self.candidates
                .iter()
                .filter(|p| mask.is_allowed(p.x as usize, p.y as usize))
                .take(max_corners)
                .cloned()
                .collect()
        }
    }

    struct CapturingSurface {
        presents: Rc<Cell<usize>>,
        close_after: usize,
        last: Rc<std::cell::RefCell<Option<RgbImage>>>,
    }

    impl RenderSurface for CapturingSurface {
        fn present(&mut self, image: &RgbImage) -> Result<()> {
            self.presents.set(self.presents.get() + 1);
            *self.last.borrow_mut() = Some(image.clone());
            Ok(())
        }

        fn should_close(&mut self) -> bool {
            self.presents.get() >= self.close_after
        }
    }

    fn build(
        camera: FakeCamera,
        candidates: Vec<Vector2d>,
        close_after: usize,
    ) -> (
        Pipeline,
        Rc<Cell<usize>>,
        Rc<Cell<usize>>,
        Rc<std::cell::RefCell<Option<RgbImage>>>,
    ) {
        let config = Config::default();
        let flow_calls = Rc::new(Cell::new(0));
        let presents = Rc::new(Cell::new(0));
        let last = Rc::new(std::cell::RefCell::new(None));
        let tracker = Tracker::new(
            Box::new(CountingFlow {
                calls: flow_calls.clone(),
            }),
            Box::new(FixedDetector { candidates }),
            &config,
        );
        let surface = CapturingSurface {
            presents: presents.clone(),
            close_after,
            last: last.clone(),
        };
        let pipeline =
            Pipeline::with_tracker(Box::new(camera), Box::new(surface), tracker, &config);
        (pipeline, flow_calls, presents, last)
    }

    #[test]
    fn test_first_tick_reseeds_without_flow() {
        let camera = FakeCamera::constant(1, 1650);
        let candidates = vec![
            Vector2d::new(8., 8.),
            Vector2d::new(16., 16.),
            Vector2d::new(24., 24.),
        ];
        let (mut pipeline, flow_calls, presents, _) = build(camera, candidates, usize::MAX);

        assert_eq!(pipeline.state(), PipelineState::AwaitFirstFrame);
        pipeline.run().unwrap();

        // Tick 0 is a detect-interval boundary: the set was empty at tick
        // start, so no flow ran, and the reseed populated singleton
        // tracks.
        assert_eq!(flow_calls.get(), 0);
        assert_eq!(pipeline.tracker().tracks().len(), 3);
        assert!(pipeline.tracker().tracks().iter().all(|t| t.len() == 1));
        assert_eq!(presents.get(), 1);
        assert_eq!(pipeline.state(), PipelineState::Terminated);
    }

    #[test]
    fn test_steady_state_grows_tracks_and_annotates() {
        let camera = FakeCamera::constant(3, 1650);
        let candidates = vec![Vector2d::new(10., 10.)];
        let (mut pipeline, flow_calls, presents, last) = build(camera, candidates, usize::MAX);

        pipeline.run().unwrap();

        // Ticks 1 and 2 each ran a forward and a backward pass.
        assert_eq!(flow_calls.get(), 4);
        assert_eq!(presents.get(), 3);
        let tracks = pipeline.tracker().tracks();
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks.iter().next().unwrap().len(), 3);

        // The endpoint marker was drawn in a depth color: 1650 raw units
        // at 1 mm per unit sits mid-range, never the sentinel black and
        // never the untouched background.
        let last = last.borrow();
        let pixel = last.as_ref().unwrap().pixel(10, 10);
        assert_ne!(pixel, [90, 90, 90]);
        assert_ne!(pixel, [0, 0, 0]);
    }

    #[test]
    fn test_quit_signal_terminates_early() {
        let camera = FakeCamera::constant(100, 1650);
        let (mut pipeline, _, presents, _) = build(camera, vec![], 1);

        pipeline.run().unwrap();
        assert_eq!(presents.get(), 1);
        assert_eq!(pipeline.state(), PipelineState::Terminated);
    }

    #[test]
    fn test_invalid_depth_marker_is_sentinel() {
        // Raw depth below the validity floor everywhere.
        let camera = FakeCamera::constant(2, 5);
        let candidates = vec![Vector2d::new(16., 16.)];
        let (mut pipeline, _, _, last) = build(camera, candidates, usize::MAX);

        pipeline.run().unwrap();
        let last = last.borrow();
        let pixel = last.as_ref().unwrap().pixel(16, 16);
        assert_eq!(pixel, [0, 0, 0]);
    }
}
