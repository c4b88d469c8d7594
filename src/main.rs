use anyhow::{Context as AnyhowContext, Result};
use clap::Parser;
use log::warn;
use std::path::Path;

use indicatif::ProgressStyle;
use tracing::info_span;
use tracing_indicatif::span_ext::IndicatifSpanExt;
use tracing_indicatif::IndicatifLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use lktrack_rust::camera::DepthCamera;
use lktrack_rust::config::*;
use lktrack_rust::dataset::ReplayCamera;
use lktrack_rust::pipeline::Pipeline;
use lktrack_rust::visualization::RerunSurface;

#[derive(Parser)]
pub struct Args {
    /// Folder holding a recorded stream (data.jsonl plus frame files).
    #[clap(short, default_value = "./data/recordings/desk")]
    pub input_folder: String,

    /// Where the annotated Rerun recording is written.
    #[clap(long, default_value = "./logs/lktrack.rrd")]
    pub output_rrd: String,

    #[clap(flatten)]
    pub config: Config,
}

fn main() -> Result<()> {
    // parse the config
    let args = Args::parse();
    let _ = CONFIG.set(args.config);
    let config = CONFIG.get().unwrap();

    // setup logging
    let indicatif_layer = IndicatifLayer::new();
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(indicatif_layer.get_stdout_writer()))
        .with(indicatif_layer)
        .init();

    // camera start is fatal on failure, before the loop is entered
    let camera = ReplayCamera::new(Path::new(&args.input_folder))
        .context("failed to start the replay camera")?;
    let profile = camera.profile();
    if profile.width != config.frame_width
        || profile.height != config.frame_height
        || profile.fps != config.fps
    {
        warn!(
            "recording is {}x{} @ {} fps, configured stream is {}x{} @ {} fps",
            profile.width,
            profile.height,
            profile.fps,
            config.frame_width,
            config.frame_height,
            config.fps
        );
    }
    let render = RerunSurface::new("lktrack", &args.output_rrd)
        .context("failed to open the render sink")?;

    let header_span = info_span!("header");
    header_span.pb_set_style(&ProgressStyle::default_bar());
    let header_span_enter = header_span.enter();

    let mut pipeline = Pipeline::new(Box::new(camera), Box::new(render), config);
    pipeline.run()?;

    std::mem::drop(header_span_enter);
    std::mem::drop(header_span);

    Ok(())
}
