use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context as AnyhowContext, Result};
use log::warn;
use serde::{Deserialize, Serialize};

use crate::camera::{AlignedFrameSet, DepthCamera, StreamProfile};
use crate::depth::DepthFrame;
use crate::image::RgbImage;

/// Replays a recorded stream of aligned color+depth pairs from a folder:
/// a `data.jsonl` index whose first record is the stream profile, then
/// one record per frame pointing at a raw RGB8 plane and a raw
/// little-endian Z16 plane.
pub struct ReplayCamera {
    root: PathBuf,
    reader: BufReader<File>,
    line: String,
    profile: StreamProfile,
}

#[derive(Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileRecord {
    pub width: usize,
    pub height: usize,
    pub fps: usize,
    pub depth_scale: f64,
}

#[derive(Debug, PartialEq, Deserialize, Serialize)]
pub struct FrameRecord {
    pub time: f64,
    pub color: String,
    pub depth: String,
}

impl ReplayCamera {
    pub fn new(path: &Path) -> Result<ReplayCamera> {
        let file = File::open(path.join("data.jsonl"))
            .with_context(|| format!("open recording index in {}", path.display()))?;
        let mut reader = BufReader::new(file);

        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 {
            bail!("recording index is empty");
        }
        let profile: ProfileRecord = serde_json::from_str(&line)
            .context("first record of a recording must be the stream profile")?;
        if profile.depth_scale <= 0. {
            bail!("recording has non-positive depth scale {}", profile.depth_scale);
        }

        Ok(ReplayCamera {
            root: path.to_path_buf(),
            reader,
            line,
            profile: StreamProfile {
                width: profile.width,
                height: profile.height,
                fps: profile.fps,
                depth_scale: profile.depth_scale,
            },
        })
    }

    fn read_raw(&self, name: &str, expected: usize) -> Result<Vec<u8>> {
        let path = self.root.join(name);
        let mut file =
            File::open(&path).with_context(|| format!("open frame file {}", path.display()))?;
        let mut data = Vec::with_capacity(expected);
        file.read_to_end(&mut data)?;
        if data.len() != expected {
            bail!(
                "frame file {} holds {} bytes, expected {}",
                path.display(),
                data.len(),
                expected
            );
        }
        Ok(data)
    }
}

impl DepthCamera for ReplayCamera {
    fn profile(&self) -> &StreamProfile {
        &self.profile
    }

    fn wait_for_frames(&mut self) -> Result<Option<AlignedFrameSet>> {
        let record = loop {
            self.line.clear();
            match self.reader.read_line(&mut self.line) {
                Ok(0) => return Ok(None),
                Err(err) => bail!("failed to read recording index: {err}"),
                _ => {}
            }
            if self.line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<FrameRecord>(&self.line) {
                Ok(record) => break record,
                Err(_) => {
                    warn!("unrecognised record in recording index: {}", self.line.trim());
                    continue;
                }
            }
        };

        let width = self.profile.width;
        let height = self.profile.height;

        let color = RgbImage {
            data: self.read_raw(&record.color, width * height * 3)?,
            width,
            height,
        };

        let raw_depth = self.read_raw(&record.depth, width * height * 2)?;
        let depth = DepthFrame {
            data: raw_depth
                .chunks_exact(2)
                .map(|b| u16::from_le_bytes([b[0], b[1]]))
                .collect(),
            width,
            height,
        };

        Ok(Some(AlignedFrameSet { color, depth }))
    }
}
