use anyhow::Result;

use crate::image::Image;
use crate::pyramid::Pyramid;

/// A grayscale frame together with its downscale pyramid, the unit the
/// flow oracle consumes. The pipeline keeps two of these alive at a time:
/// the previous and the current frame.
#[derive(Clone, Debug)]
pub struct PyramidFrame {
    /// original image
    pub image: Image,
    /// downsized images
    pub pyramid: Pyramid,
}

impl PyramidFrame {
    pub fn compute(image: Image, lk_levels: usize) -> Result<PyramidFrame> {
        let mut pyramid = Pyramid::empty();
        pyramid.compute(&image, lk_levels)?;
        Ok(PyramidFrame { image, pyramid })
    }

    pub fn get_image_at_level(&self, level: usize) -> &Image {
        if level == 0 {
            &self.image
        } else {
            &self.pyramid.levels[level - 1]
        }
    }

    /// Number of usable levels including the full-resolution image.
    pub fn level_count(&self) -> usize {
        self.pyramid.levels.len() + 1
    }
}
