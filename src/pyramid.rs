use anyhow::{bail, Result};

use crate::image::Image;

const NAIVE_DOWNSCALE: bool = false;

/// Downscale pyramid for coarse-to-fine flow. Level 0 here is half the
/// resolution of the source image; the source itself is kept next to the
/// pyramid in `PyramidFrame`.
#[derive(Clone, Debug)]
pub struct Pyramid {
    pub levels: Vec<Image>,
    pub parent_size: [usize; 2],
}

impl Pyramid {
    pub fn empty() -> Self {
        Self {
            levels: vec![],
            parent_size: [0; 2],
        }
    }

    pub fn compute(&mut self, frame: &Image, level_count: usize) -> Result<()> {
        self.compute_levels(frame, level_count)?;
        self.parent_size = [frame.width, frame.height];
        Ok(())
    }

    fn compute_levels(&mut self, frame: &Image, level_count: usize) -> Result<()> {
        while self.levels.len() < level_count {
            self.levels.push(Image::empty())
        }
        if level_count == 0 {
            return Ok(());
        }
        downscale(frame, &mut self.levels[0])?;
        for i in 0..(level_count - 1) {
            let rest = &mut self.levels[i..];
            if let Some((parent, rest)) = rest.split_first_mut() {
                downscale(parent, &mut rest[0])?;
            }
        }
        Ok(())
    }
}

/// Downscale the parent image by two and store the result in child.
fn downscale(parent: &Image, child: &mut Image) -> Result<()> {
    let w = parent.width as i32;
    let h = parent.height as i32;
    if w % 2 != 0 || h % 2 != 0 {
        bail!("cannot downscale image with shape {w} x {h}");
    }

    let w_half = w / 2;
    let h_half = h / 2;
    child.data.clear();
    child.width = w_half as usize;
    child.height = h_half as usize;

    let v = |x: i32, y: i32| -> u16 {
        let x = x.clamp(0, w - 1);
        let y = y.clamp(0, h - 1);
        parent.value(x as usize, y as usize) as u16
    };

    for y in 0..h_half {
        let y2 = 2 * y;
        for x in 0..w_half {
            let x2 = 2 * x;
            let value = if NAIVE_DOWNSCALE {
                (v(x2, y2) + v(x2 + 1, y2) + v(x2, y2 + 1) + v(x2 + 1, y2 + 1)) / 4
            } else {
                // Binomial-weighted 3x3 around the even source pixel.
                v(x2, y2) / 4
                    + (v(x2 + 1, y2) + v(x2 - 1, y2) + v(x2, y2 + 1) + v(x2, y2 - 1)) / 8
                    + (v(x2 + 1, y2 + 1)
                        + v(x2 - 1, y2 - 1)
                        + v(x2 - 1, y2 + 1)
                        + v(x2 + 1, y2 - 1))
                        / 16
            };
            child.data.push(value as u8);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_shapes() {
        let image = Image {
            data: vec![128; 64 * 48],
            width: 64,
            height: 48,
        };
        let mut pyramid = Pyramid::empty();
        pyramid.compute(&image, 3).unwrap();
        assert_eq!(pyramid.parent_size, [64, 48]);
        let shapes: Vec<[usize; 2]> = pyramid
            .levels
            .iter()
            .map(|l| [l.width, l.height])
            .collect();
        assert_eq!(shapes, vec![[32, 24], [16, 12], [8, 6]]);
    }

    #[test]
    fn test_constant_image_stays_constant() {
        let image = Image {
            data: vec![200; 32 * 32],
            width: 32,
            height: 32,
        };
        let mut pyramid = Pyramid::empty();
        pyramid.compute(&image, 2).unwrap();
        for level in &pyramid.levels {
            // Integer division in the kernel may lose at most a few counts.
            assert!(level.data.iter().all(|&v| v >= 197 && v <= 200));
        }
    }

    #[test]
    fn test_odd_shape_rejected() {
        let image = Image {
            data: vec![0; 63 * 48],
            width: 63,
            height: 48,
        };
        let mut pyramid = Pyramid::empty();
        assert!(pyramid.compute(&image, 1).is_err());
    }
}
