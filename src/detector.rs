use crate::image::Image;
use crate::my_types::*;

/// Binary map of regions where corner detection is allowed. Starts fully
/// detectable; the reseeder clears disks around live track endpoints so
/// the detector never seeds a near-duplicate on a tracked feature.
#[derive(Clone, Debug)]
pub struct DetectionMask {
    data: Vec<bool>,
    pub width: usize,
    pub height: usize,
}

impl DetectionMask {
    pub fn allow_all(width: usize, height: usize) -> Self {
        DetectionMask {
            data: vec![true; width * height],
            width,
            height,
        }
    }

    #[inline(always)]
    pub fn is_allowed(&self, x: usize, y: usize) -> bool {
        self.data[y * self.width + x]
    }

    /// Mark a filled disk of the given radius as non-detectable. Parts
    /// outside the frame are ignored.
    pub fn clear_disk(&mut self, center: Vector2d, radius: usize) {
        let cx = center.x.round() as i64;
        let cy = center.y.round() as i64;
        let r = radius as i64;
        for dy in -r..=r {
            for dx in -r..=r {
                if dx * dx + dy * dy > r * r {
                    continue;
                }
                let x = cx + dx;
                let y = cy + dy;
                if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
                    continue;
                }
                self.data[y as usize * self.width + x as usize] = false;
            }
        }
    }
}

/// Corner source contract: ranked candidate points, strongest first, each
/// above the relative quality floor, mutually separated by the minimum
/// distance, none inside a masked-out region.
pub trait CornerDetector {
    fn detect(
        &mut self,
        image: &Image,
        mask: &DetectionMask,
        max_corners: usize,
    ) -> Vec<Vector2d>;
}

/// Minimum-eigenvalue ("good features to track") corner detector.
pub struct ShiTomasi {
    quality_level: f64,
    min_distance: f64,
    block_size: usize,
}

impl ShiTomasi {
    pub fn new(quality_level: f64, min_distance: f64, block_size: usize) -> Self {
        assert!(quality_level > 0. && quality_level < 1.);
        assert!(block_size % 2 == 1);
        ShiTomasi {
            quality_level,
            min_distance,
            block_size,
        }
    }

    /// Minimum eigenvalue of the gradient covariance summed over the
    /// block window, for every pixel far enough from the border.
    fn corner_response(&self, image: &Image) -> Vec<f64> {
        let w = image.width;
        let h = image.height;
        let mut ix = vec![0f64; w * h];
        let mut iy = vec![0f64; w * h];
        for y in 1..h - 1 {
            for x in 1..w - 1 {
                let v = |dx: i32, dy: i32| -> f64 {
                    image.value_i32(x as i32 + dx, y as i32 + dy) as f64
                };
                ix[y * w + x] = (10. * (v(1, 0) - v(-1, 0))
                    + 3. * (v(1, 1) - v(-1, 1))
                    + 3. * (v(1, -1) - v(-1, -1)))
                    / 32.;
                iy[y * w + x] = (10. * (v(0, 1) - v(0, -1))
                    + 3. * (v(1, 1) - v(1, -1))
                    + 3. * (v(-1, 1) - v(-1, -1)))
                    / 32.;
            }
        }

        // Summed-area tables of the gradient products.
        let mut sxx = vec![0f64; (w + 1) * (h + 1)];
        let mut syy = vec![0f64; (w + 1) * (h + 1)];
        let mut sxy = vec![0f64; (w + 1) * (h + 1)];
        for y in 0..h {
            for x in 0..w {
                let gx = ix[y * w + x];
                let gy = iy[y * w + x];
                let i = (y + 1) * (w + 1) + (x + 1);
                let up = y * (w + 1) + (x + 1);
                let left = (y + 1) * (w + 1) + x;
                let diag = y * (w + 1) + x;
                sxx[i] = gx * gx + sxx[up] + sxx[left] - sxx[diag];
                syy[i] = gy * gy + syy[up] + syy[left] - syy[diag];
                sxy[i] = gx * gy + sxy[up] + sxy[left] - sxy[diag];
            }
        }
        let window_sum = |table: &[f64], x0: usize, y0: usize, x1: usize, y1: usize| -> f64 {
            // Inclusive pixel rectangle.
            table[(y1 + 1) * (w + 1) + (x1 + 1)] + table[y0 * (w + 1) + x0]
                - table[y0 * (w + 1) + (x1 + 1)]
                - table[(y1 + 1) * (w + 1) + x0]
        };

        let r = self.block_size / 2;
        let mut response = vec![0f64; w * h];
        if w < self.block_size + 2 || h < self.block_size + 2 {
            return response;
        }
        for y in (r + 1)..(h - r - 1) {
            for x in (r + 1)..(w - r - 1) {
                let xx = window_sum(&sxx, x - r, y - r, x + r, y + r);
                let yy = window_sum(&syy, x - r, y - r, x + r, y + r);
                let xy = window_sum(&sxy, x - r, y - r, x + r, y + r);
                let trace = xx + yy;
                let det_part = ((xx - yy).powi(2) + 4. * xy * xy).sqrt();
                response[y * w + x] = 0.5 * (trace - det_part);
            }
        }
        response
    }
}

impl CornerDetector for ShiTomasi {
    fn detect(
        &mut self,
        image: &Image,
        mask: &DetectionMask,
        max_corners: usize,
    ) -> Vec<Vector2d> {
        assert_eq!(mask.width, image.width);
        assert_eq!(mask.height, image.height);
        if max_corners == 0 {
            return vec![];
        }

        let w = image.width;
        let h = image.height;
        let response = self.corner_response(image);

        let max_response = response
            .iter()
            .enumerate()
            .filter(|(i, _)| mask.is_allowed(i % w, i / w))
            .map(|(_, &v)| v)
            .fold(0f64, f64::max);
        if max_response <= 0. {
            return vec![];
        }
        let threshold = self.quality_level * max_response;

        // Candidates: thresholded local maxima in allowed regions.
        let mut candidates: Vec<(f64, usize, usize)> = vec![];
        for y in 1..h - 1 {
            for x in 1..w - 1 {
                let v = response[y * w + x];
                if v < threshold || v <= 0. || !mask.is_allowed(x, y) {
                    continue;
                }
                let mut local_max = true;
                'nms: for dy in -1i32..=1 {
                    for dx in -1i32..=1 {
                        if dx == 0 && dy == 0 {
                            continue;
                        }
                        let n = (y as i32 + dy) as usize * w + (x as i32 + dx) as usize;
                        if response[n] > v {
                            local_max = false;
                            break 'nms;
                        }
                    }
                }
                if local_max {
                    candidates.push((v, x, y));
                }
            }
        }
        candidates.sort_unstable_by(|a, b| b.0.partial_cmp(&a.0).unwrap());

        // Greedy minimum-distance suppression over a coarse grid, the
        // strongest candidates claiming space first.
        let cell = self.min_distance.max(1.).ceil() as usize;
        let grid_w = w / cell + 1;
        let grid_h = h / cell + 1;
        let mut grid: Vec<Vec<Vector2d>> = vec![vec![]; grid_w * grid_h];
        let min_dist2 = self.min_distance * self.min_distance;

        let mut corners = vec![];
        for (_, x, y) in candidates {
            let point = Vector2d::new(x as f64, y as f64);
            let gx = x / cell;
            let gy = y / cell;
            let mut free = true;
            'search: for ny in gy.saturating_sub(1)..=(gy + 1).min(grid_h - 1) {
                for nx in gx.saturating_sub(1)..=(gx + 1).min(grid_w - 1) {
                    for other in &grid[ny * grid_w + nx] {
                        if (point - other).norm_squared() < min_dist2 {
                            free = false;
                            break 'search;
                        }
                    }
                }
            }
            if !free {
                continue;
            }
            grid[gy * grid_w + gx].push(point);
            corners.push(point);
            if corners.len() == max_corners {
                break;
            }
        }
        corners
    }
}
