use nalgebra as na;

use crate::frame::PyramidFrame;
use crate::image::*;
use crate::my_types::*;

type Range = [[i16; 2]; 2];

/// Per-call output of a flow oracle. All three vectors have the input
/// length: a point whose tracking failed still gets its best estimate
/// back, with `status` cleared.
#[derive(Clone, Debug, Default)]
pub struct FlowResult {
    pub points: Vec<Vector2d>,
    pub status: Vec<bool>,
    pub err: Vec<f64>,
}

impl FlowResult {
    pub fn with_capacity(n: usize) -> Self {
        FlowResult {
            points: Vec::with_capacity(n),
            status: Vec::with_capacity(n),
            err: Vec::with_capacity(n),
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }
}

/// Sparse correspondence primitive: given two frames and query points in
/// the first, produce the corresponding points in the second. Not
/// guaranteed invertible; callers that need trustworthy correspondences
/// run it both ways and compare (see the tracker's round-trip test).
pub trait FlowOracle {
    fn compute_flow(
        &mut self,
        from: &PyramidFrame,
        to: &PyramidFrame,
        points: &[Vector2d],
    ) -> FlowResult;
}

/// Pyramidal Lucas-Kanade flow.
/// ref http://robots.stanford.edu/cs223b04/algo_tracking.pdf
pub struct PyramidalLk {
    lk_iters: usize,
    lk_levels: usize,
    lk_win_size: usize,
    lk_term: f64,
    lk_min_eig: f64,
    ix: Matrixd,
    iy: Matrixd,
    it: Matrixd,
    grid: Matrixd,
}

impl PyramidalLk {
    pub fn new(lk_win_size: usize, lk_levels: usize, lk_iters: usize, lk_term: f64) -> Self {
        assert!(lk_win_size % 2 == 1);
        let lk_min_eig = 1e-4;
        PyramidalLk {
            lk_iters,
            lk_levels,
            lk_win_size,
            lk_term,
            lk_min_eig,
            ix: na::DMatrix::zeros(lk_win_size, lk_win_size),
            iy: na::DMatrix::zeros(lk_win_size, lk_win_size),
            it: na::DMatrix::zeros(lk_win_size, lk_win_size),
            grid: na::DMatrix::zeros(lk_win_size, lk_win_size),
        }
    }

    /// Track a single point from `frame0` to `frame1`, coarse to fine.
    /// Returns (estimate, status, residual). Status is cleared when the
    /// point leaves the integration range, sits on degenerate texture or
    /// fails to converge; the estimate is still the best one found.
    fn track_point(
        &mut self,
        frame0: &PyramidFrame,
        frame1: &PyramidFrame,
        point: Vector2d,
    ) -> (Vector2d, bool, f64) {
        let levels = usize::min(
            self.lk_levels,
            usize::min(frame0.level_count(), frame1.level_count()) - 1,
        );
        let lk_term2 = self.lk_term.powi(2);
        let r = (self.lk_win_size - 1) / 2;

        let mut g_init = Vector2d::zeros();
        let mut d = Vector2d::zeros();
        let mut residual = 0.;
        for level in (0..levels + 1).rev() {
            let scale = u32::pow(2, level as u32) as f64;
            let level0 = frame0.get_image_at_level(level);
            let level1 = frame1.get_image_at_level(level);
            let u = point / scale;

            let range = match integration_range(level0, u, r, 1) {
                Some(range) => range,
                None => return (point + g_init * scale, false, residual),
            };
            scharr(
                level0,
                u,
                range,
                &mut self.ix,
                &mut self.iy,
                &mut self.grid,
            );
            let gradient = spatial_gradient(&self.ix, &self.iy);
            match gradient.eigenvalues() {
                Some(eig) if eig.min() >= self.lk_min_eig => {}
                _ => return (point + g_init * scale, false, residual),
            }

            let mut converged = false;
            let mut nu = Vector2d::zeros();
            for _ in 0..self.lk_iters {
                let diff = image_difference(
                    range,
                    r,
                    &self.grid,
                    &mut self.it,
                    level1,
                    u + g_init + nu,
                );
                if diff.is_none() {
                    return (point + (g_init + nu) * scale, false, residual);
                }
                let eta = match flow_vector(&gradient, &self.ix, &self.iy, &self.it) {
                    Some(eta) => eta,
                    None => return (point + (g_init + nu) * scale, false, residual),
                };
                nu += eta;
                if eta.norm_squared() < lk_term2 {
                    converged = true;
                    break;
                }
            }

            d = nu;
            residual = mean_abs(&self.it);
            if !converged {
                return (point + (g_init + d) * scale, false, residual);
            }
            if level > 0 {
                g_init = 2. * (g_init + d)
            }
        }

        (point + g_init + d, true, residual)
    }
}

impl FlowOracle for PyramidalLk {
    fn compute_flow(
        &mut self,
        from: &PyramidFrame,
        to: &PyramidFrame,
        points: &[Vector2d],
    ) -> FlowResult {
        let mut result = FlowResult::with_capacity(points.len());
        for &point in points {
            let (tracked, status, err) = self.track_point(from, to, point);
            result.points.push(tracked);
            result.status.push(status);
            result.err.push(err);
        }
        result
    }
}

fn mean_abs(m: &Matrixd) -> f64 {
    if m.is_empty() {
        return 0.;
    }
    m.iter().map(|v| v.abs()).sum::<f64>() / m.len() as f64
}

fn flow_vector(gradient: &Matrix2d, ix: &Matrixd, iy: &Matrixd, it: &Matrixd) -> Option<Vector2d> {
    let mut b = Vector2d::zeros();

    for y in 0..iy.nrows() {
        for x in 0..ix.ncols() {
            b[0] += it[(y, x)] * ix[(y, x)];
            b[1] += it[(y, x)] * iy[(y, x)];
        }
    }

    gradient.try_inverse().map(|inv_g| inv_g * b)
}

/// Difference between the reference window (`i0`, gathered with one pixel
/// of padding) and the window of `level` at `center`. Fails if the window
/// at the displaced center no longer fits the image the same way.
fn image_difference(
    prev_range: Range,
    r: usize,
    i0: &Matrixd,
    mut it: &mut Matrixd,
    level: &Image,
    center: Vector2d,
) -> Option<()> {
    let range = integration_range(level, center, r, 0)?;
    if range != prev_range {
        return None;
    }
    fill_grid(level, range, center, &mut it);
    *it *= -1.;
    *it += i0.slice((1, 1), (it.nrows(), it.ncols()));
    Some(())
}

fn spatial_gradient(ix: &Matrixd, iy: &Matrixd) -> Matrix2d {
    assert_eq!(ix.nrows(), iy.nrows());
    assert_eq!(ix.ncols(), iy.ncols());

    let mut x2 = 0.;
    let mut y2 = 0.;
    let mut xy = 0.;

    for y in 0..iy.nrows() {
        for x in 0..ix.ncols() {
            x2 += ix[(y, x)] * ix[(y, x)];
            y2 += iy[(y, x)] * iy[(y, x)];
            xy += ix[(y, x)] * iy[(y, x)];
        }
    }

    Matrix2d::new(x2, xy, xy, y2)
}

/// ref https://theailearner.com/tag/scharr-operator/
fn scharr(
    level: &Image,
    center: Vector2d,
    range: Range,
    out_x: &mut Matrixd,
    out_y: &mut Matrixd,
    mut grid: &mut Matrixd,
) {
    let grange = [
        [range[0][0] - 1, range[0][1] + 1],
        [range[1][0] - 1, range[1][1] + 1],
    ];
    fill_grid(level, grange, center, &mut grid);

    *out_x = Matrixd::zeros(grid.nrows() - 2, grid.ncols() - 2);
    *out_y = Matrixd::zeros(grid.nrows() - 2, grid.ncols() - 2);
    for y in 1..(grid.nrows() - 1) {
        for x in 1..(grid.ncols() - 1) {
            out_x[(y - 1, x - 1)] =
                (10. * grid[(y, x + 1)] + 3. * grid[(y + 1, x + 1)] + 3. * grid[(y - 1, x + 1)]
                    - 10. * grid[(y, x - 1)]
                    - 3. * grid[(y + 1, x - 1)]
                    - 3. * grid[(y - 1, x - 1)])
                    / 32.;
            out_y[(y - 1, x - 1)] =
                (10. * grid[(y + 1, x)] + 3. * grid[(y + 1, x + 1)] + 3. * grid[(y + 1, x - 1)]
                    - 10. * grid[(y - 1, x)]
                    - 3. * grid[(y - 1, x + 1)]
                    - 3. * grid[(y - 1, x - 1)])
                    / 32.;
        }
    }
}

fn fill_grid(level: &Image, range: Range, center: Vector2d, grid: &mut Matrixd) {
    *grid = na::DMatrix::zeros(
        (range[1][1] - range[1][0] + 1) as usize,
        (range[0][1] - range[0][0] + 1) as usize,
    );

    for (y_ind, y) in (range[1][0]..=range[1][1]).enumerate() {
        for (x_ind, x) in (range[0][0]..=range[0][1]).enumerate() {
            grid[(y_ind, x_ind)] = bilinear(level, center + Vector2d::new(x as f64, y as f64));
        }
    }
}

/// Returns closed range of integer steps that can be taken without going
/// outside the image borders. Returns None if the center point is outside
/// the level boundaries.
fn integration_range(level: &Image, center: Vector2d, r: usize, padding: i16) -> Option<Range> {
    let r = r as i16;
    let mut range = [[0, 0], [0, 0]];
    for i in 0..2 {
        let s = if i == 0 { level.width } else { level.height };
        if center[i] < 0. || center[i] > (s - 1) as f64 {
            return None;
        }
        let n = center[i] as i16;
        let fract = if center[i].fract() > 0. { 1 } else { 0 };
        range[i] = [
            i16::max(-r, -n + padding),
            i16::min(r, s as i16 - n - padding - 1 - fract),
        ]
    }
    Some(range)
}
