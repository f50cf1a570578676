//! Cell-list global: a regular grid over the primary image feeding
//! candidate pairs to the scheduler and emitting cell-crossing events.
//!
//! Each particle belongs to exactly one cell; cells keep their residents in
//! intrusive doubly-linked lists so membership moves are O(1). Crossing
//! events do not change velocities, only membership, after which the 3^D
//! neighbourhood supplies the pairs to re-predict. Under Lees-Edwards the
//! rows wrapping through the sheared y-faces use an x-shifted (and
//! widened) lookup window.

use crate::boundary::Boundary;
use crate::core::particle::{Particle, DIM};
use crate::dynamics::Dynamics;
use crate::error::{Error, Result};
use crate::math::{self, EPS_TIME};

const NO_ID: i32 = -1;

/// Regular spatial partition of the primary cell.
#[derive(Debug, Clone)]
pub struct CellGrid {
    n: [usize; DIM],
    width: [f64; DIM],
    box_size: [f64; DIM],
    /// Head particle id of each cell's resident list (`NO_ID` when empty).
    heads: Vec<i32>,
    next: Vec<i32>,
    prev: Vec<i32>,
    cell_of: Vec<u32>,
}

impl CellGrid {
    /// Build the grid for the given boundary and interaction cutoff.
    ///
    /// Cell counts are `floor(L_i / r_cut)` per axis; a cutoff above half
    /// the box is rejected rather than guessed around.
    pub fn new(boundary: &Boundary, r_cut: f64, n_particles: usize) -> Result<Self> {
        if !r_cut.is_finite() || r_cut <= 0.0 {
            return Err(Error::Config(
                "interaction cutoff must be finite and > 0".into(),
            ));
        }
        let box_size = boundary.box_size();
        let mut n = [0usize; DIM];
        let mut width = [0.0f64; DIM];
        for k in 0..DIM {
            if r_cut > box_size[k] / 2.0 {
                return Err(Error::Config(format!(
                    "interaction cutoff {r_cut} exceeds half the box along axis {k}"
                )));
            }
            n[k] = (box_size[k] / r_cut).floor() as usize;
            width[k] = box_size[k] / n[k] as f64;
        }
        let total = n.iter().product();
        Ok(Self {
            n,
            width,
            box_size,
            heads: vec![NO_ID; total],
            next: vec![NO_ID; n_particles],
            prev: vec![NO_ID; n_particles],
            cell_of: vec![u32::MAX; n_particles],
        })
    }

    /// Cell counts per axis.
    pub fn counts(&self) -> [usize; DIM] {
        self.n
    }

    /// Smallest cell edge, a natural length scale for event intervals.
    pub fn min_width(&self) -> f64 {
        self.width.iter().copied().fold(f64::INFINITY, f64::min)
    }

    #[inline]
    fn index(&self, c: [usize; DIM]) -> usize {
        c[0] + self.n[0] * (c[1] + self.n[1] * c[2])
    }

    #[inline]
    fn coords(&self, idx: usize) -> [usize; DIM] {
        let cx = idx % self.n[0];
        let cy = (idx / self.n[0]) % self.n[1];
        let cz = idx / (self.n[0] * self.n[1]);
        [cx, cy, cz]
    }

    /// Cell containing a position in the primary image.
    pub fn cell_for(&self, r: &[f64; DIM]) -> usize {
        let mut c = [0usize; DIM];
        for k in 0..DIM {
            let f = ((r[k] + self.box_size[k] / 2.0) / self.width[k]).floor();
            c[k] = (f.max(0.0) as usize).min(self.n[k] - 1);
        }
        self.index(c)
    }

    /// Cell the particle is registered in.
    pub fn cell_of(&self, pid: u32) -> usize {
        self.cell_of[pid as usize] as usize
    }

    /// Re-bin every particle from its current (folded) position.
    pub fn rebuild(&mut self, particles: &[Particle]) {
        for h in &mut self.heads {
            *h = NO_ID;
        }
        for x in &mut self.next {
            *x = NO_ID;
        }
        for x in &mut self.prev {
            *x = NO_ID;
        }
        for p in particles {
            let cell = self.cell_for(&p.r);
            self.link(p.id, cell);
        }
    }

    fn link(&mut self, pid: u32, cell: usize) {
        let head = self.heads[cell];
        self.next[pid as usize] = head;
        self.prev[pid as usize] = NO_ID;
        if head != NO_ID {
            self.prev[head as usize] = pid as i32;
        }
        self.heads[cell] = pid as i32;
        self.cell_of[pid as usize] = cell as u32;
    }

    fn unlink(&mut self, pid: u32) {
        let p = pid as usize;
        let (prev, next) = (self.prev[p], self.next[p]);
        if prev != NO_ID {
            self.next[prev as usize] = next;
        } else {
            self.heads[self.cell_of[p] as usize] = next;
        }
        if next != NO_ID {
            self.prev[next as usize] = prev;
        }
        self.next[p] = NO_ID;
        self.prev[p] = NO_ID;
    }

    /// Earliest time (relative to `t_now`) the particle leaves its current
    /// cell, and through which face (`2*axis + {0 lower, 1 upper}`).
    pub fn next_crossing(
        &self,
        p: &Particle,
        dynamics: &Dynamics,
        boundary: &Boundary,
        t_now: f64,
    ) -> Option<(f64, u8)> {
        let c = self.coords(self.cell_of(p.id));
        let r = dynamics.position_at(p, t_now);
        let v = dynamics.velocity_at(p, t_now);
        let a = dynamics.acceleration();
        let mut best: Option<(f64, u8)> = None;
        for k in 0..DIM {
            let lo = -self.box_size[k] / 2.0 + c[k] as f64 * self.width[k];
            let hi = lo + self.width[k];
            // Lower face: gap r - lo down-crosses at exit.
            let candidates = [
                (c[k] > 0 || boundary.is_periodic(), [r[k] - lo, v[k], 0.5 * a[k], 0.0, 0.0], 0u8),
                (
                    c[k] + 1 < self.n[k] || boundary.is_periodic(),
                    [hi - r[k], -v[k], -0.5 * a[k], 0.0, 0.0],
                    1u8,
                ),
            ];
            for (open, poly, side) in candidates {
                if !open {
                    continue;
                }
                if let Some(t) = math::smallest_positive_quartic_root(&poly, EPS_TIME) {
                    let face = (2 * k) as u8 + side;
                    if best.map_or(true, |(tb, fb)| t < tb || (t == tb && face < fb)) {
                        best = Some((t, face));
                    }
                }
            }
        }
        best
    }

    /// Move membership after a crossing through `face`. The particle's
    /// position must already be streamed to the event time and folded into
    /// the primary image; under Lees-Edwards a y-wrap lands on the cell the
    /// shifted position actually occupies.
    pub fn apply_crossing(&mut self, pid: u32, face: u8, r_folded: &[f64; DIM]) {
        let mut c = self.coords(self.cell_of(pid));
        let axis = (face / 2) as usize;
        let up = face % 2 == 1;
        let wrapped = if up {
            c[axis] += 1;
            let w = c[axis] == self.n[axis];
            if w {
                c[axis] = 0;
            }
            w
        } else if c[axis] == 0 {
            c[axis] = self.n[axis] - 1;
            true
        } else {
            c[axis] -= 1;
            false
        };
        // A sheared y-wrap shifts x by a non-integer number of cells, so
        // the x index comes from the folded position.
        if axis == 1 && wrapped {
            let f = ((r_folded[0] + self.box_size[0] / 2.0) / self.width[0]).floor();
            c[0] = (f.max(0.0) as usize).min(self.n[0] - 1);
        }
        let target = self.index(c);
        self.unlink(pid);
        self.link(pid, target);
    }

    /// Ids resident in the 3^D neighbourhood of the particle's cell,
    /// excluding the particle itself. Under Lees-Edwards the y-wrapped rows
    /// use a widened, shift-corrected x window.
    pub fn neighbours(&self, pid: u32, boundary: &Boundary, t_now: f64) -> Vec<u32> {
        let c = self.coords(self.cell_of(pid));
        let mut cells: Vec<usize> = Vec::with_capacity(27);
        let offset = boundary.shear_offset(t_now);
        for dz in -1i64..=1 {
            let Some(cz) = self.wrap_axis(c[2] as i64 + dz, 2, boundary) else {
                continue;
            };
            for dy in -1i64..=1 {
                let raw_y = c[1] as i64 + dy;
                let (cy, y_wrap) = match self.wrap_axis_tagged(raw_y, 1, boundary) {
                    Some(v) => v,
                    None => continue,
                };
                if y_wrap != 0 && matches!(boundary, Boundary::LeesEdwards { .. }) {
                    // The wrapped row is displaced by the shear offset; take
                    // a widened window around the shifted x index.
                    let x_center = -self.box_size[0] / 2.0
                        + (c[0] as f64 + 0.5) * self.width[0]
                        - y_wrap as f64 * offset;
                    let shifted =
                        ((x_center + self.box_size[0] / 2.0) / self.width[0]).floor() as i64;
                    for dx in -2i64..=2 {
                        if let Some(cx) = self.wrap_axis(shifted + dx, 0, boundary) {
                            push_unique(&mut cells, self.index([cx, cy, cz]));
                        }
                    }
                } else {
                    for dx in -1i64..=1 {
                        if let Some(cx) = self.wrap_axis(c[0] as i64 + dx, 0, boundary) {
                            push_unique(&mut cells, self.index([cx, cy, cz]));
                        }
                    }
                }
            }
        }
        let mut out = Vec::new();
        for cell in cells {
            let mut cursor = self.heads[cell];
            while cursor != NO_ID {
                if cursor as u32 != pid {
                    out.push(cursor as u32);
                }
                cursor = self.next[cursor as usize];
            }
        }
        out
    }

    fn wrap_axis(&self, idx: i64, axis: usize, boundary: &Boundary) -> Option<usize> {
        self.wrap_axis_tagged(idx, axis, boundary).map(|(i, _)| i)
    }

    /// Wrap a raw cell index; the tag is -1/0/+1 for which image it fell
    /// into. `None` for indices outside an open boundary.
    fn wrap_axis_tagged(
        &self,
        idx: i64,
        axis: usize,
        boundary: &Boundary,
    ) -> Option<(usize, i64)> {
        let n = self.n[axis] as i64;
        if (0..n).contains(&idx) {
            return Some((idx as usize, 0));
        }
        if !boundary.is_periodic() {
            return None;
        }
        let wrapped = idx.rem_euclid(n);
        let image = (idx - wrapped) / n;
        Some((wrapped as usize, image.signum()))
    }

    /// Debug check: the registered cell contains the particle's position.
    pub fn membership_consistent(&self, p: &Particle) -> bool {
        self.cell_of(p.id) == self.cell_for(&p.r)
    }
}

fn push_unique(cells: &mut Vec<usize>, cell: usize) {
    if !cells.contains(&cell) {
        cells.push(cell);
    }
}
