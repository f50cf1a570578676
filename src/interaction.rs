//! Interaction model registry: hard spheres, square wells, stepped
//! potentials, and bonds, each an event-generating predicate over a pair
//! range.
//!
//! At most one interaction applies to a pair; the first registered match
//! wins. Stateful wells track how deep each pair sits via a symmetric
//! capture map keyed on `(min(id), max(id))`; the step energies summed over
//! a pair's history always equal the energy indexed by its capture count,
//! which is what makes snapshot restarts possible without trajectory
//! replay.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::boundary::Boundary;
use crate::core::event::PairSurface;
use crate::core::particle::Particle;
use crate::dynamics::{Dynamics, StepCrossing};
use crate::error::{Error, Result};
use crate::math;

/// Which particle pairs an interaction applies to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PairRange {
    /// Every distinct pair.
    All,
    /// Exactly one unordered pair.
    Pair { a: u32, b: u32 },
    /// Adjacent ids along a chain: pairs `(k, k+1)` for `start <= k < end`.
    Chain { start: u32, end: u32 },
}

impl PairRange {
    pub fn contains(&self, i: u32, j: u32) -> bool {
        let (lo, hi) = if i < j { (i, j) } else { (j, i) };
        match *self {
            PairRange::All => true,
            PairRange::Pair { a, b } => {
                let (a, b) = if a < b { (a, b) } else { (b, a) };
                lo == a && hi == b
            }
            PairRange::Chain { start, end } => lo >= start && hi <= end && hi == lo + 1,
        }
    }
}

/// Potential descriptor for a pair interaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum InteractionKind {
    /// Single impulsive core at `diameter`.
    HardSphere { diameter: f64, elasticity: f64 },
    /// Core at `diameter`, attractive well of depth `well_depth` out to
    /// `lambda * diameter`.
    SquareWell {
        diameter: f64,
        lambda: f64,
        well_depth: f64,
        elasticity: f64,
    },
    /// Piecewise-constant potential: `radii` strictly decreasing outer to
    /// inner, `energies[k]` the potential inside `radii[k]` (zero outside
    /// all steps). A positive `core_diameter` adds a hard core inside the
    /// innermost step.
    Stepped {
        radii: Vec<f64>,
        energies: Vec<f64>,
        core_diameter: f64,
        elasticity: f64,
    },
    /// Infinite well between two radii; applicable pairs never separate
    /// beyond `max_dist` nor overlap below `min_dist`.
    Bond { min_dist: f64, max_dist: f64 },
}

/// A registered interaction: pair range plus potential.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interaction {
    pub range: PairRange,
    pub kind: InteractionKind,
}

/// What actually happened when a pair event ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairOutcome {
    Core,
    Capture,
    Release,
    Bounce,
}

/// Bookkeeping returned by `run_event`.
#[derive(Debug, Clone, Copy)]
pub struct PairEventData {
    pub outcome: PairOutcome,
    pub delta_ke: f64,
    pub delta_pe: f64,
}

/// Symmetric `(min, max) -> step count` table for stateful wells. Absent
/// entries mean "outside every step".
#[derive(Debug, Clone, Default)]
pub struct CaptureMap {
    map: HashMap<(u32, u32), u32>,
}

#[inline]
fn pair_key(i: u32, j: u32) -> (u32, u32) {
    if i < j {
        (i, j)
    } else {
        (j, i)
    }
}

impl CaptureMap {
    pub fn count(&self, i: u32, j: u32) -> u32 {
        self.map.get(&pair_key(i, j)).copied().unwrap_or(0)
    }

    pub fn capture(&mut self, i: u32, j: u32) {
        *self.map.entry(pair_key(i, j)).or_insert(0) += 1;
    }

    pub fn release(&mut self, i: u32, j: u32) {
        let key = pair_key(i, j);
        if let Some(c) = self.map.get_mut(&key) {
            *c -= 1;
            if *c == 0 {
                self.map.remove(&key);
            }
        }
    }

    pub fn set(&mut self, i: u32, j: u32, count: u32) {
        if count == 0 {
            self.map.remove(&pair_key(i, j));
        } else {
            self.map.insert(pair_key(i, j), count);
        }
    }

    pub fn clear(&mut self) {
        self.map.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Entries sorted by key, for deterministic persistence.
    pub fn sorted_entries(&self) -> Vec<(u32, u32, u32)> {
        let mut v: Vec<_> = self.map.iter().map(|(&(i, j), &c)| (i, j, c)).collect();
        v.sort_unstable();
        v
    }

    pub fn from_entries(entries: &[(u32, u32, u32)]) -> Self {
        let mut map = HashMap::new();
        for &(i, j, c) in entries {
            if c > 0 {
                map.insert(pair_key(i, j), c);
            }
        }
        Self { map }
    }
}

impl Interaction {
    pub fn hard_sphere(range: PairRange, diameter: f64, elasticity: f64) -> Result<Self> {
        if !diameter.is_finite() || diameter <= 0.0 {
            return Err(Error::InvalidParam("diameter must be finite and > 0".into()));
        }
        if !(0.0..=1.0).contains(&elasticity) {
            return Err(Error::InvalidParam("elasticity must lie in [0, 1]".into()));
        }
        Ok(Self {
            range,
            kind: InteractionKind::HardSphere {
                diameter,
                elasticity,
            },
        })
    }

    pub fn square_well(
        range: PairRange,
        diameter: f64,
        lambda: f64,
        well_depth: f64,
        elasticity: f64,
    ) -> Result<Self> {
        if !diameter.is_finite() || diameter <= 0.0 {
            return Err(Error::InvalidParam("diameter must be finite and > 0".into()));
        }
        if !lambda.is_finite() || lambda <= 1.0 {
            return Err(Error::InvalidParam("lambda must be > 1".into()));
        }
        if !well_depth.is_finite() {
            return Err(Error::InvalidParam("well_depth must be finite".into()));
        }
        Ok(Self {
            range,
            kind: InteractionKind::SquareWell {
                diameter,
                lambda,
                well_depth,
                elasticity,
            },
        })
    }

    pub fn stepped(
        range: PairRange,
        radii: Vec<f64>,
        energies: Vec<f64>,
        core_diameter: f64,
        elasticity: f64,
    ) -> Result<Self> {
        if radii.is_empty() || radii.len() != energies.len() {
            return Err(Error::InvalidParam(
                "stepped potential needs matching, non-empty radii and energies".into(),
            ));
        }
        if !radii.windows(2).all(|w| w[0] > w[1]) {
            return Err(Error::InvalidParam(
                "step radii must be strictly decreasing".into(),
            ));
        }
        if core_diameter < 0.0 || core_diameter >= radii[radii.len() - 1] {
            return Err(Error::InvalidParam(
                "core diameter must be non-negative and inside the innermost step".into(),
            ));
        }
        Ok(Self {
            range,
            kind: InteractionKind::Stepped {
                radii,
                energies,
                core_diameter,
                elasticity,
            },
        })
    }

    pub fn bond(range: PairRange, min_dist: f64, max_dist: f64) -> Result<Self> {
        if !(min_dist.is_finite() && max_dist.is_finite() && 0.0 < min_dist && min_dist < max_dist)
        {
            return Err(Error::InvalidParam(
                "bond needs 0 < min_dist < max_dist".into(),
            ));
        }
        Ok(Self {
            range,
            kind: InteractionKind::Bond { min_dist, max_dist },
        })
    }

    /// Largest separation at which this interaction can generate an event.
    pub fn max_range(&self) -> f64 {
        match &self.kind {
            InteractionKind::HardSphere { diameter, .. } => *diameter,
            InteractionKind::SquareWell {
                diameter, lambda, ..
            } => diameter * lambda,
            InteractionKind::Stepped { radii, .. } => radii[0],
            InteractionKind::Bond { max_dist, .. } => *max_dist,
        }
    }

    /// Potential energy of a pair at the given capture count.
    pub fn energy_at(&self, count: u32) -> f64 {
        match &self.kind {
            InteractionKind::HardSphere { .. } | InteractionKind::Bond { .. } => 0.0,
            InteractionKind::SquareWell { well_depth, .. } => {
                if count >= 1 {
                    -well_depth
                } else {
                    0.0
                }
            }
            InteractionKind::Stepped { energies, .. } => {
                if count == 0 {
                    0.0
                } else {
                    energies[(count as usize - 1).min(energies.len() - 1)]
                }
            }
        }
    }

    /// Predict this pair's next event: time relative to `t_now` plus the
    /// surface it occurs on. `None` when the pair generates no further
    /// event from its current state.
    pub fn next_event(
        &self,
        pi: &Particle,
        pj: &Particle,
        count: u32,
        dynamics: &Dynamics,
        boundary: &Boundary,
        t_now: f64,
    ) -> Option<(f64, PairSurface)> {
        let mut best: Option<(f64, PairSurface)> = None;
        let mut consider = |t: Option<f64>, surface: PairSurface| {
            if let Some(t) = t {
                if best.map_or(true, |(tb, _)| t < tb) {
                    best = Some((t, surface));
                }
            }
        };

        match &self.kind {
            InteractionKind::HardSphere { diameter, .. } => {
                consider(
                    dynamics.predict_sphere_crossing(pi, pj, *diameter, t_now, boundary, false),
                    PairSurface::Core,
                );
            }
            InteractionKind::SquareWell {
                diameter, lambda, ..
            } => {
                let well = diameter * lambda;
                if count == 0 {
                    consider(
                        dynamics.predict_sphere_crossing(pi, pj, well, t_now, boundary, false),
                        PairSurface::WellIn,
                    );
                } else {
                    consider(
                        dynamics.predict_sphere_crossing(pi, pj, *diameter, t_now, boundary, false),
                        PairSurface::Core,
                    );
                    consider(
                        dynamics.predict_sphere_crossing(pi, pj, well, t_now, boundary, true),
                        PairSurface::WellOut,
                    );
                }
            }
            InteractionKind::Stepped {
                radii,
                core_diameter,
                ..
            } => {
                let m = radii.len() as u32;
                if count < m {
                    consider(
                        dynamics.predict_sphere_crossing(
                            pi,
                            pj,
                            radii[count as usize],
                            t_now,
                            boundary,
                            false,
                        ),
                        PairSurface::WellIn,
                    );
                }
                if count >= 1 {
                    consider(
                        dynamics.predict_sphere_crossing(
                            pi,
                            pj,
                            radii[count as usize - 1],
                            t_now,
                            boundary,
                            true,
                        ),
                        PairSurface::WellOut,
                    );
                }
                if count == m && *core_diameter > 0.0 {
                    consider(
                        dynamics.predict_sphere_crossing(
                            pi,
                            pj,
                            *core_diameter,
                            t_now,
                            boundary,
                            false,
                        ),
                        PairSurface::Core,
                    );
                }
            }
            InteractionKind::Bond { min_dist, max_dist } => {
                consider(
                    dynamics.predict_sphere_crossing(pi, pj, *min_dist, t_now, boundary, false),
                    PairSurface::Core,
                );
                consider(
                    dynamics.predict_sphere_crossing(pi, pj, *max_dist, t_now, boundary, true),
                    PairSurface::BondMax,
                );
            }
        }
        best
    }

    /// Execute a pair event at the current time. Both particles must
    /// already be streamed to the event time; the capture map is updated
    /// for realized captures and releases.
    pub fn run_event(
        &self,
        pi: &mut Particle,
        pj: &mut Particle,
        surface: PairSurface,
        captures: &mut CaptureMap,
        dynamics: &Dynamics,
        boundary: &Boundary,
        t_now: f64,
    ) -> Result<PairEventData> {
        let (rel_r, rel_v) = dynamics.relative_state(pi, pj, t_now, boundary);
        let dist = math::norm(&rel_r);
        if dist <= math::EPS_TIME {
            return Err(Error::Numeric(format!(
                "degenerate contact normal between particles {} and {}",
                pi.id, pj.id
            )));
        }
        let mut nhat = rel_r;
        for c in &mut nhat {
            *c /= dist;
        }
        let u_n = math::dot(&rel_v, &nhat);

        let elasticity = match &self.kind {
            InteractionKind::HardSphere { elasticity, .. }
            | InteractionKind::SquareWell { elasticity, .. }
            | InteractionKind::Stepped { elasticity, .. } => *elasticity,
            InteractionKind::Bond { .. } => 1.0,
        };

        let count = captures.count(pi.id, pj.id);
        match surface {
            PairSurface::Core | PairSurface::BondMax => {
                let delta_ke = dynamics.execute_core(pi, pj, &nhat, u_n, elasticity);
                let outcome = if surface == PairSurface::Core {
                    PairOutcome::Core
                } else {
                    PairOutcome::Bounce
                };
                Ok(PairEventData {
                    outcome,
                    delta_ke,
                    delta_pe: 0.0,
                })
            }
            PairSurface::WellIn => {
                let delta_u = self.energy_at(count + 1) - self.energy_at(count);
                match dynamics.execute_step(pi, pj, &nhat, u_n, delta_u) {
                    StepCrossing::Crossed => {
                        captures.capture(pi.id, pj.id);
                        Ok(PairEventData {
                            outcome: PairOutcome::Capture,
                            delta_ke: -delta_u,
                            delta_pe: delta_u,
                        })
                    }
                    StepCrossing::Bounced => Ok(PairEventData {
                        outcome: PairOutcome::Bounce,
                        delta_ke: 0.0,
                        delta_pe: 0.0,
                    }),
                }
            }
            PairSurface::WellOut => {
                if count == 0 {
                    return Err(Error::InvariantViolation(format!(
                        "release event for uncaptured pair ({}, {})",
                        pi.id, pj.id
                    )));
                }
                let delta_u = self.energy_at(count - 1) - self.energy_at(count);
                match dynamics.execute_step(pi, pj, &nhat, u_n, delta_u) {
                    StepCrossing::Crossed => {
                        captures.release(pi.id, pj.id);
                        Ok(PairEventData {
                            outcome: PairOutcome::Release,
                            delta_ke: -delta_u,
                            delta_pe: delta_u,
                        })
                    }
                    StepCrossing::Bounced => Ok(PairEventData {
                        outcome: PairOutcome::Bounce,
                        delta_ke: 0.0,
                        delta_pe: 0.0,
                    }),
                }
            }
        }
    }

    /// Capture count implied by the pair's current separation alone. Used
    /// to reconstruct the capture map at initialisation when no persisted
    /// counts exist.
    pub fn geometric_capture_count(
        &self,
        pi: &Particle,
        pj: &Particle,
        dynamics: &Dynamics,
        boundary: &Boundary,
        t_now: f64,
    ) -> u32 {
        let (rel_r, _) = dynamics.relative_state(pi, pj, t_now, boundary);
        let dist = math::norm(&rel_r);
        match &self.kind {
            InteractionKind::SquareWell {
                diameter, lambda, ..
            } => u32::from(dist < diameter * lambda),
            InteractionKind::Stepped { radii, .. } => {
                radii.iter().filter(|&&r| dist < r).count() as u32
            }
            _ => 0,
        }
    }

    /// Check the pair separation against the window its capture state
    /// allows, within a relative tolerance.
    pub fn validate_state(
        &self,
        pi: &Particle,
        pj: &Particle,
        count: u32,
        dynamics: &Dynamics,
        boundary: &Boundary,
        t_now: f64,
        tol: f64,
    ) -> Result<()> {
        let (rel_r, _) = dynamics.relative_state(pi, pj, t_now, boundary);
        let dist = math::norm(&rel_r);
        let overlap_err = |limit: f64| {
            Err(Error::InvariantViolation(format!(
                "particles {} and {} at separation {dist} violate contact distance {limit}",
                pi.id, pj.id
            )))
        };
        match &self.kind {
            InteractionKind::HardSphere { diameter, .. } => {
                if dist < diameter * (1.0 - tol) {
                    return overlap_err(*diameter);
                }
            }
            InteractionKind::SquareWell {
                diameter, lambda, ..
            } => {
                if dist < diameter * (1.0 - tol) {
                    return overlap_err(*diameter);
                }
                if count >= 1 && dist > diameter * lambda * (1.0 + tol) {
                    return overlap_err(diameter * lambda);
                }
            }
            InteractionKind::Stepped {
                radii,
                core_diameter,
                ..
            } => {
                if *core_diameter > 0.0 && dist < core_diameter * (1.0 - tol) {
                    return overlap_err(*core_diameter);
                }
                if count >= 1 {
                    let outer = radii[count as usize - 1];
                    if dist > outer * (1.0 + tol) {
                        return overlap_err(outer);
                    }
                }
            }
            InteractionKind::Bond { min_dist, max_dist } => {
                if dist < min_dist * (1.0 - tol) {
                    return overlap_err(*min_dist);
                }
                if dist > max_dist * (1.0 + tol) {
                    return overlap_err(*max_dist);
                }
            }
        }
        Ok(())
    }
}

/// First registered interaction matching the pair, with its registry index.
pub fn find_interaction<'a>(
    interactions: &'a [Interaction],
    i: u32,
    j: u32,
) -> Option<(u32, &'a Interaction)> {
    interactions
        .iter()
        .enumerate()
        .find(|(_, inter)| inter.range.contains(i, j))
        .map(|(idx, inter)| (idx as u32, inter))
}
