use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Fixed spatial dimension (3D).
pub const DIM: usize = 3;

/// A point particle advanced ballistically between events.
///
/// Fields:
/// - `id`: stable identifier in `[0, N)`
/// - `r`: position at `last_update_time`; between events the implicit
///   position is `r + v dt (+ a dt^2 / 2)` under the active dynamics
/// - `v`: velocity
/// - `mass`: particle mass (> 0)
/// - `last_update_time`: absolute time `r` and `v` refer to
/// - `event_count`: incremented each time the particle participates in a
///   realized event; queued events snapshot it for invalidation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Particle {
    /// Stable particle identifier.
    pub id: u32,
    /// Position (x, y, z) at `last_update_time`.
    pub r: [f64; DIM],
    /// Velocity (vx, vy, vz).
    pub v: [f64; DIM],
    /// Mass (> 0).
    pub mass: f64,
    /// Absolute time the stored state refers to.
    pub last_update_time: f64,
    /// Event participation counter (for stale-event invalidation).
    pub event_count: u64,
}

impl Particle {
    /// Create a new particle after validating invariants.
    ///
    /// Errors:
    /// - `Error::InvalidParam` if `mass` is non-positive or any component is
    ///   NaN/inf.
    pub fn new(id: u32, r: [f64; DIM], v: [f64; DIM], mass: f64) -> Result<Self> {
        if !mass.is_finite() || mass <= 0.0 {
            return Err(Error::InvalidParam("mass must be finite and > 0".into()));
        }
        if !r.iter().all(|x| x.is_finite()) {
            return Err(Error::InvalidParam("position must be finite".into()));
        }
        if !v.iter().all(|x| x.is_finite()) {
            return Err(Error::InvalidParam("velocity must be finite".into()));
        }
        Ok(Self {
            id,
            r,
            v,
            mass,
            last_update_time: 0.0,
            event_count: 0,
        })
    }

    /// Increment the event counter (used for stale-event invalidation).
    #[inline]
    pub fn bump_event_count(&mut self) {
        self.event_count = self.event_count.saturating_add(1);
    }

    /// Returns the particle's kinetic energy: 1/2 m |v|^2.
    #[inline]
    pub fn kinetic_energy(&self) -> f64 {
        let vsq: f64 = self.v.iter().map(|&c| c * c).sum();
        0.5 * self.mass * vsq
    }

    /// Returns the particle's momentum m v.
    #[inline]
    pub fn momentum(&self) -> [f64; DIM] {
        let mut p = self.v;
        for c in &mut p {
            *c *= self.mass;
        }
        p
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_particle_ok() -> Result<()> {
        let p = Particle::new(1, [0.0, 1.0, 2.0], [2.0, -3.0, 0.5], 2.0)?;
        assert_eq!(p.id, 1);
        assert_eq!(p.r, [0.0, 1.0, 2.0]);
        assert_eq!(p.v, [2.0, -3.0, 0.5]);
        assert_eq!(p.mass, 2.0);
        assert_eq!(p.event_count, 0);
        assert_eq!(p.last_update_time, 0.0);
        Ok(())
    }

    #[test]
    fn invalid_mass_rejected() {
        let err = Particle::new(0, [0.0, 0.0, 0.0], [0.0, 0.0, 0.0], 0.0).unwrap_err();
        assert!(err.to_string().contains("mass"));
    }

    #[test]
    fn non_finite_position_rejected() {
        let err =
            Particle::new(0, [f64::NAN, 0.0, 0.0], [0.0, 0.0, 0.0], 1.0).unwrap_err();
        assert!(err.to_string().contains("position"));
    }

    #[test]
    fn kinetic_energy_computed() -> Result<()> {
        // v = (3,4,0), |v|^2 = 25; KE = 0.5 * m * 25
        let p = Particle::new(7, [0.0, 0.0, 0.0], [3.0, 4.0, 0.0], 2.0)?;
        assert!((p.kinetic_energy() - 25.0).abs() < 1e-12);
        Ok(())
    }

    #[test]
    fn bump_event_count() -> Result<()> {
        let mut p = Particle::new(1, [0.0, 0.0, 0.0], [0.0, 0.0, 0.0], 1.0)?;
        assert_eq!(p.event_count, 0);
        p.bump_event_count();
        assert_eq!(p.event_count, 1);
        Ok(())
    }
}
