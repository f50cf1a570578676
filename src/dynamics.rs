//! Dynamics layer: closed-form event prediction and post-event updates.
//!
//! Trajectories are ballistic (or uniformly accelerated) between events, so
//! particle state is streamed lazily: `(r, v)` refer to `last_update_time`
//! and predictors evaluate trajectories without mutating. Variants share
//! the capability set `{predict_pair, execute, predict_wall, stream}` as a
//! closed enum.

use serde::{Deserialize, Serialize};

use crate::boundary::Boundary;
use crate::core::particle::{Particle, DIM};
use crate::math::{self, EPS_TIME};

/// Equations of motion for the free flight between events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Dynamics {
    /// Constant-velocity flight.
    Newtonian,
    /// Constant acceleration `g` applied to every particle.
    Gravity { g: [f64; DIM] },
    /// Constant-velocity flight with contact diameters growing linearly:
    /// `d(t) = d0 * (1 + rate * t)`.
    Compression { rate: f64 },
}

/// Outcome of crossing (or failing to cross) a potential step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepCrossing {
    Crossed,
    Bounced,
}

/// A local plane barrier (e.g. a floor under gravity).
///
/// Particles live on the side the inward normal points to; contact happens
/// `contact_radius` away from the plane.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wall {
    pub axis: usize,
    pub position: f64,
    /// +1.0 when particles occupy the +axis side of the plane, -1.0 otherwise.
    pub inward: f64,
    pub contact_radius: f64,
    pub elasticity: f64,
}

impl Dynamics {
    /// Per-particle acceleration under this dynamics.
    #[inline]
    pub fn acceleration(&self) -> [f64; DIM] {
        match *self {
            Dynamics::Gravity { g } => g,
            _ => [0.0; DIM],
        }
    }

    /// Position of `p` coasted to absolute time `t` without mutating it.
    #[inline]
    pub fn position_at(&self, p: &Particle, t: f64) -> [f64; DIM] {
        let dt = t - p.last_update_time;
        let a = self.acceleration();
        let mut r = p.r;
        for k in 0..DIM {
            r[k] += p.v[k] * dt + 0.5 * a[k] * dt * dt;
        }
        r
    }

    /// Velocity of `p` coasted to absolute time `t` without mutating it.
    #[inline]
    pub fn velocity_at(&self, p: &Particle, t: f64) -> [f64; DIM] {
        let dt = t - p.last_update_time;
        let a = self.acceleration();
        let mut v = p.v;
        for k in 0..DIM {
            v[k] += a[k] * dt;
        }
        v
    }

    /// Stream `p` to absolute time `t`, updating its stored state.
    pub fn stream(&self, p: &mut Particle, t: f64) {
        p.r = self.position_at(p, t);
        p.v = self.velocity_at(p, t);
        p.last_update_time = t;
    }

    /// Effective contact diameter for a rest diameter `d0` at time `t`.
    #[inline]
    pub fn effective_diameter(&self, d0: f64, t: f64) -> f64 {
        match *self {
            Dynamics::Compression { rate } => d0 * (1.0 + rate * t),
            _ => d0,
        }
    }

    /// Time until the pair `(pi, pj)` crosses the sphere of rest diameter
    /// `d0`, relative to `t_now`. `inside` selects the escape root for a
    /// pair currently within the contact radius.
    ///
    /// Returns `None` when the trajectories never meet (not approaching and
    /// already separated).
    pub fn predict_sphere_crossing(
        &self,
        pi: &Particle,
        pj: &Particle,
        d0: f64,
        t_now: f64,
        boundary: &Boundary,
        inside: bool,
    ) -> Option<f64> {
        let (rel_r, rel_v) = self.relative_state(pi, pj, t_now, boundary);
        match *self {
            Dynamics::Newtonian | Dynamics::Gravity { .. } => {
                // Equal acceleration cancels in the pair frame; the quartic
                // path degenerates internally where it can.
                math::parabola_sphere(&rel_r, &rel_v, &[0.0; DIM], d0, inside)
            }
            Dynamics::Compression { rate } => {
                let s = d0 * (1.0 + rate * t_now);
                let s_dot = d0 * rate;
                let mut c: math::Quartic = [
                    math::norm_sq(&rel_r) - s * s,
                    2.0 * (math::dot(&rel_r, &rel_v) - s * s_dot),
                    math::norm_sq(&rel_v) - s_dot * s_dot,
                    0.0,
                    0.0,
                ];
                if inside {
                    for x in &mut c {
                        *x = -*x;
                    }
                }
                math::smallest_positive_quartic_root(&c, EPS_TIME)
            }
        }
    }

    /// Minimum-image relative position and velocity of `pj` with respect to
    /// `pi` at time `t_now`, with the Lees-Edwards corrections applied to
    /// the returned copies.
    pub fn relative_state(
        &self,
        pi: &Particle,
        pj: &Particle,
        t_now: f64,
        boundary: &Boundary,
    ) -> ([f64; DIM], [f64; DIM]) {
        let ri = self.position_at(pi, t_now);
        let rj = self.position_at(pj, t_now);
        let vi = self.velocity_at(pi, t_now);
        let vj = self.velocity_at(pj, t_now);
        let mut rel_r = math::sub(&rj, &ri);
        let mut rel_v = math::sub(&vj, &vi);
        boundary.minimum_image_rel(&mut rel_r, &mut rel_v, t_now);
        (rel_r, rel_v)
    }

    /// Time until particle `p` contacts `wall`, relative to `t_now`.
    pub fn predict_wall(&self, p: &Particle, wall: &Wall, t_now: f64) -> Option<f64> {
        let r = self.position_at(p, t_now);
        let v = self.velocity_at(p, t_now);
        let a = self.acceleration();
        let contact = wall.position + wall.inward * wall.contact_radius;
        // Signed gap, positive on the allowed side; contact at down-crossing.
        let c: math::Quartic = [
            (r[wall.axis] - contact) * wall.inward,
            v[wall.axis] * wall.inward,
            0.5 * a[wall.axis] * wall.inward,
            0.0,
            0.0,
        ];
        math::smallest_positive_quartic_root(&c, EPS_TIME)
    }

    /// Reflect particle `p` off `wall` (specular, with the wall's
    /// elasticity on the normal component). Returns the kinetic energy
    /// change. The particle must already be streamed to the event time.
    pub fn execute_wall(&self, p: &mut Particle, wall: &Wall) -> f64 {
        let e = wall.elasticity;
        let vn = p.v[wall.axis];
        p.v[wall.axis] = -e * vn;
        // Snap onto the exact contact plane to stop numerical seepage.
        p.r[wall.axis] = wall.position + wall.inward * wall.contact_radius;
        -0.5 * p.mass * (1.0 - e * e) * vn * vn
    }

    /// Impulsive core collision along the contact normal.
    ///
    /// `nhat` is the unit vector from `pi` to `pj` at contact, `u_n` the
    /// normal component of the (boundary-corrected) relative velocity
    /// `v_j - v_i`. Returns the kinetic energy change (zero for `e = 1`).
    pub fn execute_core(
        &self,
        pi: &mut Particle,
        pj: &mut Particle,
        nhat: &[f64; DIM],
        u_n: f64,
        elasticity: f64,
    ) -> f64 {
        let mu = pi.mass * pj.mass / (pi.mass + pj.mass);
        let impulse = (1.0 + elasticity) * mu * u_n;
        for k in 0..DIM {
            pi.v[k] += impulse / pi.mass * nhat[k];
            pj.v[k] -= impulse / pj.mass * nhat[k];
        }
        -0.5 * mu * (1.0 - elasticity * elasticity) * u_n * u_n
    }

    /// Attempt to cross a potential step of height `delta_u` (positive when
    /// the crossing costs energy). The normal velocity is rescaled to
    /// conserve energy on a crossing; with insufficient kinetic energy
    /// along the normal the pair reflects elastically off the step.
    pub fn execute_step(
        &self,
        pi: &mut Particle,
        pj: &mut Particle,
        nhat: &[f64; DIM],
        u_n: f64,
        delta_u: f64,
    ) -> StepCrossing {
        let mu = pi.mass * pj.mass / (pi.mass + pj.mass);
        let disc = u_n * u_n - 2.0 * delta_u / mu;
        let (impulse, crossing) = if disc >= 0.0 {
            let u_n_new = u_n.signum() * disc.sqrt();
            (mu * (u_n_new - u_n), StepCrossing::Crossed)
        } else {
            (-2.0 * mu * u_n, StepCrossing::Bounced)
        };
        for k in 0..DIM {
            pi.v[k] -= impulse / pi.mass * nhat[k];
            pj.v[k] += impulse / pj.mass * nhat[k];
        }
        crossing
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;

    fn particle(id: u32, r: [f64; DIM], v: [f64; DIM]) -> Particle {
        Particle::new(id, r, v, 1.0).expect("valid particle")
    }

    #[test]
    fn stream_ballistic() {
        let dyn_ = Dynamics::Newtonian;
        let mut p = particle(0, [1.0, 0.0, 0.0], [2.0, 0.0, 0.0]);
        dyn_.stream(&mut p, 3.0);
        assert_eq!(p.r, [7.0, 0.0, 0.0]);
        assert_eq!(p.last_update_time, 3.0);
    }

    #[test]
    fn stream_under_gravity() {
        let dyn_ = Dynamics::Gravity {
            g: [0.0, 0.0, -2.0],
        };
        let mut p = particle(0, [0.0, 0.0, 10.0], [0.0, 0.0, 0.0]);
        dyn_.stream(&mut p, 2.0);
        // z = 10 - 0.5*2*4 = 6, vz = -4
        assert!((p.r[2] - 6.0).abs() < 1e-12);
        assert!((p.v[2] - (-4.0)).abs() < 1e-12);
    }

    #[test]
    fn head_on_pair_prediction() -> Result<()> {
        let bc = Boundary::open([20.0, 20.0, 20.0])?;
        let dyn_ = Dynamics::Newtonian;
        let pi = particle(0, [-1.5, 0.0, 0.0], [1.0, 0.0, 0.0]);
        let pj = particle(1, [1.5, 0.0, 0.0], [-1.0, 0.0, 0.0]);
        // Gap 3, closing speed 2, contact at separation 1: t = 1.0.
        let t = dyn_
            .predict_sphere_crossing(&pi, &pj, 1.0, 0.0, &bc, false)
            .expect("must collide");
        assert!((t - 1.0).abs() < 1e-12, "got {t}");
        Ok(())
    }

    #[test]
    fn receding_pair_never_collides() -> Result<()> {
        let bc = Boundary::open([20.0, 20.0, 20.0])?;
        let dyn_ = Dynamics::Newtonian;
        let pi = particle(0, [-1.5, 0.0, 0.0], [-1.0, 0.0, 0.0]);
        let pj = particle(1, [1.5, 0.0, 0.0], [1.0, 0.0, 0.0]);
        assert!(dyn_
            .predict_sphere_crossing(&pi, &pj, 1.0, 0.0, &bc, false)
            .is_none());
        Ok(())
    }

    #[test]
    fn compression_contact_from_growing_diameters() -> Result<()> {
        let bc = Boundary::open([20.0, 20.0, 20.0])?;
        let dyn_ = Dynamics::Compression { rate: 0.5 };
        // Stationary pair 3 apart: the diameter 1 * (1 + t/2) reaches the
        // separation at t = 4.
        let pi = particle(0, [-1.5, 0.0, 0.0], [0.0, 0.0, 0.0]);
        let pj = particle(1, [1.5, 0.0, 0.0], [0.0, 0.0, 0.0]);
        let t = dyn_
            .predict_sphere_crossing(&pi, &pj, 1.0, 0.0, &bc, false)
            .expect("growing core must reach the pair");
        assert!((t - 4.0).abs() < 1e-9, "got {t}");
        assert!((dyn_.effective_diameter(1.0, 4.0) - 3.0).abs() < 1e-12);
        Ok(())
    }

    #[test]
    fn elastic_core_swaps_equal_mass_head_on() {
        let dyn_ = Dynamics::Newtonian;
        let mut pi = particle(0, [-0.5, 0.0, 0.0], [1.0, 0.0, 0.0]);
        let mut pj = particle(1, [0.5, 0.0, 0.0], [-1.0, 0.0, 0.0]);
        let nhat = [1.0, 0.0, 0.0];
        let u_n = -2.0; // (v_j - v_i) . nhat
        let de = dyn_.execute_core(&mut pi, &mut pj, &nhat, u_n, 1.0);
        assert!((pi.v[0] - (-1.0)).abs() < 1e-12);
        assert!((pj.v[0] - 1.0).abs() < 1e-12);
        assert!(de.abs() < 1e-12, "elastic collision conserves energy");
    }

    #[test]
    fn inelastic_core_dissipates() {
        let dyn_ = Dynamics::Newtonian;
        let mut pi = particle(0, [-0.5, 0.0, 0.0], [1.0, 0.0, 0.0]);
        let mut pj = particle(1, [0.5, 0.0, 0.0], [-1.0, 0.0, 0.0]);
        let ke0 = pi.kinetic_energy() + pj.kinetic_energy();
        let de = dyn_.execute_core(&mut pi, &mut pj, &[1.0, 0.0, 0.0], -2.0, 0.5);
        let ke1 = pi.kinetic_energy() + pj.kinetic_energy();
        assert!(de < 0.0);
        assert!(((ke1 - ke0) - de).abs() < 1e-12, "reported delta matches");
    }

    #[test]
    fn step_crossing_conserves_total_energy() {
        let dyn_ = Dynamics::Newtonian;
        let mut pi = particle(0, [-1.0, 0.0, 0.0], [1.0, 0.0, 0.0]);
        let mut pj = particle(1, [1.0, 0.0, 0.0], [-1.0, 0.0, 0.0]);
        let ke0 = pi.kinetic_energy() + pj.kinetic_energy();
        // Dropping into a well of depth 1: delta_u = -1 releases energy.
        let res = dyn_.execute_step(&mut pi, &mut pj, &[1.0, 0.0, 0.0], -2.0, -1.0);
        assert_eq!(res, StepCrossing::Crossed);
        let ke1 = pi.kinetic_energy() + pj.kinetic_energy();
        assert!(((ke1 - ke0) - 1.0).abs() < 1e-12, "KE gains the well depth");
    }

    #[test]
    fn step_bounce_below_threshold() {
        let dyn_ = Dynamics::Newtonian;
        let mut pi = particle(0, [-1.0, 0.0, 0.0], [0.1, 0.0, 0.0]);
        let mut pj = particle(1, [1.0, 0.0, 0.0], [-0.1, 0.0, 0.0]);
        let ke0 = pi.kinetic_energy() + pj.kinetic_energy();
        // Barrier of height 10 with tiny approach speed: reflect.
        let res = dyn_.execute_step(&mut pi, &mut pj, &[1.0, 0.0, 0.0], -0.2, 10.0);
        assert_eq!(res, StepCrossing::Bounced);
        let ke1 = pi.kinetic_energy() + pj.kinetic_energy();
        assert!((ke1 - ke0).abs() < 1e-12, "bounce is elastic");
        assert!(pi.v[0] < 0.0 && pj.v[0] > 0.0, "velocities reflect");
    }

    #[test]
    fn wall_prediction_and_bounce_under_gravity() -> Result<()> {
        let dyn_ = Dynamics::Gravity {
            g: [0.0, 0.0, -1.0],
        };
        let wall = Wall {
            axis: 2,
            position: 0.0,
            inward: 1.0,
            contact_radius: 0.5,
            elasticity: 1.0,
        };
        let mut p = particle(0, [0.0, 0.0, 8.5], [0.0, 0.0, 0.0]);
        // Drop from gap 8: 0.5 t^2 = 8 => t = 4.
        let t = dyn_.predict_wall(&p, &wall, 0.0).expect("must land");
        assert!((t - 4.0).abs() < 1e-9, "got {t}");
        dyn_.stream(&mut p, t);
        let de = dyn_.execute_wall(&mut p, &wall);
        assert!((p.v[2] - 4.0).abs() < 1e-9, "speed preserved, sign flipped");
        assert!(de.abs() < 1e-12);
        Ok(())
    }
}
