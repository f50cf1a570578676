//! Initial-state collaborators: lattice packers, velocity draws, and the
//! momentum/temperature conditioning passes run before a simulation starts.

use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::boundary::Boundary;
use crate::core::particle::{Particle, DIM};
use crate::error::{Error, Result};
use crate::math;
use crate::observer::kinetic_temperature;

/// Sites of an FCC lattice with `cells` unit cells per axis, centered in a
/// box of the given size (positions span `[-L/2, L/2)`).
pub fn fcc_sites(cells: [usize; DIM], box_size: [f64; DIM]) -> Vec<[f64; DIM]> {
    const BASIS: [[f64; DIM]; 4] = [
        [0.0, 0.0, 0.0],
        [0.0, 0.5, 0.5],
        [0.5, 0.0, 0.5],
        [0.5, 0.5, 0.0],
    ];
    let mut a = [0.0; DIM];
    for k in 0..DIM {
        a[k] = box_size[k] / cells[k] as f64;
    }
    let mut sites = Vec::with_capacity(4 * cells.iter().product::<usize>());
    for ix in 0..cells[0] {
        for iy in 0..cells[1] {
            for iz in 0..cells[2] {
                for basis in &BASIS {
                    let cell = [ix as f64, iy as f64, iz as f64];
                    let mut r = [0.0; DIM];
                    for k in 0..DIM {
                        r[k] = -box_size[k] / 2.0 + (cell[k] + basis[k]) * a[k];
                    }
                    sites.push(r);
                }
            }
        }
    }
    sites
}

/// Draw `n` velocities with Maxwell-Boltzmann components at temperature
/// `k_t` for particles of the given mass.
pub fn maxwell_velocities<R: Rng>(
    rng: &mut R,
    n: usize,
    k_t: f64,
    mass: f64,
) -> Result<Vec<[f64; DIM]>> {
    if !(k_t.is_finite() && k_t > 0.0 && mass.is_finite() && mass > 0.0) {
        return Err(Error::InvalidParam(
            "temperature and mass must be finite and > 0".into(),
        ));
    }
    let normal = Normal::new(0.0, (k_t / mass).sqrt())
        .map_err(|e| Error::InvalidParam(format!("bad velocity distribution: {e}")))?;
    Ok((0..n)
        .map(|_| {
            let mut v = [0.0; DIM];
            for c in &mut v {
                *c = normal.sample(rng);
            }
            v
        })
        .collect())
}

/// Subtract the centre-of-mass velocity so total momentum is zero.
/// Relative velocities are preserved.
pub fn zero_momentum(particles: &mut [Particle]) {
    let total_mass: f64 = particles.iter().map(|p| p.mass).sum();
    if total_mass <= 0.0 {
        return;
    }
    let mut v_com = [0.0; DIM];
    for p in particles.iter() {
        for (acc, m) in v_com.iter_mut().zip(p.momentum()) {
            *acc += m;
        }
    }
    for c in &mut v_com {
        *c /= total_mass;
    }
    for p in particles.iter_mut() {
        for (v, c) in p.v.iter_mut().zip(v_com) {
            *v -= c;
        }
    }
}

/// Scale all velocities so the kinetic temperature equals `k_t`.
pub fn rescale_to_temperature(particles: &mut [Particle], k_t: f64) -> Result<()> {
    if !(k_t.is_finite() && k_t > 0.0) {
        return Err(Error::InvalidParam(
            "target temperature must be finite and > 0".into(),
        ));
    }
    let current = kinetic_temperature(particles);
    if current <= 0.0 {
        return Err(Error::InvalidParam(
            "cannot rescale a system with zero kinetic energy".into(),
        ));
    }
    let factor = (k_t / current).sqrt();
    for p in particles.iter_mut() {
        for v in &mut p.v {
            *v *= factor;
        }
    }
    Ok(())
}

/// Rejection-sample `n` sites inside the primary image with pairwise
/// minimum-image separation at least `min_separation`.
pub fn random_sites<R: Rng>(
    rng: &mut R,
    n: usize,
    boundary: &Boundary,
    min_separation: f64,
) -> Result<Vec<[f64; DIM]>> {
    if !min_separation.is_finite() || min_separation <= 0.0 {
        return Err(Error::InvalidParam(
            "min_separation must be finite and > 0".into(),
        ));
    }
    let box_size = boundary.box_size();
    let min_sq = min_separation * min_separation;
    let max_attempts = 1_000_000usize;
    let mut sites: Vec<[f64; DIM]> = Vec::with_capacity(n);
    for placed in 0..n {
        let mut attempts = 0usize;
        loop {
            if attempts >= max_attempts {
                return Err(Error::InvalidParam(format!(
                    "failed to place site {placed} without overlap; lower the density"
                )));
            }
            attempts += 1;
            let mut r = [0.0; DIM];
            for (c, &l) in r.iter_mut().zip(box_size.iter()) {
                *c = rng.random_range(-l / 2.0..l / 2.0);
            }
            let overlaps = sites.iter().any(|s| {
                let mut dr = math::sub(&r, s);
                boundary.minimum_image(&mut dr, 0.0);
                math::norm_sq(&dr) < min_sq
            });
            if !overlaps {
                sites.push(r);
                break;
            }
        }
    }
    Ok(sites)
}
