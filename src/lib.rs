//! Event-driven molecular dynamics for piecewise-analytic potentials.
//!
//! The engine advances N point particles by computing, in closed form, the
//! exact time of the next pairwise or boundary event and jumping the system
//! to that instant: no force integration, no fixed time step. Trajectories
//! are ballistic (or uniformly accelerated) between instantaneous events.
//!
//! The core subsystems:
//! - [`sorter`]: per-particle event heaps under a bounded calendar or
//!   four-heap global, with counter-snapshot staleness on dequeue.
//! - [`dynamics`]: Newtonian / gravity / compression predictors and
//!   post-event state updates.
//! - [`cells`]: the cell-list global feeding candidate pairs to the
//!   scheduler and emitting its own crossing events.
//! - [`interaction`]: hard-sphere, square-well, stepped, and bond models
//!   with the capture map for stateful wells.
//!
//! The [`core::Simulation`] container owns all of it and exposes
//! `initialise` / `run_simulation_step` / `reset`, broadcasting a
//! particle-update record to registered [`observer::Observer`]s after every
//! event.
//!
//! ```no_run
//! use edmd::boundary::Boundary;
//! use edmd::core::{Particle, Simulation};
//! use edmd::dynamics::Dynamics;
//! use edmd::interaction::{Interaction, PairRange};
//!
//! # fn main() -> edmd::error::Result<()> {
//! let particles = vec![
//!     Particle::new(0, [-1.5, 0.0, 0.0], [1.0, 0.0, 0.0], 1.0)?,
//!     Particle::new(1, [1.5, 0.0, 0.0], [-1.0, 0.0, 0.0], 1.0)?,
//! ];
//! let mut sim = Simulation::new(
//!     particles,
//!     Boundary::periodic([10.0, 10.0, 10.0])?,
//!     Dynamics::Newtonian,
//!     Some(1),
//! )?;
//! sim.add_interaction(Interaction::hard_sphere(PairRange::All, 1.0, 1.0)?);
//! sim.end_event_count = 1000;
//! sim.initialise()?;
//! sim.run_simulation()?;
//! # Ok(())
//! # }
//! ```

pub mod boundary;
pub mod cells;
pub mod core;
pub mod dynamics;
pub mod error;
pub mod interaction;
pub mod math;
pub mod observer;
pub mod packing;
pub mod snapshot;
pub mod sorter;

pub use crate::core::{Event, EventKind, Particle, Simulation};
pub use crate::error::{Error, Result};
