//! Core simulation data structures: particles, events, and the simulation
//! container with its scheduler loop.

pub mod event;
pub mod particle;
pub mod sim;

pub use event::{Event, EventKind, PairSurface};
pub use particle::{Particle, DIM};
pub use sim::{SimClock, Simulation, Status};
