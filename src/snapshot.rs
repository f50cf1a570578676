//! Persisted core state: everything needed to restart a run and continue
//! the trajectory without replay — time, event count, particle state, the
//! capture maps of stateful interactions, the PRNG, and the registered
//! component parameters. The event queue is not persisted; it is rebuilt
//! deterministically by `initialise()` from the restored state.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use rand_chacha::ChaCha12Rng;
use serde::{Deserialize, Serialize};

use crate::boundary::Boundary;
use crate::core::particle::Particle;
use crate::core::sim::{SimClock, Simulation};
use crate::dynamics::{Dynamics, Wall};
use crate::error::Result;
use crate::interaction::{CaptureMap, Interaction};

/// Serialisable image of a simulation's full core state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub system_time: SimClock,
    pub event_count: u64,
    pub end_event_count: u64,
    pub particles: Vec<Particle>,
    pub boundary: Boundary,
    pub dynamics: Dynamics,
    pub interactions: Vec<Interaction>,
    pub walls: Vec<Wall>,
    /// Capture-map entries `(i, j, count)`, sorted for determinism.
    pub captures: Vec<(u32, u32, u32)>,
    pub rng: ChaCha12Rng,
}

impl Snapshot {
    /// Capture the simulation's state. Particles are streamed to the
    /// current system time first so the stored `(r, v)` are synchronous.
    pub fn capture(sim: &mut Simulation) -> Self {
        sim.sync_particles();
        Self {
            system_time: sim.clock,
            event_count: sim.event_count,
            end_event_count: sim.end_event_count,
            particles: sim.particles.clone(),
            boundary: sim.boundary.clone(),
            dynamics: sim.dynamics.clone(),
            interactions: sim.interactions.clone(),
            walls: sim.walls.clone(),
            captures: sim.captures.sorted_entries(),
            rng: sim.rng.clone(),
        }
    }

    /// Rebuild a simulation from this snapshot. The result is in the
    /// `Start` status; call `initialise()` to prime the event queue, after
    /// which the continued trajectory matches an uninterrupted run.
    pub fn restore(&self) -> Result<Simulation> {
        let mut sim = Simulation::new(
            self.particles.clone(),
            self.boundary.clone(),
            self.dynamics.clone(),
            Some(0),
        )?;
        for interaction in &self.interactions {
            sim.add_interaction(interaction.clone());
        }
        for wall in &self.walls {
            sim.add_wall(wall.clone());
        }
        sim.captures = CaptureMap::from_entries(&self.captures);
        sim.clock = self.system_time;
        sim.event_count = self.event_count;
        sim.end_event_count = self.end_event_count;
        sim.rng = self.rng.clone();
        Ok(sim)
    }

    pub fn to_writer<W: Write>(&self, writer: W) -> Result<()> {
        serde_json::to_writer(writer, self)?;
        Ok(())
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        Ok(serde_json::from_reader(reader)?)
    }

    pub fn save_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.to_writer(BufWriter::new(File::create(path)?))
    }

    pub fn load_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_reader(BufReader::new(File::open(path)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interaction::PairRange;

    fn small_sim() -> Result<Simulation> {
        let particles = vec![
            Particle::new(0, [-1.0, 0.0, 0.0], [0.4, 0.1, 0.0], 1.0)?,
            Particle::new(1, [1.0, 0.0, 0.0], [-0.4, -0.1, 0.0], 1.0)?,
        ];
        let mut sim = Simulation::new(
            particles,
            Boundary::periodic([8.0, 8.0, 8.0])?,
            Dynamics::Newtonian,
            Some(99),
        )?;
        sim.add_interaction(Interaction::square_well(PairRange::All, 1.0, 1.5, 1.0, 1.0)?);
        Ok(sim)
    }

    #[test]
    fn snapshot_json_round_trip() -> Result<()> {
        let mut sim = small_sim()?;
        sim.end_event_count = 10;
        sim.initialise()?;
        sim.run_simulation()?;

        let snap = Snapshot::capture(&mut sim);
        let mut buf = Vec::new();
        snap.to_writer(&mut buf)?;
        let loaded = Snapshot::from_reader(buf.as_slice())?;

        assert_eq!(loaded.event_count, snap.event_count);
        assert_eq!(loaded.captures, snap.captures);
        assert_eq!(loaded.particles.len(), snap.particles.len());
        for (a, b) in loaded.particles.iter().zip(snap.particles.iter()) {
            assert_eq!(a.r, b.r, "positions survive the round trip bitwise");
            assert_eq!(a.v, b.v, "velocities survive the round trip bitwise");
        }
        assert_eq!(loaded.system_time.now(), snap.system_time.now());
        Ok(())
    }

    #[test]
    fn restored_simulation_resumes_from_snapshot_state() -> Result<()> {
        let mut sim = small_sim()?;
        sim.end_event_count = 6;
        sim.initialise()?;
        sim.run_simulation()?;

        let snap = Snapshot::capture(&mut sim);
        let mut restored = snap.restore()?;
        assert_eq!(restored.event_count(), sim.event_count());
        assert_eq!(restored.system_time(), sim.system_time());
        for (a, b) in restored.particles.iter().zip(sim.particles.iter()) {
            assert_eq!(a.r, b.r);
            assert_eq!(a.v, b.v);
        }
        restored.initialise()?;
        assert!(restored.queued_events() > 0, "queue rebuilt after restore");
        Ok(())
    }

    #[test]
    fn rng_state_survives_round_trip() -> Result<()> {
        use rand::Rng;
        let mut sim = small_sim()?;
        sim.initialise()?;
        let snap = Snapshot::capture(&mut sim);
        let mut restored = snap.restore()?;
        // Unconsumed generators must produce identical streams.
        let a: [u64; 4] = std::array::from_fn(|_| sim.rng.random());
        let b: [u64; 4] = std::array::from_fn(|_| restored.rng.random());
        assert_eq!(a, b, "PRNG state restored bit-for-bit");
        Ok(())
    }
}
