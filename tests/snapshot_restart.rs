use edmd::boundary::Boundary;
use edmd::core::{Particle, Simulation};
use edmd::dynamics::Dynamics;
use edmd::error::Result;
use edmd::interaction::{Interaction, PairRange};
use edmd::snapshot::Snapshot;

fn head_on(seed: u64) -> Result<Simulation> {
    let particles = vec![
        Particle::new(0, [-2.5, 0.0, 0.0], [1.0, 0.0, 0.0], 1.0)?,
        Particle::new(1, [2.5, 0.0, 0.0], [-1.0, 0.0, 0.0], 1.0)?,
    ];
    let mut sim = Simulation::new(
        particles,
        Boundary::periodic([12.0, 12.0, 12.0])?,
        Dynamics::Newtonian,
        Some(seed),
    )?;
    sim.add_interaction(Interaction::hard_sphere(PairRange::All, 1.0, 1.0)?);
    Ok(sim)
}

/// Saving mid-run, restoring, and continuing reproduces the uninterrupted
/// trajectory exactly: this system's event times are all exactly
/// representable, so the comparison is bitwise.
#[test]
fn restart_reproduces_uninterrupted_trajectory() -> Result<()> {
    let mut full = head_on(1)?;
    full.end_event_count = 40;
    full.initialise()?;
    full.run_simulation()?;

    let mut first_half = head_on(1)?;
    first_half.end_event_count = 20;
    first_half.initialise()?;
    first_half.run_simulation()?;

    let snap = Snapshot::capture(&mut first_half);
    let mut second_half = snap.restore()?;
    second_half.end_event_count = 40;
    second_half.initialise()?;
    second_half.run_simulation()?;

    assert_eq!(second_half.event_count(), full.event_count());
    assert_eq!(
        second_half.system_time(),
        full.system_time(),
        "continued clock matches the uninterrupted run"
    );
    full.sync_particles();
    second_half.sync_particles();
    for (a, b) in full.particles.iter().zip(second_half.particles.iter()) {
        assert_eq!(a.r, b.r, "positions match bitwise after restart");
        assert_eq!(a.v, b.v, "velocities match bitwise after restart");
    }
    Ok(())
}

/// Round trip through the JSON schema and back preserves the capture maps
/// and continues a square-well trajectory's energy ledger.
#[test]
fn square_well_state_survives_save_load() -> Result<()> {
    let particles = vec![
        Particle::new(0, [-1.0, 0.0, 0.0], [0.3, 0.0, 0.0], 1.0)?,
        Particle::new(1, [1.0, 0.0, 0.0], [-0.3, 0.0, 0.0], 1.0)?,
    ];
    let mut sim = Simulation::new(
        particles,
        Boundary::periodic([10.0, 10.0, 10.0])?,
        Dynamics::Newtonian,
        Some(8),
    )?;
    sim.add_interaction(Interaction::square_well(PairRange::All, 1.0, 1.5, 1.0, 1.0)?);
    sim.end_event_count = 8;
    sim.initialise()?;
    sim.run_simulation()?;
    let captured = sim.capture_count(0, 1);
    let e_before = sim.total_energy();

    let snap = Snapshot::capture(&mut sim);
    let mut buf = Vec::new();
    snap.to_writer(&mut buf)?;
    let restored_snap = Snapshot::from_reader(buf.as_slice())?;
    let mut restored = restored_snap.restore()?;
    restored.initialise()?;

    assert_eq!(restored.capture_count(0, 1), captured);
    assert!(
        (restored.total_energy() - e_before).abs() < 1e-12,
        "energy ledger intact across save/load"
    );
    restored.end_event_count = 16;
    restored.run_simulation()?;
    assert!(
        (restored.total_energy() - e_before).abs() < 1e-9,
        "energy still conserved after continuing"
    );
    Ok(())
}

/// `reset()` followed by `initialise()` on the same configuration rebuilds
/// the same initial event queue.
#[test]
fn reset_initialise_reproduces_initial_queue() -> Result<()> {
    let mut sim = head_on(3)?;
    sim.initialise()?;
    let first_time = sim.next_event_time();
    let first_len = sim.queued_events();

    sim.reset();
    sim.initialise()?;
    assert_eq!(
        sim.next_event_time(),
        first_time,
        "same first event after reset + initialise"
    );
    assert_eq!(sim.queued_events(), first_len, "same queue population");
    Ok(())
}
