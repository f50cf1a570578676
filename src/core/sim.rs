//! Simulation container and the event-loop scheduler.
//!
//! The container owns particles, boundary condition, dynamics, interaction
//! registry, local walls, cell global, sorter, observers, PRNG, and the
//! compensated system clock. The scheduler repeatedly pops the globally
//! earliest event, discards stale entries via the counter snapshots,
//! advances time, streams exactly the touched particles, dispatches, and
//! regenerates the touched particles' event lists from their cell
//! neighbourhoods.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha12Rng;
use serde::{Deserialize, Serialize};

use crate::boundary::Boundary;
use crate::cells::CellGrid;
use crate::core::event::{Event, EventKind};
use crate::core::particle::{Particle, DIM};
use crate::dynamics::{Dynamics, Wall};
use crate::error::{Error, Result};
use crate::interaction::{
    find_interaction, CaptureMap, Interaction, InteractionKind, PairOutcome,
};
use crate::math::{self, EPS_TIME};
use crate::observer::{EventClass, EventRecord, Observer};
use crate::sorter::{Sorter, SorterKind};

/// Phases of a simulation's life.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    /// Configured but not yet initialised.
    Start,
    /// `initialise()` succeeded; the event queue is primed.
    Initialised,
    /// At least one event has been executed.
    Production,
    /// A fatal invariant or numeric failure occurred.
    Error,
}

/// System clock with Kahan-compensated accumulation, keeping the absolute
/// drift near `O(sqrt(eventCount) * eps)` over billions of event deltas.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SimClock {
    t: f64,
    comp: f64,
}

impl SimClock {
    #[inline]
    pub fn now(&self) -> f64 {
        self.t
    }

    pub fn advance(&mut self, dt: f64) {
        let y = dt - self.comp;
        let t = self.t + y;
        self.comp = (t - self.t) - y;
        self.t = t;
    }
}

/// Auto-selection threshold: below this N the four-heap beats the calendar.
const CALENDAR_THRESHOLD: usize = 1024;

/// A single event-driven molecular dynamics simulation.
pub struct Simulation {
    pub particles: Vec<Particle>,
    pub boundary: Boundary,
    pub dynamics: Dynamics,
    pub(crate) interactions: Vec<Interaction>,
    pub(crate) walls: Vec<Wall>,
    pub(crate) captures: CaptureMap,
    cells: Option<CellGrid>,
    sorter: Option<Sorter>,
    pub(crate) clock: SimClock,
    pub(crate) event_count: u64,
    pub end_event_count: u64,
    ticker_period: Option<f64>,
    next_tick: f64,
    shutdown: bool,
    status: Status,
    pub(crate) rng: ChaCha12Rng,
    observers: Vec<Box<dyn Observer>>,
    sorter_override: Option<SorterKind>,
}

impl Simulation {
    /// Create a simulation from explicit particle state. Particle ids must
    /// equal their index. `seed` fixes the PRNG for reproducible runs.
    pub fn new(
        particles: Vec<Particle>,
        boundary: Boundary,
        dynamics: Dynamics,
        seed: Option<u64>,
    ) -> Result<Self> {
        for (idx, p) in particles.iter().enumerate() {
            if p.id as usize != idx {
                return Err(Error::InvalidParam(format!(
                    "particle id {} does not match its index {idx}",
                    p.id
                )));
            }
        }
        let rng = match seed {
            Some(s) => ChaCha12Rng::seed_from_u64(s),
            None => ChaCha12Rng::seed_from_u64(rand::rng().random()),
        };
        Ok(Self {
            particles,
            boundary,
            dynamics,
            interactions: Vec::new(),
            walls: Vec::new(),
            captures: CaptureMap::default(),
            cells: None,
            sorter: None,
            clock: SimClock::default(),
            event_count: 0,
            end_event_count: u64::MAX,
            ticker_period: None,
            next_tick: f64::INFINITY,
            shutdown: false,
            status: Status::Start,
            rng,
            observers: Vec::new(),
            sorter_override: None,
        })
    }

    pub fn add_interaction(&mut self, interaction: Interaction) {
        self.interactions.push(interaction);
    }

    pub fn add_wall(&mut self, wall: Wall) {
        self.walls.push(wall);
    }

    pub fn add_observer<O: Observer + 'static>(&mut self, observer: O) {
        self.observers.push(Box::new(observer));
    }

    /// Hand back a registered observer by concrete type.
    pub fn observer<T: 'static>(&self) -> Option<&T> {
        self.observers
            .iter()
            .find_map(|o| o.as_any().downcast_ref::<T>())
    }

    /// Period of the system ticker event (forces a queue resort and a tick
    /// broadcast to observers).
    pub fn set_ticker_period(&mut self, period: f64) -> Result<()> {
        if !period.is_finite() || period <= 0.0 {
            return Err(Error::InvalidParam(
                "ticker period must be finite and > 0".into(),
            ));
        }
        self.ticker_period = Some(period);
        Ok(())
    }

    /// Pin the sorter's global structure instead of auto-selecting by N.
    pub fn set_sorter_kind(&mut self, kind: SorterKind) {
        self.sorter_override = Some(kind);
    }

    /// Request a cooperative stop; the loop exits before the next event.
    pub fn sim_shutdown(&mut self) {
        self.shutdown = true;
    }

    #[inline]
    pub fn status(&self) -> Status {
        self.status
    }

    #[inline]
    pub fn system_time(&self) -> f64 {
        self.clock.now()
    }

    #[inline]
    pub fn event_count(&self) -> u64 {
        self.event_count
    }

    pub fn num_particles(&self) -> usize {
        self.particles.len()
    }

    /// Current capture depth of a pair in its stepped/well interaction.
    pub fn capture_count(&self, i: u32, j: u32) -> u32 {
        self.captures.count(i, j)
    }

    /// Build the cell list, prime every particle's event list, and seed the
    /// system events. Fails on unusable configuration.
    pub fn initialise(&mut self) -> Result<()> {
        if self.particles.is_empty() {
            return Err(Error::Config("no particles configured".into()));
        }
        if self.interactions.is_empty() {
            return Err(Error::Config("no interactions registered".into()));
        }
        let r_cut = self
            .interactions
            .iter()
            .map(Interaction::max_range)
            .fold(0.0_f64, f64::max);

        let t_now = self.clock.now();
        for p in &mut self.particles {
            self.dynamics.stream(p, t_now);
            self.boundary.apply_position(&mut p.r, &mut p.v, t_now);
        }

        let mut cells = CellGrid::new(&self.boundary, r_cut, self.particles.len())?;
        cells.rebuild(&self.particles);
        self.cells = Some(cells);

        self.reconstruct_captures()?;
        self.check_system()?;

        let kind = self.sorter_override.unwrap_or_else(|| {
            if self.particles.len() < CALENDAR_THRESHOLD {
                SorterKind::FourHeap
            } else {
                SorterKind::Calendar
            }
        });
        let hint = self.calendar_width_hint();
        self.sorter = Some(Sorter::new(kind, self.particles.len(), t_now, hint));

        for pid in 0..self.particles.len() as u32 {
            self.recompute_events(pid)?;
        }
        if let Some(period) = self.ticker_period {
            self.next_tick = t_now + period;
        }
        self.status = Status::Initialised;
        Ok(())
    }

    /// Discard accumulated event history: zero the clock, the event count,
    /// and every particle's event counter, and drop the queue. Particle
    /// positions, velocities, and capture state are preserved; call
    /// `initialise()` to rebuild.
    pub fn reset(&mut self) {
        // Capture the streamed state before the clock rewinds.
        let t_now = self.clock.now();
        for p in &mut self.particles {
            self.dynamics.stream(p, t_now);
            p.event_count = 0;
            p.last_update_time = 0.0;
        }
        self.clock = SimClock::default();
        self.event_count = 0;
        self.shutdown = false;
        self.next_tick = f64::INFINITY;
        self.cells = None;
        self.sorter = None;
        self.observers.clear();
        self.status = Status::Start;
    }

    /// Execute the next event. Returns `false` when the run is complete:
    /// the event budget is exhausted, shutdown was requested, or the system
    /// is frozen (universally infinite next event — a terminal condition,
    /// not an error).
    pub fn run_simulation_step(&mut self) -> Result<bool> {
        match self.status {
            Status::Initialised | Status::Production => {}
            Status::Start => {
                return Err(Error::Config(
                    "simulation must be initialised before stepping".into(),
                ))
            }
            Status::Error => {
                return Err(Error::Config(
                    "simulation is in the error status".into(),
                ))
            }
        }
        if self.shutdown || self.event_count >= self.end_event_count {
            return Ok(false);
        }
        self.status = Status::Production;

        loop {
            let queue_time = self
                .sorter
                .as_mut()
                .expect("initialised simulation has a sorter")
                .peek_time();

            // System ticker competes with the particle queue; particle
            // events win ties so the tick observes post-event state.
            let tick_first = match queue_time {
                Some(tq) => self.next_tick < tq,
                None => self.next_tick.is_finite(),
            };

            if tick_first {
                let t = self.next_tick;
                self.advance_clock_to(t)?;
                let sorter = self.sorter.as_mut().expect("sorter present");
                sorter.rebuild_global();
                let period = self.ticker_period.expect("tick scheduled without period");
                self.next_tick = t + period;
                self.finish_event(EventRecord {
                    time: t,
                    class: EventClass::Tick,
                    primary: None,
                    secondary: None,
                    delta_ke: 0.0,
                    delta_pe: 0.0,
                });
                return Ok(self.more_to_run());
            }

            if queue_time.is_none() {
                // Frozen system: nothing will ever happen again.
                return Ok(false);
            }

            let ev = self
                .sorter
                .as_mut()
                .expect("sorter present")
                .pop()
                .expect("peeked event must pop");
            if !self.event_still_valid(&ev) {
                continue;
            }

            let t_ev = ev.time_f64();
            self.advance_clock_to(t_ev)?;
            let record = self.dispatch(&ev, t_ev)?;
            self.check_event_invariants(&ev)?;
            self.finish_event(record);
            return Ok(self.more_to_run());
        }
    }

    /// Drive the loop until the event budget, shutdown, or freeze.
    pub fn run_simulation(&mut self) -> Result<()> {
        while self.run_simulation_step()? {}
        Ok(())
    }

    /// Process all events up to `target_time`, then stream every particle
    /// to it. The event budget still applies.
    pub fn advance_to(&mut self, target_time: f64) -> Result<()> {
        if !target_time.is_finite() {
            return Err(Error::InvalidParam("target_time must be finite".into()));
        }
        if target_time < self.clock.now() - EPS_TIME {
            return Err(Error::InvalidParam(
                "target_time cannot be earlier than current time".into(),
            ));
        }
        loop {
            let next = match (
                self.sorter.as_mut().and_then(Sorter::peek_time),
                self.next_tick,
            ) {
                (Some(tq), tick) => tq.min(tick),
                (None, tick) => tick,
            };
            if !next.is_finite() || next > target_time || !self.run_simulation_step()? {
                break;
            }
        }
        let dt = target_time - self.clock.now();
        if dt > 0.0 {
            self.clock.advance(dt);
        }
        self.sync_particles();
        Ok(())
    }

    /// Stream every particle to the current system time.
    pub fn sync_particles(&mut self) {
        let t = self.clock.now();
        for p in &mut self.particles {
            self.dynamics.stream(p, t);
        }
    }

    /// Number of queued (possibly stale) events.
    pub fn queued_events(&self) -> usize {
        self.sorter.as_ref().map_or(0, Sorter::len)
    }

    /// Absolute time of the next scheduled event, if any.
    pub fn next_event_time(&mut self) -> Option<f64> {
        let queue = self.sorter.as_mut().and_then(Sorter::peek_time);
        match (queue, self.next_tick.is_finite()) {
            (Some(tq), true) => Some(tq.min(self.next_tick)),
            (Some(tq), false) => Some(tq),
            (None, true) => Some(self.next_tick),
            (None, false) => None,
        }
    }

    // ============ Diagnostics ============

    /// Total kinetic energy from the stored velocities (call
    /// `sync_particles` first under accelerated dynamics).
    pub fn kinetic_energy(&self) -> f64 {
        self.particles.iter().map(Particle::kinetic_energy).sum()
    }

    /// Total step-potential energy from the capture map.
    pub fn potential_energy(&self) -> f64 {
        self.captures
            .sorted_entries()
            .iter()
            .map(|&(i, j, count)| {
                find_interaction(&self.interactions, i, j)
                    .map_or(0.0, |(_, inter)| inter.energy_at(count))
            })
            .sum()
    }

    pub fn total_energy(&self) -> f64 {
        self.kinetic_energy() + self.potential_energy()
    }

    pub fn total_momentum(&self) -> [f64; DIM] {
        crate::observer::total_momentum(&self.particles)
    }

    pub fn kinetic_temperature(&self) -> f64 {
        crate::observer::kinetic_temperature(&self.particles)
    }

    pub fn number_density(&self) -> f64 {
        self.particles.len() as f64 / self.boundary.volume()
    }

    /// Packing fraction from the first registered interaction's core
    /// diameter.
    pub fn packing_fraction(&self) -> f64 {
        let sigma = self
            .interactions
            .first()
            .map_or(0.0, |inter| core_diameter(&inter.kind));
        self.number_density() * std::f64::consts::PI * sigma.powi(3) / 6.0
    }

    // ============ Scheduler internals ============

    fn more_to_run(&self) -> bool {
        !self.shutdown && self.event_count < self.end_event_count
    }

    fn advance_clock_to(&mut self, t: f64) -> Result<()> {
        let dt = t - self.clock.now();
        if dt < -EPS_TIME {
            self.status = Status::Error;
            return Err(Error::InvariantViolation(format!(
                "event time {t} precedes system time {}",
                self.clock.now()
            )));
        }
        if dt > 0.0 {
            self.clock.advance(dt);
        }
        Ok(())
    }

    fn event_still_valid(&self, ev: &Event) -> bool {
        let primary_ok = ev
            .kind
            .primary()
            .map(|i| self.particles[i as usize].event_count);
        let secondary_ok = ev
            .kind
            .secondary()
            .map(|j| self.particles[j as usize].event_count);
        match primary_ok {
            Some(ec) => ev.is_valid(ec, secondary_ok),
            None => true,
        }
    }

    fn dispatch(&mut self, ev: &Event, t: f64) -> Result<EventRecord> {
        match ev.kind {
            EventKind::Pair {
                i, j, interaction, ..
            } => self.dispatch_pair(ev, i, j, interaction, t),
            EventKind::Local { i, wall } => {
                let p = &mut self.particles[i as usize];
                self.dynamics.stream(p, t);
                let wall = self.walls.get(wall as usize).ok_or_else(|| {
                    Error::Config(format!("local event references unknown wall {wall}"))
                })?;
                let delta_ke = self.dynamics.execute_wall(p, wall);
                p.bump_event_count();
                self.recompute_events(i)?;
                Ok(EventRecord {
                    time: t,
                    class: EventClass::Wall,
                    primary: Some(i),
                    secondary: None,
                    delta_ke,
                    delta_pe: 0.0,
                })
            }
            EventKind::CellCrossing { i, face } => {
                let p = &mut self.particles[i as usize];
                self.dynamics.stream(p, t);
                self.boundary.apply_position(&mut p.r, &mut p.v, t);
                let r = p.r;
                self.cells
                    .as_mut()
                    .expect("initialised simulation has cells")
                    .apply_crossing(i, face, &r);
                self.particles[i as usize].bump_event_count();
                self.recompute_events(i)?;
                Ok(EventRecord {
                    time: t,
                    class: EventClass::CellShift,
                    primary: Some(i),
                    secondary: None,
                    delta_ke: 0.0,
                    delta_pe: 0.0,
                })
            }
            EventKind::System { .. } | EventKind::Sentinel => Err(Error::Numeric(
                "system events never enter the particle queue".into(),
            )),
        }
    }

    fn dispatch_pair(
        &mut self,
        ev: &Event,
        i: u32,
        j: u32,
        interaction: u32,
        t: f64,
    ) -> Result<EventRecord> {
        let surface = match ev.kind {
            EventKind::Pair { surface, .. } => surface,
            _ => unreachable!("dispatch_pair called on a pair event"),
        };
        let inter = self
            .interactions
            .get(interaction as usize)
            .ok_or_else(|| {
                Error::Config(format!(
                    "pair event references unknown interaction {interaction}"
                ))
            })?;
        let (pi, pj) = pair_mut(&mut self.particles, i as usize, j as usize);
        self.dynamics.stream(pi, t);
        self.dynamics.stream(pj, t);
        let data = inter.run_event(
            pi,
            pj,
            surface,
            &mut self.captures,
            &self.dynamics,
            &self.boundary,
            t,
        )?;
        pi.bump_event_count();
        pj.bump_event_count();
        self.recompute_events(i)?;
        self.recompute_events(j)?;
        let class = match data.outcome {
            PairOutcome::Core => EventClass::Core,
            PairOutcome::Capture => EventClass::Capture,
            PairOutcome::Release => EventClass::Release,
            PairOutcome::Bounce => EventClass::Bounce,
        };
        Ok(EventRecord {
            time: t,
            class,
            primary: Some(i),
            secondary: Some(j),
            delta_ke: data.delta_ke,
            delta_pe: data.delta_pe,
        })
    }

    /// Clear and regenerate particle `i`'s event list: one event per
    /// neighbouring pair, the earliest wall event, and its cell crossing.
    fn recompute_events(&mut self, i: u32) -> Result<()> {
        let t_now = self.clock.now();
        let cells = self.cells.as_ref().expect("cells built");
        let sorter = self.sorter.as_mut().expect("sorter built");
        sorter.clear_particle(i);

        let pi = &self.particles[i as usize];
        let ec_i = pi.event_count;

        for j in cells.neighbours(i, &self.boundary, t_now) {
            let pj = &self.particles[j as usize];
            let (idx, inter) =
                find_interaction(&self.interactions, i, j).ok_or_else(|| {
                    Error::Config(format!("no interaction covers pair ({i}, {j})"))
                })?;
            let count = self.captures.count(i, j);
            if let Some((dt, surface)) =
                inter.next_event(pi, pj, count, &self.dynamics, &self.boundary, t_now)
            {
                sorter.push(Event::new(
                    t_now + dt,
                    EventKind::Pair {
                        i,
                        j,
                        interaction: idx,
                        surface,
                    },
                    ec_i,
                    Some(pj.event_count),
                )?);
            }
        }

        let mut best_wall: Option<(f64, u32)> = None;
        for (widx, wall) in self.walls.iter().enumerate() {
            if let Some(dt) = self.dynamics.predict_wall(pi, wall, t_now) {
                if best_wall.map_or(true, |(tb, _)| dt < tb) {
                    best_wall = Some((dt, widx as u32));
                }
            }
        }
        if let Some((dt, wall)) = best_wall {
            sorter.push(Event::new(
                t_now + dt,
                EventKind::Local { i, wall },
                ec_i,
                None,
            )?);
        }

        if let Some((dt, face)) = cells.next_crossing(pi, &self.dynamics, &self.boundary, t_now)
        {
            sorter.push(Event::new(
                t_now + dt,
                EventKind::CellCrossing { i, face },
                ec_i,
                None,
            )?);
        }
        Ok(())
    }

    fn finish_event(&mut self, record: EventRecord) {
        self.event_count += 1;
        let mut observers = std::mem::take(&mut self.observers);
        for obs in &mut observers {
            obs.on_event(&self.particles, &record);
        }
        self.observers = observers;
    }

    /// Derive capture counts from geometry when no persisted counts exist
    /// at all; restored and reset states keep their capture maps.
    fn reconstruct_captures(&mut self) -> Result<()> {
        if !self.captures.is_empty() {
            return Ok(());
        }
        let cells = self.cells.as_ref().expect("cells built");
        let t_now = self.clock.now();
        let mut derived: Vec<(u32, u32, u32)> = Vec::new();
        for pi in &self.particles {
            for j in cells.neighbours(pi.id, &self.boundary, t_now) {
                if j < pi.id {
                    continue;
                }
                let Some((_, inter)) = find_interaction(&self.interactions, pi.id, j) else {
                    continue;
                };
                let count = inter.geometric_capture_count(
                    pi,
                    &self.particles[j as usize],
                    &self.dynamics,
                    &self.boundary,
                    t_now,
                );
                if count > 0 {
                    derived.push((pi.id, j, count));
                }
            }
        }
        for (i, j, count) in derived {
            self.captures.set(i, j, count);
        }
        Ok(())
    }

    /// Configuration sanity pass: every neighbouring pair must be covered
    /// by an interaction and must not violate its separation window.
    fn check_system(&self) -> Result<()> {
        let cells = self.cells.as_ref().expect("cells built");
        let t_now = self.clock.now();
        for pi in &self.particles {
            for j in cells.neighbours(pi.id, &self.boundary, t_now) {
                if j < pi.id {
                    continue;
                }
                let pj = &self.particles[j as usize];
                let (_, inter) =
                    find_interaction(&self.interactions, pi.id, j).ok_or_else(|| {
                        Error::Config(format!("no interaction covers pair ({}, {j})", pi.id))
                    })?;
                let count = self.captures.count(pi.id, j);
                inter.validate_state(
                    pi,
                    pj,
                    count,
                    &self.dynamics,
                    &self.boundary,
                    t_now,
                    1e-9,
                )?;
            }
        }
        Ok(())
    }

    /// Debug-build invariant checks after an event.
    fn check_event_invariants(&mut self, ev: &Event) -> Result<()> {
        if !cfg!(debug_assertions) {
            return Ok(());
        }
        let cells = self.cells.as_ref().expect("cells built");
        for pid in [ev.kind.primary(), ev.kind.secondary()].into_iter().flatten() {
            let p = &self.particles[pid as usize];
            if matches!(ev.kind, EventKind::CellCrossing { .. })
                && !cells.membership_consistent(p)
            {
                self.status = Status::Error;
                return Err(Error::InvariantViolation(format!(
                    "particle {pid} is listed in a cell that does not contain it"
                )));
            }
            if !p.v.iter().chain(p.r.iter()).all(|x| x.is_finite()) {
                self.status = Status::Error;
                return Err(Error::Numeric(format!(
                    "particle {pid} left the event with non-finite state"
                )));
            }
        }
        Ok(())
    }

    fn calendar_width_hint(&self) -> f64 {
        let n = self.particles.len() as f64;
        let mean_speed = self
            .particles
            .iter()
            .map(|p| math::norm(&p.v))
            .sum::<f64>()
            / n;
        let min_width = self
            .cells
            .as_ref()
            .map_or(1.0, CellGrid::min_width);
        if mean_speed > EPS_TIME {
            0.25 * min_width / mean_speed
        } else {
            1.0
        }
    }
}

/// Core (excluded-volume) diameter of an interaction kind.
fn core_diameter(kind: &InteractionKind) -> f64 {
    match kind {
        InteractionKind::HardSphere { diameter, .. }
        | InteractionKind::SquareWell { diameter, .. } => *diameter,
        InteractionKind::Stepped { core_diameter, .. } => *core_diameter,
        InteractionKind::Bond { min_dist, .. } => *min_dist,
    }
}

/// Disjoint mutable borrows of two distinct particles.
fn pair_mut(parts: &mut [Particle], i: usize, j: usize) -> (&mut Particle, &mut Particle) {
    debug_assert_ne!(i, j, "pair event with identical participants");
    if i < j {
        let (a, b) = parts.split_at_mut(j);
        (&mut a[i], &mut b[0])
    } else {
        let (a, b) = parts.split_at_mut(i);
        let (pj, pi) = (&mut a[j], &mut b[0]);
        (pi, pj)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interaction::PairRange;

    fn two_body_head_on() -> Result<Simulation> {
        let particles = vec![
            Particle::new(0, [-1.5, 0.0, 0.0], [1.0, 0.0, 0.0], 1.0)?,
            Particle::new(1, [1.5, 0.0, 0.0], [-1.0, 0.0, 0.0], 1.0)?,
        ];
        let mut sim = Simulation::new(
            particles,
            Boundary::periodic([10.0, 10.0, 10.0])?,
            Dynamics::Newtonian,
            Some(42),
        )?;
        sim.add_interaction(Interaction::hard_sphere(PairRange::All, 1.0, 1.0)?);
        Ok(sim)
    }

    #[test]
    fn step_before_initialise_is_config_error() -> Result<()> {
        let mut sim = two_body_head_on()?;
        let err = sim.run_simulation_step().unwrap_err();
        assert!(err.to_string().contains("initialised"));
        Ok(())
    }

    #[test]
    fn head_on_collision_at_expected_time() -> Result<()> {
        let mut sim = two_body_head_on()?;
        sim.initialise()?;
        // Gap 3 closing at 2 with contact diameter 1: collision at t = 1.0.
        sim.end_event_count = u64::MAX;
        let mut collided = false;
        for _ in 0..64 {
            if !sim.run_simulation_step()? {
                break;
            }
            if sim.particles[0].v[0] < 0.0 {
                collided = true;
                break;
            }
        }
        assert!(collided, "collision must occur");
        assert!(
            (sim.system_time() - 1.0).abs() < 1e-9,
            "collision at t = 1, got {}",
            sim.system_time()
        );
        // Equal masses swap velocities head-on.
        assert!((sim.particles[0].v[0] - (-1.0)).abs() < 1e-12);
        assert!((sim.particles[1].v[0] - 1.0).abs() < 1e-12);
        Ok(())
    }

    #[test]
    fn shutdown_stops_cleanly() -> Result<()> {
        let mut sim = two_body_head_on()?;
        sim.initialise()?;
        sim.sim_shutdown();
        assert!(!sim.run_simulation_step()?, "shutdown exits the loop");
        assert_eq!(sim.event_count(), 0);
        Ok(())
    }

    #[test]
    fn event_budget_bounds_the_run() -> Result<()> {
        let mut sim = two_body_head_on()?;
        sim.end_event_count = 3;
        sim.initialise()?;
        sim.run_simulation()?;
        assert_eq!(sim.event_count(), 3);
        Ok(())
    }

    #[test]
    fn momentum_and_energy_conserved_over_events() -> Result<()> {
        let mut sim = two_body_head_on()?;
        sim.end_event_count = 50;
        sim.initialise()?;
        let e0 = sim.kinetic_energy();
        sim.run_simulation()?;
        let e1 = sim.kinetic_energy();
        assert!(
            ((e1 - e0) / e0).abs() < 1e-12,
            "hard-sphere kinetic energy is conserved"
        );
        let p = sim.total_momentum();
        assert!(math::norm(&p) < 1e-12, "zero net momentum preserved");
        Ok(())
    }

    #[test]
    fn reset_preserves_state_but_zeroes_history() -> Result<()> {
        let mut sim = two_body_head_on()?;
        sim.end_event_count = 5;
        sim.initialise()?;
        sim.run_simulation()?;
        sim.sync_particles();
        let r_after = sim.particles[0].r;
        sim.reset();
        assert_eq!(sim.event_count(), 0);
        assert_eq!(sim.system_time(), 0.0);
        assert_eq!(sim.status(), Status::Start);
        assert_eq!(sim.particles[0].r, r_after, "positions preserved");
        assert_eq!(sim.particles[0].event_count, 0);
        Ok(())
    }

    #[test]
    fn frozen_system_terminates_without_error() -> Result<()> {
        // Two resting particles far apart: no event will ever fire.
        let particles = vec![
            Particle::new(0, [-3.0, 0.0, 0.0], [0.0; DIM], 1.0)?,
            Particle::new(1, [3.0, 0.0, 0.0], [0.0; DIM], 1.0)?,
        ];
        let mut sim = Simulation::new(
            particles,
            Boundary::periodic([10.0, 10.0, 10.0])?,
            Dynamics::Newtonian,
            Some(7),
        )?;
        sim.add_interaction(Interaction::hard_sphere(PairRange::All, 1.0, 1.0)?);
        sim.initialise()?;
        assert!(!sim.run_simulation_step()?, "frozen system reports done");
        assert_ne!(sim.status(), Status::Error);
        Ok(())
    }

    #[test]
    fn overlapping_configuration_rejected() -> Result<()> {
        let particles = vec![
            Particle::new(0, [0.0, 0.0, 0.0], [0.0; DIM], 1.0)?,
            Particle::new(1, [0.5, 0.0, 0.0], [0.0; DIM], 1.0)?,
        ];
        let mut sim = Simulation::new(
            particles,
            Boundary::periodic([10.0, 10.0, 10.0])?,
            Dynamics::Newtonian,
            Some(7),
        )?;
        sim.add_interaction(Interaction::hard_sphere(PairRange::All, 1.0, 1.0)?);
        let err = sim.initialise().unwrap_err();
        assert!(matches!(err, Error::InvariantViolation(_)));
        Ok(())
    }

    #[test]
    fn ticker_fires_between_events() -> Result<()> {
        let mut sim = two_body_head_on()?;
        sim.set_ticker_period(0.25)?;
        sim.add_observer(crate::observer::RunStats::new());
        sim.end_event_count = 8;
        sim.initialise()?;
        sim.run_simulation()?;
        let stats: &crate::observer::RunStats =
            sim.observer().expect("stats observer registered");
        assert!(stats.ticks >= 3, "periodic ticks interleave with events");
        Ok(())
    }
}
