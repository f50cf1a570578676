use ordered_float::NotNan;
use std::cmp::Ordering;

use crate::error::{Error, Result};

/// Which interaction surface a pair event was predicted against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairSurface {
    /// The hard core (or bond minimum): an impulsive collision.
    Core,
    /// An inward step/well boundary crossing; may capture or bounce.
    WellIn,
    /// An outward step/well boundary crossing; may release or bounce.
    WellOut,
    /// The outer bond wall: an inward reflection.
    BondMax,
}

impl PairSurface {
    #[inline]
    fn rank(self) -> u32 {
        match self {
            PairSurface::Core => 0,
            PairSurface::WellIn => 1,
            PairSurface::WellOut => 2,
            PairSurface::BondMax => 3,
        }
    }
}

/// Kinds of events the engine schedules.
///
/// Tie-breaking at equal times is deterministic on `(kind, ids)`; pair
/// events outrank local walls, which outrank cell crossings, so a pair
/// event coinciding with the crossing that would have discovered it is
/// executed first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// Interaction event between particles `i` (primary) and `j`, produced
    /// by the registered interaction at index `interaction`.
    Pair {
        i: u32,
        j: u32,
        interaction: u32,
        surface: PairSurface,
    },
    /// Particle `i` meets the local wall `wall`.
    Local { i: u32, wall: u32 },
    /// Particle `i` exits its cell through `face` (2*axis + {0 lower, 1 upper}).
    CellCrossing { i: u32, face: u8 },
    /// System-wide event (ticker) with registry id `id`.
    System { id: u32 },
    /// Pseudo-event forcing a periodic resort of the global queue.
    Sentinel,
}

impl EventKind {
    #[inline]
    fn order_key(&self) -> (u8, u32, u32, u32) {
        match *self {
            EventKind::Pair {
                i, j, surface, ..
            } => (0, i, j, surface.rank()),
            EventKind::Local { i, wall } => (1, i, wall, 0),
            EventKind::CellCrossing { i, face } => (2, i, face as u32, 0),
            EventKind::System { id } => (3, id, 0, 0),
            EventKind::Sentinel => (4, 0, 0, 0),
        }
    }

    /// The particle whose event list owns this event, if any.
    #[inline]
    pub fn primary(&self) -> Option<u32> {
        match *self {
            EventKind::Pair { i, .. }
            | EventKind::Local { i, .. }
            | EventKind::CellCrossing { i, .. } => Some(i),
            EventKind::System { .. } | EventKind::Sentinel => None,
        }
    }

    /// The second participating particle, if any.
    #[inline]
    pub fn secondary(&self) -> Option<u32> {
        match *self {
            EventKind::Pair { j, .. } => Some(j),
            _ => None,
        }
    }
}

/// A scheduled event with deterministic total ordering.
///
/// - `time`: absolute occurrence time (finite, non-NaN).
/// - `kind`: event kind and participants.
/// - `ec_primary`, `ec_secondary`: event-counter snapshots taken at enqueue;
///   a mismatch on dequeue marks the event stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    pub time: NotNan<f64>,
    pub kind: EventKind,
    pub ec_primary: u64,
    pub ec_secondary: Option<u64>,
}

impl Event {
    /// Create a new event, validating that time is finite and non-NaN.
    pub fn new(
        time: f64,
        kind: EventKind,
        ec_primary: u64,
        ec_secondary: Option<u64>,
    ) -> Result<Self> {
        if time.is_nan() {
            return Err(Error::Numeric("event time is NaN".into()));
        }
        if !time.is_finite() {
            return Err(Error::Numeric("event time must be finite".into()));
        }
        let time =
            NotNan::new(time).map_err(|_| Error::Numeric("event time is NaN".into()))?;
        Ok(Self {
            time,
            kind,
            ec_primary,
            ec_secondary,
        })
    }

    /// Returns the raw f64 event time.
    #[inline]
    pub fn time_f64(&self) -> f64 {
        self.time.into_inner()
    }

    /// Validate against current event counters. Pass `None` for
    /// `ec_secondary_now` when the event has no second participant.
    #[inline]
    pub fn is_valid(&self, ec_primary_now: u64, ec_secondary_now: Option<u64>) -> bool {
        if self.ec_primary != ec_primary_now {
            return false;
        }
        match (self.ec_secondary, ec_secondary_now) {
            (Some(a), Some(b)) => a == b,
            (None, None) => true,
            // Single-participant events stay valid regardless of an
            // unrelated second counter.
            (None, Some(_)) => true,
            (Some(_), None) => false,
        }
    }
}

impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.time.cmp(&other.time) {
            Ordering::Equal => {
                let a = self.kind.order_key();
                let b = other.kind.order_key();
                match a.cmp(&b) {
                    Ordering::Equal => {
                        // Final tie-breaker on counter snapshots for a
                        // total order.
                        (self.ec_primary, self.ec_secondary.unwrap_or(0))
                            .cmp(&(other.ec_primary, other.ec_secondary.unwrap_or(0)))
                    }
                    o => o,
                }
            }
            o => o,
        }
    }
}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
