//! Event sorter: per-particle min-heaps of pending events, collected under
//! a global structure over the heap tops.
//!
//! Two interchangeable globals are provided. The bounded calendar queue is
//! a ring of time buckets with an overflow region: O(1) insertion and
//! amortised O(1) extraction when the bucket width sits near the mean event
//! interval. The four-heap is a 4-ary indexed tournament over the tops:
//! O(log N) both ways, preferred for small N or when event intervals vary
//! by orders of magnitude. The scheduler is agnostic.
//!
//! Staleness is the caller's contract: events snapshot participant event
//! counters at push time and the scheduler discards mismatches on pop; the
//! sorter itself never scans for invalidated entries.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use ordered_float::NotNan;
use serde::{Deserialize, Serialize};

use crate::core::event::Event;

const INF: f64 = f64::INFINITY;

/// Which global structure collects the per-particle heap tops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SorterKind {
    FourHeap,
    Calendar,
}

/// Per-particle event lists under a global top-of-heap structure.
#[derive(Debug)]
pub struct Sorter {
    heaps: Vec<BinaryHeap<Reverse<Event>>>,
    global: GlobalQueue,
}

impl Sorter {
    /// `width_hint` seeds the calendar bucket width; it is ignored by the
    /// four-heap.
    pub fn new(kind: SorterKind, n_particles: usize, t_now: f64, width_hint: f64) -> Self {
        let global = match kind {
            SorterKind::FourHeap => GlobalQueue::FourHeap(FourHeap::new(n_particles)),
            SorterKind::Calendar => {
                GlobalQueue::Calendar(CalendarQueue::new(n_particles, t_now, width_hint))
            }
        };
        Self {
            heaps: (0..n_particles).map(|_| BinaryHeap::new()).collect(),
            global,
        }
    }

    fn top_time(&self, pid: u32) -> NotNan<f64> {
        self.heaps[pid as usize]
            .peek()
            .map(|Reverse(ev)| ev.time)
            .unwrap_or_else(|| NotNan::new(INF).expect("inf is not NaN"))
    }

    /// Insert an event under its primary participant's heap.
    pub fn push(&mut self, ev: Event) {
        let pid = ev
            .kind
            .primary()
            .expect("only particle events enter the sorter");
        self.heaps[pid as usize].push(Reverse(ev));
        let top = self.top_time(pid);
        self.global.update(pid, top);
    }

    /// Drop every pending event owned by `pid` (all were computed against
    /// its pre-event state).
    pub fn clear_particle(&mut self, pid: u32) {
        self.heaps[pid as usize].clear();
        self.global
            .update(pid, NotNan::new(INF).expect("inf is not NaN"));
    }

    /// Time of the globally earliest event, if any.
    pub fn peek_time(&mut self) -> Option<f64> {
        self.global.min().map(|(_, t)| t.into_inner())
    }

    /// Pop the globally earliest event. The caller validates counter
    /// snapshots and retries on staleness.
    pub fn pop(&mut self) -> Option<Event> {
        let (pid, _) = self.global.min()?;
        let Reverse(ev) = self.heaps[pid as usize].pop()?;
        let top = self.top_time(pid);
        self.global.update(pid, top);
        Some(ev)
    }

    /// Recompute the global structure from every heap top (the sentinel
    /// resort, and the calendar's overflow redistribution hook).
    pub fn rebuild_global(&mut self) {
        for pid in 0..self.heaps.len() as u32 {
            let top = self.top_time(pid);
            self.global.update(pid, top);
        }
    }

    /// Total number of queued events across all particles.
    pub fn len(&self) -> usize {
        self.heaps.iter().map(|h| h.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.heaps.iter().all(|h| h.is_empty())
    }
}

#[derive(Debug)]
enum GlobalQueue {
    FourHeap(FourHeap),
    Calendar(CalendarQueue),
}

impl GlobalQueue {
    fn update(&mut self, pid: u32, key: NotNan<f64>) {
        match self {
            GlobalQueue::FourHeap(h) => h.update(pid, key),
            GlobalQueue::Calendar(c) => c.update(pid, key),
        }
    }

    fn min(&mut self) -> Option<(u32, NotNan<f64>)> {
        match self {
            GlobalQueue::FourHeap(h) => h.min(),
            GlobalQueue::Calendar(c) => c.min(),
        }
    }
}

/// 4-ary indexed heap over particle ids keyed by their top event time.
/// Every particle is always present; empty heaps carry an infinite key.
/// Ties break on the particle id for determinism.
#[derive(Debug)]
struct FourHeap {
    heap: Vec<u32>,
    pos: Vec<usize>,
    keys: Vec<NotNan<f64>>,
}

impl FourHeap {
    fn new(n: usize) -> Self {
        Self {
            heap: (0..n as u32).collect(),
            pos: (0..n).collect(),
            keys: vec![NotNan::new(INF).expect("inf is not NaN"); n],
        }
    }

    #[inline]
    fn less(&self, a: u32, b: u32) -> bool {
        (self.keys[a as usize], a) < (self.keys[b as usize], b)
    }

    fn update(&mut self, pid: u32, key: NotNan<f64>) {
        self.keys[pid as usize] = key;
        let i = self.pos[pid as usize];
        self.sift_up(i);
        self.sift_down(self.pos[pid as usize]);
    }

    fn min(&self) -> Option<(u32, NotNan<f64>)> {
        let &pid = self.heap.first()?;
        let key = self.keys[pid as usize];
        if key.into_inner() == INF {
            return None;
        }
        Some((pid, key))
    }

    fn swap(&mut self, i: usize, j: usize) {
        self.heap.swap(i, j);
        self.pos[self.heap[i] as usize] = i;
        self.pos[self.heap[j] as usize] = j;
    }

    fn sift_up(&mut self, mut i: usize) {
        while i > 0 {
            let parent = (i - 1) / 4;
            if self.less(self.heap[i], self.heap[parent]) {
                self.swap(i, parent);
                i = parent;
            } else {
                break;
            }
        }
    }

    fn sift_down(&mut self, mut i: usize) {
        loop {
            let first_child = 4 * i + 1;
            if first_child >= self.heap.len() {
                break;
            }
            let mut best = i;
            for c in first_child..(first_child + 4).min(self.heap.len()) {
                if self.less(self.heap[c], self.heap[best]) {
                    best = c;
                }
            }
            if best == i {
                break;
            }
            self.swap(i, best);
            i = best;
        }
    }
}

const NO_BUCKET: usize = usize::MAX;
const OVERFLOW_BUCKET: usize = usize::MAX - 1;

/// Bounded calendar queue: a ring of time buckets over the particle tops,
/// with events beyond the ring's horizon parked in an overflow region that
/// is redistributed each time the ring wraps a full year.
#[derive(Debug)]
struct CalendarQueue {
    keys: Vec<NotNan<f64>>,
    bucket_of: Vec<usize>,
    buckets: Vec<Vec<u32>>,
    overflow: Vec<u32>,
    width: f64,
    /// Start time of the cursor bucket.
    base: f64,
    cursor: usize,
    stored: usize,
}

impl CalendarQueue {
    fn new(n: usize, t_now: f64, width_hint: f64) -> Self {
        let width = if width_hint.is_finite() && width_hint > 0.0 {
            width_hint
        } else {
            1.0
        };
        let n_buckets = n.next_power_of_two().clamp(16, 4096);
        Self {
            keys: vec![NotNan::new(INF).expect("inf is not NaN"); n],
            bucket_of: vec![NO_BUCKET; n],
            buckets: vec![Vec::new(); n_buckets],
            overflow: Vec::new(),
            width,
            base: t_now,
            cursor: 0,
            stored: 0,
        }
    }

    fn remove(&mut self, pid: u32) {
        let b = self.bucket_of[pid as usize];
        let list = match b {
            NO_BUCKET => return,
            OVERFLOW_BUCKET => &mut self.overflow,
            i => &mut self.buckets[i],
        };
        if let Some(at) = list.iter().position(|&x| x == pid) {
            list.swap_remove(at);
        }
        self.bucket_of[pid as usize] = NO_BUCKET;
        self.stored -= 1;
    }

    fn place(&mut self, pid: u32) {
        let key = self.keys[pid as usize].into_inner();
        if key == INF {
            return;
        }
        let b = self.buckets.len();
        let rel = ((key - self.base) / self.width).floor().max(0.0);
        let slot = if rel >= b as f64 {
            self.overflow.push(pid);
            OVERFLOW_BUCKET
        } else {
            let i = (self.cursor + rel as usize) % b;
            self.buckets[i].push(pid);
            i
        };
        self.bucket_of[pid as usize] = slot;
        self.stored += 1;
    }

    fn update(&mut self, pid: u32, key: NotNan<f64>) {
        self.remove(pid);
        self.keys[pid as usize] = key;
        self.place(pid);
    }

    fn min(&mut self) -> Option<(u32, NotNan<f64>)> {
        if self.stored == 0 {
            return None;
        }
        loop {
            // Scan forward from the cursor; the first occupied bucket holds
            // the minimum since keys live in their own window.
            for step in 0..self.buckets.len() {
                let i = (self.cursor + step) % self.buckets.len();
                if !self.buckets[i].is_empty() {
                    // Advance the ring start to the scanned position.
                    self.base += step as f64 * self.width;
                    self.cursor = i;
                    let best = self.buckets[i]
                        .iter()
                        .copied()
                        .min_by_key(|&pid| (self.keys[pid as usize], pid))
                        .expect("bucket non-empty");
                    return Some((best, self.keys[best as usize]));
                }
            }
            // A whole year is empty: pull the overflow into the ring.
            self.base += self.buckets.len() as f64 * self.width;
            // Jump the base forward to the earliest overflow key so sparse
            // far-future events do not spin the ring.
            if let Some(&earliest) = self
                .overflow
                .iter()
                .min_by_key(|&&pid| (self.keys[pid as usize], pid))
            {
                self.base = self.keys[earliest as usize].into_inner().max(self.base)
                    - self.width * 0.5;
            } else {
                return None;
            }
            let parked: Vec<u32> = std::mem::take(&mut self.overflow);
            for pid in parked {
                self.bucket_of[pid as usize] = NO_BUCKET;
                self.stored -= 1;
                self.place(pid);
            }
        }
    }
}
