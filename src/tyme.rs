//! The virtual clock: `Tymist` owns `tyme` and hands out read-only tyme
//! closures ("tymth") to every `Tymee`; `Tymer` is a simple countdown built
//! on top of one.
//!
//! Mirrors the role moxie's `Revision`/`Runtime` pair plays (a monotonic
//! counter the embedding system advances once per call), generalized to a
//! floating-point `tyme` with a configurable `tick` and an optional
//! real-time pacer.

use std::{
    cell::Cell,
    rc::Rc,
    time::{Duration, Instant},
};

/// A read-only snapshot of a tymist's current tyme, cloneable and cheap to
/// hold onto. Any `Tymee` (a `Box`, a `Doer`, a `Tymer`) is handed one of
/// these on registration instead of a back-reference to the tymist itself.
#[derive(Clone)]
pub struct Tymth {
    tyme: Rc<Cell<f64>>,
}

impl Tymth {
    pub fn now(&self) -> f64 {
        self.tyme.get()
    }
}

/// Anything that reads tyme exclusively through a [`Tymth`] closure.
pub trait Tymee {
    fn tymth(&self) -> &Tymth;

    fn tyme(&self) -> f64 {
        self.tymth().now()
    }
}

/// Owns `tyme`, the tick size, an optional run limit, and the real-time
/// pacing flag. The sole mutator of virtual time.
pub struct Tymist {
    tyme: Rc<Cell<f64>>,
    pub tick: f64,
    pub limit: Option<f64>,
    pub real: bool,
    start_tyme: f64,
    wall_tick_start: Option<Instant>,
}

impl Tymist {
    pub fn new(tick: f64) -> Self {
        Tymist {
            tyme: Rc::new(Cell::new(0.0)),
            tick,
            limit: None,
            real: false,
            start_tyme: 0.0,
            wall_tick_start: None,
        }
    }

    pub fn with_limit(mut self, limit: f64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_real(mut self, real: bool) -> Self {
        self.real = real;
        self
    }

    pub fn tyme(&self) -> f64 {
        self.tyme.get()
    }

    /// Returns a `Tymth` broadcasting this tymist's current tyme. Every
    /// `Tymee` registered with the tymist should hold one of these rather
    /// than a reference back to the `Tymist`.
    pub fn tymth(&self) -> Tymth {
        Tymth { tyme: Rc::clone(&self.tyme) }
    }

    /// Whether a configured `limit` has been reached, measured from the
    /// tyme at which the tymist started running.
    pub fn limit_reached(&self) -> bool {
        match self.limit {
            Some(limit) => self.tyme() - self.start_tyme >= limit,
            None => false,
        }
    }

    /// Advances tyme by `tick` (or the provided override), logging the
    /// turn at trace level. If `real` pacing is on, sleeps to keep virtual
    /// tyme from outrunning the wall clock — it never fast-forwards.
    pub fn turn(&mut self, tick: Option<f64>) {
        let step = tick.unwrap_or(self.tick);
        let next = self.tyme() + step;
        tracing::trace!(from = self.tyme(), to = next, step, "tymist turn");
        self.tyme.set(next);

        if self.real {
            if let Some(wall_tick_start) = self.wall_tick_start {
                let elapsed = wall_tick_start.elapsed();
                let budget = Duration::from_secs_f64(step.max(0.0));
                if let Some(remaining) = budget.checked_sub(elapsed) {
                    std::thread::sleep(remaining);
                }
            }
            self.wall_tick_start = Some(Instant::now());
        }
    }

    /// Marks the start of a run, anchoring `limit_reached` to the current
    /// tyme. Called once by `Doer` schedulers before their first `turn`.
    pub fn begin_run(&mut self) {
        self.start_tyme = self.tyme();
        if self.real {
            self.wall_tick_start = Some(Instant::now());
        }
    }
}

/// A countdown derived from a [`Tymth`]. `elapsed`/`remaining`/`expired` are
/// always computed from the *current* tyme, so re-winding to a different
/// tyme source can never desynchronize `start`.
#[derive(Clone)]
pub struct Tymer {
    tymth: Tymth,
    start: f64,
    duration: f64,
}

impl Tymer {
    pub fn new(tymth: Tymth, duration: f64) -> Self {
        let start = tymth.now();
        Tymer { tymth, start, duration }
    }

    /// Rebinds the time source without disturbing `start`/`duration`, only
    /// where "current tyme" is read from.
    pub fn wind(&mut self, tymth: Tymth) {
        self.tymth = tymth;
    }

    pub fn start(&mut self, duration: Option<f64>) {
        self.start = self.tymth.now();
        if let Some(duration) = duration {
            self.duration = duration;
        }
    }

    /// Restarts the countdown anchored to the current tyme.
    pub fn restart(&mut self, duration: Option<f64>) {
        self.start(duration);
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn elapsed(&self) -> f64 {
        self.tymth.now() - self.start
    }

    pub fn remaining(&self) -> f64 {
        self.duration - self.elapsed()
    }

    pub fn expired(&self) -> bool {
        self.elapsed() >= self.duration
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// S1 — tick 0.25, duration 1.0, four turns: tyme == 1.0, expired,
    /// remaining == 0.0.
    #[test]
    fn tymer_expiry_s1() {
        let mut tymist = Tymist::new(0.25);
        let mut tymer = Tymer::new(tymist.tymth(), 1.0);
        for _ in 0..4 {
            tymist.turn(None);
        }
        assert_eq!(tymist.tyme(), 1.0);
        assert!(tymer.expired());
        assert_eq!(tymer.remaining(), 0.0);

        // restarting anchors to the current tyme, not the original start.
        tymer.restart(Some(0.5));
        assert_eq!(tymer.elapsed(), 0.0);
        assert!(!tymer.expired());
    }

    #[test]
    fn tyme_is_monotonic_and_steps_by_tick() {
        let mut tymist = Tymist::new(1.0);
        tymist.turn(None);
        assert_eq!(tymist.tyme(), 1.0);
        tymist.turn(Some(0.75));
        assert_eq!(tymist.tyme(), 1.75);
        tymist.tick = 0.5;
        tymist.turn(None);
        assert_eq!(tymist.tyme(), 2.25);
    }

    #[test]
    fn rewinding_tymth_does_not_desync_start() {
        let mut a = Tymist::new(1.0);
        let mut tymer = Tymer::new(a.tymth(), 2.0);
        a.turn(None);
        assert_eq!(tymer.elapsed(), 1.0);

        let mut b = Tymist::new(1.0);
        b.turn(None);
        b.turn(None);
        tymer.wind(b.tymth());
        // start is unchanged; elapsed now reads off b's tyme (2.0) - 0.0
        assert_eq!(tymer.elapsed(), 2.0);
    }
}
