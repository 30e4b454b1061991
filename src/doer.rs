//! `Doer`: the cooperative unit of work a scheduler steps once per pass,
//! and the scheduler's ready-list loop itself.
//!
//! A `Doer` is enter → recur* → exit, the same three-phase lifecycle
//! `doer::tcp::TcpClientDoer` layers over a TCP client. `recur` returns
//! whether it wants to keep running; the scheduler is the one piece
//! deciding when a deed moves on to `exit` (recur says stop, or an abort
//! is requested from outside).

use crate::tyme::{Tymist, Tymth};
use std::{cell::RefCell, rc::Rc};

pub mod tcp;

/// Lifecycle state of a single deed.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DoerState {
    Exited,
    Entered,
    Recurring,
    Exiting,
    Aborted,
}

/// What the scheduler should do with a deed on its next pass.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Desire {
    Recur,
    Exit,
    Abort,
}

/// Anything the scheduler can drive through enter/recur/exit.
pub trait Doer {
    /// Sets up resources. Comparable to a context manager's `__enter__`.
    fn enter(&mut self) {}

    /// Does one unit of work at `tyme`. Returns whether the deed wants
    /// another `recur` pass.
    fn recur(&mut self, tyme: f64) -> bool;

    /// Tears down resources. Always called exactly once, whether the deed
    /// finished on its own or was aborted.
    fn exit(&mut self) {}

    /// Rebinds the deed's time source. The default no-op is right for
    /// doers with no nested tymists of their own to rewind.
    fn wind(&mut self, _tymth: Tymth) {}
}

/// A scheduled `Doer` plus its lifecycle bookkeeping. `tock` is the deed's
/// requested minimum spacing between `recur` passes, in tyme units; `0.0`
/// means "every tick".
pub struct Deed {
    pub doer: Box<dyn Doer>,
    pub tock: f64,
    state: DoerState,
    desire: Desire,
    next_due: f64,
}

impl Deed {
    pub fn new(doer: Box<dyn Doer>) -> Self {
        Deed { doer, tock: 0.0, state: DoerState::Exited, desire: Desire::Recur, next_due: 0.0 }
    }

    pub fn with_tock(mut self, tock: f64) -> Self {
        self.tock = tock;
        self
    }

    pub fn state(&self) -> DoerState {
        self.state
    }

    pub fn abort(&mut self) {
        self.desire = Desire::Abort;
    }
}

/// Drives a ready-list of `Deed`s against a `Tymist`, one tick at a time.
/// Mirrors the role a `Runtime::run_once` loop plays for an incremental
/// system: each `cycle` call is one virtual tick, advancing every deed due
/// this tyme through exactly one lifecycle step.
pub struct Doist {
    pub tymist: Tymist,
    deeds: Vec<Rc<RefCell<Deed>>>,
}

impl Doist {
    pub fn new(tymist: Tymist) -> Self {
        Doist { tymist, deeds: Vec::new() }
    }

    pub fn add(&mut self, doer: Box<dyn Doer>) -> Rc<RefCell<Deed>> {
        self.add_deed(Deed::new(doer))
    }

    pub fn add_deed(&mut self, mut deed: Deed) -> Rc<RefCell<Deed>> {
        deed.doer.wind(self.tymist.tymth());
        let handle = Rc::new(RefCell::new(deed));
        self.deeds.push(Rc::clone(&handle));
        handle
    }

    pub fn is_empty(&self) -> bool {
        self.deeds.is_empty()
    }

    /// One scheduler pass: steps every due deed exactly one lifecycle
    /// phase, drops deeds that have fully exited, then advances the
    /// tymist by one tick.
    pub fn cycle(&mut self) {
        let tyme = self.tymist.tyme();
        for handle in &self.deeds {
            let mut deed = handle.borrow_mut();
            if deed.state != DoerState::Exited && deed.state != DoerState::Aborted && tyme < deed.next_due {
                continue;
            }
            step(&mut deed, tyme);
        }
        self.deeds.retain(|h| !matches!(h.borrow().state, DoerState::Exited | DoerState::Aborted));
        self.tymist.turn(None);
    }

    /// Runs `cycle` until the ready-list drains or the tymist's configured
    /// `limit` is reached. Every entered-but-not-yet-exited deed is force-
    /// exited on the way out, including on an unwinding panic, so a doer's
    /// resources are never leaked just because the loop left by an
    /// unusual path.
    pub fn run(&mut self) -> crate::error::Result<()> {
        let deeds = self.deeds.clone();
        let _teardown = scopeguard::guard(deeds, |deeds| {
            for handle in deeds {
                let mut deed = handle.borrow_mut();
                if matches!(deed.state, DoerState::Entered | DoerState::Recurring | DoerState::Exiting) {
                    deed.doer.exit();
                    deed.state = DoerState::Exited;
                }
            }
        });

        self.tymist.begin_run();
        while !self.is_empty() {
            if self.tymist.limit_reached() {
                for handle in &self.deeds {
                    handle.borrow_mut().abort();
                }
                self.cycle();
                return Err(crate::error::Error::SchedulerLimit);
            }
            self.cycle();
        }
        Ok(())
    }
}

fn step(deed: &mut Deed, tyme: f64) {
    match (deed.state, deed.desire) {
        (DoerState::Exited, Desire::Abort) => {
            deed.state = DoerState::Aborted;
        }
        (DoerState::Exited, _) => {
            deed.doer.enter();
            deed.state = DoerState::Entered;
        }
        (DoerState::Entered, Desire::Abort) => {
            deed.doer.exit();
            deed.state = DoerState::Aborted;
        }
        (DoerState::Entered, _) | (DoerState::Recurring, Desire::Recur) => {
            let wants_more = deed.doer.recur(tyme);
            deed.next_due = tyme + deed.tock;
            if wants_more {
                deed.state = DoerState::Recurring;
            } else {
                deed.desire = Desire::Exit;
                deed.state = DoerState::Exiting;
            }
        }
        (DoerState::Recurring, Desire::Exit) | (DoerState::Recurring, Desire::Abort) | (DoerState::Exiting, _) => {
            deed.doer.exit();
            deed.state = DoerState::Exited;
        }
        (DoerState::Aborted, _) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountingDoer {
        log: Rc<RefCell<Vec<&'static str>>>,
        ticks: std::cell::Cell<u32>,
        max: u32,
    }

    impl Doer for CountingDoer {
        fn enter(&mut self) {
            self.log.borrow_mut().push("enter");
        }

        fn recur(&mut self, _tyme: f64) -> bool {
            self.log.borrow_mut().push("recur");
            let n = self.ticks.get() + 1;
            self.ticks.set(n);
            n < self.max
        }

        fn exit(&mut self) {
            self.log.borrow_mut().push("exit");
        }
    }

    /// S2 — a two-tock doer lifecycle: enter once, recur twice, exit once.
    #[test]
    fn doer_lifecycle_s2() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut doist = Doist::new(Tymist::new(1.0));
        doist.add(Box::new(CountingDoer { log: Rc::clone(&log), ticks: std::cell::Cell::new(0), max: 2 }));
        doist.run().unwrap();
        assert_eq!(*log.borrow(), vec!["enter", "recur", "recur", "exit"]);
    }

    #[test]
    fn abort_tears_down_entered_doer() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut doist = Doist::new(Tymist::new(1.0));
        let handle = doist.add(Box::new(CountingDoer { log: Rc::clone(&log), ticks: std::cell::Cell::new(0), max: 100 }));
        doist.cycle(); // enter
        handle.borrow_mut().abort();
        doist.run().unwrap();
        assert_eq!(*log.borrow(), vec!["enter", "exit"]);
    }

    #[test]
    fn scheduler_limit_aborts_remaining_deeds() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut tymist = Tymist::new(1.0);
        tymist.limit = Some(1.0);
        let mut doist = Doist::new(tymist);
        doist.add(Box::new(CountingDoer { log: Rc::clone(&log), ticks: std::cell::Cell::new(0), max: 1000 }));
        let result = doist.run();
        assert!(matches!(result, Err(crate::error::Error::SchedulerLimit)));
        assert_eq!(log.borrow().last(), Some(&"exit"));
    }
}
