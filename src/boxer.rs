//! `Boxer`: drives one hierarchical state machine — a single active pile of
//! `Box` nodes advanced one tick at a time — and `exen`, the pile-diffing
//! algorithm a transition uses to decide what exits, enters, or merely gets
//! re-marked.
//!
//! Both piles are root-first (`Box::pile`, via `boxes::trace`), and the
//! forced-reentry case (the destination already sitting on the active
//! pile) falls out of the same index scan as the ordinary different-branch
//! case — no separate branch in the code is needed for it.

use crate::{
    act::{Act, ActCtx, Nabe},
    boxes::{self, Box},
    error::{Error, Result},
    mine::Mine,
    need::{self, Env, Need},
    tyme::{Tymee, Tymth},
};
use std::collections::HashMap;

/// A transition candidate: fires to `dest` (or, when `dest` is the `next`
/// sentinel, the owning box's `next` link) the first time `need` holds.
#[derive(Debug)]
pub struct Goact {
    dest: String,
    need: Need,
}

const NEXT: &str = "next";

impl Goact {
    pub fn new(dest: Option<String>, need: Need) -> Self {
        Goact { dest: dest.unwrap_or_else(|| NEXT.to_string()), need }
    }

    fn resolved_dest(&self, current: &Box) -> Option<String> {
        if self.dest == NEXT {
            current.next.clone()
        } else {
            Some(self.dest.clone())
        }
    }
}

/// Partitions `near`'s pile against `far`'s pile into `(exits, enters,
/// rexits, renters)`. `nears`/`fars` must both be root-first (see
/// `boxes::Trace::pile`). `far_name` is the destination box's own name —
/// passed separately because, when the destination already sits on the
/// active pile, it may appear at an index the scan reaches before `fars`
/// and `nears` themselves diverge.
pub fn exen(nears: &[String], fars: &[String], far_name: &str) -> (Vec<String>, Vec<String>, Vec<String>, Vec<String>) {
    let l = nears.len().min(fars.len());
    for i in 0..l {
        if nears[i] == far_name || fars[i] != nears[i] {
            let exits: Vec<String> = nears[i..].iter().rev().cloned().collect();
            let enters: Vec<String> = fars[i..].to_vec();
            let rexits: Vec<String> = nears[..i].iter().rev().cloned().collect();
            let renters: Vec<String> = fars[..i].to_vec();
            return (exits, enters, rexits, renters);
        }
    }
    // nears/fars agree over their whole shared length (one is a descendant
    // chain of the other with no divergence and no forced reentry) -- exit
    // nothing further and enter nothing further.
    (Vec::new(), Vec::new(), nears.iter().rev().cloned().collect(), fars.to_vec())
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum EntryKind {
    Fresh,
    Re,
}

/// Drives one boxwork (a named tree of `Box`es sharing a `Mine`). Owns the
/// active pile and the queue of boxes still needing their entry-side acts
/// run before this tick's `reacts`/`lacts`/`tracts` pass.
pub struct Boxer {
    pub name: String,
    pub boxes: HashMap<String, Box>,
    pub first: String,
    pub mine: Mine,
    tymth: Tymth,
    active: Vec<String>,
    pending: Vec<(String, EntryKind)>,
    started: bool,
}

impl Tymee for Boxer {
    fn tymth(&self) -> &Tymth {
        &self.tymth
    }
}

impl Boxer {
    pub fn new(name: impl Into<String>, first: impl Into<String>, mine: Mine, tymth: Tymth) -> Self {
        Boxer { name: name.into(), boxes: HashMap::new(), first: first.into(), mine, tymth, active: Vec::new(), pending: Vec::new(), started: false }
    }

    pub fn insert(&mut self, box_: Box) -> Result<()> {
        if self.boxes.contains_key(&box_.name) {
            return Err(Error::DuplicateBox(box_.name.clone()));
        }
        self.boxes.insert(box_.name.clone(), box_);
        Ok(())
    }

    /// Validates every `over`/`unders`/`next`/tract-`dest` reference names a
    /// box that actually exists, and drops every cached trace so the next
    /// access recomputes it. Must be called after the boxwork is fully
    /// built and before the first `prep`.
    pub fn resolve(&mut self) -> Result<()> {
        if !self.boxes.contains_key(&self.first) {
            return Err(Error::UnresolvedLink(self.first.clone()));
        }
        let names: Vec<String> = self.boxes.keys().cloned().collect();
        for name in &names {
            let box_ = &self.boxes[name];
            if let Some(over) = &box_.over {
                if !self.boxes.contains_key(over) {
                    return Err(Error::UnresolvedLink(over.clone()));
                }
            }
            for under in &box_.unders {
                if !self.boxes.contains_key(under) {
                    return Err(Error::UnresolvedLink(under.clone()));
                }
            }
            if let Some(next) = &box_.next {
                if !self.boxes.contains_key(next) {
                    return Err(Error::UnresolvedDest(next.clone()));
                }
            }
            for goact in &box_.tracts {
                if goact.dest != NEXT && !self.boxes.contains_key(&goact.dest) {
                    return Err(Error::UnresolvedDest(goact.dest.clone()));
                }
            }
            box_.invalidate_trace();
        }
        Ok(())
    }

    /// The current active pile, root-first, innermost box last.
    pub fn active_pile(&self) -> Vec<String> {
        self.active.clone()
    }

    fn env(&self) -> Env<'_> {
        Env { mine: &self.mine, boxer: &self.name, box_: self.active.last().map(String::as_str).unwrap_or(&self.first), tyme: self.tyme() }
    }

    fn ctx<'a>(&'a self, box_: &'a str) -> ActCtx<'a> {
        ActCtx { mine: &self.mine, boxer: &self.name, box_, tyme: self.tyme() }
    }

    fn run_acts(&self, acts: &[std::boxed::Box<dyn Act>], box_: &str) -> Result<()> {
        let ctx = self.ctx(box_);
        for act in acts {
            act.invoke(&ctx)?;
        }
        Ok(())
    }

    fn mark_entered(&self, box_: &str) -> Result<()> {
        let key = need::enter_mark_key(&self.name, box_)?;
        self.mine.ensure(key.clone());
        self.mine.set(key, crate::mine::Value::Float(self.tyme()), self.tyme());
        Ok(())
    }

    fn signal_done(&self) -> Result<()> {
        let key = need::end_key(&self.name)?;
        self.mine.ensure(key.clone());
        self.mine.set(key, crate::mine::Value::Bool(true), self.tyme());
        Ok(())
    }

    /// The precondition gate: evaluates `preacts` for each box in `names`
    /// (top-down, as given). A preact whose invoked value is falsy rejects
    /// the gate immediately, without running the remaining boxes' preacts.
    fn gate_passes(&self, names: &[String]) -> Result<bool> {
        for name in names {
            let box_ = self.boxes.get(name).ok_or_else(|| Error::UnresolvedLink(name.clone()))?;
            let ctx = self.ctx(name);
            for act in &box_.preacts {
                if !act.invoke(&ctx)?.truthy() {
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }

    /// Runs one box's entry-side acts: either `remacts`/`renacts` (re-entry)
    /// or `emacts`/`enacts` (fresh entry), then stamps the enter mark
    /// `Need::Elapsed` reads. The gate (`preacts`) has already been checked
    /// by whatever decided to queue this entry (`prep`/`transition_to`).
    fn enter_box(&self, name: &str, kind: EntryKind) -> Result<()> {
        let box_ = self.boxes.get(name).ok_or_else(|| Error::UnresolvedLink(name.to_string()))?;
        match kind {
            EntryKind::Fresh => {
                self.run_acts(&box_.emacts, name)?;
                self.run_acts(&box_.enacts, name)?;
            }
            EntryKind::Re => {
                self.run_acts(&box_.remacts, name)?;
                self.run_acts(&box_.renacts, name)?;
            }
        }
        self.mark_entered(name)
    }

    fn exit_box(&self, name: &str, rexit: bool) -> Result<()> {
        let box_ = self.boxes.get(name).ok_or_else(|| Error::UnresolvedLink(name.to_string()))?;
        if rexit {
            self.run_acts(&box_.rexacts, name)?;
        } else {
            self.run_acts(&box_.exacts, name)?;
        }
        Ok(())
    }

    /// Gates, then enters, the first box's default-descendant chain,
    /// queuing each for fresh entry on the next `run`. If the initial gate
    /// fails, the boxer never becomes active and is immediately signaled
    /// done instead.
    pub fn prep(&mut self) -> Result<()> {
        let trace = boxes::trace(&self.boxes, &self.first)?;
        self.started = true;
        if !self.gate_passes(&trace.pile)? {
            return self.signal_done();
        }
        self.active = trace.pile.clone();
        self.pending = trace.pile.into_iter().map(|n| (n, EntryKind::Fresh)).collect();
        Ok(())
    }

    /// Whether the boxer's end bag has been set (by an `EndAct`, or by a
    /// surrounding tymist's run limit).
    pub fn done(&self) -> bool {
        let key = match need::end_key(&self.name) {
            Ok(k) => k,
            Err(_) => return false,
        };
        matches!(self.mine.get(&key), Ok(bag) if bag.value.truthy())
    }

    /// One tick: runs any pending entry-side acts, checks for a requested
    /// end, runs `reacts`/`lacts` on the whole active pile top-down,
    /// evaluates `tracts` top-down (outer boxes before inner) with
    /// first-fire-wins, and on an accepted fire, re-piles via `exen` and
    /// runs the exit-side acts. A fired tract whose candidate fails the
    /// precondition gate is rejected; evaluation continues with that box's
    /// remaining tracts.
    pub fn run(&mut self) -> Result<()> {
        if !self.started {
            self.prep()?;
        }
        for (name, kind) in std::mem::take(&mut self.pending) {
            self.enter_box(&name, kind)?;
        }

        if self.done() {
            return self.quit();
        }

        for name in self.active.clone() {
            let box_ = self.boxes.get(&name).ok_or_else(|| Error::UnresolvedLink(name.clone()))?;
            self.run_acts(&box_.reacts, &name)?;
            self.run_acts(&box_.lacts, &name)?;
        }

        'search: for name in self.active.clone() {
            let box_ = self.boxes.get(&name).ok_or_else(|| Error::UnresolvedLink(name.clone()))?;
            for goact in &box_.tracts {
                let env = self.env();
                if goact.need.try_eval(&env)? {
                    let dest = goact
                        .resolved_dest(box_)
                        .ok_or_else(|| Error::UnresolvedDest(format!("{name}.next")))?;
                    if self.transition_to(&dest)? {
                        break 'search;
                    }
                }
            }
        }
        Ok(())
    }

    /// Attempts a transition to `dest`. Computes `exen`, re-runs the
    /// precondition gate against the candidate's `enters`, and only commits
    /// (running `exits`/`rexits` and re-piling) if the gate passes. Returns
    /// whether the transition was accepted; a rejected transition leaves
    /// `active`/`pending` untouched.
    fn transition_to(&mut self, dest: &str) -> Result<bool> {
        if !self.boxes.contains_key(dest) {
            return Err(Error::UnresolvedDest(dest.to_string()));
        }
        let far_trace = boxes::trace(&self.boxes, dest)?;
        let (exits, enters, rexits, renters) = exen(&self.active, &far_trace.pile, dest);

        if !self.gate_passes(&enters)? {
            return Ok(false);
        }

        for name in &exits {
            self.exit_box(name, false)?;
        }
        for name in &rexits {
            self.exit_box(name, true)?;
        }

        let mut new_active = Vec::with_capacity(renters.len() + enters.len());
        new_active.extend(renters.iter().cloned());
        new_active.extend(enters.iter().cloned());
        self.active = new_active;

        self.pending = renters.into_iter().map(|n| (n, EntryKind::Re)).chain(enters.into_iter().map(|n| (n, EntryKind::Fresh))).collect();
        Ok(true)
    }

    /// Forces a full exit of the current active pile, innermost first, and
    /// clears it. Called when the boxer's end bag is set, and by a
    /// scheduler tearing down on abort or tymist limit.
    pub fn quit(&mut self) -> Result<()> {
        for name in self.active.clone().into_iter().rev() {
            self.exit_box(&name, false)?;
        }
        self.active.clear();
        self.pending.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    /// S3 — same-branch forced reentry: far is already on the active pile.
    #[test]
    fn exen_forced_reentry() {
        let nears = chain(&["Root", "Mid", "Leaf"]);
        let fars = chain(&["Root", "Mid"]);
        let (exits, enters, rexits, renters) = exen(&nears, &fars, "Mid");
        assert_eq!(exits, chain(&["Leaf", "Mid"]));
        assert_eq!(enters, chain(&["Mid"]));
        assert_eq!(rexits, chain(&["Root"]));
        assert_eq!(renters, chain(&["Root"]));
    }

    /// S4 — different branch under a shared ancestor.
    #[test]
    fn exen_different_branch() {
        let nears = chain(&["Root", "A", "A1"]);
        let fars = chain(&["Root", "B", "B1"]);
        let (exits, enters, rexits, renters) = exen(&nears, &fars, "B1");
        assert_eq!(exits, chain(&["A1", "A"]));
        assert_eq!(enters, chain(&["B", "B1"]));
        assert_eq!(rexits, chain(&["Root"]));
        assert_eq!(renters, chain(&["Root"]));
    }

    /// S5 — disjoint trees: no shared root at all.
    #[test]
    fn exen_disjoint_trees() {
        let nears = chain(&["RootA", "A1"]);
        let fars = chain(&["RootB", "B1"]);
        let (exits, enters, rexits, renters) = exen(&nears, &fars, "B1");
        assert_eq!(exits, chain(&["A1", "RootA"]));
        assert_eq!(enters, chain(&["RootB", "B1"]));
        assert!(rexits.is_empty());
        assert!(renters.is_empty());
    }

    fn linear_boxer() -> Boxer {
        let mine = Mine::new();
        let mut tymist = crate::tyme::Tymist::new(1.0);
        tymist.begin_run();
        let mut boxer = Boxer::new("B", "Start", mine, tymist.tymth());
        let mut start = Box::new("Start", None);
        start.next = Some("Done".to_string());
        start.append_tract(Goact::new(None, Need::Count(1)));
        let count_act = crate::act::Count::new(&boxer.mine, "B", "Start").unwrap();
        start.append_act(Nabe::Redo, std::boxed::Box::new(count_act));
        boxer.insert(start).unwrap();
        boxer.insert(Box::new("Done", None)).unwrap();
        boxer.resolve().unwrap();
        boxer
    }

    #[test]
    fn boxer_transitions_on_first_firing_tract() {
        let mut boxer = linear_boxer();
        boxer.run().unwrap(); // prep + enter Start, count -> 0, need false
        assert_eq!(boxer.active, vec!["Start".to_string()]);
        boxer.run().unwrap(); // count -> 1, need true, transitions to Done
        assert_eq!(boxer.active, vec!["Done".to_string()]);
    }

    #[derive(Debug)]
    struct RejectingAct;
    impl Act for RejectingAct {
        fn nabe(&self) -> Nabe {
            Nabe::Preact
        }
        fn invoke(&self, _ctx: &ActCtx<'_>) -> Result<crate::mine::Value> {
            Ok(crate::mine::Value::Bool(false))
        }
    }

    /// A firing tract whose destination's `preacts` gate fails must be
    /// rejected: the boxer stays on its current pile, with no exits run.
    #[test]
    fn firing_tract_rejected_by_failing_gate_leaves_pile_unchanged() {
        let mut boxer = linear_boxer();
        boxer.boxes.get_mut("Done").unwrap().append_act(Nabe::Preact, std::boxed::Box::new(RejectingAct));
        boxer.run().unwrap(); // prep + enter Start, count -> 0
        boxer.run().unwrap(); // count -> 1, need true, but Done's gate fails
        assert_eq!(boxer.active, vec!["Start".to_string()]);
    }

    /// An initial gate failure signals the boxer done without ever
    /// activating the first box.
    #[test]
    fn prep_signals_done_when_initial_gate_fails() {
        let mine = Mine::new();
        let mut tymist = crate::tyme::Tymist::new(1.0);
        tymist.begin_run();
        let mut boxer = Boxer::new("B", "Start", mine, tymist.tymth());
        let mut start = Box::new("Start", None);
        start.append_act(Nabe::Preact, std::boxed::Box::new(RejectingAct));
        boxer.insert(start).unwrap();
        boxer.resolve().unwrap();
        boxer.run().unwrap();
        assert!(boxer.active_pile().is_empty());
        assert!(boxer.done());
    }
}
