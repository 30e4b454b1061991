//! `Box`: a single node in a boxer's hierarchy tree, holding the ten
//! per-context act lists and the lazily-computed pile/spot/trail used by
//! `exen` and transition resolution.

use crate::act::{Act, Nabe};
use crate::boxer::Goact;
use std::cell::RefCell;

/// A node in the hierarchy tree. `over` is the parent box name (if any);
/// `unders` lists child box names in declaration order, the first of which
/// is the default child entered on a plain (non-`dest`) enter.
#[derive(Debug)]
pub struct Box {
    pub name: String,
    pub over: Option<String>,
    pub unders: Vec<String>,
    /// Default successor box name for a bare `Goact` with no explicit
    /// `dest`, set by the builder's auto-linking.
    pub next: Option<String>,

    pub preacts: Vec<std::boxed::Box<dyn Act>>,
    pub remacts: Vec<std::boxed::Box<dyn Act>>,
    pub renacts: Vec<std::boxed::Box<dyn Act>>,
    pub emacts: Vec<std::boxed::Box<dyn Act>>,
    pub enacts: Vec<std::boxed::Box<dyn Act>>,
    pub reacts: Vec<std::boxed::Box<dyn Act>>,
    pub lacts: Vec<std::boxed::Box<dyn Act>>,
    pub tracts: Vec<Goact>,
    pub exacts: Vec<std::boxed::Box<dyn Act>>,
    pub rexacts: Vec<std::boxed::Box<dyn Act>>,

    trace: RefCell<Option<Trace>>,
}

/// Cached results of [`trace`]: the pile (root-first, through this box,
/// continuing down its default-child chain), the depth of this box within
/// it ("spot"), and the printable trail string.
#[derive(Clone, Debug)]
pub struct Trace {
    pub pile: Vec<String>,
    pub spot: usize,
    pub trail: String,
}

impl Box {
    pub fn new(name: impl Into<String>, over: Option<String>) -> Self {
        Box {
            name: name.into(),
            over,
            unders: Vec::new(),
            next: None,
            preacts: Vec::new(),
            remacts: Vec::new(),
            renacts: Vec::new(),
            emacts: Vec::new(),
            enacts: Vec::new(),
            reacts: Vec::new(),
            lacts: Vec::new(),
            tracts: Vec::new(),
            exacts: Vec::new(),
            rexacts: Vec::new(),
            trace: RefCell::new(None),
        }
    }

    pub fn append_act(&mut self, nabe: Nabe, act: std::boxed::Box<dyn Act>) {
        match nabe {
            Nabe::Preact => self.preacts.push(act),
            Nabe::Remark => self.remacts.push(act),
            Nabe::Renter => self.renacts.push(act),
            Nabe::Enmark => self.emacts.push(act),
            Nabe::Endo => self.enacts.push(act),
            Nabe::Redo => self.reacts.push(act),
            Nabe::Last => self.lacts.push(act),
            Nabe::Exdo => self.exacts.push(act),
            Nabe::Rexdo => self.rexacts.push(act),
            Nabe::Godo => panic!("Goact acts append to tracts via Box::append_tract, not append_act"),
        }
    }

    pub fn append_tract(&mut self, goact: Goact) {
        self.tracts.push(goact);
    }

    /// Invalidates the cached trace. Called by `Boxer::resolve` whenever
    /// `over`/`unders` change.
    pub fn invalidate_trace(&self) {
        *self.trace.borrow_mut() = None;
    }
}

/// Computes (and caches) `trace` for `name`: walks `over` up to the root,
/// then walks back down through each box's default child (`unders[0]`) to
/// the deepest descendant, producing a root-first `pile` with `name` at
/// offset `spot`. Mirrors `Box._trace` exactly, including the fact that
/// the pile reaches past `name` into its default-child chain, not just up
/// to it — `exen` depends on that to detect same-branch forced reentry.
pub fn trace(boxes: &std::collections::HashMap<String, Box>, name: &str) -> crate::error::Result<Trace> {
    let box_ = boxes.get(name).ok_or_else(|| crate::error::Error::UnresolvedLink(name.to_string()))?;
    if let Some(cached) = box_.trace.borrow().as_ref() {
        return Ok(cached.clone());
    }

    let mut ancestors = Vec::new();
    let mut cursor = box_.over.clone();
    while let Some(parent_name) = cursor {
        ancestors.push(parent_name.clone());
        cursor = boxes.get(&parent_name).and_then(|b| b.over.clone());
    }
    ancestors.reverse();
    let spot = ancestors.len();

    let mut pile = ancestors;
    pile.push(name.to_string());

    let mut cursor = boxes.get(name).and_then(|b| b.unders.first().cloned());
    while let Some(under_name) = cursor {
        cursor = boxes.get(&under_name).and_then(|b| b.unders.first().cloned());
        pile.push(under_name);
    }

    let up = pile[..spot].join("<");
    let dn = pile[spot + 1..].join(">");
    let trail = format!("{up}<{name}>{dn}");

    let computed = Trace { pile, spot, trail };
    *box_.trace.borrow_mut() = Some(computed.clone());
    Ok(computed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn trace_walks_to_root() {
        let mut boxes = HashMap::new();
        boxes.insert("Root".to_string(), Box::new("Root", None));
        boxes.insert("Mid".to_string(), Box::new("Mid", Some("Root".to_string())));
        boxes.insert("Leaf".to_string(), Box::new("Leaf", Some("Mid".to_string())));

        let t = trace(&boxes, "Leaf").unwrap();
        assert_eq!(t.pile, vec!["Root", "Mid", "Leaf"]);
        assert_eq!(t.spot, 2);
        assert_eq!(t.trail, "Root<Mid<Leaf>");
    }

    #[test]
    fn trace_is_cached() {
        let mut boxes = HashMap::new();
        boxes.insert("Root".to_string(), Box::new("Root", None));
        let first = trace(&boxes, "Root").unwrap();
        let second = trace(&boxes, "Root").unwrap();
        assert_eq!(first.trail, second.trail);
    }
}
