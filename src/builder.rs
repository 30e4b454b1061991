//! `BoxworkBuilder`: an explicit context object for assembling a boxer's
//! tree and act lists (`bx`/`on`/`go`/`do_`). The in-progress state
//! (`box_`, `over`, the name-generation counters) lives as ordinary
//! mutable fields on the builder, threaded through each method call rather
//! than captured implicitly.

use crate::{
    act::{Act, Nabe},
    boxer::{Boxer, Goact},
    boxes::Box,
    error::{Error, Result},
    mine::KeyPath,
    need::Need,
};

/// Where a new box sits relative to the box work built so far.
pub enum Over {
    /// No over box — a new top-level box.
    Top,
    /// Same level as the box just built (reuse its `over`).
    Same,
    /// An explicit, already-declared over box.
    Named(String),
}

/// One of the four special guard conditions `on` can shorthand, matching
/// `Need`'s special predicates.
pub enum Cond {
    Updated,
    Changed,
    Count(u64),
    Elapsed(f64),
}

/// Builds one boxer's tree of boxes and wires its act lists through plain
/// methods (`bx`/`on`/`go`/`do_`) on an owned context object.
pub struct BoxworkBuilder<'a> {
    boxer: &'a mut Boxer,
    box_: Option<String>,
    over: Option<String>,
    bxpre: String,
    bxidx: u32,
    actpre: String,
    actidx: u32,
}

impl<'a> BoxworkBuilder<'a> {
    pub fn new(boxer: &'a mut Boxer) -> Self {
        BoxworkBuilder { boxer, box_: None, over: None, bxpre: "box".to_string(), bxidx: 0, actpre: "act".to_string(), actidx: 0 }
    }

    fn fresh_box_name(&mut self) -> String {
        let mut name = format!("{}{}", self.bxpre, self.bxidx);
        self.bxidx += 1;
        while self.boxer.boxes.contains_key(&name) {
            name = format!("{}{}", self.bxpre, self.bxidx);
            self.bxidx += 1;
        }
        name
    }

    /// Makes a box, adds it to the boxer, links the previously-built box's
    /// `next` to it, and makes it the current box for subsequent `on`/`go`/
    /// `do` calls. Returns the box's resolved name.
    pub fn bx(&mut self, name: Option<&str>, over: Over) -> Result<String> {
        let name = match name {
            Some(n) => {
                if self.boxer.boxes.contains_key(n) {
                    return Err(Error::DuplicateBox(n.to_string()));
                }
                n.to_string()
            }
            None => self.fresh_box_name(),
        };

        let over_name = match over {
            Over::Top => None,
            Over::Same => self.over.clone(),
            Over::Named(n) => {
                if !self.boxer.boxes.contains_key(&n) {
                    return Err(Error::UnresolvedLink(n));
                }
                Some(n)
            }
        };

        if let Some(prev) = &self.box_ {
            self.boxer.boxes.get_mut(prev).expect("builder-tracked box always exists").next = Some(name.clone());
        }

        self.boxer.insert(Box::new(name.clone(), over_name.clone()))?;
        if let Some(over_name) = &over_name {
            self.boxer.boxes.get_mut(over_name).expect("checked above").unders.push(name.clone());
        }

        self.over = over_name;
        self.box_ = Some(name.clone());
        Ok(name)
    }

    /// Builds a `Need` from a special condition, a subject key where the
    /// condition needs one, and an extra need ANDed onto it. `cond`
    /// defaults to `Updated` on the currently-marked key when both
    /// arguments are omitted.
    pub fn on(&self, cond: Option<Cond>, key: Option<KeyPath>, extra: Option<Need>) -> Result<Need> {
        let cond = cond.unwrap_or(Cond::Updated);
        let base = match cond {
            Cond::Updated => Need::Updated(key.ok_or_else(|| Error::MissingIop { act: "on".into(), iop: "_key" })?),
            Cond::Changed => Need::Changed(key.ok_or_else(|| Error::MissingIop { act: "on".into(), iop: "_key" })?),
            Cond::Count(n) => Need::Count(n),
            Cond::Elapsed(t) => Need::Elapsed(t),
        };
        Ok(match extra {
            Some(extra) => base.and(extra),
            None => base,
        })
    }

    /// Appends a `Goact` to the current box's `tracts`. `dest == None`
    /// resolves to the current box's `next` link at construction time if
    /// one is already set, otherwise it is left as the `next` sentinel for
    /// `Boxer::run` to resolve lazily each time it fires.
    pub fn go(&mut self, dest: Option<&str>, need: Need) -> Result<()> {
        let box_name = self.current_box_name()?;
        let dest = match dest {
            None | Some("next") | Some("Next") | Some("NEXT") => {
                let current = self.boxer.boxes.get(&box_name).expect("current box exists");
                current.next.clone()
            }
            Some(explicit) => Some(explicit.to_string()),
        };
        let box_ = self.boxer.boxes.get_mut(&box_name).expect("current box exists");
        box_.append_tract(Goact::new(dest, need));
        Ok(())
    }

    /// Appends `act` to the current box's list for `act`'s own `nabe`
    /// (`enacts` for a plain `Deed`, `reacts` for `Count`, and so on).
    pub fn do_(&mut self, act: std::boxed::Box<dyn Act>) -> Result<()> {
        let box_name = self.current_box_name()?;
        let nabe = act.nabe();
        let box_ = self.boxer.boxes.get_mut(&box_name).expect("current box exists");
        box_.append_act(nabe, act);
        Ok(())
    }

    /// Generates the next default act-kind name (`"act0"`, `"act1"`, ...),
    /// for callers constructing registry-backed acts that want an
    /// auto-assigned identity rather than an explicit one.
    pub fn fresh_act_name(&mut self) -> String {
        let name = format!("{}{}", self.actpre, self.actidx);
        self.actidx += 1;
        name
    }

    fn current_box_name(&self) -> Result<String> {
        self.box_.clone().ok_or_else(|| Error::InvalidName("no current box; call bx() first".to_string()))
    }

    /// Finishes building: validates every link and clears cached traces.
    pub fn finish(self) -> Result<()> {
        self.boxer.resolve()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{act::Deed, mine::Mine, tyme::Tymist};
    use std::rc::Rc;

    #[test]
    fn bx_auto_links_next_and_auto_names() {
        let mine = Mine::new();
        let mut tymist = Tymist::new(1.0);
        tymist.begin_run();
        let mut boxer = Boxer::new("B", "box0", mine, tymist.tymth());
        {
            let mut b = BoxworkBuilder::new(&mut boxer);
            let first = b.bx(None, Over::Top).unwrap();
            let second = b.bx(None, Over::Top).unwrap();
            assert_eq!(first, "box0");
            assert_eq!(second, "box1");
            b.finish().unwrap();
        }
        assert_eq!(boxer.boxes.get("box0").unwrap().next.as_deref(), Some("box1"));
    }

    #[test]
    fn do_appends_into_acts_nabe() {
        let mine = Mine::new();
        let mut tymist = Tymist::new(1.0);
        tymist.begin_run();
        let mut boxer = Boxer::new("B", "box0", mine, tymist.tymth());
        let mut b = BoxworkBuilder::new(&mut boxer);
        b.bx(None, Over::Top).unwrap();
        let deed = Deed::new(Nabe::Endo, Default::default(), Rc::new(|_ctx, _iops| Ok(crate::mine::Value::Null)));
        b.do_(std::boxed::Box::new(deed)).unwrap();
        assert_eq!(boxer.boxes.get("box0").unwrap().enacts.len(), 1);
    }

    #[test]
    fn go_appends_tract_left_for_lazy_next_resolution() {
        let mine = Mine::new();
        let mut tymist = Tymist::new(1.0);
        tymist.begin_run();
        let mut boxer = Boxer::new("B", "box0", mine, tymist.tymth());
        let mut b = BoxworkBuilder::new(&mut boxer);
        b.bx(None, Over::Top).unwrap();
        b.bx(None, Over::Top).unwrap();
        // box1 (current) has no .next yet -- go(None) is left unresolved,
        // to be read off box1.next lazily each time the tract is evaluated.
        b.go(None, Need::True).unwrap();
        assert_eq!(boxer.boxes.get("box1").unwrap().tracts.len(), 1);
        // a later bx() call retroactively sets box1.next, which the
        // already-built tract will pick up the next time it fires.
        b.bx(None, Over::Top).unwrap();
        assert_eq!(boxer.boxes.get("box1").unwrap().next.as_deref(), Some("box2"));
    }
}
