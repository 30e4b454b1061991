//! Acts: the callable units a [`crate::boxes::Box`] runs in each of its ten
//! per-context action lists.
//!
//! A `deed` is always a Rust closure rather than a string of statements
//! compiled and evaluated at runtime; general expression evaluation beyond
//! the guard language isn't part of this runtime's job. The kind table,
//! the construction-time validation, and the registry carry the rest of
//! the behavior.

use crate::{
    error::{Error, Result},
    mine::{KeyPath, Mine, Value},
    need,
};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::{collections::HashMap, fmt, rc::Rc};

/// The context (list) an act runs in, one per `Box` field. Five of the ten
/// names (`endo`, `godo`, `enmark`, `redo`, `exdo`) are fixed conventions;
/// the remaining five are completed by symmetry for their matching
/// box-list contexts.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Nabe {
    Preact,
    Remark,
    Renter,
    Enmark,
    Endo,
    Redo,
    Last,
    Godo,
    Exdo,
    Rexdo,
}

/// Input/output parameters passed to an act's construction and invocation.
pub type Iops = HashMap<String, Value>;

/// Everything an act needs at invocation time: the shared mine, which
/// boxer/box it's running as part of, and the current tyme (for mark
/// writes, which must stamp `_tyme` before becoming observable).
pub struct ActCtx<'a> {
    pub mine: &'a Mine,
    pub boxer: &'a str,
    pub box_: &'a str,
    pub tyme: f64,
}

/// Common contract for every act kind except `Goact` (which has its own
/// evaluate-to-destination contract, see [`crate::boxer::Goact`]).
pub trait Act: fmt::Debug {
    fn nabe(&self) -> Nabe;
    fn invoke(&self, ctx: &ActCtx<'_>) -> Result<Value>;
}

/// The `do` verb: invokes a user-provided closure with `iops`, in `endo`
/// context by default.
pub struct Deed {
    nabe: Nabe,
    iops: Iops,
    deed: Rc<dyn Fn(&ActCtx<'_>, &Iops) -> Result<Value>>,
}

impl Deed {
    pub fn new(nabe: Nabe, iops: Iops, deed: Rc<dyn Fn(&ActCtx<'_>, &Iops) -> Result<Value>>) -> Self {
        Deed { nabe, iops, deed }
    }
}

impl fmt::Debug for Deed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deed").field("nabe", &self.nabe).field("iops", &self.iops).finish()
    }
}

impl Act for Deed {
    fn nabe(&self) -> Nabe {
        self.nabe
    }

    fn invoke(&self, ctx: &ActCtx<'_>) -> Result<Value> {
        (self.deed)(ctx, &self.iops)
    }
}

/// `end`: requests termination of the hosting boxer by setting its end bag
/// true. Always `endo` nabe.
#[derive(Debug)]
pub struct EndAct {
    boxer: String,
}

impl EndAct {
    pub fn new(mine: &Mine, boxer: impl Into<String>) -> Result<Self> {
        let boxer = boxer.into();
        mine.ensure(need::end_key(&boxer)?);
        Ok(EndAct { boxer })
    }
}

impl Act for EndAct {
    fn nabe(&self) -> Nabe {
        Nabe::Endo
    }

    fn invoke(&self, ctx: &ActCtx<'_>) -> Result<Value> {
        let key = need::end_key(&self.boxer)?;
        ctx.mine.set(key, Value::Bool(true), ctx.tyme);
        Ok(Value::Null)
    }
}

/// Shared construction-time validation for the `Mark` family: the boxer,
/// box, and marked key must all be present in `iops`/`mine`.
fn mark_iops(boxer: Option<String>, box_: Option<String>, key: Option<KeyPath>, mine: &Mine) -> Result<(String, String, KeyPath)> {
    let boxer = boxer.ok_or(Error::MissingIop { act: "Mark".into(), iop: "_boxer" })?;
    let box_ = box_.ok_or(Error::MissingIop { act: "Mark".into(), iop: "_box" })?;
    let key = key.ok_or(Error::MissingIop { act: "Mark".into(), iop: "_key" })?;
    if !mine.has(&key) {
        return Err(Error::MissingBag(key));
    }
    Ok((boxer, box_, key))
}

/// `UpdateMark`: stores the marked bag's `_tyme` under the update-mark key,
/// in `enmark` context by default.
#[derive(Debug)]
pub struct UpdateMark {
    boxer: String,
    box_: String,
    key: KeyPath,
}

impl UpdateMark {
    pub fn new(mine: &Mine, boxer: impl Into<String>, box_: impl Into<String>, key: KeyPath) -> Result<Self> {
        let (boxer, box_, key) = mark_iops(Some(boxer.into()), Some(box_.into()), Some(key), mine)?;
        mine.ensure(need::update_mark_key(&boxer, &box_, &key)?);
        Ok(UpdateMark { boxer, box_, key })
    }
}

impl Act for UpdateMark {
    fn nabe(&self) -> Nabe {
        Nabe::Enmark
    }

    fn invoke(&self, ctx: &ActCtx<'_>) -> Result<Value> {
        let bag = ctx.mine.get(&self.key)?;
        let mark_key = need::update_mark_key(&self.boxer, &self.box_, &self.key)?;
        ctx.mine.set(mark_key, Value::Float(bag.tyme().unwrap_or(0.0)), ctx.tyme);
        Ok(Value::Null)
    }
}

/// `ChangeMark`: stores the marked bag's content fingerprint under the
/// change-mark key, in `enmark` context by default.
#[derive(Debug)]
pub struct ChangeMark {
    boxer: String,
    box_: String,
    key: KeyPath,
}

impl ChangeMark {
    pub fn new(mine: &Mine, boxer: impl Into<String>, box_: impl Into<String>, key: KeyPath) -> Result<Self> {
        let (boxer, box_, key) = mark_iops(Some(boxer.into()), Some(box_.into()), Some(key), mine)?;
        mine.ensure(need::change_mark_key(&boxer, &box_, &key)?);
        Ok(ChangeMark { boxer, box_, key })
    }
}

impl Act for ChangeMark {
    fn nabe(&self) -> Nabe {
        Nabe::Enmark
    }

    fn invoke(&self, ctx: &ActCtx<'_>) -> Result<Value> {
        let bag = ctx.mine.get(&self.key)?;
        let (fingerprint,) = bag.astuple();
        let mark_key = need::change_mark_key(&self.boxer, &self.box_, &self.key)?;
        ctx.mine.set(mark_key, fingerprint, ctx.tyme);
        Ok(Value::Null)
    }
}

/// `Count`: the per-box redo counter, incremented each `redo` (recur)
/// context invocation.
#[derive(Debug)]
pub struct Count {
    boxer: String,
    box_: String,
}

impl Count {
    pub fn new(mine: &Mine, boxer: impl Into<String>, box_: impl Into<String>) -> Result<Self> {
        let boxer = boxer.into();
        let box_ = box_.into();
        mine.ensure(need::count_key(&boxer, &box_)?);
        Ok(Count { boxer, box_ })
    }
}

impl Act for Count {
    fn nabe(&self) -> Nabe {
        Nabe::Redo
    }

    fn invoke(&self, ctx: &ActCtx<'_>) -> Result<Value> {
        let key = need::count_key(&self.boxer, &self.box_)?;
        let next = match ctx.mine.get(&key)?.value {
            Value::Null => 0,
            Value::Int(i) => i + 1,
            _ => 0,
        };
        ctx.mine.set(key, Value::Int(next), ctx.tyme);
        Ok(Value::Int(next))
    }
}

/// `Discount`: resets the per-box redo counter to unset, in `exdo` context.
#[derive(Debug)]
pub struct Discount {
    boxer: String,
    box_: String,
}

impl Discount {
    pub fn new(mine: &Mine, boxer: impl Into<String>, box_: impl Into<String>) -> Result<Self> {
        let boxer = boxer.into();
        let box_ = box_.into();
        mine.ensure(need::count_key(&boxer, &box_)?);
        Ok(Discount { boxer, box_ })
    }
}

impl Act for Discount {
    fn nabe(&self) -> Nabe {
        Nabe::Exdo
    }

    fn invoke(&self, ctx: &ActCtx<'_>) -> Result<Value> {
        let key = need::count_key(&self.boxer, &self.box_)?;
        ctx.mine.set(key, Value::Null, ctx.tyme);
        Ok(Value::Null)
    }
}

/// A registered act-kind constructor: given `iops` and the owning
/// boxer/box names, builds a boxed act. Kept separate from `Deed`, which is
/// always constructed directly by the `do` builder verb rather than looked
/// up by name.
pub type Ctor = fn(&Mine, &str, &str, &Iops) -> Result<Box<dyn Act>>;

/// Process-wide registry of act-kind constructors, indexed by every alias
/// a kind is registered under: a module-scope map from name to constructor,
/// populated at program init via static registration.
static REGISTRY: Lazy<Mutex<HashMap<&'static str, Ctor>>> = Lazy::new(|| {
    let mut reg: HashMap<&'static str, Ctor> = HashMap::new();
    register(&mut reg, &["count", "Count"], |mine, boxer, box_, _iops| {
        Ok(Box::new(Count::new(mine, boxer, box_)?))
    });
    register(&mut reg, &["discount", "Discount"], |mine, boxer, box_, _iops| {
        Ok(Box::new(Discount::new(mine, boxer, box_)?))
    });
    register(&mut reg, &["end", "End"], |mine, boxer, _box_, _iops| Ok(Box::new(EndAct::new(mine, boxer)?)));
    register(&mut reg, &["updatemark", "UpdateMark"], |mine, boxer, box_, iops| {
        let key = key_iop(iops)?;
        Ok(Box::new(UpdateMark::new(mine, boxer, box_, key)?))
    });
    register(&mut reg, &["changemark", "ChangeMark"], |mine, boxer, box_, iops| {
        let key = key_iop(iops)?;
        Ok(Box::new(ChangeMark::new(mine, boxer, box_, key)?))
    });
    Mutex::new(reg)
});

fn key_iop(iops: &Iops) -> Result<KeyPath> {
    match iops.get("_key") {
        Some(Value::Str(s)) => KeyPath::try_from(s.as_str()),
        _ => Err(Error::MissingIop { act: "Mark".into(), iop: "_key" }),
    }
}

fn register(reg: &mut HashMap<&'static str, Ctor>, names: &[&'static str], ctor: Ctor) {
    for name in names {
        if reg.insert(name, ctor).is_some() {
            panic!("duplicate act-kind registration for {name:?}");
        }
    }
}

/// Looks up and constructs a registered act kind by name.
pub fn construct(kind: &str, mine: &Mine, boxer: &str, box_: &str, iops: &Iops) -> Result<Box<dyn Act>> {
    let registry = REGISTRY.lock();
    let ctor = registry.get(kind).copied().ok_or_else(|| Error::UnknownActKind(kind.to_string()))?;
    drop(registry);
    ctor(mine, boxer, box_, iops)
}
