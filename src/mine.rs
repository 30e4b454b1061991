//! The shared, hierarchical keyed bag store.
//!
//! `Mine` plays the same role for this runtime that `Rc<RefCell<Cache<_>>>`
//! plays for moxie's `Runtime`: a single piece of shared, interior-mutable
//! storage threaded through every tick. Unlike moxie's cache, lookups here
//! are addressed by explicit hierarchical key paths rather than call-site
//! identity, and every write stamps a tyme rather than a revision.

use crate::error::{Error, Result};
use std::{
    cell::RefCell,
    collections::HashMap,
    fmt::{self, Display, Formatter},
    rc::Rc,
};

/// An ordered sequence of name segments addressing a `Bag` in a `Mine`.
///
/// Segments must match `^[A-Za-z_][A-Za-z0-9_]*$`, except that a single
/// leading empty segment is permitted (used throughout the boxer's mark
/// keys, e.g. `("", "boxer", B, "end")`).
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub struct KeyPath(Vec<String>);

impl KeyPath {
    pub fn new(segments: impl IntoIterator<Item = impl Into<String>>) -> Result<Self> {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        for (i, seg) in segments.iter().enumerate() {
            if seg.is_empty() && i == 0 {
                continue;
            }
            if !is_valid_segment(seg) {
                return Err(Error::InvalidKey(KeyPath(segments.clone())));
            }
        }
        Ok(KeyPath(segments))
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Appends a segment, returning a new `KeyPath`.
    pub fn join(&self, segment: impl Into<String>) -> Result<Self> {
        let mut segments = self.0.clone();
        segments.push(segment.into());
        KeyPath::new(segments)
    }
}

fn is_valid_segment(seg: &str) -> bool {
    let mut chars = seg.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl Display for KeyPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("."))
    }
}

impl TryFrom<&str> for KeyPath {
    type Error = Error;

    fn try_from(dotted: &str) -> Result<Self> {
        KeyPath::new(dotted.split('.'))
    }
}

impl<const N: usize> TryFrom<[&str; N]> for KeyPath {
    type Error = Error;

    fn try_from(segments: [&str; N]) -> Result<Self> {
        KeyPath::new(segments)
    }
}

/// A record held at a `Mine` key: a payload plus the tyme of its last write.
///
/// `_tyme` and `_astuple` are the bag's hidden bookkeeping; only `value` is
/// part of the content fingerprint returned by [`Bag::astuple`].
#[derive(Clone, Debug, Default)]
pub struct Bag {
    pub value: Value,
    tyme: Option<f64>,
}

impl Bag {
    pub fn new(value: Value) -> Self {
        Bag { value, tyme: None }
    }

    /// Virtual tyme of this bag's last mutation via the mine interface, or
    /// `None` if it has never been written through one.
    pub fn tyme(&self) -> Option<f64> {
        self.tyme
    }

    /// Content fingerprint of the bag's non-hidden fields, stable-ordered.
    pub fn astuple(&self) -> (Value,) {
        (self.value.clone(),)
    }
}

/// A dynamically-typed payload for a `Bag`. Guard comparisons only need a
/// small closed set of literal shapes, so `Value` stays a plain enum rather
/// than reaching for `Box<dyn Any>`.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}
impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}
impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}
impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}
impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_owned())
    }
}

impl Value {
    /// Truthiness used by guard evaluation for the bare-key form of a need.
    pub fn truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
        }
    }
}

/// Hierarchical key path -> `Bag` store, shared by every box and act in a
/// boxwork. Single-threaded and interior-mutable, like moxie's own
/// `Rc<RefCell<Cache<_>>>` store — there is no locking because the whole
/// runtime is cooperative and non-reentrant.
#[derive(Clone, Debug, Default)]
pub struct Mine {
    inner: Rc<RefCell<HashMap<KeyPath, Bag>>>,
}

impl Mine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has(&self, key: &KeyPath) -> bool {
        self.inner.borrow().contains_key(key)
    }

    /// Idempotent on value identity: inserting at an already-present key
    /// with no observable change still counts as a normal insert, but
    /// callers that only want to ensure a bag exists should check `has`
    /// first (as every `Mark`/`Count` act does).
    pub fn ensure(&self, key: KeyPath) {
        self.inner.borrow_mut().entry(key).or_insert_with(Bag::default);
    }

    pub fn get(&self, key: &KeyPath) -> Result<Bag> {
        self.inner.borrow().get(key).cloned().ok_or_else(|| Error::MissingKey(key.clone()))
    }

    /// Writes `value` at `key`, stamping `_tyme` with `at` *before* the
    /// write becomes observable to any other reader.
    pub fn set(&self, key: KeyPath, value: Value, at: f64) {
        let mut inner = self.inner.borrow_mut();
        let bag = inner.entry(key).or_insert_with(Bag::default);
        bag.value = value;
        bag.tyme = Some(at);
    }

    pub fn delete(&self, key: &KeyPath) -> Result<Bag> {
        self.inner.borrow_mut().remove(key).ok_or_else(|| Error::MissingKey(key.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_stamps_tyme() {
        let mine = Mine::new();
        let key = KeyPath::try_from(["a", "b"]).unwrap();
        mine.set(key.clone(), Value::Int(1), 0.5);
        let bag = mine.get(&key).unwrap();
        assert_eq!(bag.tyme(), Some(0.5));
        assert_eq!(bag.value, Value::Int(1));
    }

    #[test]
    fn astuple_excludes_tyme() {
        let mine = Mine::new();
        let key = KeyPath::try_from(["k"]).unwrap();
        mine.set(key.clone(), Value::Int(7), 1.0);
        let first = mine.get(&key).unwrap().astuple();
        mine.set(key.clone(), Value::Int(7), 2.0);
        let second = mine.get(&key).unwrap().astuple();
        assert_eq!(first, second);
    }

    #[test]
    fn missing_key_fails() {
        let mine = Mine::new();
        let key = KeyPath::try_from(["nope"]).unwrap();
        assert!(matches!(mine.get(&key), Err(Error::MissingKey(_))));
    }

    #[test]
    fn invalid_key_segment_rejected() {
        assert!(KeyPath::try_from(["1bad"]).is_err());
        assert!(KeyPath::try_from(["", "boxer", "B", "end"]).is_ok());
    }

    #[test]
    fn dotted_and_sequence_forms_match() {
        let a = KeyPath::try_from("boxer.B.end").unwrap();
        let b = KeyPath::try_from(["boxer", "B", "end"]).unwrap();
        assert_eq!(a, b);
    }
}
