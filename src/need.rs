//! The guard language evaluated by transition (`Goact`) and precondition
//! (`preacts`) checks.
//!
//! Guards are a small AST rather than strings compiled and executed at
//! runtime — `Need` is `And`/`Or`/`Not`/`Cmp`/`KeyTruthy`/the four special
//! predicates — matched against an environment holding the mine, the
//! current box/boxer names, and the tymist's current tyme. This keeps
//! guard behavior fully inspectable and testable without any string-exec
//! coupling.

use crate::mine::{KeyPath, Mine, Value};

/// Evaluation environment for a [`Need`]. `boxer`/`box_` identify the
/// context the guard runs in, needed to resolve the special predicates'
/// implicit mark keys.
pub struct Env<'a> {
    pub mine: &'a Mine,
    pub boxer: &'a str,
    pub box_: &'a str,
    pub tyme: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// A boolean guard expression over the mine. The empty/default need always
/// evaluates to `true`.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Need {
    #[default]
    True,
    And(Box<Need>, Box<Need>),
    Or(Box<Need>, Box<Need>),
    Not(Box<Need>),
    Cmp(KeyPath, CmpOp, Value),
    /// The bare-key form: `M[key]` used directly as a boolean.
    KeyTruthy(KeyPath),
    /// `updated(key)` — bag's `_tyme` differs from the stored update mark.
    Updated(KeyPath),
    /// `changed(key)` — bag's `_astuple()` differs from the stored change mark.
    Changed(KeyPath),
    /// `count(n)` — the box's redo counter equals `n`.
    Count(u64),
    /// `elapsed(t)` — at least `t` tyme has elapsed since the box's pile
    /// redo counter was reset (evaluated against the ambient `Env::tyme`
    /// and the box's update mark, mirroring `updated`'s bookkeeping).
    Elapsed(f64),
}

impl Need {
    pub fn and(self, other: Need) -> Need {
        match self {
            Need::True => other,
            _ if other == Need::True => self,
            _ => Need::And(Box::new(self), Box::new(other)),
        }
    }

    pub fn or(self, other: Need) -> Need {
        Need::Or(Box::new(self), Box::new(other))
    }

    pub fn not(self) -> Need {
        Need::Not(Box::new(self))
    }

    /// Evaluates the guard. Undefined key references fail closed — `false`
    /// — rather than raising, *unless* the need is the literal `True`.
    /// Callers that want the raw `GuardError` for logging can use
    /// [`Need::try_eval`] instead.
    pub fn eval(&self, env: &Env<'_>) -> bool {
        match self.try_eval(env) {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!(error = %e, "guard evaluation failed, treating as false");
                false
            }
        }
    }

    /// Like [`Need::eval`] but surfaces the error instead of logging and
    /// swallowing it. Used by the boxer, which is the one call site
    /// responsible for the "logged event, not a killed boxer" contract.
    pub fn try_eval(&self, env: &Env<'_>) -> crate::error::Result<bool> {
        use crate::error::Error;
        match self {
            Need::True => Ok(true),
            Need::And(a, b) => Ok(a.try_eval(env)? && b.try_eval(env)?),
            Need::Or(a, b) => Ok(a.try_eval(env)? || b.try_eval(env)?),
            Need::Not(a) => Ok(!a.try_eval(env)?),
            Need::KeyTruthy(key) => {
                let bag = env.mine.get(key).map_err(|_| Error::GuardError(format!("unknown key {key}")))?;
                Ok(bag.value.truthy())
            }
            Need::Cmp(key, op, rhs) => {
                let bag = env.mine.get(key).map_err(|_| Error::GuardError(format!("unknown key {key}")))?;
                Ok(compare(&bag.value, op, rhs))
            }
            Need::Updated(key) => {
                let bag = env.mine.get(key).map_err(|_| Error::GuardError(format!("unknown key {key}")))?;
                let mark_key = update_mark_key(env.boxer, env.box_, key)?;
                let stored = env.mine.get(&mark_key).ok();
                let mark_tyme = match stored.map(|b| b.value) {
                    Some(Value::Float(t)) => Some(t),
                    _ => None,
                };
                Ok(bag.tyme() != mark_tyme)
            }
            Need::Changed(key) => {
                let bag = env.mine.get(key).map_err(|_| Error::GuardError(format!("unknown key {key}")))?;
                let mark_key = change_mark_key(env.boxer, env.box_, key)?;
                let stored = env.mine.get(&mark_key).ok();
                let mark_tuple = stored.map(|b| b.value);
                let (current,) = bag.astuple();
                Ok(mark_tuple.as_ref() != Some(&current))
            }
            Need::Count(n) => {
                let count_key = count_key(env.boxer, env.box_)?;
                let count = match env.mine.get(&count_key).ok().map(|b| b.value) {
                    Some(Value::Int(i)) => i as u64,
                    _ => 0,
                };
                Ok(count == *n)
            }
            Need::Elapsed(t) => {
                let mark_key = enter_mark_key(env.boxer, env.box_)?;
                let mark_tyme = match env.mine.get(&mark_key).ok().map(|b| b.value) {
                    Some(Value::Float(t)) => t,
                    _ => 0.0,
                };
                Ok(env.tyme - mark_tyme >= *t)
            }
        }
    }
}

fn compare(lhs: &Value, op: &CmpOp, rhs: &Value) -> bool {
    let ord = match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => (*a as f64).partial_cmp(&(*b as f64)),
        (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
        (Value::Int(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
        (Value::Float(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    };
    match op {
        CmpOp::Eq => lhs == rhs,
        CmpOp::Ne => lhs != rhs,
        CmpOp::Lt => matches!(ord, Some(std::cmp::Ordering::Less)),
        CmpOp::Le => matches!(ord, Some(std::cmp::Ordering::Less | std::cmp::Ordering::Equal)),
        CmpOp::Gt => matches!(ord, Some(std::cmp::Ordering::Greater)),
        CmpOp::Ge => matches!(ord, Some(std::cmp::Ordering::Greater | std::cmp::Ordering::Equal)),
    }
}

/// `("", "boxer", B, "box", X, "update", K)`
pub fn update_mark_key(boxer: &str, box_: &str, key: &KeyPath) -> crate::error::Result<KeyPath> {
    KeyPath::new(
        ["".to_string(), "boxer".to_string(), boxer.to_string(), "box".to_string(), box_.to_string(), "update".to_string(), key.to_string()],
    )
}

/// `("", "boxer", B, "box", X, "change", K)`
pub fn change_mark_key(boxer: &str, box_: &str, key: &KeyPath) -> crate::error::Result<KeyPath> {
    KeyPath::new(
        ["".to_string(), "boxer".to_string(), boxer.to_string(), "box".to_string(), box_.to_string(), "change".to_string(), key.to_string()],
    )
}

/// `("", "boxer", B, "box", X, "count")`
pub fn count_key(boxer: &str, box_: &str) -> crate::error::Result<KeyPath> {
    KeyPath::new(["".to_string(), "boxer".to_string(), boxer.to_string(), "box".to_string(), box_.to_string(), "count".to_string()])
}

/// `("", "boxer", B, "end")`
pub fn end_key(boxer: &str) -> crate::error::Result<KeyPath> {
    KeyPath::new(["".to_string(), "boxer".to_string(), boxer.to_string(), "end".to_string()])
}

/// `("", "boxer", B, "box", X, "enter")` — tyme of this box's last
/// enter/re-enter, written by the boxer itself (`boxer.rs`) and read by
/// `Need::Elapsed`, following the same `("", "boxer", B, "box", X, <facet>)`
/// shape as the other mark keys.
pub fn enter_mark_key(boxer: &str, box_: &str) -> crate::error::Result<KeyPath> {
    KeyPath::new(["".to_string(), "boxer".to_string(), boxer.to_string(), "box".to_string(), box_.to_string(), "enter".to_string()])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mine::Mine;

    fn env<'a>(mine: &'a Mine, tyme: f64) -> Env<'a> {
        Env { mine, boxer: "B", box_: "X", tyme }
    }

    #[test]
    fn empty_need_is_true() {
        let mine = Mine::new();
        assert!(Need::True.eval(&env(&mine, 0.0)));
    }

    #[test]
    fn undefined_reference_fails_closed() {
        let mine = Mine::new();
        let key = KeyPath::try_from(["missing"]).unwrap();
        assert!(!Need::KeyTruthy(key).eval(&env(&mine, 0.0)));
    }

    /// S6 — update mark idempotence.
    #[test]
    fn update_mark_idempotence_s6() {
        let mine = Mine::new();
        let key = KeyPath::try_from(["K"]).unwrap();
        mine.ensure(key.clone());
        let mark_key = update_mark_key("B", "X", &key).unwrap();
        mine.ensure(mark_key.clone());

        let bag = mine.get(&key).unwrap();
        mine.set(mark_key.clone(), Value::Float(bag.tyme().unwrap_or(0.0)), 0.0);
        assert!(!Need::Updated(key.clone()).eval(&env(&mine, 0.5)));

        mine.set(key.clone(), Value::Int(1), 0.5);
        assert!(Need::Updated(key.clone()).eval(&env(&mine, 0.5)));

        let bag = mine.get(&key).unwrap();
        mine.set(mark_key, Value::Float(bag.tyme().unwrap()), 0.5);
        assert!(!Need::Updated(key).eval(&env(&mine, 0.5)));
    }

    #[test]
    fn and_short_circuits_like_builder_on() {
        let need = Need::True.and(Need::Cmp(KeyPath::try_from(["k"]).unwrap(), CmpOp::Eq, Value::Int(1)));
        let mine = Mine::new();
        mine.set(KeyPath::try_from(["k"]).unwrap(), Value::Int(1), 0.0);
        assert!(need.eval(&env(&mine, 0.0)));
    }
}
