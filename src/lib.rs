//! A hierarchical action runtime: a virtual-time scheduler (`tyme`)
//! driving cooperative `doer`s and hierarchical `boxer` state machines over
//! a shared keyed bag store (`mine`).

pub mod act;
pub mod boxer;
pub mod boxes;
pub mod builder;
pub mod doer;
pub mod error;
pub mod mine;
pub mod need;
pub mod tyme;

pub mod testing;

pub use crate::{
    act::{Act, ActCtx, Nabe},
    boxer::{Boxer, Goact},
    boxes::Box as BoxNode,
    builder::{BoxworkBuilder, Cond, Over},
    doer::{Deed, Desire, Doer, DoerState, Doist},
    error::{Error, Result},
    mine::{Bag, KeyPath, Mine, Value},
    need::{CmpOp, Env, Need},
    tyme::{Tymee, Tymer, Tymist, Tymth},
};
