//! xjs core crate.
//!
//! Layers, bottom-up:
//!
//! - `reader`: tokenizer with source offsets, plus the lenient identifier
//!   scan used to guess dependencies of expressions that fail to evaluate.
//! - `compiler`: Pratt parser producing [`Expr`] trees.
//! - `vm` + `builtins`: tree evaluator over a [`vm::Scope`], with the native
//!   methods and globals expressions may call.
//! - `runtime`: the data-facing contract. [`evaluate`] returns a value together
//!   with every data key it read; [`run`] executes statements for effect.
//! - `engine`: instance-scoped parse cache over `runtime`.
//!
//! Host environments plug in through [`DataContext`] (where free identifiers
//! come from) and [`HostObject`] (elements, events and other live objects that
//! expressions can read, write and call).

pub mod builtins;
pub mod compiler;
pub mod engine;
pub mod reader;
pub mod runtime;
pub mod value;
pub mod vm;

pub use compiler::{Expr, compile};
pub use engine::Engine;
pub use reader::identifiers;
pub use runtime::{
    Bindings, DataContext, Dependencies, EvalError, EvalResult, Evaluation, Tracked, evaluate,
    read_data_literal, run,
};
pub use value::{HostObject, NativeFn, Val};
