//! lowc resolver: binds named types, lays out structs, folds constants,
//! derives function flags and assigns the emission order.
//!
//! Entry point: [`resolve`].

mod eval;
mod flags;
mod layout;
mod order;
mod resolver;
pub mod ty;

pub use eval::{fit_to_width, wrap_to_width};
pub use resolver::{resolve, Resolver};
pub use ty::{FieldTy, Ty, Types, POINTER_SIZE};
