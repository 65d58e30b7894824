//! lowc code generator: lowers a resolved declaration table to module text.
//!
//! # Architecture
//!
//! Emission runs in two passes over separate data:
//!
//! 1. [`emit`] walks the declarations in source order and builds a
//!    [`Module`] tree of fields and [`Instruction`]s, reporting semantic
//!    errors (types, operands, slots, calls) as diagnostics.
//! 2. [`render`] prints that tree as WebAssembly text with two-space
//!    indentation and `$`-prefixed names.
//!
//! ## Module layout
//!
//! - function imports
//! - `memory`, exported as `memory` by default
//! - one `funcref` table holding every `table` declaration back to back
//! - globals, type definitions, data segments and functions in order
//! - exports of `export` functions
//!
//! ## Values
//!
//! Sub-word integers live in `i32` slots and are normalised after
//! arithmetic; pointers are `i32` addresses. Structs and arrays only exist
//! in memory and are reached through pointers.

mod builder;
mod emitter;
pub mod error;
mod expr;
pub mod module;
pub mod render;
mod stmt;

pub use emitter::{emit, EmitOptions, Emitted};
pub use error::{CodegenError, CodegenResult};
pub use module::{
    Conversion, Field, Func, FuncType, Instruction, MemArg, Memory, Module, NumOp, ValType, Value,
};
pub use render::{escape_bytes, render, render_instructions, INDENT};
