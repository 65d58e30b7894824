//! lowc preprocessor: evaluates directive lines and emits the source
//! chunks that survive conditional compilation.

mod condition;
pub mod preprocessor;

pub use preprocessor::{IncludeResolver, IncludedSource, Preprocessor, MAX_INCLUDE_DEPTH};
