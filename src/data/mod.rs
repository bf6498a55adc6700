//! Data-driven expansion
//!
//! Argument sets, data providers, matrices and class-based sources, and the
//! expander that turns them into concrete test cases.

mod expand;
mod matrix;
mod shared;
mod source;

pub use expand::{repeat_cases, Expander};
pub use matrix::{cartesian, MatrixParameter, MatrixSpec};
pub use shared::{ClassSource, ScopeKey, SharedInstance, SharedRegistry, SharedType};
pub use source::{DataSource, ParameterSource, RowsProvider, TestTemplate, ValuesProvider};
