//! # droidscope-core - Dump Parsing and Query Engine
//!
//! Foundation crate for droidscope. Parses ViewServer dump lines, rebuilds the view
//! hierarchy, and compiles UiAutomator-compatible selectors into node predicates.
//!
//! This crate has **zero internal dependencies** and does no I/O apart from
//! logging setup.
//!
//! ## Public API
//!
//! ### Dump Parsing (`view_node`)
//! - [`ViewNode`] - One UI element with raw, grouped, and derived properties
//! - [`DerivedProps`] - Typed view over well-known properties (`id`, bounds, flags, color)
//! - [`NodeId`] - Arena index of a node inside a [`ViewTree`]
//!
//! ### View Hierarchy (`view_tree`)
//! - [`ViewTree`] - Tree rebuilt from an indented pre-order dump
//!
//! ### Selectors (`selector`)
//! - [`Selector`] - Bitmask query with a `child`/`sibling` chain
//! - [`CompiledSelector`] - Reusable node predicate
//! - [`FieldValue`], [`FieldKind`], [`Relation`]
//!
//! ### Error Handling (`error`)
//! - [`Error`] - Error enum with `fatal` vs `recoverable` classification
//! - [`Result`] - Type alias for `std::result::Result<T, Error>`
//! - [`ResultExt`] - Extension trait for adding error context
//!
//! ## Prelude
//!
//! Import commonly used types with:
//! ```rust
//! use droidscope_core::prelude::*;
//! ```

pub mod error;
pub mod logging;
pub mod selector;
pub mod view_node;
pub mod view_tree;

/// Prelude for common imports used throughout all droidscope crates
pub mod prelude {
    pub use super::error::{Error, Result, ResultExt};
    pub use tracing::{debug, error, info, instrument, trace, warn};
}

// Re-export commonly used types at crate root for convenience
pub use error::{Error, Result, ResultExt};
pub use selector::{CompiledSelector, FieldKind, FieldValue, Relation, Selector, FIELDS};
pub use view_node::{
    DerivedProps, NodeId, ViewNode, DEFAULT_GROUP, DEFAULT_VISIBILITY, ROOT_CLASS_NAME,
    TRANSPARENT_COLOR,
};
pub use view_tree::ViewTree;
