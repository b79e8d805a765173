//! Archsight: architecture models from compiled class files.
//!
//! Pipelines written with the [`dsl`] builders walk an element universe of
//! classes, methods, fields, parameters and generic signatures, register
//! business entities on the elements they reach, and relate those entities
//! through traversal traces or through the call graph. The result is a
//! [`SystemModel`](model::SystemModel) that serializes to JSON and diffs
//! against earlier runs.

// Element model, traces and entities - re-exported from archsight-core
pub use archsight_core::config;
pub use archsight_core::element;
pub use archsight_core::entity;
pub use archsight_core::error;
pub use archsight_core::model;
pub use archsight_core::trace;
pub use archsight_core::value;

// Pipeline language and interpreter
pub mod action;
pub mod context;
pub mod dsl;
pub mod measure;
pub mod resolver;
pub mod signature;
