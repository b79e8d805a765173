//! Core infrastructure for archsight.
//!
//! This crate provides the data structures the analysis pipeline runs on:
//! - Element arena and input declarations from the bytecode reader
//! - Typed property values
//! - Trace registry recording how every element was reached
//! - Entity registry enforcing element-to-entity bindings
//! - System model snapshot and its serialized shape
//! - Error types and error codes
//! - Analysis configuration

pub mod config;
pub mod element;
pub mod entity;
pub mod error;
pub mod model;
pub mod trace;
pub mod value;
