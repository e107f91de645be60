//! Core types for ringkv
//!
//! This crate defines the foundational types used throughout the system:
//! - Value: tagged JSON value with a canonical byte encoding
//! - NodeId: identifier for a physical cluster node
//! - Error: error type hierarchy shared by every layer

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod types;
pub mod value;

pub use error::{Error, Result};
pub use types::NodeId;
pub use value::Value;
