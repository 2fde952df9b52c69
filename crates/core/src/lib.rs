//! Core types for the Magpie collection substrate
//!
//! This crate defines the vocabulary shared by every layer:
//! - [`ObjectName`]: hierarchical path addressing a store object
//! - [`AgeSelector`]: which versions of an attribute a read returns
//! - [`Value`]: the canonical attribute value model
//! - [`Error`]: the unified error taxonomy
//!
//! Nothing in here touches storage or scheduling; higher crates depend
//! on this one and never on each other's internals.

#![warn(missing_docs)]

pub mod error;
pub mod name;
pub mod types;
pub mod value;

pub use error::{Error, Result};
pub use name::ObjectName;
pub use types::{AgeSelector, AgentId, RequestId, SessionId, Timestamp};
pub use value::Value;
