//! Data model, extraction, scanning and embedding for the code
//! intelligence service. This crate has no knowledge of storage or
//! orchestration — it is pure transformation: bytes in, entities/
//! relations/vectors out.

pub mod config;
pub mod embedding;
pub mod errors;
pub mod extract;
pub mod model;
pub mod scan;

pub use errors::{CoreError, ErrorKind, Result};
