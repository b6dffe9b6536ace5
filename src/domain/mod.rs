//! Domain layer for sealed-review
//!
//! This module contains the review models, the error taxonomy, and the port
//! traits that storage, oracle and ciphertext adapters implement.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{DomainError, DomainResult, ErrorKind};
