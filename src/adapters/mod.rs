//! Adapters implementing the domain ports.

pub mod memory;
pub mod oracle;
pub mod sqlite;
