//! CLI command implementations

pub mod ask;
pub mod chat;
pub mod spaces;
pub mod stress;
