//! Shared configuration and observability for Prism

pub mod config;
pub mod observability;

pub use config::*;
pub use observability::*;
