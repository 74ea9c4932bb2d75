//! Domain layer for fleetkeeper
//!
//! This module contains the fleet and job models, the domain error type,
//! and the ports the services depend on.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{DomainError, DomainResult};
