//! # kindred-core
//!
//! Core types, traits, and abstractions for the kindred identity graph —
//! the system that resolves "who is the same human" across independent
//! chat platforms.
//!
//! This crate provides:
//! - Domain models (identities, platform profiles, links, confidence
//!   factors, link requests, audit entries)
//! - The error taxonomy shared by every kindred crate
//! - Repository traits defining the graph store contract
//! - Default constants for signal thresholds and fusion bonuses
//! - Structured logging field names
//! - UUIDv7 utilities for time-ordered identifiers

pub mod defaults;
pub mod error;
pub mod logging;
pub mod models;
pub mod traits;
pub mod uuid_utils;

pub use error::{Error, Result};
pub use models::*;
pub use traits::{
    AuditRepository, FactorRepository, IdentityRepository, IdentitySeed, LinkRepository,
    ProfileRepository, RecordLink,
};
pub use uuid_utils::new_v7;
