//! # kindred-match
//!
//! Multi-signal matching and confidence engine for kindred.
//!
//! This crate provides:
//! - Username similarity scoring (normalized edit distance)
//! - Temporal activity correlation over hour-of-week histograms
//! - Social graph overlap via shared logical communities
//! - Confidence fusion with corroboration bonuses
//! - The engine that discovers candidates, persists confidence factors,
//!   and proposes pending auto links
//!
//! ## Example
//!
//! ```ignore
//! use kindred_match::{MatchConfig, MatchEngine};
//! use kindred_db::Database;
//!
//! let db = Database::connect("postgres://...").await?;
//! let engine = MatchEngine::with_config(db, MatchConfig::new().candidate_limit(10));
//!
//! let report = engine.analyze("telegram", "12345").await?;
//! println!("{} candidates, {} auto-linked", report.candidates.len(), report.auto_linked);
//! ```

pub mod config;
pub mod engine;
pub mod fusion;
pub mod social;
pub mod temporal;
pub mod username;

// Re-export core types
pub use kindred_core::*;

pub use config::MatchConfig;
pub use engine::MatchEngine;
pub use fusion::{corroboration_bonus, fuse};
pub use social::overlap_score;
pub use temporal::{correlation_score, pearson_correlation, total_observations};
pub use username::{levenshtein, normalize, similarity};
