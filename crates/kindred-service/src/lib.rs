//! # kindred-service
//!
//! The kindred operation surface: resolve, request_link, verify, analyze,
//! merge, unlink, and search over the identity graph, plus the
//! verification workflow and the link-request reaper.
//!
//! This crate is a library; it defines no CLI or wire protocol. A caller
//! (a chat agent's action layer, an admin tool) embeds [`IdentityService`]
//! and invokes operations over whatever transport it chooses. No operation
//! here performs platform I/O: fetching metadata and delivering prompts to
//! users is the caller's job, decoupled from the transactions in this
//! core.
//!
//! ## Example
//!
//! ```ignore
//! use kindred_db::Database;
//! use kindred_service::IdentityService;
//!
//! let db = Database::connect("postgres://...").await?;
//! let service = IdentityService::new(db);
//!
//! let ticket = service
//!     .request_link("telegram", "12345", "discord", "cryptoking")
//!     .await?;
//! // Relay ticket.instruction to the user; later, from discord:
//! let outcome = service
//!     .verify("discord", "u987", &ticket.request.code, Default::default())
//!     .await?;
//! println!("linked under identity {}", outcome.identity_id);
//! ```

pub mod reaper;
pub mod service;
pub mod verification;

// Re-export core types
pub use kindred_core::*;

pub use reaper::{run_pass as run_reaper_pass, ReaperStats};
pub use service::IdentityService;
pub use verification::{generate_code, VerificationWorkflow, VerifyConfig};
