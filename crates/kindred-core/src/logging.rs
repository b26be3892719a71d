//! Structured logging schema and field name constants for kindred.
//!
//! All crates use these constants for consistent structured logging fields,
//! so log aggregation tools can query by standardized names across every
//! subsystem.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded service, requires operator attention |
//! | WARN  | Recoverable issue, automatic fallback applied |
//! | INFO  | Identity-affecting operations (verify, merge, unlink) |
//! | DEBUG | Decision points, signal scores, config choices |
//! | TRACE | Per-candidate iteration during matching |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Subsystem originating the log event.
/// Values: "db", "match", "service"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "pool", "engine", "verification", "reaper"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "resolve", "analyze", "verify_code", "merge"
pub const OPERATION: &str = "op";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Identity UUID being operated on.
pub const IDENTITY_ID: &str = "identity_id";

/// Platform profile UUID being operated on.
pub const PROFILE_ID: &str = "profile_id";

/// Platform name ("telegram", "discord", ...).
pub const PLATFORM: &str = "platform";

/// Identity link UUID.
pub const LINK_ID: &str = "link_id";

/// Link request UUID.
pub const REQUEST_ID: &str = "request_id";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Number of candidates produced by a matching run.
pub const CANDIDATE_COUNT: &str = "candidate_count";

/// Number of pending auto links persisted by a matching run.
pub const AUTO_LINKED: &str = "auto_linked";

/// Fused or per-signal confidence value.
pub const CONFIDENCE: &str = "confidence";

/// Number of rows affected by a bulk operation.
pub const ROW_COUNT: &str = "row_count";

// ─── Database fields ───────────────────────────────────────────────────────

/// Number of active connections in the pool.
pub const POOL_SIZE: &str = "pool_size";

/// Number of idle connections in the pool.
pub const POOL_IDLE: &str = "pool_idle";

// ─── Outcome fields ────────────────────────────────────────────────────────

/// Boolean success/failure indicator.
pub const SUCCESS: &str = "success";

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";
