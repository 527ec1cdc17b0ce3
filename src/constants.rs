//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! Centralized configuration constants for Gatehouse.
//!
//! All default policies and intervals live here so the config layer and the
//! tests agree on the same numbers.

// ============================================================================
// Per-action policies
// ============================================================================

/// Newsletter subscriptions allowed per window.
pub const NEWSLETTER_LIMIT: u64 = 5;

/// Newsletter window (1 hour).
pub const NEWSLETTER_WINDOW_MS: u64 = 60 * 60 * 1000;

/// Contact form submissions allowed per window.
pub const CONTACT_LIMIT: u64 = 3;

/// Contact form window (1 hour).
pub const CONTACT_WINDOW_MS: u64 = 60 * 60 * 1000;

/// Admin login attempts allowed per window.
pub const ADMIN_LOGIN_LIMIT: u64 = 5;

/// Admin login window (15 minutes).
pub const ADMIN_LOGIN_WINDOW_MS: u64 = 15 * 60 * 1000;

/// Generic API calls allowed per window.
pub const GENERIC_API_LIMIT: u64 = 100;

/// Generic API window (15 minutes).
pub const GENERIC_API_WINDOW_MS: u64 = 15 * 60 * 1000;

// ============================================================================
// Escalation
// ============================================================================

/// Violations a client may accumulate before it is blocked.
pub const DEFAULT_ESCALATION_THRESHOLD: u32 = 10;

/// Default block duration (1 hour).
pub const DEFAULT_BLOCK_DURATION_MS: u64 = 60 * 60 * 1000;

/// Violation tallies older than this are forgotten (1 hour).
pub const DEFAULT_VIOLATION_TTL_MS: u64 = 60 * 60 * 1000;

// ============================================================================
// Tokens
// ============================================================================

/// Default token lifetime (1 hour).
pub const DEFAULT_TOKEN_LIFETIME_MS: u64 = 60 * 60 * 1000;

/// Random bytes per token (256 bits).
pub const TOKEN_ENTROPY_BYTES: usize = 32;

/// Longest token string accepted for lookup.
///
/// 32 bytes in unpadded base64 is 43 characters; anything longer cannot have
/// been issued by this store.
pub const MAX_TOKEN_LENGTH: usize = 64;

// ============================================================================
// Sweeping
// ============================================================================

/// Default sweep interval (5 minutes).
pub const DEFAULT_SWEEP_INTERVAL_MS: u64 = 5 * 60 * 1000;

// ============================================================================
// Threat monitor
// ============================================================================

/// Pattern hits per (client, kind) that trigger a block.
pub const DEFAULT_THREAT_BLOCK_THRESHOLD: u32 = 6;

/// Threat tallies older than this are forgotten (24 hours).
pub const DEFAULT_THREAT_TTL_MS: u64 = 24 * 60 * 60 * 1000;

// ============================================================================
// Input validation
// ============================================================================

/// Longest client identifier accepted.
pub const MAX_CLIENT_ID_LENGTH: usize = 256;
