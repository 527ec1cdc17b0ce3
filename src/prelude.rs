//! Prelude module - Commonly used types for quick imports
//!
//! This module re-exports the most commonly used types from Gatehouse,
//! allowing users to import them with a single `use gatehouse::prelude::*;`
//! statement instead of importing each type individually.

// Core types - always available
pub use crate::config::{Action, ActionPolicy, EscalationThreshold, GatehouseConfig};
pub use crate::controller::{AdmissionController, RateLimitInfo, SecurityReport, SweepReport};
pub use crate::error::{Admission, GatehouseError};

// Supporting types
pub use crate::block_list::{BlockEntry, BlockReason};
pub use crate::clock::{Clock, ManualClock, SystemClock};
pub use crate::sweeper::{Sweeper, SweeperHandle};
pub use crate::token_store::Token;

// Feature-gated exports
#[cfg(feature = "threat-monitor")]
pub use crate::threat_monitor::{ThreatKind, ThreatVerdict};

#[cfg(feature = "monitoring")]
pub use crate::telemetry::Metrics;
