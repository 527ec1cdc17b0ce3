//! Copyright (c) 2026, Kirky.X
//!
//! MIT License
//!
//! Gatehouse - Request admission control for web handlers
//!
//! Provides per-client fixed-window rate limiting, an escalating block list,
//! one-shot anti-forgery tokens and suspicious request detection.
//!
//! # API Layers
//!
//! ## Prelude (Quick Start)
//!
//! Use `use gatehouse::prelude::*;` to import all commonly used types.
//!
//! ## Core API
//!
//! - [`AdmissionController`] - Composes windows, block list, tokens and threat detection
//! - [`GatehouseConfig`] - Per-action policies and housekeeping settings
//! - [`Admission`] - Decision returned for every admission check
//! - [`GatehouseError`] - Error types
//!
//! ## Extensions (feature-gated)
//!
//! - Suspicious request detection (requires `threat-monitor` feature, on by default)
//! - Prometheus metrics (requires `monitoring` feature)
//!
//! # Examples
//!
//! ```rust
//! use gatehouse::prelude::*;
//!
//! let controller = AdmissionController::new(GatehouseConfig::default()).unwrap();
//!
//! let decision = controller.check("203.0.113.7", Action::NewsletterSubscribe).unwrap();
//! assert!(decision.allowed);
//! assert_eq!(decision.remaining, 4);
//!
//! let token = controller.issue_token().unwrap();
//! assert!(controller.consume_token(token.as_str()));
//! assert!(!controller.consume_token(token.as_str()));
//! ```
//!
//! # Background sweeping
//!
//! Expired state is only reclaimed by [`AdmissionController::sweep`]. Inside a tokio
//! runtime, [`Sweeper::spawn_configured`] runs it periodically until the returned
//! handle is shut down or dropped.

pub mod prelude;

pub mod block_list;
pub mod clock;
pub mod config;
pub mod constants;
pub mod controller;
pub mod error;
pub mod log_redaction;
pub mod sweeper;
#[cfg(feature = "monitoring")]
pub mod telemetry;
#[cfg(feature = "threat-monitor")]
pub mod threat_monitor;
pub mod token_store;
pub mod window;

// 重新导出常用类型
pub use block_list::{BlockEntry, BlockList, BlockReason};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Action, ActionPolicy, EscalationThreshold, GatehouseConfig, ThreatConfig};
pub use controller::{AdmissionController, RateLimitInfo, SecurityReport, SweepReport};
pub use error::{Admission, GatehouseError};
pub use sweeper::{Sweeper, SweeperHandle};
#[cfg(feature = "monitoring")]
pub use telemetry::Metrics;
#[cfg(feature = "threat-monitor")]
pub use threat_monitor::{ThreatKind, ThreatMonitor, ThreatVerdict};
pub use token_store::{Token, TokenInfo, TokenStore};
pub use window::{ClientKey, WindowCounter, WindowHit, WindowTable};
