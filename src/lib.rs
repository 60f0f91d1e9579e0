//! Prompter - Desktop assistant runtime core
//!
//! Prompter is the local daemon behind a desktop assistant: it owns the
//! orchestration that the window chrome and views only observe.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                     Presentation layer                        │
//! │        (window chrome, views: reads state, sends commands)   │
//! └───────────────┬─────────────────────────────▲─────────────────┘
//!                 │ POST /api/command           │ GET /ws/state
//! ┌───────────────▼─────────────────────────────┴─────────────────┐
//! │                      Runtime core                             │
//! │  ┌────────────┐ ┌─────────────┐ ┌───────────┐ ┌────────────┐  │
//! │  │  Command   │ │ Agent       │ │ Liveness  │ │  Action    │  │
//! │  │  dispatch  │ │ supervisors │ │ prober    │ │  lock      │  │
//! │  └─────┬──────┘ └──────┬──────┘ └─────┬─────┘ └─────┬──────┘  │
//! │        └───────────────┴──────┬───────┴─────────────┘         │
//! │                        ┌──────▼──────┐                        │
//! │                        │ State store │                        │
//! │                        └─────────────┘                        │
//! └───────┬───────────────────┬───────────────────┬───────────────┘
//!         │ NDJSON :50002/3   │ NDJSON :50001     │ (no channel)
//! ┌───────▼───────┐  ┌────────▼───────┐  ┌────────▼────────┐
//! │  ASR agents   │  │  VCam agent    │  │ Audio control   │
//! │  (self/other) │  │                │  │ agent           │
//! └───────────────┘  └────────────────┘  └─────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`agent`]: supervision of the external agent processes
//! - [`state`]: the authoritative session-state store
//! - [`action`]: mutual exclusion for long-running user actions
//! - [`probe`]: backend / GPU-server liveness probing
//! - [`backend`]: HTTP client for the assistant backend
//! - [`command`]: the presentation-layer command boundary
//! - [`api`]: axum router serving that boundary locally
//! - [`runtime`]: the owning application context
//! - [`config`]: configuration management

pub mod action;
pub mod agent;
pub mod api;
pub mod backend;
pub mod command;
pub mod config;
pub mod error;
pub mod probe;
pub mod runtime;
pub mod state;

pub use config::PrompterConfig;
pub use error::{Error, Result};
pub use runtime::{Runtime, RuntimeBuilder};
