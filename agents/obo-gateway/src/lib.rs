//! On-Behalf-Of Workflow Gateway
//!
//! Runs multi-step workflows that call a downstream agent for an end user,
//! carrying both a delegated identity and the caller's trace context.
//!
//! # Flow
//! - Inbound headers are located and the parent trace context extracted
//! - A Pending request is registered and a background unit started
//! - The unit exchanges the user's token at the STS for an OBO token
//! - Auth and trace headers are attached by the interceptor chain
//! - The agent's reply is synthesized into a result
//!
//! # Design Principles
//! - No panics on identity-provider or transport failure
//! - At most one attempt per STS or agent call
//! - A reader that sees `Completed` always finds the result

pub mod app;
pub mod client;
pub mod config;
pub mod engine;
pub mod error;
pub mod interceptor;

// Re-export contracts
#[path = "../contracts/mod.rs"]
pub mod contracts;

pub use app::Gateway;
pub use config::{ExchangeFailurePolicy, GatewayConfig, HttpTimeouts};
pub use contracts::*;
pub use engine::{TokenStrategy, WorkflowCoordinator, WorkflowSubmission};
pub use error::{ConfigError, DownstreamAgentError, TokenExchangeError, WorkflowError};
