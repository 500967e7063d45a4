//! Workflow Gateway Contracts
//!
//! Wire shapes exchanged with the HTTP layer in front of the gateway and with
//! the downstream agent.

mod workflow;

pub use workflow::*;
