//! Identity primitives for on-behalf-of (OBO) agent calls.
//!
//! This crate holds the values that travel with every outbound agent call
//! and the checks applied to inbound callers:
//!
//! - [`DelegationChain`]: "subject acting for audience with scope", nested
//!   under the actor that made the call. Bounded depth, immutable once built.
//! - [`Token`] / [`OboToken`]: opaque bearer strings with best-effort JWT
//!   metadata. The bearer never shows up in `Debug` output or logs.
//! - [`TokenVerifier`]: validates an inbound bearer JWT and yields the
//!   [`Principal`] a workflow runs for.
//!
//! # Usage
//!
//! ```rust
//! use obo_core::DelegationChain;
//!
//! let actor = DelegationChain::build(
//!     "spiffe://cluster.local/ns/default/sa/backend",
//!     "supply-chain-agent",
//!     "supply-chain:optimize",
//!     None,
//! ).unwrap();
//! let chain = DelegationChain::build("alice", "supply-chain-agent", "supply-chain:optimize", Some(actor)).unwrap();
//!
//! let claim = chain.to_claim();
//! assert_eq!(DelegationChain::from_claim(&claim).unwrap(), chain);
//! ```

pub mod auth;
pub mod delegation;
pub mod error;
pub mod token;

pub use auth::{Principal, TokenVerifier, VerificationKey, VerifierConfig};
pub use delegation::{DelegationChain, MAX_DELEGATION_DEPTH};
pub use error::{AuthenticationError, DelegationError};
pub use token::{OboToken, Token, TokenMetadata, TOKEN_TYPE_ACCESS, TOKEN_TYPE_JWT};
