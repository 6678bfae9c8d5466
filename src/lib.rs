//! Proof registry service.
//!
//! Registers financial-approval proofs on an EVM chain by content hash and
//! answers existence and detail queries over an HTTP JSON API.

pub mod api_server;
pub mod config;
pub mod deploy;
pub mod error;
pub mod logger;
pub mod proof;
pub mod registry;
pub mod service;
