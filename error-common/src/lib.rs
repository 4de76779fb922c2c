//! Common error handling utilities for the OpenLearn sync core
//!
//! This module provides the standardized error taxonomy used across all sync
//! crates. It ensures consistent classification of failures, which is what the
//! sync engine's retry/discard decisions hang off.
//!
//! # Error Categories
//!
//! - **Connectivity**: transient network failures; always retryable, never
//!   cause local data loss
//! - **ServerRejection**: the remote explicitly refused submitted content;
//!   terminal for that item, the queued data is discarded with a warning
//! - **Blocked**: an advisory sync block is held (user editing online); the
//!   attempt is rejected before touching any state
//! - **Storage**: local persistence failures
//! - **InvalidOperation**: programming or data-shape errors (bad payloads)
//!
//! All variants carry string payloads so errors stay `Clone`: the lock
//! registry hands the same settled outcome to every concurrent caller.

pub mod types;

pub use types::*;
