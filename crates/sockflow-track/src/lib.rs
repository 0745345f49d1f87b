//! # sockflow-track
//!
//! Turns noisy, repeated socket observations into a bounded set of
//! stable connection relationships.
//!
//! - **Endpoint**: normalization of collector `ip:port` strings.
//! - **Observation**: raw collector rows, normalization, and filtering.
//! - **Cache**: the deduplicating tracking cache with eviction.
//! - **Roles**: client/server inference used when exporting flows.
//! - **Shared**: mutex-guarded cache for concurrent collectors.
//! - **State**: JSON persistence of the cache between runs.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod cache;
pub mod endpoint;
pub mod observation;
pub mod record;
pub mod roles;
pub mod shared;
pub mod state;
