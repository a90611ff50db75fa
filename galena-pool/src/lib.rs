//! Solo Bitcoin mining pool.
//!
//! Sits between Stratum v1 miners and a local Bitcoin node: pulls block
//! templates, hands out jobs with a reserved extranonce placeholder in the
//! coinbase, validates returned shares against per-client difficulty, and
//! submits any share that also meets the network target as a full block.
//! Rewards go to a single configured address.

pub mod api;
pub mod api_client;
pub mod codec;
pub mod config;
pub mod job;
pub mod node;
pub mod services;
pub mod share;
pub mod stats;
pub mod stratum;
pub mod target;
pub mod tracing;
pub mod vardiff;
