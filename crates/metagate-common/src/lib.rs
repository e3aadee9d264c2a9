//! Metagate Common - Shared types and utilities
//!
//! This crate provides the metadata records, cluster snapshot shapes,
//! configuration and error definitions used across all metagate components.

pub mod checksum;
pub mod cluster;
pub mod config;
pub mod error;
pub mod types;

pub use checksum::{compute_crc32c, fingerprint, hex_encode, verify_crc32c};
pub use cluster::{ClusterBlocks, ClusterSnapshot, LocalNode};
pub use config::{
    format_duration, parse_duration, AutoImportPolicy, Config, GatewayConfig, StateFormat,
};
pub use error::{Error, Result};
pub use types::*;
