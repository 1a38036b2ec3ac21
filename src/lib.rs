//! LAN device discovery and folder backup.
//!
//! lanvault finds a trusted machine on the local network without knowing its
//! address in advance, then synchronizes configured folders to it over an
//! abstract transfer boundary. Discovery probes the local /24 concurrently
//! and identifies machines by hardware address; a whitelist plus a
//! last-known-good cache turn the discovered set into a single destination;
//! upload history keeps repeated runs idempotent.
//!
//! Module map:
//! - [`core`]: discovery, trust policy, selection, upload, orchestration
//! - [`adapters`]: platform connectivity probes
//! - [`db`]: SQLite persistence for whitelist, device cache, history, runs
//! - [`config`] / [`context`] / [`logging`]: application plumbing

pub mod adapters;
pub mod config;
pub mod context;
pub mod core;
pub mod db;
pub mod logging;
