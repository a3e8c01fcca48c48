//! Declarative state reconciliation for a Consul cluster.
//!
//! A JSON action list is loaded through the [`registry`] into typed
//! [`action`]s, validated, and applied in order by [`apply`]. [`export`]
//! turns live ACL, catalog and KV state back into the same list.
pub mod action;
pub mod apply;
pub mod cli;
pub mod cluster;
pub mod config;
pub mod document;
pub mod export;
pub mod registry;
