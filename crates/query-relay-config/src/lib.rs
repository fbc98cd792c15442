// crates/query-relay-config/src/lib.rs
// ============================================================================
// Module: Query Relay Config Library
// Description: Configuration model, loading, and validation.
// Purpose: Single source of truth for gateway configuration.
// Dependencies: query-relay-core, serde, thiserror, toml
// ============================================================================

//! ## Overview
//! This crate owns the `query-relay.toml` model. Loading enforces size,
//! encoding, and path limits; validation is fail-closed.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::*;
