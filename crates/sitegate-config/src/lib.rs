// crates/sitegate-config/src/lib.rs
// ============================================================================
// Module: Sitegate Config Library
// Description: Canonical config model, validation, and runtime construction.
// Purpose: Single source of truth for sitegate.toml semantics.
// Dependencies: sitegate-core, serde, toml
// ============================================================================

//! ## Overview
//! `sitegate-config` defines the `sitegate.toml` model. Loading is strict and
//! fail-closed; a configuration that validates is guaranteed to build a
//! registry, dispatch rules, and the in-memory credential stores.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod build;
pub mod config;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::*;
