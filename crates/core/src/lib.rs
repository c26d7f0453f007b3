//! AQS de Parfum Core - Shared types library.
//!
//! This crate provides common types used across the storefront components:
//! - `storefront` - Cart synchronization, checkout and the JSON API
//! - `cli` - Catalog seeding and cart inspection
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no
//! document store access, no HTTP clients. Everything read from the store is
//! normalized here, so records are well-formed by the time any service sees
//! them.
//!
//! # Modules
//!
//! - [`types`] - IDs, emails, prices, perfumes, cart lines and identity keys

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
