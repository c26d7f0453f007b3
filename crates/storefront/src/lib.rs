//! AQS de Parfum Storefront library.
//!
//! This crate provides the storefront functionality as a library,
//! allowing it to be tested and reused by the CLI.
//!
//! # Modules
//!
//! - [`store`] - Document store trait, Firestore REST client and in-memory store
//! - [`identity`] - Auth-state stream, guest ids and identity key resolution
//! - [`cart`] - Cart synchronization engine and its write queue
//! - [`checkout`] - Contact fields, debounced save and payment initiation
//! - [`payments`] - Payment-session service client
//! - [`catalog`], [`news`], [`newsletter`] - Content reads and sign-ups
//! - [`routes`] - JSON API

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod auth;
pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod config;
pub mod debounce;
pub mod error;
pub mod identity;
pub mod middleware;
pub mod models;
pub mod news;
pub mod newsletter;
pub mod payments;
pub mod routes;
pub mod shopper;
pub mod state;
pub mod store;
