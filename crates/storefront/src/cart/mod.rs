//! Cart synchronization.
//!
//! [`CartService`] owns the in-memory cart for one shopper and mirrors it to
//! `carts/{identityKey}` through [`CartWriter`].

mod service;
mod writer;

pub use service::{CartService, CartSnapshot};
pub use writer::{CartWriter, RetryPolicy, SaveStatus};
