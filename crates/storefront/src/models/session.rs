//! Session-related types.
//!
//! The cookie session carries only the shopper's guest id and, once signed
//! in, the verified user. Cart contents live in the document store.

/// Session keys for shopper identity.
pub mod keys {
    /// Key for the anonymous guest id, created on first visit.
    pub const GUEST_ID: &str = "guest_id";

    /// Key for the signed-in [`aqs_core::AuthUser`].
    pub const CURRENT_USER: &str = "current_user";
}
