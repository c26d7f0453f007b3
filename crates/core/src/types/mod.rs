//! Core types for the storefront.
//!
//! This module provides type-safe wrappers and normalized records for the
//! catalog, the cart and the shopper identity.

pub mod cart;
pub mod checkout;
pub mod email;
pub mod id;
pub mod identity;
pub mod news;
pub mod perfume;
pub mod price;

pub use cart::{CARTS_COLLECTION, CartDocument, CartItem, CartLines, CheckoutContact, clamp_quantity};
pub use checkout::{AddressError, ContactValidation, ShippingAddress, ValidContact};
pub use email::{Email, EmailError};
pub use id::*;
pub use identity::{AuthUser, IdentityKey};
pub use news::{NEWS_COLLECTION, NEWS_ORDER_FIELD, NewsPost, NewsQuote, NewsSection, NewsStat, featured};
pub use perfume::{
    DEFAULT_CURRENCY, DEFAULT_STOCK_TEXT, NoteTiers, PERFUMES_COLLECTION, Perfume, split_notes,
};
pub use price::{CurrencyCode, FLAT_SHIPPING, OrderSummary, Price};
