//! Checkout contact validation.

use core::fmt;

use serde::{Deserialize, Serialize};

use super::cart::CheckoutContact;
use super::email::Email;

/// Errors that can occur when parsing a [`ShippingAddress`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    /// Fewer than [`ShippingAddress::MIN_LENGTH`] characters after trimming.
    #[error("shipping address must be at least {min} characters")]
    TooShort {
        /// Minimum allowed length.
        min: usize,
    },
}

/// A free-form shipping address, trimmed, with a minimum length.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct ShippingAddress(String);

impl ShippingAddress {
    /// Minimum number of characters after trimming.
    pub const MIN_LENGTH: usize = 10;

    /// Parse and trim an address.
    ///
    /// # Errors
    ///
    /// Returns [`AddressError::TooShort`] when fewer than
    /// [`Self::MIN_LENGTH`] characters remain after trimming.
    pub fn parse(s: &str) -> Result<Self, AddressError> {
        let trimmed = s.trim();
        if trimmed.chars().count() < Self::MIN_LENGTH {
            return Err(AddressError::TooShort {
                min: Self::MIN_LENGTH,
            });
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Returns the address as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ShippingAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Field-level validation result for the checkout form.
///
/// Messages are only set for fields the shopper has started typing in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactValidation {
    pub email_ok: bool,
    pub address_ok: bool,
    pub email_error: Option<&'static str>,
    pub address_error: Option<&'static str>,
}

impl ContactValidation {
    /// Both fields valid.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.email_ok && self.address_ok
    }
}

/// Checkout contact fields that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidContact {
    pub email: Email,
    pub shipping_address: ShippingAddress,
}

impl CheckoutContact {
    /// Whether both fields are blank (nothing worth saving).
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.email.trim().is_empty() && self.shipping_address.trim().is_empty()
    }

    /// Validate both fields.
    #[must_use]
    pub fn validate(&self) -> ContactValidation {
        let email_ok = Email::is_valid(&self.email);
        let address_ok = ShippingAddress::parse(&self.shipping_address).is_ok();
        ContactValidation {
            email_ok,
            address_ok,
            email_error: (!email_ok && !self.email.trim().is_empty())
                .then_some("Please enter a valid email."),
            address_error: (!address_ok && !self.shipping_address.trim().is_empty())
                .then_some("Please enter a complete address (at least 10 characters)."),
        }
    }

    /// Parse into validated fields.
    ///
    /// # Errors
    ///
    /// Returns the field-level validation when either field is invalid.
    pub fn to_valid(&self) -> Result<ValidContact, ContactValidation> {
        match (
            Email::parse(self.email.trim()),
            ShippingAddress::parse(&self.shipping_address),
        ) {
            (Ok(email), Ok(shipping_address)) => Ok(ValidContact {
                email,
                shipping_address,
            }),
            _ => Err(self.validate()),
        }
    }

    /// Whether payment may start: valid fields and a non-empty cart.
    #[must_use]
    pub fn can_pay(&self, cart_lines: usize) -> bool {
        cart_lines > 0 && self.validate().is_valid()
    }
}
