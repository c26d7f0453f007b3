//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures errors to Sentry before
//! responding to the client. All route handlers should return `Result<T, AppError>`.
//! Responses are JSON: `{"error": "..."}`, plus `validation` for checkout
//! field errors.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use aqs_core::ContactValidation;

use crate::auth::AuthError;
use crate::checkout::CheckoutError;
use crate::newsletter::NewsletterError;
use crate::payments::PaymentError;
use crate::store::StoreError;

/// Application-level error type for the storefront.
#[derive(Debug, Error)]
pub enum AppError {
    /// Document store operation failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Checkout could not start a payment.
    #[error("Checkout error: {0}")]
    Checkout(#[from] CheckoutError),

    /// Newsletter sign-up failed.
    #[error("Newsletter error: {0}")]
    Newsletter(#[from] NewsletterError),

    /// ID token verification failed.
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// Session storage failed.
    #[error("Session error: {0}")]
    Session(#[from] tower_sessions::session::Error),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// JSON error body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<ContactValidation>,
}

impl AppError {
    fn is_server_error(&self) -> bool {
        match self {
            Self::Store(_) | Self::Session(_) | Self::Internal(_) => true,
            Self::Checkout(err) => matches!(
                err,
                CheckoutError::Store(_) | CheckoutError::Payment(_)
            ),
            Self::Newsletter(err) => matches!(err, NewsletterError::Store(_)),
            Self::Auth(err) => !matches!(err, AuthError::InvalidToken | AuthError::NotConfigured),
            Self::NotFound(_) | Self::BadRequest(_) => false,
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::Store(_) | Self::Session(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::Checkout(err) => match err {
                CheckoutError::EmptyCart | CheckoutError::InvalidContact(_) => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
                CheckoutError::Busy => StatusCode::CONFLICT,
                CheckoutError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
                CheckoutError::Payment(_) => StatusCode::BAD_GATEWAY,
            },
            Self::Newsletter(err) => match err {
                NewsletterError::InvalidEmail => StatusCode::UNPROCESSABLE_ENTITY,
                NewsletterError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Auth(err) => match err {
                AuthError::InvalidToken => StatusCode::UNAUTHORIZED,
                AuthError::NotConfigured => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::BAD_GATEWAY,
            },
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    // Don't expose internal error details to clients
    fn public_message(&self) -> String {
        match self {
            Self::Store(_) | Self::Session(_) | Self::Internal(_) => {
                "Internal server error".to_string()
            }
            Self::Checkout(err) => match err {
                CheckoutError::Store(_) => "Could not save your details. Please try again.".to_string(),
                CheckoutError::Payment(PaymentError::UnexpectedResponse) => {
                    "Unexpected payment response.".to_string()
                }
                CheckoutError::Payment(_) => "Payment session failed.".to_string(),
                other => other.to_string(),
            },
            Self::Newsletter(err) => match err {
                NewsletterError::InvalidEmail => err.to_string(),
                NewsletterError::Store(_) => "Something went wrong. Please try again.".to_string(),
            },
            Self::Auth(err) => match err {
                AuthError::InvalidToken | AuthError::NotConfigured => err.to_string(),
                _ => "Authentication service error".to_string(),
            },
            Self::NotFound(_) | Self::BadRequest(_) => self.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Capture server errors to Sentry
        if self.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        let status = self.status();
        let body = ErrorBody {
            error: self.public_message(),
            validation: match self {
                Self::Checkout(CheckoutError::InvalidContact(validation)) => Some(validation),
                _ => None,
            },
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context from a user ID.
///
/// Call this after successful authentication to associate errors with users.
pub fn set_sentry_user(user_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
///
/// Call this on logout to stop associating errors with the user.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

/// Add a breadcrumb for user actions.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of user actions
/// leading up to an error.
///
/// # Example
///
/// ```rust,ignore
/// add_breadcrumb("cart", "Added to cart", Some(&[("perfume_id", "oud-1")]));
/// ```
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}
