//! Request extractor for the current shopper.

use std::sync::Arc;

use axum::{extract::FromRequestParts, http::request::Parts};
use tower_sessions::Session;

use crate::error::AppError;
use crate::shopper::Shopper;
use crate::state::AppState;

/// Extractor that resolves the shopper behind the session cookie.
///
/// Creates the guest id on first visit. Requires the session layer.
///
/// # Example
///
/// ```rust,ignore
/// async fn handler(CurrentShopper(shopper): CurrentShopper) -> Json<CartSnapshot> {
///     Json(shopper.cart.snapshot())
/// }
/// ```
pub struct CurrentShopper(pub Arc<Shopper>);

impl FromRequestParts<AppState> for CurrentShopper {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let session = parts
            .extensions
            .get::<Session>()
            .cloned()
            .ok_or_else(|| AppError::Internal("session layer missing".to_string()))?;

        let shopper = state.shoppers().shopper_for(&session).await?;
        Ok(Self(shopper))
    }
}
