//! Sign-in and sign-out handlers.
//!
//! The browser signs in with the auth provider and posts the resulting ID
//! token here. The verified user is kept in the session and published to the
//! shopper, which moves the cart to `user_{uid}`. Signing out moves it back
//! to the guest cart.

use aqs_core::AuthUser;
use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use tracing::{info, instrument};

use crate::auth::AuthVerifier;
use crate::cart::CartSnapshot;
use crate::error::{AppError, Result, clear_sentry_user, set_sentry_user};
use crate::middleware::CurrentShopper;
use crate::models::session::keys;
use crate::state::AppState;

/// Sign-in body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignInRequest {
    pub id_token: String,
}

/// Auth state and the cart that goes with it.
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub user: Option<AuthUser>,
    pub cart: CartSnapshot,
}

/// Who is signed in.
#[instrument(skip_all)]
pub async fn show(CurrentShopper(shopper): CurrentShopper) -> Json<SessionResponse> {
    Json(SessionResponse {
        user: shopper.events.current(),
        cart: shopper.settled().await,
    })
}

/// Verify an ID token and sign the shopper in.
#[instrument(skip_all)]
pub async fn sign_in(
    State(state): State<AppState>,
    session: Session,
    CurrentShopper(shopper): CurrentShopper,
    Json(body): Json<SignInRequest>,
) -> Result<Json<SessionResponse>> {
    let token = body.id_token.trim();
    if token.is_empty() {
        return Err(AppError::BadRequest("idToken is required".to_string()));
    }
    let user = state.verifier().verify(token).await?;

    // New session id on privilege change
    session.cycle_id().await?;
    session.insert(keys::CURRENT_USER, &user).await?;

    set_sentry_user(&user.id, user.email.as_ref().map(aqs_core::Email::as_str));
    info!(user_id = %user.id, "Signed in");
    shopper.sync_user(Some(user.clone()));

    Ok(Json(SessionResponse {
        user: Some(user),
        cart: shopper.settled().await,
    }))
}

/// Sign out; the guest cart becomes current again.
#[instrument(skip_all)]
pub async fn sign_out(
    session: Session,
    CurrentShopper(shopper): CurrentShopper,
) -> Result<Json<SessionResponse>> {
    session.remove::<AuthUser>(keys::CURRENT_USER).await?;
    clear_sentry_user();
    shopper.sync_user(None);
    Ok(Json(SessionResponse {
        user: None,
        cart: shopper.settled().await,
    }))
}
