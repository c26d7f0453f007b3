//! Newsletter sign-up handler.

use axum::{Json, extract::State, http::StatusCode};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::error::Result;
use crate::newsletter::subscribe;
use crate::state::AppState;

/// Sign-up body.
#[derive(Debug, Deserialize)]
pub struct SubscribeRequest {
    pub email: String,
}

/// Sign-up confirmation.
#[derive(Debug, Serialize)]
pub struct SubscribeResponse {
    pub email: String,
    pub message: &'static str,
}

/// Subscribe an address.
#[instrument(skip_all)]
pub async fn create(
    State(state): State<AppState>,
    Json(body): Json<SubscribeRequest>,
) -> Result<(StatusCode, Json<SubscribeResponse>)> {
    let email = subscribe(state.store(), &body.email).await?;
    Ok((
        StatusCode::CREATED,
        Json(SubscribeResponse {
            email: email.to_string(),
            message: "Thanks for subscribing!",
        }),
    ))
}
