//! Checkout route handlers.

use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::checkout::CheckoutState;
use crate::error::{Result, add_breadcrumb};
use crate::middleware::CurrentShopper;
use crate::payments::{PayMethod, PaymentSession};

/// Contact fields as typed; omitted fields keep their value.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactUpdate {
    pub email: Option<String>,
    pub shipping_address: Option<String>,
}

/// Pay request body.
#[derive(Debug, Default, Deserialize)]
pub struct PayRequest {
    #[serde(default)]
    pub method: PayMethod,
}

/// Pay response: the session and where to send the shopper.
#[derive(Debug, Serialize)]
pub struct PayResponse {
    pub session: PaymentSession,
    pub next: String,
}

/// Form state, validation and totals.
#[instrument(skip_all)]
pub async fn show(CurrentShopper(shopper): CurrentShopper) -> Json<CheckoutState> {
    shopper.settled().await;
    Json(shopper.checkout.state())
}

/// Update contact fields; the save is debounced.
#[instrument(skip_all)]
pub async fn update_contact(
    CurrentShopper(shopper): CurrentShopper,
    Json(body): Json<ContactUpdate>,
) -> Json<CheckoutState> {
    shopper.settled().await;
    shopper
        .checkout
        .update_contact(body.email, body.shipping_address);
    Json(shopper.checkout.state())
}

/// Save contact fields immediately.
#[instrument(skip_all)]
pub async fn save_contact(CurrentShopper(shopper): CurrentShopper) -> Result<Json<CheckoutState>> {
    shopper.settled().await;
    shopper.checkout.save_contact_now().await?;
    Ok(Json(shopper.checkout.state()))
}

/// Start a payment session for the current cart.
#[instrument(skip_all, fields(method = ?body.method))]
pub async fn pay(
    CurrentShopper(shopper): CurrentShopper,
    Json(body): Json<PayRequest>,
) -> Result<Json<PayResponse>> {
    shopper.settled().await;
    let session = shopper.checkout.start_payment(body.method).await?;
    add_breadcrumb("checkout", "Payment session created", None);
    Ok(Json(PayResponse {
        next: session.next_location(),
        session,
    }))
}
