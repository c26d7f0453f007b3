//! Cart route handlers.
//!
//! Every handler waits for the shopper's cart to finish loading for the
//! current identity before touching it, then answers with the new snapshot.
//! Writes are queued; `saveStatus` in the snapshot reports their progress.

use aqs_core::PerfumeId;
use axum::{
    Json,
    extract::{Path, State},
};
use serde::Deserialize;
use tracing::instrument;

use crate::cart::CartSnapshot;
use crate::error::{AppError, Result, add_breadcrumb};
use crate::middleware::CurrentShopper;
use crate::state::AppState;

/// Add to cart body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddItem {
    pub perfume_id: String,
}

/// Set quantity body. Any number is accepted and clamped.
#[derive(Debug, Deserialize)]
pub struct SetQuantity {
    pub quantity: f64,
}

/// Current cart.
#[instrument(skip_all)]
pub async fn show(CurrentShopper(shopper): CurrentShopper) -> Json<CartSnapshot> {
    Json(shopper.settled().await)
}

/// Add one unit of a catalog perfume.
#[instrument(skip(state, shopper), fields(perfume_id = %body.perfume_id))]
pub async fn add(
    State(state): State<AppState>,
    CurrentShopper(shopper): CurrentShopper,
    Json(body): Json<AddItem>,
) -> Result<Json<CartSnapshot>> {
    let id = PerfumeId::new(body.perfume_id.trim());
    if id.is_empty() {
        return Err(AppError::BadRequest("perfumeId is required".to_string()));
    }
    let perfume = state
        .catalog()
        .get_perfume(&id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("perfume {id}")))?;

    shopper.settled().await;
    shopper.cart.add_to_cart(perfume);
    add_breadcrumb("cart", "Added to cart", Some(&[("perfume_id", id.as_str())]));
    Ok(Json(shopper.cart.snapshot()))
}

/// Remove a line.
#[instrument(skip(shopper))]
pub async fn remove(
    CurrentShopper(shopper): CurrentShopper,
    Path(id): Path<String>,
) -> Json<CartSnapshot> {
    shopper.settled().await;
    shopper.cart.remove_from_cart(&PerfumeId::new(id));
    Json(shopper.cart.snapshot())
}

/// One more unit of a line.
#[instrument(skip(shopper))]
pub async fn increase(
    CurrentShopper(shopper): CurrentShopper,
    Path(id): Path<String>,
) -> Json<CartSnapshot> {
    shopper.settled().await;
    shopper.cart.increase_qty(&PerfumeId::new(id));
    Json(shopper.cart.snapshot())
}

/// One less unit of a line.
#[instrument(skip(shopper))]
pub async fn decrease(
    CurrentShopper(shopper): CurrentShopper,
    Path(id): Path<String>,
) -> Json<CartSnapshot> {
    shopper.settled().await;
    shopper.cart.decrease_qty(&PerfumeId::new(id));
    Json(shopper.cart.snapshot())
}

/// Set a line's quantity; zero or less removes it.
#[instrument(skip(shopper, body))]
pub async fn set_quantity(
    CurrentShopper(shopper): CurrentShopper,
    Path(id): Path<String>,
    Json(body): Json<SetQuantity>,
) -> Json<CartSnapshot> {
    shopper.settled().await;
    shopper.cart.set_qty(&PerfumeId::new(id), body.quantity);
    Json(shopper.cart.snapshot())
}
