//! Catalog route handlers.

use aqs_core::{NoteTiers, Perfume, PerfumeId};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::Serialize;
use tracing::{error, instrument};

use crate::catalog::LIST_ERROR;
use crate::error::{AppError, Result};
use crate::state::AppState;

/// Perfume listing. A failed read answers with an empty list and the
/// listing error to show in its place.
#[derive(Debug, Serialize)]
pub struct PerfumeListing {
    pub perfumes: Vec<Perfume>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<&'static str>,
}

/// One perfume with its notes split into tiers.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerfumeDetail {
    pub perfume: Perfume,
    pub note_tiers: NoteTiers,
}

/// All perfumes.
#[instrument(skip(state))]
pub async fn index(State(state): State<AppState>) -> (StatusCode, Json<PerfumeListing>) {
    match state.catalog().list_perfumes().await {
        Ok(perfumes) => (
            StatusCode::OK,
            Json(PerfumeListing {
                perfumes: perfumes.as_ref().clone(),
                error: None,
            }),
        ),
        Err(e) => {
            error!(error = %e, "Failed to list perfumes");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(PerfumeListing {
                    perfumes: Vec::new(),
                    error: Some(LIST_ERROR),
                }),
            )
        }
    }
}

/// One perfume by id.
#[instrument(skip(state))]
pub async fn show(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<PerfumeDetail>> {
    let perfume = state
        .catalog()
        .get_perfume(&PerfumeId::new(id.clone()))
        .await?
        .ok_or_else(|| AppError::NotFound(format!("perfume {id}")))?;
    Ok(Json(PerfumeDetail {
        note_tiers: perfume.note_tiers(),
        perfume,
    }))
}
