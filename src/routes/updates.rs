use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use tracing::info;

use super::records;
use crate::error::{AppError, AppResult};
use crate::models::CardState;
use crate::registry::{self, FlatRecord, UpdateFields};
use crate::state::AppState;

/// Partial update payload. Every field is optional; omitted fields leave
/// their owning entity untouched, so PUT and PATCH behave identically.
#[derive(Debug, Deserialize)]
pub struct UpdateRequest {
    pub full_name: Option<String>,
    pub state: Option<String>,
    pub car_plate: Option<String>,
    pub brand: Option<String>,
}

pub async fn update_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(payload): Json<UpdateRequest>,
) -> AppResult<Json<FlatRecord>> {
    let fields = parse_fields(payload)?;

    let resolved = {
        let mut conn = state.db()?;
        let root = registry::user_root(&mut conn, &user_id)?;
        registry::apply_update(&mut conn, root, fields)?
    };

    info!(user_id = %user_id, "unified update applied");

    let record = records::flat_record(&state, &resolved).await?;
    Ok(Json(record))
}

pub async fn update_card(
    State(state): State<AppState>,
    Path(card_number): Path<String>,
    Json(payload): Json<UpdateRequest>,
) -> AppResult<Json<FlatRecord>> {
    let fields = parse_fields(payload)?;

    let resolved = {
        let mut conn = state.db()?;
        let root = registry::card_root(&mut conn, &card_number)?;
        registry::apply_update(&mut conn, root, fields)?
    };

    info!(card_number = %card_number, "unified update applied");

    let record = records::flat_record(&state, &resolved).await?;
    Ok(Json(record))
}

fn parse_fields(payload: UpdateRequest) -> AppResult<UpdateFields> {
    let state = match payload.state.as_deref() {
        Some(value) => Some(value.parse::<CardState>().map_err(AppError::bad_request)?),
        None => None,
    };

    Ok(UpdateFields {
        full_name: payload.full_name,
        state,
        car_plate: payload.car_plate,
        brand: payload.brand,
    })
}
