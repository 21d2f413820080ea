use std::time::Duration;

use axum::extract::{Path, State};
use axum::Json;
use tracing::error;

use crate::error::{AppError, AppResult};
use crate::registry::{self, FlatRecord, ResolvedRecord};
use crate::state::AppState;

const PRESIGNED_URL_EXPIRY_SECONDS: u64 = 300;

pub async fn user_detail(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> AppResult<Json<FlatRecord>> {
    let resolved = {
        let mut conn = state.db()?;
        let root = registry::user_root(&mut conn, &user_id)?;
        registry::resolve(&mut conn, root)?
    };

    let record = flat_record(&state, &resolved).await?;
    Ok(Json(record))
}

pub async fn card_detail(
    State(state): State<AppState>,
    Path(card_number): Path<String>,
) -> AppResult<Json<FlatRecord>> {
    let resolved = {
        let mut conn = state.db()?;
        let root = registry::card_root(&mut conn, &card_number)?;
        registry::resolve(&mut conn, root)?
    };

    let record = flat_record(&state, &resolved).await?;
    Ok(Json(record))
}

/// Flattens a resolved record, presigning the authorization document URL
/// when one exists. The pooled connection must already be dropped; the
/// storage call is async.
pub(crate) async fn flat_record(
    state: &AppState,
    resolved: &ResolvedRecord,
) -> AppResult<FlatRecord> {
    let document_url = match resolved.document.as_ref() {
        Some(document) => {
            let url = state
                .storage
                .presign_get_object(
                    &document.s3_key,
                    Duration::from_secs(PRESIGNED_URL_EXPIRY_SECONDS),
                )
                .await
                .map_err(|err| {
                    error!(error = %err, key = %document.s3_key, "failed to presign document URL");
                    AppError::internal(format!("failed to presign document URL: {err}"))
                })?;
            Some(url)
        }
        None => None,
    };

    Ok(registry::flatten(resolved, document_url))
}
