use std::path::Path as FsPath;

use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::Json;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::records;
use crate::error::{AppError, AppResult};
use crate::models::CardState;
use crate::registry::{self, FlatRecord, RegistrationInput, ResolvedRecord, StoredDocument};
use crate::state::AppState;

pub async fn create_registration(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<FlatRecord>)> {
    let mut id_user: Option<String> = None;
    let mut full_name: Option<String> = None;
    let mut card_number: Option<String> = None;
    let mut card_state: Option<String> = None;
    let mut car_plate: Option<String> = None;
    let mut brand: Option<String> = None;
    let mut file_bytes: Option<Vec<u8>> = None;
    let mut original_name: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(|err| {
        let msg = format!("invalid multipart data: {err}");
        error!(error = %err, "invalid multipart data");
        AppError::bad_request(msg)
    })? {
        let name = field.name().map(|n| n.to_string());
        match name.as_deref() {
            Some("authorization_document") => {
                original_name = field.file_name().map(|n| n.to_string());
                let data = field.bytes().await.map_err(|err| {
                    let msg = format!("failed to read file bytes: {err}");
                    error!(error = %err, "failed to read file bytes");
                    AppError::bad_request(msg)
                })?;
                file_bytes = Some(data.to_vec());
            }
            Some("id_user") => id_user = Some(text_field(field, "id_user").await?),
            Some("full_name") => full_name = Some(text_field(field, "full_name").await?),
            Some("card_number") => card_number = Some(text_field(field, "card_number").await?),
            Some("state") => card_state = Some(text_field(field, "state").await?),
            Some("car_plate") => car_plate = Some(text_field(field, "car_plate").await?),
            Some("brand") => brand = Some(text_field(field, "brand").await?),
            _ => {}
        }
    }

    let state_value = match card_state.as_deref() {
        Some(value) => value
            .parse::<CardState>()
            .map_err(AppError::bad_request)?,
        None => CardState::default(),
    };

    let input = RegistrationInput {
        id_user: require_field(id_user, "id_user")?,
        full_name: require_field(full_name, "full_name")?,
        card_number: require_field(card_number, "card_number")?,
        state: state_value,
        car_plate: require_field(car_plate, "car_plate")?,
        brand: require_field(brand, "brand")?,
    };
    input.validate()?;

    let file_bytes = file_bytes.ok_or_else(|| {
        error!("registration rejected: missing authorization_document field");
        AppError::bad_request("authorization_document field is required")
    })?;
    if file_bytes.is_empty() {
        error!("registration rejected: empty authorization document");
        return Err(AppError::bad_request(
            "authorization_document must not be empty",
        ));
    }
    let original_name = original_name.ok_or_else(|| {
        error!("registration rejected: missing document filename");
        AppError::bad_request("authorization_document filename is required")
    })?;
    if !is_pdf_filename(&original_name) {
        error!(filename = %original_name, "registration rejected: not a PDF");
        return Err(AppError::bad_request(
            "authorization_document must be a .pdf file",
        ));
    }

    // Advisory pre-check; the unique constraints still decide under races.
    {
        let mut conn = state.db()?;
        registry::ensure_registrable(&mut conn, &input)?;
    }

    let document_id = Uuid::new_v4();
    let s3_key = format!("authorizations/{document_id}.pdf");
    let content_type = mime_guess::from_path(&original_name)
        .first()
        .map(|mime| mime.to_string());
    let content_disposition = inline_content_disposition(&original_name);

    state
        .storage
        .put_object(&s3_key, file_bytes, content_type, content_disposition)
        .await
        .map_err(|err| {
            error!(error = %err, key = %s3_key, "failed to store authorization document");
            AppError::internal(format!("failed to store authorization document: {err}"))
        })?;

    let stored = StoredDocument {
        id: document_id,
        s3_key: s3_key.clone(),
        original_name,
    };

    // conn is not Send; it must be dropped before the storage await below.
    let result = {
        let mut conn = state.db()?;
        registry::register(&mut conn, input, stored)
    };
    let registration = match result {
        Ok(registration) => registration,
        Err(err) => {
            error!(error = %err, "registration transaction failed");
            if let Err(delete_err) = state.storage.delete_object(&s3_key).await {
                warn!(error = %delete_err, key = %s3_key, "failed to remove orphaned document");
            }
            return Err(err.into());
        }
    };

    info!(
        user_id = %registration.user.id,
        card_number = %registration.card.card_number,
        plate = %registration.vehicle.plate,
        "registration created"
    );

    let resolved = ResolvedRecord {
        user: registration.user,
        card: Some(registration.card),
        vehicle: Some(registration.vehicle),
        document: Some(registration.document),
    };
    let record = records::flat_record(&state, &resolved).await?;

    Ok((StatusCode::CREATED, Json(record)))
}

async fn text_field(
    field: axum::extract::multipart::Field<'_>,
    name: &str,
) -> AppResult<String> {
    field.text().await.map_err(|err| {
        let msg = format!("invalid value for {name}: {err}");
        error!(error = %err, field = name, "invalid multipart field");
        AppError::bad_request(msg)
    })
}

fn require_field(value: Option<String>, name: &str) -> AppResult<String> {
    value.ok_or_else(|| AppError::bad_request(format!("{name} field is required")))
}

fn is_pdf_filename(filename: &str) -> bool {
    FsPath::new(filename)
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false)
}

fn inline_content_disposition(filename: &str) -> Option<String> {
    if filename.is_empty() {
        return None;
    }

    let sanitized: String = filename
        .chars()
        .map(|ch| match ch {
            '"' | '\\' => '_',
            _ => ch,
        })
        .collect();

    let encoded =
        percent_encoding::utf8_percent_encode(&sanitized, percent_encoding::NON_ALPHANUMERIC);
    Some(format!(
        "inline; filename=\"{}\"; filename*=UTF-8''{}",
        sanitized, encoded
    ))
}
