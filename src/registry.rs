//! Core of the registry: resolving a root entity (user or parking card)
//! into the full user/card/vehicle/document graph, flattening that graph
//! into the unified record shape, and fanning registration and partial
//! updates back out across the four tables inside one transaction.

use chrono::{DateTime, NaiveDateTime, Utc};
use diesel::dsl::exists;
use diesel::{prelude::*, result::DatabaseErrorKind, select, PgConnection};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    CardState, Document, NewDocument, NewParkingCard, NewUser, NewVehicle, ParkingCard, User,
    Vehicle,
};
use crate::schema::{documents, parking_cards, users, vehicles};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Duplicate(String),
    #[error("resource not found")]
    NotFound,
    #[error("{0}")]
    RelationMissing(String),
    #[error(transparent)]
    Database(#[from] diesel::result::Error),
}

/// Starting point for traversal and update. The two lookup paths produce
/// the same resolved graph downstream.
#[derive(Debug, Clone)]
pub enum RootEntity {
    User(User),
    Card(ParkingCard),
}

/// The related rows reachable from a root. `user` is always present:
/// user-rooted resolution starts from it, and a card row without its
/// owning user is a broken foreign key, not a tolerated absence.
#[derive(Debug, Clone)]
pub struct ResolvedRecord {
    pub user: User,
    pub card: Option<ParkingCard>,
    pub vehicle: Option<Vehicle>,
    pub document: Option<Document>,
}

/// Unified flat response shape combining all four entities. Timestamps
/// come from the user row regardless of which root the traversal began at.
#[derive(Debug, Serialize)]
pub struct FlatRecord {
    pub id_user: String,
    pub full_name: String,
    pub card_number: Option<String>,
    pub state: Option<String>,
    pub car_plate: Option<String>,
    pub brand: Option<String>,
    pub authorization_document: Option<String>,
    pub created: String,
    pub updated: String,
}

pub fn user_root(conn: &mut PgConnection, user_id: &str) -> Result<RootEntity, RegistryError> {
    let user = users::table
        .find(user_id)
        .first::<User>(conn)
        .optional()?
        .ok_or(RegistryError::NotFound)?;
    Ok(RootEntity::User(user))
}

pub fn card_root(conn: &mut PgConnection, card_number: &str) -> Result<RootEntity, RegistryError> {
    let card = parking_cards::table
        .find(card_number)
        .first::<ParkingCard>(conn)
        .optional()?
        .ok_or(RegistryError::NotFound)?;
    Ok(RootEntity::Card(card))
}

pub fn resolve(
    conn: &mut PgConnection,
    root: RootEntity,
) -> Result<ResolvedRecord, RegistryError> {
    match root {
        RootEntity::User(user) => {
            let card = parking_cards::table
                .filter(parking_cards::user_id.eq(&user.id))
                .first::<ParkingCard>(conn)
                .optional()?;
            let (vehicle, document) = match card.as_ref() {
                Some(card) => (first_vehicle(conn, card)?, first_document(conn, card)?),
                None => (None, None),
            };
            Ok(ResolvedRecord {
                user,
                card,
                vehicle,
                document,
            })
        }
        RootEntity::Card(card) => {
            let user = users::table
                .find(&card.user_id)
                .first::<User>(conn)
                .optional()?
                .ok_or_else(|| {
                    RegistryError::RelationMissing(format!(
                        "card {} has no owning user",
                        card.card_number
                    ))
                })?;
            let vehicle = first_vehicle(conn, &card)?;
            let document = first_document(conn, &card)?;
            Ok(ResolvedRecord {
                user,
                card: Some(card),
                vehicle,
                document,
            })
        }
    }
}

// "First" is whatever row the database returns first; no ordering is
// guaranteed when a card has more than one vehicle or document.
fn first_vehicle(
    conn: &mut PgConnection,
    card: &ParkingCard,
) -> Result<Option<Vehicle>, RegistryError> {
    Ok(Vehicle::belonging_to(card)
        .first::<Vehicle>(conn)
        .optional()?)
}

fn first_document(
    conn: &mut PgConnection,
    card: &ParkingCard,
) -> Result<Option<Document>, RegistryError> {
    Ok(Document::belonging_to(card)
        .first::<Document>(conn)
        .optional()?)
}

pub fn flatten(resolved: &ResolvedRecord, document_url: Option<String>) -> FlatRecord {
    FlatRecord {
        id_user: resolved.user.id.clone(),
        full_name: resolved.user.full_name.clone(),
        card_number: resolved
            .card
            .as_ref()
            .map(|card| card.card_number.clone()),
        state: resolved.card.as_ref().map(|card| card.state.clone()),
        car_plate: resolved
            .vehicle
            .as_ref()
            .map(|vehicle| vehicle.plate.clone()),
        brand: resolved
            .vehicle
            .as_ref()
            .map(|vehicle| vehicle.brand.clone()),
        authorization_document: document_url,
        created: to_iso(resolved.user.created_at),
        updated: to_iso(resolved.user.updated_at),
    }
}

#[derive(Debug)]
pub struct RegistrationInput {
    pub id_user: String,
    pub full_name: String,
    pub card_number: String,
    pub state: CardState,
    pub car_plate: String,
    pub brand: String,
}

impl RegistrationInput {
    pub fn validate(&self) -> Result<(), RegistryError> {
        if self.id_user.chars().count() != 13 {
            return Err(RegistryError::Validation(
                "id_user must be exactly 13 characters".to_string(),
            ));
        }
        validate_full_name(&self.full_name)?;
        validate_short_id("card_number", &self.card_number)?;
        validate_short_id("car_plate", &self.car_plate)?;
        validate_brand(&self.brand)?;
        Ok(())
    }
}

/// The authorization PDF after it has been written to object storage.
#[derive(Debug)]
pub struct StoredDocument {
    pub id: Uuid,
    pub s3_key: String,
    pub original_name: String,
}

#[derive(Debug)]
pub struct Registration {
    pub user: User,
    pub card: ParkingCard,
    pub vehicle: Vehicle,
    pub document: Document,
}

/// Advisory duplicate checks against current persisted state. Run before
/// the registration transaction; the unique constraints remain the real
/// guarantee under concurrent registrations.
pub fn ensure_registrable(
    conn: &mut PgConnection,
    input: &RegistrationInput,
) -> Result<(), RegistryError> {
    let user_taken: bool =
        select(exists(users::table.filter(users::id.eq(&input.id_user)))).get_result(conn)?;
    if user_taken {
        return Err(RegistryError::Duplicate(format!(
            "user id {} already registered",
            input.id_user
        )));
    }

    let card_taken: bool = select(exists(
        parking_cards::table.filter(parking_cards::card_number.eq(&input.card_number)),
    ))
    .get_result(conn)?;
    if card_taken {
        return Err(RegistryError::Duplicate(format!(
            "card number {} already in use",
            input.card_number
        )));
    }

    let plate_taken: bool = select(exists(
        vehicles::table.filter(vehicles::plate.eq(&input.car_plate)),
    ))
    .get_result(conn)?;
    if plate_taken {
        return Err(RegistryError::Duplicate(format!(
            "vehicle plate {} already registered",
            input.car_plate
        )));
    }

    Ok(())
}

/// Creates user, card, vehicle, and document in dependency order inside
/// one transaction. Any failure rolls the whole set back; a unique
/// violation that raced past `ensure_registrable` surfaces as `Duplicate`.
pub fn register(
    conn: &mut PgConnection,
    input: RegistrationInput,
    stored: StoredDocument,
) -> Result<Registration, RegistryError> {
    input.validate()?;

    conn.transaction(|conn| {
        let new_user = NewUser {
            id: input.id_user.clone(),
            full_name: input.full_name.clone(),
            slug: user_slug(&input.full_name, &input.id_user),
        };
        diesel::insert_into(users::table)
            .values(&new_user)
            .execute(conn)
            .map_err(|err| {
                map_unique(err, format!("user id {} already registered", input.id_user))
            })?;

        let new_card = NewParkingCard {
            card_number: input.card_number.clone(),
            user_id: input.id_user.clone(),
            slug: card_slug(&input.card_number),
            state: input.state.as_str().to_string(),
        };
        diesel::insert_into(parking_cards::table)
            .values(&new_card)
            .execute(conn)
            .map_err(|err| {
                map_unique(
                    err,
                    format!("card number {} already in use", input.card_number),
                )
            })?;

        let new_vehicle = NewVehicle {
            plate: input.car_plate.clone(),
            card_number: input.card_number.clone(),
            brand: input.brand.clone(),
        };
        diesel::insert_into(vehicles::table)
            .values(&new_vehicle)
            .execute(conn)
            .map_err(|err| {
                map_unique(
                    err,
                    format!("vehicle plate {} already registered", input.car_plate),
                )
            })?;

        let new_document = NewDocument {
            id: stored.id,
            card_number: input.card_number.clone(),
            s3_key: stored.s3_key.clone(),
            original_name: stored.original_name.clone(),
        };
        diesel::insert_into(documents::table)
            .values(&new_document)
            .execute(conn)?;

        let user: User = users::table.find(&input.id_user).first(conn)?;
        let card: ParkingCard = parking_cards::table.find(&input.card_number).first(conn)?;
        let vehicle: Vehicle = vehicles::table.find(&input.car_plate).first(conn)?;
        let document: Document = documents::table.find(stored.id).first(conn)?;

        Ok(Registration {
            user,
            card,
            vehicle,
            document,
        })
    })
}

/// Partial field set accepted by the unified writer. Absent fields leave
/// their owning entity untouched.
#[derive(Debug, Default)]
pub struct UpdateFields {
    pub full_name: Option<String>,
    pub state: Option<CardState>,
    pub car_plate: Option<String>,
    pub brand: Option<String>,
}

impl UpdateFields {
    pub fn validate(&self) -> Result<(), RegistryError> {
        if let Some(ref full_name) = self.full_name {
            validate_full_name(full_name)?;
        }
        if let Some(ref car_plate) = self.car_plate {
            validate_short_id("car_plate", car_plate)?;
        }
        if let Some(ref brand) = self.brand {
            validate_brand(brand)?;
        }
        Ok(())
    }

    fn touches_vehicle(&self) -> bool {
        self.car_plate.is_some() || self.brand.is_some()
    }
}

/// Applies the supplied fields across user, card, and vehicle inside one
/// transaction and returns the freshly re-resolved record. Vehicle (and,
/// for user-rooted updates, card) fields are silently skipped when the
/// related row does not exist.
pub fn apply_update(
    conn: &mut PgConnection,
    root: RootEntity,
    fields: UpdateFields,
) -> Result<ResolvedRecord, RegistryError> {
    fields.validate()?;

    let rooted_at_user = matches!(root, RootEntity::User(_));
    let root_pk = match &root {
        RootEntity::User(user) => user.id.clone(),
        RootEntity::Card(card) => card.card_number.clone(),
    };
    let resolved = resolve(conn, root)?;

    if let Some(ref plate) = fields.car_plate {
        let current_plate = resolved.vehicle.as_ref().map(|vehicle| vehicle.plate.as_str());
        if current_plate != Some(plate.as_str()) {
            let taken: bool = select(exists(vehicles::table.filter(vehicles::plate.eq(plate))))
                .get_result(conn)?;
            if taken {
                return Err(RegistryError::Duplicate(format!(
                    "vehicle plate {plate} already registered"
                )));
            }
        }
    }

    conn.transaction(|conn| {
        if let Some(ref full_name) = fields.full_name {
            diesel::update(users::table.find(&resolved.user.id))
                .set(users::full_name.eq(full_name))
                .execute(conn)?;
        }

        if let Some(state) = fields.state {
            if let Some(ref card) = resolved.card {
                diesel::update(parking_cards::table.find(&card.card_number))
                    .set(parking_cards::state.eq(state.as_str()))
                    .execute(conn)?;
            }
        }

        if fields.touches_vehicle() {
            if let Some(ref vehicle) = resolved.vehicle {
                update_vehicle(conn, vehicle, &fields)?;
            }
        }

        Ok::<_, RegistryError>(())
    })?;

    let fresh_root = if rooted_at_user {
        user_root(conn, &root_pk)?
    } else {
        card_root(conn, &root_pk)?
    };
    resolve(conn, fresh_root)
}

// plate is the table's primary key, which AsChangeset skips, so the
// column pairs are set explicitly. One UPDATE covers both fields.
fn update_vehicle(
    conn: &mut PgConnection,
    vehicle: &Vehicle,
    fields: &UpdateFields,
) -> Result<(), RegistryError> {
    let target = vehicles::table.find(&vehicle.plate);
    let result = match (fields.car_plate.as_deref(), fields.brand.as_deref()) {
        (Some(plate), Some(brand)) => diesel::update(target)
            .set((vehicles::plate.eq(plate), vehicles::brand.eq(brand)))
            .execute(conn),
        (Some(plate), None) => diesel::update(target)
            .set(vehicles::plate.eq(plate))
            .execute(conn),
        (None, Some(brand)) => diesel::update(target)
            .set(vehicles::brand.eq(brand))
            .execute(conn),
        (None, None) => return Ok(()),
    };
    result.map_err(|err| {
        let plate = fields.car_plate.as_deref().unwrap_or(&vehicle.plate);
        map_unique(err, format!("vehicle plate {plate} already registered"))
    })?;
    Ok(())
}

fn map_unique(err: diesel::result::Error, message: String) -> RegistryError {
    match err {
        diesel::result::Error::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
            RegistryError::Duplicate(message)
        }
        other => RegistryError::Database(other),
    }
}

fn validate_full_name(full_name: &str) -> Result<(), RegistryError> {
    if full_name.trim().is_empty() {
        return Err(RegistryError::Validation(
            "full_name must not be empty".to_string(),
        ));
    }
    if full_name.chars().count() > 100 {
        return Err(RegistryError::Validation(
            "full_name must be at most 100 characters".to_string(),
        ));
    }
    Ok(())
}

fn validate_brand(brand: &str) -> Result<(), RegistryError> {
    if brand.trim().is_empty() {
        return Err(RegistryError::Validation(
            "brand must not be empty".to_string(),
        ));
    }
    if brand.chars().count() > 50 {
        return Err(RegistryError::Validation(
            "brand must be at most 50 characters".to_string(),
        ));
    }
    Ok(())
}

fn validate_short_id(field: &str, value: &str) -> Result<(), RegistryError> {
    let len = value.chars().count();
    if !(6..=8).contains(&len) {
        return Err(RegistryError::Validation(format!(
            "{field} must be between 6 and 8 characters"
        )));
    }
    Ok(())
}

fn user_slug(full_name: &str, user_id: &str) -> String {
    format!(
        "{}-{}",
        full_name.trim().to_lowercase().replace(' ', "-"),
        user_id
    )
}

fn card_slug(card_number: &str) -> String {
    format!("card-{card_number}")
}

fn to_iso(dt: NaiveDateTime) -> String {
    DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc).to_rfc3339()
}
