use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::schema::*;

/// Lifecycle state of a parking card. A flat enumerated field; any state
/// may be set to any other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardState {
    Active,
    Inactive,
    Expired,
}

impl CardState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CardState::Active => "active",
            CardState::Inactive => "inactive",
            CardState::Expired => "expired",
        }
    }
}

impl Default for CardState {
    fn default() -> Self {
        CardState::Active
    }
}

impl fmt::Display for CardState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CardState {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "active" => Ok(CardState::Active),
            "inactive" => Ok(CardState::Inactive),
            "expired" => Ok(CardState::Expired),
            other => Err(format!(
                "state must be one of active, inactive, expired (got {other:?})"
            )),
        }
    }
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = users)]
pub struct User {
    pub id: String,
    pub full_name: String,
    pub slug: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub id: String,
    pub full_name: String,
    pub slug: String,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = parking_cards)]
#[diesel(primary_key(card_number))]
#[diesel(belongs_to(User, foreign_key = user_id))]
pub struct ParkingCard {
    pub card_number: String,
    pub user_id: String,
    pub slug: String,
    pub state: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = parking_cards)]
pub struct NewParkingCard {
    pub card_number: String,
    pub user_id: String,
    pub slug: String,
    pub state: String,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = vehicles)]
#[diesel(primary_key(plate))]
#[diesel(belongs_to(ParkingCard, foreign_key = card_number))]
pub struct Vehicle {
    pub plate: String,
    pub card_number: String,
    pub brand: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = vehicles)]
pub struct NewVehicle {
    pub plate: String,
    pub card_number: String,
    pub brand: String,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = documents)]
#[diesel(belongs_to(ParkingCard, foreign_key = card_number))]
pub struct Document {
    pub id: Uuid,
    pub card_number: String,
    pub s3_key: String,
    pub original_name: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = documents)]
pub struct NewDocument {
    pub id: Uuid,
    pub card_number: String,
    pub s3_key: String,
    pub original_name: String,
}
