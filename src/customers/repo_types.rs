use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use crate::images::services::DEFAULT_IMAGE;

/// Customer record in the database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Customer {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: Option<Date>,
    pub email: String,
    pub phone: String,
    pub account_number: String,
    pub about: Option<String>,
    pub image: Option<String>, // NULL → placeholder
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl Customer {
    /// The image to display, falling back to the shared placeholder.
    pub fn image_path(&self) -> &str {
        self.image.as_deref().unwrap_or(DEFAULT_IMAGE)
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Validated, normalized values written on create and update.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomerFields {
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: Option<Date>,
    pub email: String,
    pub phone: String,
    pub account_number: String,
    pub about: Option<String>,
}

/// Columns carrying a `UNIQUE` constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueField {
    Email,
    Phone,
}

impl UniqueField {
    pub fn name(self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Phone => "phone",
        }
    }

    #[cfg(test)]
    pub fn of(self, fields: &CustomerFields) -> &str {
        match self {
            Self::Email => &fields.email,
            Self::Phone => &fields.phone,
        }
    }
}

/// Result of an update: the fresh snapshot plus the image it displaced, if any.
#[derive(Debug, Clone)]
pub struct UpdatedCustomer {
    pub customer: Customer,
    pub replaced_image: Option<String>,
}
