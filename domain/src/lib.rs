//! Domain library for the profile registry.
//!
//! Holds the user record types, the blob-store port, the record store, the
//! validation rules and the error definitions. Keep HTTP and database concerns
//! out of this crate; they live in the adapter and app crates.

use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Deserializer, Serialize};

/// Key under which the serialized user collection is stored.
pub const USERS_KEY: &str = "users";

/// A single user's profile entry.
///
/// Serialized with the storage keys the browser form has always written
/// (`firstname`, `addressOne`, `zipcode`, ...); camelCase names are accepted
/// as aliases on input. Missing fields deserialize to empty strings so a
/// partially filled form can still be validated.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserRecord {
    #[serde(rename = "firstname", alias = "firstName")]
    pub first_name: String,
    #[serde(rename = "lastname", alias = "lastName")]
    pub last_name: String,
    pub email: String,
    #[serde(rename = "mobileNumber", alias = "mobile_number")]
    pub mobile_number: String,
    #[serde(rename = "addressOne", alias = "addressLine1")]
    pub address_line1: String,
    #[serde(
        rename = "addressTwo",
        alias = "addressLine2",
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub address_line2: Option<String>,
    pub country: String,
    pub state: String,
    pub city: String,
    #[serde(rename = "zipcode", alias = "zipCode")]
    pub zip_code: String,
}

impl UserRecord {
    /// Value of a text field by name. `AddressLine2` yields "" when unset.
    pub fn field(&self, field: Field) -> &str {
        match field {
            Field::FirstName => self.first_name.as_str(),
            Field::LastName => self.last_name.as_str(),
            Field::Email => self.email.as_str(),
            Field::MobileNumber => self.mobile_number.as_str(),
            Field::AddressLine1 => self.address_line1.as_str(),
            Field::AddressLine2 => self.address_line2.as_deref().unwrap_or(""),
            Field::Country => self.country.as_str(),
            Field::State => self.state.as_str(),
            Field::City => self.city.as_str(),
            Field::ZipCode => self.zip_code.as_str(),
        }
    }
}

/// Partial update for a [`UserRecord`]. `None` means "not supplied".
///
/// `address_line2` is doubly optional so a patch can clear it:
/// absent leaves it alone, `null` or `""` clears it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct UserPatch {
    #[serde(rename = "firstname", alias = "firstName")]
    pub first_name: Option<String>,
    #[serde(rename = "lastname", alias = "lastName")]
    pub last_name: Option<String>,
    pub email: Option<String>,
    #[serde(rename = "mobileNumber", alias = "mobile_number")]
    pub mobile_number: Option<String>,
    #[serde(rename = "addressOne", alias = "addressLine1")]
    pub address_line1: Option<String>,
    #[serde(
        rename = "addressTwo",
        alias = "addressLine2",
        deserialize_with = "supplied_or_cleared"
    )]
    pub address_line2: Option<Option<String>>,
    pub country: Option<String>,
    pub state: Option<String>,
    pub city: Option<String>,
    #[serde(rename = "zipcode", alias = "zipCode")]
    pub zip_code: Option<String>,
}

impl UserPatch {
    /// True when no field is supplied.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Overwrite the supplied fields of `record`, leaving the rest untouched.
    pub fn apply_to(&self, record: &mut UserRecord) {
        fn set(slot: &mut String, value: &Option<String>) {
            if let Some(v) = value {
                slot.clone_from(v);
            }
        }
        set(&mut record.first_name, &self.first_name);
        set(&mut record.last_name, &self.last_name);
        set(&mut record.email, &self.email);
        set(&mut record.mobile_number, &self.mobile_number);
        set(&mut record.address_line1, &self.address_line1);
        if let Some(line2) = &self.address_line2 {
            record.address_line2.clone_from(line2);
        }
        set(&mut record.country, &self.country);
        set(&mut record.state, &self.state);
        set(&mut record.city, &self.city);
        set(&mut record.zip_code, &self.zip_code);
    }
}

fn empty_as_none<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    let value = Option::<String>::deserialize(d)?;
    Ok(value.filter(|s| !s.is_empty()))
}

// Only called when the key is present; absent keys fall back to the default (None).
fn supplied_or_cleared<'de, D: Deserializer<'de>>(
    d: D,
) -> Result<Option<Option<String>>, D::Error> {
    empty_as_none(d).map(Some)
}

/// Form fields of a [`UserRecord`], in form order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Field {
    #[serde(rename = "firstname")]
    FirstName,
    #[serde(rename = "lastname")]
    LastName,
    #[serde(rename = "email")]
    Email,
    #[serde(rename = "mobileNumber")]
    MobileNumber,
    #[serde(rename = "addressOne")]
    AddressLine1,
    #[serde(rename = "addressTwo")]
    AddressLine2,
    #[serde(rename = "country")]
    Country,
    #[serde(rename = "state")]
    State,
    #[serde(rename = "city")]
    City,
    #[serde(rename = "zipcode")]
    ZipCode,
}

impl Field {
    /// Key used in the serialized record and in error maps.
    pub fn as_str(&self) -> &'static str {
        match self {
            Field::FirstName => "firstname",
            Field::LastName => "lastname",
            Field::Email => "email",
            Field::MobileNumber => "mobileNumber",
            Field::AddressLine1 => "addressOne",
            Field::AddressLine2 => "addressTwo",
            Field::Country => "country",
            Field::State => "state",
            Field::City => "city",
            Field::ZipCode => "zipcode",
        }
    }
}

/// Field-level validation messages, ordered by form position. Empty means valid.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<Field, String>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, field: Field, message: impl Into<String>) {
        self.0.insert(field, message.into());
    }

    pub fn get(&self, field: Field) -> Option<&str> {
        self.0.get(&field).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Field, &str)> {
        self.0.iter().map(|(f, m)| (*f, m.as_str()))
    }
}

impl Display for ValidationErrors {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for (field, message) in self.iter() {
            if !first {
                write!(f, "; ")?;
            }
            write!(f, "{}: {}", field.as_str(), message)?;
            first = false;
        }
        Ok(())
    }
}

/// Persistent key-value storage holding serialized blobs.
pub trait BlobStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, CoreError>;
    fn set(&self, key: &str, value: &str) -> Result<(), CoreError>;
}

impl<B: BlobStore + ?Sized> BlobStore for std::sync::Arc<B> {
    fn get(&self, key: &str) -> Result<Option<String>, CoreError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), CoreError> {
        (**self).set(key, value)
    }
}

/// Core domain errors.
#[derive(Debug)]
pub enum CoreError {
    Validation(ValidationErrors),
    NotFound,
    AlreadyExists,
    Serialization(String),
    Repository(String),
}

impl Display for CoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            CoreError::Validation(errors) => write!(f, "validation failed: {}", errors),
            CoreError::NotFound => write!(f, "not found"),
            CoreError::AlreadyExists => write!(f, "resource already exists"),
            CoreError::Serialization(msg) => write!(f, "serialization error: {}", msg),
            CoreError::Repository(msg) => write!(f, "repository error: {}", msg),
        }
    }
}

impl Error for CoreError {}

/// Return a short about/version line for binaries to log at startup.
pub fn about() -> String {
    let pkg = env!("CARGO_PKG_NAME");
    let ver = env!("CARGO_PKG_VERSION");
    format!("{} v{} - profile registry domain", pkg, ver)
}

pub mod adapters;
pub mod service;
pub mod store;
pub mod validate;
