//! Form validation rules for user records.
//!
//! Rules live in a static table of per-field checks evaluated uniformly over
//! the candidate record. A field reports at most one message: the required
//! check first, then its format check.

use std::sync::LazyLock;

use regex::Regex;

use crate::{Field, UserRecord, ValidationErrors};

/// Minimum length, in characters, for first and last names.
pub const NAME_MIN_LEN: usize = 5;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$",
    )
    .unwrap_or_else(|error| panic!("email regex failed to compile: {error}"))
});

static MOBILE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9]{10}$")
        .unwrap_or_else(|error| panic!("mobile regex failed to compile: {error}"))
});

static ZIP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9]{6}$").unwrap_or_else(|error| panic!("zip regex failed to compile: {error}"))
});

/// A format check applied once the field is known to be present.
pub struct Check {
    pub test: fn(&str) -> bool,
    pub message: &'static str,
}

/// Validation rule for one field.
pub struct FieldRule {
    pub field: Field,
    /// Message when the field is empty; `None` for optional fields.
    pub required: Option<&'static str>,
    pub check: Option<Check>,
}

pub fn is_valid_email(s: &str) -> bool {
    EMAIL_RE.is_match(s)
}

pub fn is_valid_mobile(s: &str) -> bool {
    MOBILE_RE.is_match(s)
}

pub fn is_valid_zip(s: &str) -> bool {
    ZIP_RE.is_match(s)
}

fn long_enough(s: &str) -> bool {
    s.chars().count() >= NAME_MIN_LEN
}

pub static RULES: [FieldRule; 10] = [
    FieldRule {
        field: Field::FirstName,
        required: Some("First Name is required"),
        check: Some(Check {
            test: long_enough,
            message: "firstname must be at least 5 characters",
        }),
    },
    FieldRule {
        field: Field::LastName,
        required: Some("Last Name is required"),
        check: Some(Check {
            test: long_enough,
            message: "lastname must be at least 5 characters",
        }),
    },
    FieldRule {
        field: Field::Email,
        required: Some("Email is required"),
        check: Some(Check {
            test: is_valid_email,
            message: "Invalid email format",
        }),
    },
    FieldRule {
        field: Field::MobileNumber,
        required: Some("Mobile Number is required"),
        check: Some(Check {
            test: is_valid_mobile,
            message: "Invalid mobile number format",
        }),
    },
    FieldRule {
        field: Field::AddressLine1,
        required: Some("Address 1 is required"),
        check: None,
    },
    FieldRule {
        field: Field::AddressLine2,
        required: None,
        check: None,
    },
    FieldRule {
        field: Field::State,
        required: Some("State is required"),
        check: None,
    },
    FieldRule {
        field: Field::City,
        required: Some("City is required"),
        check: None,
    },
    FieldRule {
        field: Field::Country,
        required: Some("Country is required"),
        check: None,
    },
    FieldRule {
        field: Field::ZipCode,
        required: Some("Zip Code is required"),
        check: Some(Check {
            test: is_valid_zip,
            message: "Invalid zipcode format",
        }),
    },
];

/// Evaluate every rule against `candidate`. An empty result means valid.
pub fn validate(candidate: &UserRecord) -> ValidationErrors {
    let mut errors = ValidationErrors::new();
    for rule in RULES.iter() {
        let value = candidate.field(rule.field);
        if value.is_empty() {
            if let Some(message) = rule.required {
                errors.insert(rule.field, message);
            }
            continue;
        }
        if let Some(check) = &rule.check {
            if !(check.test)(value) {
                errors.insert(rule.field, check.message);
            }
        }
    }
    errors
}

/// Like [`validate`] but as a `Result`, for use with `?`.
pub fn validate_record(candidate: &UserRecord) -> Result<(), ValidationErrors> {
    let errors = validate(candidate);
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
