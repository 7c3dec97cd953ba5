use lazy_static::lazy_static;
use regex::Regex;
use time::{macros::format_description, Date};
use tracing::debug;
use uuid::Uuid;

use super::dto::{CustomerForm, ValidationErrors};
use super::errors::CustomerError;
use super::repo::CustomerRepository;
use super::repo_types::{CustomerFields, UniqueField};
use crate::images::services::{ImageKind, ImageUpload, UploadItem, MAX_IMAGE_BYTES};

/// Which rule set a submission is checked against. Updates additionally
/// require a date of birth; on create it is optional.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormKind {
    Create,
    Update,
}

/// A submission that passed every rule.
#[derive(Debug, Clone)]
pub struct ValidatedCustomer {
    pub fields: CustomerFields,
    pub image: Option<ImageUpload>,
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn is_numeric(value: &str) -> bool {
    lazy_static! {
        static ref NUMERIC_RE: Regex =
            Regex::new(r"^[+-]?(\d+\.?\d*|\.\d+)([eE][+-]?\d+)?$").unwrap();
    }
    NUMERIC_RE.is_match(value)
}

fn label(field: &str) -> String {
    field.replace('_', " ")
}

/// Trimmed value, `None` when missing or blank.
fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn required<'a>(errors: &mut ValidationErrors, field: &str, value: &'a Option<String>) -> Option<&'a str> {
    let v = present(value);
    if v.is_none() {
        errors.add(field, format!("The {} field is required.", label(field)));
    }
    v
}

fn length_between(errors: &mut ValidationErrors, field: &str, value: &str, min: usize, max: usize) {
    let len = value.chars().count();
    if len < min {
        errors.add(
            field,
            format!("The {} field must be at least {} characters.", label(field), min),
        );
    }
    if len > max {
        errors.add(
            field,
            format!("The {} field must not be greater than {} characters.", label(field), max),
        );
    }
}

fn numeric_digits(errors: &mut ValidationErrors, field: &str, value: &str, min: usize, max: usize) {
    if !is_numeric(value) {
        errors.add(field, format!("The {} field must be a number.", label(field)));
    }
    let digits_only = value.bytes().all(|b| b.is_ascii_digit());
    if !digits_only || value.len() < min || value.len() > max {
        errors.add(
            field,
            format!("The {} field must be between {} and {} digits.", label(field), min, max),
        );
    }
}

fn date_before(errors: &mut ValidationErrors, field: &str, value: &str, today: Date) -> Option<Date> {
    match Date::parse(value, format_description!("[year]-[month]-[day]")) {
        Ok(date) if date < today => Some(date),
        Ok(_) => {
            errors.add(field, format!("The {} field must be a date before today.", label(field)));
            None
        }
        Err(_) => {
            errors.add(field, format!("The {} field must be a valid date.", label(field)));
            errors.add(field, format!("The {} field must be a date before today.", label(field)));
            None
        }
    }
}

/// Also used when an upload is cut off before it is fully read.
pub fn image_too_large(errors: &mut ValidationErrors) {
    errors.add(
        "image",
        format!("The image field must not be greater than {} kilobytes.", MAX_IMAGE_BYTES / 1024),
    );
}

fn check_image(errors: &mut ValidationErrors, item: &UploadItem) -> Option<ImageUpload> {
    let before = errors.get("image").len();
    let kind = ImageKind::sniff(&item.body);
    if kind.is_none() {
        errors.add("image", "The image field must be an image.");
    }
    if !kind.map(ImageKind::is_accepted).unwrap_or(false) {
        errors.add("image", "The image field must be a file of type: jpeg, png, jpg, gif, svg.");
    }
    if item.body.len() > MAX_IMAGE_BYTES {
        image_too_large(errors);
    }
    match kind {
        Some(kind) if errors.get("image").len() == before => Some(ImageUpload {
            body: item.body.clone(),
            file_name: item.file_name.clone(),
            kind,
        }),
        _ => None,
    }
}

/// Applies every field rule that needs no store access and collects all violations.
pub fn check_fields(
    form: &CustomerForm,
    kind: FormKind,
    today: Date,
) -> Result<ValidatedCustomer, ValidationErrors> {
    let mut errors = ValidationErrors::default();

    let image = form.image.as_ref().and_then(|item| check_image(&mut errors, item));

    let first_name = required(&mut errors, "first_name", &form.first_name);
    if let Some(v) = first_name {
        length_between(&mut errors, "first_name", v, 2, 50);
    }

    let last_name = required(&mut errors, "last_name", &form.last_name);
    if let Some(v) = last_name {
        length_between(&mut errors, "last_name", v, 2, 50);
    }

    let dob_raw = match kind {
        FormKind::Create => present(&form.date_of_birth),
        FormKind::Update => required(&mut errors, "date_of_birth", &form.date_of_birth),
    };
    // a supplied date is always checked, even where it may be left out
    let date_of_birth = dob_raw.and_then(|v| date_before(&mut errors, "date_of_birth", v, today));

    let email = required(&mut errors, "email", &form.email);
    if let Some(v) = email {
        if !is_valid_email(v) {
            errors.add("email", "The email field must be a valid email address.");
        }
        if v.chars().count() > 255 {
            errors.add("email", "The email field must not be greater than 255 characters.");
        }
    }

    let phone = required(&mut errors, "phone", &form.phone);
    if let Some(v) = phone {
        numeric_digits(&mut errors, "phone", v, 10, 12);
    }

    let account_number = required(&mut errors, "account_number", &form.account_number);
    if let Some(v) = account_number {
        numeric_digits(&mut errors, "account_number", v, 5, 10);
    }

    let about = present(&form.about);
    if let Some(v) = about {
        if v.chars().count() > 500 {
            errors.add("about", "The about field must not be greater than 500 characters.");
        }
    }

    match (first_name, last_name, email, phone, account_number) {
        (Some(first_name), Some(last_name), Some(email), Some(phone), Some(account_number))
            if errors.is_empty() =>
        {
            Ok(ValidatedCustomer {
                fields: CustomerFields {
                    first_name: first_name.to_string(),
                    last_name: last_name.to_string(),
                    date_of_birth,
                    email: email.to_string(),
                    phone: phone.to_string(),
                    account_number: account_number.to_string(),
                    about: about.map(str::to_string),
                },
                image,
            })
        }
        _ => Err(errors),
    }
}

/// Full rule set: field rules plus uniqueness of email and phone, skipping `except`.
/// `except` marks an update. Only reads from the repository.
pub async fn validate(
    repo: &dyn CustomerRepository,
    form: &CustomerForm,
    except: Option<Uuid>,
    today: Date,
) -> Result<ValidatedCustomer, CustomerError> {
    let kind = if except.is_some() {
        FormKind::Update
    } else {
        FormKind::Create
    };
    let checked = check_fields(form, kind, today);
    let mut errors = match &checked {
        Ok(_) => ValidationErrors::default(),
        Err(errors) => errors.clone(),
    };

    for field in [UniqueField::Email, UniqueField::Phone] {
        if errors.has(field.name()) {
            continue;
        }
        let value = match field {
            UniqueField::Email => present(&form.email),
            UniqueField::Phone => present(&form.phone),
        };
        let Some(value) = value else { continue };
        let taken = repo
            .is_taken(field, value, except)
            .await
            .map_err(CustomerError::Database)?;
        if taken {
            debug!(field = field.name(), "unique value already taken");
            errors.add(field.name(), taken_message(field));
        }
    }

    match checked {
        Ok(valid) if errors.is_empty() => Ok(valid),
        _ => Err(CustomerError::Validation(errors)),
    }
}

pub fn taken_message(field: UniqueField) -> String {
    format!("The {} has already been taken.", field.name())
}
