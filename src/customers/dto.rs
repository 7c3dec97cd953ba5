use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use time::macros::format_description;

use super::repo_types::Customer;
use crate::images::services::UploadItem;

/// Raw values submitted by the customer form. Nothing here is trusted yet.
#[derive(Debug, Clone, Default)]
pub struct CustomerForm {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub date_of_birth: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub account_number: Option<String>,
    pub about: Option<String>,
    pub image: Option<UploadItem>,
}

impl CustomerForm {
    /// Stores a text part by its form name. Unknown names are ignored.
    pub fn set(&mut self, name: &str, value: String) {
        let slot = match name {
            "first_name" => &mut self.first_name,
            "last_name" => &mut self.last_name,
            "date_of_birth" => &mut self.date_of_birth,
            "email" => &mut self.email,
            "phone" => &mut self.phone,
            "account_number" => &mut self.account_number,
            "about" => &mut self.about,
            _ => return,
        };
        *slot = Some(value);
    }

    /// Prefills the edit form from a stored record.
    pub fn from_customer(c: &Customer) -> Self {
        let dob = c
            .date_of_birth
            .and_then(|d| d.format(format_description!("[year]-[month]-[day]")).ok());
        Self {
            first_name: Some(c.first_name.clone()),
            last_name: Some(c.last_name.clone()),
            date_of_birth: dob,
            email: Some(c.email.clone()),
            phone: Some(c.phone.clone()),
            account_number: Some(c.account_number.clone()),
            about: c.about.clone(),
            image: None,
        }
    }
}

/// Field name → violation messages, in rule order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationErrors(BTreeMap<String, Vec<String>>);

impl ValidationErrors {
    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn has(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn get(&self, field: &str) -> &[String] {
        self.0.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn fields(&self) -> Vec<&str> {
        self.0.keys().map(String::as_str).collect()
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, messages) in &self.0 {
            for m in messages {
                if !first {
                    f.write_str("; ")?;
                }
                write!(f, "{}: {}", field, m)?;
                first = false;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod dto_tests {
    use super::*;

    #[test]
    fn set_ignores_unknown_fields() {
        let mut form = CustomerForm::default();
        form.set("email", "ana@x.com".into());
        form.set("_token", "abc".into());
        assert_eq!(form.email.as_deref(), Some("ana@x.com"));
        assert!(form.first_name.is_none());
    }

    #[test]
    fn errors_collect_per_field_and_display_in_order() {
        let mut errors = ValidationErrors::default();
        errors.add("phone", "The phone field must be a number.");
        errors.add("email", "The email has already been taken.");
        errors.add("phone", "The phone field must be between 10 and 12 digits.");

        assert_eq!(errors.fields(), vec!["email", "phone"]);
        assert_eq!(errors.get("phone").len(), 2);
        assert!(errors.get("about").is_empty());
        assert_eq!(
            errors.to_string(),
            "email: The email has already been taken.; \
             phone: The phone field must be a number.; \
             phone: The phone field must be between 10 and 12 digits."
        );
    }

    #[test]
    fn errors_serialize_as_a_plain_map() {
        let mut errors = ValidationErrors::default();
        errors.add("email", "The email field is required.");
        let json = serde_json::to_value(&errors).unwrap();
        assert_eq!(json["email"][0], "The email field is required.");
    }
}
