use askama::Template;
use time::macros::format_description;
use uuid::Uuid;

use super::dto::{CustomerForm, ValidationErrors};
use super::repo_types::Customer;
use super::validation::FormKind;

fn fmt_date(c: &Customer) -> String {
    c.date_of_birth
        .and_then(|d| d.format(format_description!("[year]-[month]-[day]")).ok())
        .unwrap_or_default()
}

/// One row of the customers table.
pub struct CustomerRow {
    pub number: usize,
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: String,
    pub phone: String,
    pub email: String,
    pub account_number: String,
    pub image: String,
}

#[derive(Template)]
#[template(path = "customers/index.html")]
pub struct IndexPage {
    pub flash: String,
    pub customers: Vec<CustomerRow>,
}

impl IndexPage {
    pub fn new(customers: &[Customer], flash: Option<&str>) -> Self {
        Self {
            flash: flash.unwrap_or_default().to_string(),
            customers: customers
                .iter()
                .enumerate()
                .map(|(i, c)| CustomerRow {
                    number: i + 1,
                    id: c.id,
                    first_name: c.first_name.clone(),
                    last_name: c.last_name.clone(),
                    date_of_birth: fmt_date(c),
                    phone: c.phone.clone(),
                    email: c.email.clone(),
                    account_number: c.account_number.clone(),
                    image: c.image_path().to_string(),
                })
                .collect(),
        }
    }
}

#[derive(Template)]
#[template(path = "customers/detail.html")]
pub struct DetailPage {
    pub id: Uuid,
    pub full_name: String,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: String,
    pub email: String,
    pub phone: String,
    pub account_number: String,
    pub about: String,
    pub image: String,
}

impl From<&Customer> for DetailPage {
    fn from(c: &Customer) -> Self {
        Self {
            id: c.id,
            full_name: c.full_name(),
            first_name: c.first_name.clone(),
            last_name: c.last_name.clone(),
            date_of_birth: fmt_date(c),
            email: c.email.clone(),
            phone: c.phone.clone(),
            account_number: c.account_number.clone(),
            about: c.about.clone().unwrap_or_default(),
            image: c.image_path().to_string(),
        }
    }
}

/// A single input on the customer form with its submitted value and errors.
pub struct FormField {
    pub name: &'static str,
    pub label: &'static str,
    pub input_type: &'static str,
    pub value: String,
    pub errors: Vec<String>,
    pub required: bool,
}

#[derive(Template)]
#[template(path = "customers/form.html")]
pub struct FormPage {
    pub heading: String,
    pub action: String,
    /// Method override sent as `_method`; empty for plain POST.
    pub method: &'static str,
    pub submit_label: &'static str,
    pub fields: Vec<FormField>,
    pub image: String,
    pub image_errors: Vec<String>,
}

const FIELDS: [(&str, &str, &str, bool); 7] = [
    ("first_name", "First Name", "text", true),
    ("last_name", "Last Name", "text", true),
    ("date_of_birth", "Date of Birth", "date", false),
    ("email", "Email", "email", true),
    ("phone", "Phone Number", "text", true),
    ("account_number", "Bank Account Number", "text", true),
    ("about", "About", "textarea", false),
];

fn form_fields(form: &CustomerForm, errors: &ValidationErrors, kind: FormKind) -> Vec<FormField> {
    FIELDS
        .iter()
        .map(|&(name, label, input_type, required)| {
            let value = match name {
                "first_name" => &form.first_name,
                "last_name" => &form.last_name,
                "date_of_birth" => &form.date_of_birth,
                "email" => &form.email,
                "phone" => &form.phone,
                "account_number" => &form.account_number,
                _ => &form.about,
            };
            FormField {
                name,
                label,
                input_type,
                value: value.clone().unwrap_or_default(),
                errors: errors.get(name).to_vec(),
                required: required || (name == "date_of_birth" && kind == FormKind::Update),
            }
        })
        .collect()
}

impl FormPage {
    pub fn create(form: &CustomerForm, errors: &ValidationErrors) -> Self {
        Self {
            heading: "Create Customer".into(),
            action: "/customers".into(),
            method: "",
            submit_label: "Save",
            fields: form_fields(form, errors, FormKind::Create),
            image: String::new(),
            image_errors: errors.get("image").to_vec(),
        }
    }

    pub fn edit(customer: &Customer, form: &CustomerForm, errors: &ValidationErrors) -> Self {
        Self {
            heading: format!("Edit {}", customer.full_name()),
            action: format!("/customers/{}", customer.id),
            method: "PUT",
            submit_label: "Update",
            fields: form_fields(form, errors, FormKind::Update),
            image: customer.image_path().to_string(),
            image_errors: errors.get("image").to_vec(),
        }
    }
}

#[derive(Template)]
#[template(path = "not_found.html")]
pub struct NotFoundPage {
    pub message: String,
}

#[derive(Template)]
#[template(path = "error.html")]
pub struct ErrorPage {
    pub message: String,
}
