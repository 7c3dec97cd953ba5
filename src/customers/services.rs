use time::{Date, OffsetDateTime};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use super::dto::{CustomerForm, ValidationErrors};
use super::errors::CustomerError;
use super::repo::DuplicateKey;
use super::repo_types::Customer;
use super::validation::{taken_message, validate};
use crate::images::services::{delete_image, is_owned_asset, store_image};
use crate::state::AppState;

fn today() -> Date {
    OffsetDateTime::now_utc().date()
}

/// Turns a repository failure into a domain error. Unique-constraint hits
/// from the store surface the same way as the validation-layer check.
fn repo_error(e: anyhow::Error) -> CustomerError {
    if let Some(dup) = e.downcast_ref::<DuplicateKey>() {
        let mut errors = ValidationErrors::default();
        errors.add(dup.field.name(), taken_message(dup.field));
        return CustomerError::Validation(errors);
    }
    CustomerError::Database(e)
}

/// Best-effort removal of an asset nobody references any more.
async fn discard_image(st: &AppState, reference: &str) {
    if let Err(e) = delete_image(st, reference).await {
        let cause = format!("{:#}", e);
        error!(error = %cause, %reference, "orphaned image left in storage");
    }
}

#[instrument(skip(st))]
pub async fn list_customers(st: &AppState) -> Result<Vec<Customer>, CustomerError> {
    st.customers.list().await.map_err(CustomerError::Database)
}

#[instrument(skip(st))]
pub async fn get_customer(st: &AppState, id: Uuid) -> Result<Customer, CustomerError> {
    st.customers
        .find(id)
        .await
        .map_err(CustomerError::Database)?
        .ok_or(CustomerError::NotFound(id))
}

#[instrument(skip(st, form))]
pub async fn create_customer(st: &AppState, form: CustomerForm) -> Result<Customer, CustomerError> {
    let valid = validate(st.customers.as_ref(), &form, None, today()).await?;

    let image = match &valid.image {
        Some(upload) => Some(store_image(st, upload).await.map_err(CustomerError::Storage)?),
        None => None,
    };

    let id = Uuid::new_v4();
    match st.customers.insert(id, &valid.fields, image.as_deref()).await {
        Ok(customer) => {
            info!(customer_id = %customer.id, email = %customer.email, "customer created");
            Ok(customer)
        }
        Err(e) => {
            if let Some(reference) = &image {
                discard_image(st, reference).await;
            }
            Err(repo_error(e))
        }
    }
}

/// Validates against the current record, optionally swaps the image, and
/// returns the new snapshot. A replaced upload is removed after the write.
#[instrument(skip(st, form))]
pub async fn update_customer(
    st: &AppState,
    id: Uuid,
    form: CustomerForm,
) -> Result<Customer, CustomerError> {
    get_customer(st, id).await?;
    let valid = validate(st.customers.as_ref(), &form, Some(id), today()).await?;

    let image = match &valid.image {
        Some(upload) => Some(store_image(st, upload).await.map_err(CustomerError::Storage)?),
        None => None,
    };

    let updated = match st.customers.update(id, &valid.fields, image.as_deref()).await {
        Ok(Some(updated)) => updated,
        Ok(None) => {
            if let Some(reference) = &image {
                discard_image(st, reference).await;
            }
            return Err(CustomerError::NotFound(id));
        }
        Err(e) => {
            if let Some(reference) = &image {
                discard_image(st, reference).await;
            }
            return Err(repo_error(e));
        }
    };

    if let Some(old) = updated.replaced_image.as_deref() {
        if is_owned_asset(Some(old)) && Some(old) != image.as_deref() {
            discard_image(st, old).await;
        }
    }

    info!(customer_id = %id, "customer updated");
    Ok(updated.customer)
}

/// Deletes the row first, then the image it owned. If the asset removal
/// fails the record is still gone and the file is left orphaned.
#[instrument(skip(st))]
pub async fn delete_customer(st: &AppState, id: Uuid) -> Result<Customer, CustomerError> {
    let removed = st
        .customers
        .delete(id)
        .await
        .map_err(CustomerError::Database)?
        .ok_or(CustomerError::NotFound(id))?;

    match removed.image.as_deref() {
        Some(reference) if is_owned_asset(Some(reference)) => discard_image(st, reference).await,
        Some(reference) => warn!(%reference, "image is not an owned upload; left in place"),
        None => {}
    }

    info!(customer_id = %id, "customer deleted");
    Ok(removed)
}
