use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

use super::repo_types::{Customer, CustomerFields, UniqueField, UpdatedCustomer};

/// Raised (inside `anyhow`) when the store rejects a write on a unique column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("duplicate value for {}", .field.name())]
pub struct DuplicateKey {
    pub field: UniqueField,
}

/// Persistence for customer records. Every method returns fresh snapshots.
#[async_trait]
pub trait CustomerRepository: Send + Sync {
    async fn list(&self) -> anyhow::Result<Vec<Customer>>;
    async fn find(&self, id: Uuid) -> anyhow::Result<Option<Customer>>;
    /// Whether a customer other than `except` already holds `value` in `field`.
    async fn is_taken(
        &self,
        field: UniqueField,
        value: &str,
        except: Option<Uuid>,
    ) -> anyhow::Result<bool>;
    async fn insert(
        &self,
        id: Uuid,
        fields: &CustomerFields,
        image: Option<&str>,
    ) -> anyhow::Result<Customer>;
    /// `image: None` keeps the current image. Returns `None` if `id` is unknown.
    async fn update(
        &self,
        id: Uuid,
        fields: &CustomerFields,
        image: Option<&str>,
    ) -> anyhow::Result<Option<UpdatedCustomer>>;
    /// Returns the removed record, `None` if `id` is unknown.
    async fn delete(&self, id: Uuid) -> anyhow::Result<Option<Customer>>;
}

const COLUMNS: &str = "id, first_name, last_name, date_of_birth, email, phone, account_number, \
                       about, image, created_at, updated_at";

#[derive(Clone)]
pub struct PgCustomerRepository {
    db: PgPool,
}

impl PgCustomerRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

fn map_write_error(e: sqlx::Error) -> anyhow::Error {
    if let sqlx::Error::Database(db_err) = &e {
        if db_err.is_unique_violation() {
            let field = match db_err.constraint() {
                Some("customers_email_unique") => Some(UniqueField::Email),
                Some("customers_phone_unique") => Some(UniqueField::Phone),
                _ => None,
            };
            if let Some(field) = field {
                return DuplicateKey { field }.into();
            }
        }
    }
    anyhow::Error::new(e)
}

#[async_trait]
impl CustomerRepository for PgCustomerRepository {
    async fn list(&self) -> anyhow::Result<Vec<Customer>> {
        let rows = sqlx::query_as::<_, Customer>(&format!(
            "SELECT {COLUMNS} FROM customers ORDER BY created_at DESC"
        ))
        .fetch_all(&self.db)
        .await
        .context("list customers")?;
        Ok(rows)
    }

    async fn find(&self, id: Uuid) -> anyhow::Result<Option<Customer>> {
        let row = sqlx::query_as::<_, Customer>(&format!(
            "SELECT {COLUMNS} FROM customers WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .context("find customer")?;
        Ok(row)
    }

    async fn is_taken(
        &self,
        field: UniqueField,
        value: &str,
        except: Option<Uuid>,
    ) -> anyhow::Result<bool> {
        let sql = match field {
            UniqueField::Email => {
                "SELECT EXISTS(SELECT 1 FROM customers WHERE email = $1 AND ($2::uuid IS NULL OR id <> $2))"
            }
            UniqueField::Phone => {
                "SELECT EXISTS(SELECT 1 FROM customers WHERE phone = $1 AND ($2::uuid IS NULL OR id <> $2))"
            }
        };
        let (taken,): (bool,) = sqlx::query_as(sql)
            .bind(value)
            .bind(except)
            .fetch_one(&self.db)
            .await
            .with_context(|| format!("check unique {}", field.name()))?;
        Ok(taken)
    }

    async fn insert(
        &self,
        id: Uuid,
        fields: &CustomerFields,
        image: Option<&str>,
    ) -> anyhow::Result<Customer> {
        let mut tx = self.db.begin().await.context("begin tx")?;
        let customer = sqlx::query_as::<_, Customer>(&format!(
            r#"
            INSERT INTO customers
                (id, first_name, last_name, date_of_birth, email, phone, account_number, about, image)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&fields.first_name)
        .bind(&fields.last_name)
        .bind(fields.date_of_birth)
        .bind(&fields.email)
        .bind(&fields.phone)
        .bind(&fields.account_number)
        .bind(fields.about.as_deref())
        .bind(image)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_write_error)?;
        tx.commit().await.context("commit tx")?;
        Ok(customer)
    }

    async fn update(
        &self,
        id: Uuid,
        fields: &CustomerFields,
        image: Option<&str>,
    ) -> anyhow::Result<Option<UpdatedCustomer>> {
        let mut tx = self.db.begin().await.context("begin tx")?;

        let previous: Option<(Option<String>,)> =
            sqlx::query_as("SELECT image FROM customers WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await
                .context("lock customer")?;
        let Some((previous_image,)) = previous else {
            return Ok(None);
        };

        let customer = sqlx::query_as::<_, Customer>(&format!(
            r#"
            UPDATE customers
               SET first_name = $2, last_name = $3, date_of_birth = $4, email = $5,
                   phone = $6, account_number = $7, about = $8,
                   image = COALESCE($9, image), updated_at = now()
             WHERE id = $1
            RETURNING {COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&fields.first_name)
        .bind(&fields.last_name)
        .bind(fields.date_of_birth)
        .bind(&fields.email)
        .bind(&fields.phone)
        .bind(&fields.account_number)
        .bind(fields.about.as_deref())
        .bind(image)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_write_error)?;
        tx.commit().await.context("commit tx")?;

        let replaced_image = if image.is_some() { previous_image } else { None };
        Ok(Some(UpdatedCustomer {
            customer,
            replaced_image,
        }))
    }

    async fn delete(&self, id: Uuid) -> anyhow::Result<Option<Customer>> {
        let mut tx = self.db.begin().await.context("begin tx")?;
        let removed = sqlx::query_as::<_, Customer>(&format!(
            "DELETE FROM customers WHERE id = $1 RETURNING {COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .context("delete customer")?;
        tx.commit().await.context("commit tx")?;
        Ok(removed)
    }
}
