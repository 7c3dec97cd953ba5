use thiserror::Error;
use uuid::Uuid;

use super::dto::ValidationErrors;

#[derive(Debug, Error)]
pub enum CustomerError {
    #[error("validation failed: {0}")]
    Validation(ValidationErrors),
    #[error("customer {0} not found")]
    NotFound(Uuid),
    #[error("storage failure: {0:#}")]
    Storage(anyhow::Error),
    #[error("database error: {0:#}")]
    Database(anyhow::Error),
}

#[cfg(test)]
impl CustomerError {
    pub fn validation_errors(&self) -> Option<&ValidationErrors> {
        match self {
            Self::Validation(errors) => Some(errors),
            _ => None,
        }
    }
}
