use askama::Template;
use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use thiserror::Error;
use tracing::{error, warn};

use crate::customers::dto::ValidationErrors;
use crate::customers::errors::CustomerError;
use crate::customers::views::{ErrorPage, NotFoundPage};

/// Failures that end a request with an error page.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("not found")]
    NotFound,
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("method not allowed")]
    MethodNotAllowed,
    #[error("validation failed: {0}")]
    Unprocessable(ValidationErrors),
    #[error("request body too large")]
    PayloadTooLarge,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let page = match &self {
            Self::NotFound => NotFoundPage {
                message: "The customer you are looking for does not exist.".into(),
            }
            .render(),
            Self::BadRequest(msg) => {
                warn!(%msg, "bad request");
                ErrorPage {
                    message: msg.clone(),
                }
                .render()
            }
            Self::MethodNotAllowed => ErrorPage {
                message: "Method not allowed.".into(),
            }
            .render(),
            Self::Unprocessable(errors) => ErrorPage {
                message: errors.to_string(),
            }
            .render(),
            Self::PayloadTooLarge => ErrorPage {
                message: "The submitted form is too large.".into(),
            }
            .render(),
            Self::Internal(e) => {
                let cause = format!("{:#}", e);
                error!(error = %cause, "request failed");
                ErrorPage {
                    message: "Something went wrong. Please try again.".into(),
                }
                .render()
            }
        };
        match page {
            Ok(body) => (status, Html(body)).into_response(),
            Err(e) => {
                error!(error = %e, "render error page");
                (status, status.canonical_reason().unwrap_or("error")).into_response()
            }
        }
    }
}

impl From<CustomerError> for AppError {
    fn from(e: CustomerError) -> Self {
        match e {
            CustomerError::NotFound(_) => Self::NotFound,
            CustomerError::Validation(errors) => Self::Unprocessable(errors),
            CustomerError::Storage(e) => Self::Internal(e.context("image storage")),
            CustomerError::Database(e) => Self::Internal(e.context("customer store")),
        }
    }
}

impl From<askama::Error> for AppError {
    fn from(e: askama::Error) -> Self {
        Self::Internal(anyhow::Error::new(e).context("render template"))
    }
}

impl From<MultipartError> for AppError {
    fn from(e: MultipartError) -> Self {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            return Self::PayloadTooLarge;
        }
        Self::BadRequest(e.body_text())
    }
}
