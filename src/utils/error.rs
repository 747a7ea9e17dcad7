use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use mongodb::error::{ErrorKind, WriteFailure};
use serde_json::json;
use thiserror::Error;

use crate::api::response::Envelope;

/// Erros da aplicação - cada variante mapeia para um status HTTP
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    /// Field-level validation failure. Each entry is (field, problem).
    #[error("Validation failed")]
    Validation(Vec<(String, String)>),

    #[error("Too many requests, retry in {0}s")]
    RateLimited(u64),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn validation(field: &str, problem: impl Into<String>) -> Self {
        AppError::Validation(vec![(field.to_string(), problem.into())])
    }

    pub fn forbidden() -> Self {
        AppError::Forbidden("You do not have permission to perform this action".to_string())
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();

        // Não vaza detalhes internos para o cliente
        let message = match self {
            AppError::Database(detail) | AppError::Internal(detail) => {
                log::error!("❌ {}", detail);
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        let data = match self {
            AppError::Validation(fields) => Some(json!({
                "errors": fields
                    .iter()
                    .map(|(field, problem)| json!({ "field": field, "message": problem }))
                    .collect::<Vec<_>>()
            })),
            _ => None,
        };

        let mut builder = HttpResponse::build(status);
        if let AppError::RateLimited(retry_after) = self {
            builder.insert_header(("Retry-After", retry_after.to_string()));
        }
        builder.json(Envelope::<serde_json::Value>::error(message, data))
    }
}

impl From<mongodb::error::Error> for AppError {
    fn from(err: mongodb::error::Error) -> Self {
        if is_duplicate_key(&err) {
            return AppError::Conflict("Resource already exists".to_string());
        }
        AppError::Database(err.to_string())
    }
}

impl From<mongodb::bson::oid::Error> for AppError {
    fn from(_: mongodb::bson::oid::Error) -> Self {
        AppError::BadRequest("Invalid id".to_string())
    }
}

impl From<mongodb::bson::de::Error> for AppError {
    fn from(err: mongodb::bson::de::Error) -> Self {
        AppError::Database(format!("Failed to decode document: {}", err))
    }
}

impl From<mongodb::bson::ser::Error> for AppError {
    fn from(err: mongodb::bson::ser::Error) -> Self {
        AppError::Internal(format!("Failed to encode document: {}", err))
    }
}

impl From<bcrypt::BcryptError> for AppError {
    fn from(err: bcrypt::BcryptError) -> Self {
        AppError::Internal(format!("Password hashing failed: {}", err))
    }
}

impl From<jsonwebtoken::errors::Error> for AppError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        log::debug!("JWT rejected: {}", err);
        AppError::Unauthorized("Invalid or expired token".to_string())
    }
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write_error)) => write_error.code == 11000,
        ErrorKind::Command(command_error) => command_error.code == 11000,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;

    #[test]
    fn status_codes_follow_variant() {
        assert_eq!(AppError::BadRequest("x".into()).status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::Unauthorized("x".into()).status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::forbidden().status_code(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::NotFound("Order".into()).status_code(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::Conflict("x".into()).status_code(), StatusCode::CONFLICT);
        assert_eq!(
            AppError::validation("email", "invalid").status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(AppError::RateLimited(3).status_code(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            AppError::Database("boom".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[actix_rt::test]
    async fn internal_errors_hide_details() {
        let response = AppError::Database("connection refused at 10.0.0.3".into()).error_response();
        let body = to_bytes(response.into_body()).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();

        assert_eq!(value["status"], "error");
        assert_eq!(value["message"], "Internal server error");
        assert!(value["data"].is_null());
    }

    #[actix_rt::test]
    async fn validation_errors_list_fields() {
        let response = AppError::Validation(vec![
            ("email".into(), "invalid format".into()),
            ("phone".into(), "too short".into()),
        ])
        .error_response();
        let body = to_bytes(response.into_body()).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();

        let errors = value["data"]["errors"].as_array().unwrap();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0]["field"], "email");
        assert_eq!(errors[1]["message"], "too short");
    }

    #[test]
    fn rate_limited_sets_retry_after() {
        let response = AppError::RateLimited(42).error_response();
        assert_eq!(response.headers().get("Retry-After").unwrap(), "42");
    }

    #[test]
    fn not_found_message_names_resource() {
        assert_eq!(AppError::NotFound("Pickup".into()).to_string(), "Pickup not found");
    }
}
