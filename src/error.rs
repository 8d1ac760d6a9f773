use rocket::http::Status;
use rocket::response::{self, Responder};
use rocket::{Request, Response};
use rocket_okapi::okapi::openapi3::Responses;
use rocket_okapi::r#gen::OpenApiGenerator;
use rocket_okapi::response::OpenApiResponderInner;
use serde::{Deserialize, Serialize};
use std::io::Cursor;

use crate::sync::store::{RegistryError, StoreError};

#[derive(Debug)]
pub enum ApiError {
    Store(StoreError),
    Registry(RegistryError),
    NotFound(String),
    BadRequest(String),
    InternalError(String),
}

/// JSON envelope shared by handler errors and catchers.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
        }
    }
}

impl ApiError {
    fn parts(self) -> (Status, &'static str, String) {
        match self {
            ApiError::Store(e) => {
                log::error!("store error: {}", e);
                (Status::InternalServerError, "StoreError", e.to_string())
            }
            ApiError::Registry(e) => {
                log::error!("account registry error: {}", e);
                (Status::InternalServerError, "RegistryError", e.to_string())
            }
            ApiError::NotFound(msg) => {
                log::debug!("not found: {}", msg);
                (Status::NotFound, "NotFound", msg)
            }
            ApiError::BadRequest(msg) => {
                log::debug!("bad request: {}", msg);
                (Status::BadRequest, "ValidationError", msg)
            }
            ApiError::InternalError(msg) => {
                log::error!("internal error: {}", msg);
                (Status::InternalServerError, "InternalError", msg)
            }
        }
    }
}

fn json_error(status: Status, body: &ErrorResponse) -> response::Result<'static> {
    let json = serde_json::to_string(body).unwrap_or_else(|_| {
        r#"{"error":"SerializationError","message":"Failed to serialize error"}"#.to_string()
    });

    Response::build()
        .status(status)
        .header(rocket::http::ContentType::JSON)
        .sized_body(json.len(), Cursor::new(json))
        .ok()
}

impl<'r> Responder<'r, 'static> for ApiError {
    fn respond_to(self, _: &'r Request<'_>) -> response::Result<'static> {
        let (status, error_type, message) = self.parts();
        json_error(status, &ErrorResponse::new(error_type, message))
    }
}

impl OpenApiResponderInner for ApiError {
    fn responses(_gen: &mut OpenApiGenerator) -> rocket_okapi::Result<Responses> {
        Ok(Responses::default())
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Store(err)
    }
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        ApiError::Registry(err)
    }
}
