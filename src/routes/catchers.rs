use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::{Catcher, Request, catch, catchers};

use crate::error::ErrorResponse;

type Envelope = (Status, Json<ErrorResponse>);

fn envelope(status: Status, error: &str, message: &str) -> Envelope {
    (status, Json(ErrorResponse::new(error, message)))
}

#[catch(400)]
fn bad_request(_: &Request<'_>) -> Envelope {
    envelope(Status::BadRequest, "ValidationError", "malformed request")
}

#[catch(401)]
fn unauthorized(_: &Request<'_>) -> Envelope {
    envelope(
        Status::Unauthorized,
        "AuthorizationError",
        "missing or invalid credentials",
    )
}

#[catch(403)]
fn forbidden(_: &Request<'_>) -> Envelope {
    envelope(Status::Forbidden, "AuthorizationError", "forbidden")
}

#[catch(404)]
fn not_found(request: &Request<'_>) -> Envelope {
    envelope(
        Status::NotFound,
        "NotFound",
        &format!("no route for {} {}", request.method(), request.uri()),
    )
}

#[catch(422)]
fn unprocessable(_: &Request<'_>) -> Envelope {
    envelope(
        Status::UnprocessableEntity,
        "ValidationError",
        "request body could not be parsed",
    )
}

#[catch(500)]
fn internal_error(_: &Request<'_>) -> Envelope {
    envelope(
        Status::InternalServerError,
        "InternalError",
        "internal server error",
    )
}

pub fn all() -> Vec<Catcher> {
    catchers![
        bad_request,
        unauthorized,
        forbidden,
        not_found,
        unprocessable,
        internal_error
    ]
}
