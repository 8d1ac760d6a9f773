use rocket::fairing::{Fairing, Info, Kind};
use rocket::http::Header;
use rocket::{Data, Request, Response};
use std::time::Instant;
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "X-Request-Id";

/// Per-request correlation id, taken from the caller when provided.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// Fairing to log one line per HTTP request with timing and a request id.
pub struct RequestLogger;

#[rocket::async_trait]
impl Fairing for RequestLogger {
    fn info(&self) -> Info {
        Info {
            name: "Request Logger",
            kind: Kind::Request | Kind::Response,
        }
    }

    async fn on_request(&self, request: &mut Request<'_>, _: &mut Data<'_>) {
        request.local_cache(Instant::now);

        let incoming = request
            .headers()
            .get_one(REQUEST_ID_HEADER)
            .map(str::trim)
            .filter(|id| !id.is_empty() && id.len() <= 128)
            .map(str::to_string);
        request.local_cache(|| RequestId(incoming.unwrap_or_else(|| Uuid::new_v4().to_string())));
    }

    async fn on_response<'r>(&self, request: &'r Request<'_>, response: &mut Response<'r>) {
        let duration = request.local_cache(Instant::now).elapsed();
        let request_id = request.local_cache(|| RequestId(Uuid::new_v4().to_string()));

        response.set_header(Header::new(REQUEST_ID_HEADER, request_id.0.clone()));

        log::info!(
            "[{}] {} {} -> {} ({:.2}ms)",
            request_id.0,
            request.method(),
            request.uri(),
            response.status().code,
            duration.as_secs_f64() * 1000.0
        );
    }
}
