use mailsync_api::request_logger::{REQUEST_ID_HEADER, RequestLogger};
use mailsync_api::routes::health::{HealthResponse, health_check};
use mailsync_api::test_support::TestRocketBuilder;
use rocket::http::{Header, Status};
use rocket::local::blocking::Client;
use rocket::routes;

#[test]
fn health_endpoint_returns_ok() {
    let client = TestRocketBuilder::new()
        .mount_api_routes(routes![health_check])
        .blocking_client();

    let response = client.get("/api/v1/health").dispatch();
    assert_eq!(response.status(), Status::Ok);

    let payload: HealthResponse = response.into_json().expect("valid JSON payload");
    assert_eq!(payload.status, "ok");
    assert!(!payload.version.is_empty());
}

#[test]
fn unknown_routes_use_json_envelope() {
    let client = TestRocketBuilder::new()
        .mount_api_routes(routes![health_check])
        .blocking_client();

    let response = client.get("/api/v1/nope").dispatch();
    assert_eq!(response.status(), Status::NotFound);

    let body: serde_json::Value = response.into_json().expect("valid JSON payload");
    assert_eq!(body["error"], "NotFound");
}

#[test]
fn responses_carry_request_id() {
    let rocket = TestRocketBuilder::new()
        .mount_api_routes(routes![health_check])
        .build()
        .attach(RequestLogger);
    let client = Client::tracked(rocket).expect("valid Rocket instance");

    let generated = client.get("/api/v1/health").dispatch();
    let id = generated
        .headers()
        .get_one(REQUEST_ID_HEADER)
        .expect("request id header");
    assert_eq!(id.len(), 36);

    let echoed = client
        .get("/api/v1/health")
        .header(Header::new(REQUEST_ID_HEADER, "trace-123"))
        .dispatch();
    assert_eq!(echoed.headers().get_one(REQUEST_ID_HEADER), Some("trace-123"));
}
