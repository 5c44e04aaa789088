//! Services integration tests

use actix_web::test::TestRequest;
use serde_json::Value;

mod users;

/// Prepares JSON API request
fn json_post(uri: &str, body: Value) -> TestRequest {
    TestRequest::post()
        .uri(uri)
        .insert_header(("content-type", "application/json"))
        .set_payload(body.to_string())
}

/// Attaches session token to the request
fn with_session(req: TestRequest, token: &str) -> TestRequest {
    req.insert_header(("Authorization", format!("Session {token}")))
}
