//! Accounts and sessions API tests

use actix_web::http::StatusCode;
use actix_web::{App, test};
use assert_json_diff::assert_json_include;
use serde_json::{Value, json};

use crate::config;
use crate::model::Model;
use crate::service::tests::{json_post, with_session};
use crate::service::{self, Settings};

#[actix_web::test]
async fn signup_users() {
    let model = Model::test().await.unwrap();
    let app = App::new().configure(service::configure(Settings::default(), model));
    let app = test::init_service(app).await;

    let resp = test::call_service(
        &app,
        json_post("/signup", json!({ "username": "alice", "password": "pw1" })).to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let body: Value = test::read_body_json(resp).await;
    let alice = body["userId"].as_i64().unwrap();

    let resp = test::call_service(
        &app,
        json_post("/signup", json!({ "username": "bob", "password": "pw2" })).to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let body: Value = test::read_body_json(resp).await;
    assert_ne!(body["userId"].as_i64().unwrap(), alice);
}

#[actix_web::test]
async fn duplicate_signup_conflicts() {
    let model = Model::test().await.unwrap();
    let app = App::new().configure(service::configure(Settings::default(), model));
    let app = test::init_service(app).await;

    let signup = json!({ "username": "alice", "password": "pw1" });
    let resp = test::call_service(&app, json_post("/signup", signup.clone()).to_request()).await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let resp = test::call_service(&app, json_post("/signup", signup).to_request()).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    let body: Value = test::read_body_json(resp).await;
    assert_json_include!(actual: body, expected: json!({ "error": "DuplicateUsername" }));
}

#[actix_web::test]
async fn invalid_signup_rejected() {
    let model = Model::test().await.unwrap();
    let app = App::new().configure(service::configure(Settings::default(), model));
    let app = test::init_service(app).await;

    for payload in [
        json!({ "username": "", "password": "pw1" }),
        json!({ "username": "alice", "password": "" }),
        json!({ "username": "alice" }),
        json!("alice"),
    ] {
        let resp = test::call_service(&app, json_post("/signup", payload).to_request()).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(resp).await;
        assert_json_include!(actual: body, expected: json!({ "error": "ValidationError" }));
    }
}

#[actix_web::test]
async fn login_failures_distinguished() {
    let model = Model::test().await.unwrap();
    let app = App::new().configure(service::configure(Settings::default(), model));
    let app = test::init_service(app).await;

    let resp = test::call_service(
        &app,
        json_post("/signup", json!({ "username": "alice", "password": "pw1" })).to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let resp = test::call_service(
        &app,
        json_post("/login", json!({ "username": "alice", "password": "wrong" })).to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: Value = test::read_body_json(resp).await;
    assert_json_include!(actual: body, expected: json!({ "error": "InvalidPassword" }));

    let resp = test::call_service(
        &app,
        json_post("/login", json!({ "username": "bob", "password": "pw1" })).to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body: Value = test::read_body_json(resp).await;
    assert_json_include!(actual: body, expected: json!({ "error": "NotFound" }));
}

#[actix_web::test]
async fn login_failures_unified() {
    let model = Model::test().await.unwrap();
    let settings = Settings {
        auth: config::Auth {
            unify_credential_errors: true,
            ..Default::default()
        },
        ..Default::default()
    };
    let app = App::new().configure(service::configure(settings, model));
    let app = test::init_service(app).await;

    let resp = test::call_service(
        &app,
        json_post("/signup", json!({ "username": "alice", "password": "pw1" })).to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    for credentials in [
        json!({ "username": "alice", "password": "wrong" }),
        json!({ "username": "bob", "password": "pw1" }),
    ] {
        let resp = test::call_service(&app, json_post("/login", credentials).to_request()).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let body: Value = test::read_body_json(resp).await;
        assert_json_include!(actual: body, expected: json!({ "error": "InvalidCredentials" }));
    }
}

#[actix_web::test]
async fn login_sets_session_cookie() {
    let model = Model::test().await.unwrap();
    let app = App::new().configure(service::configure(Settings::default(), model));
    let app = test::init_service(app).await;

    let resp = test::call_service(
        &app,
        json_post("/signup", json!({ "username": "alice", "password": "pw1" })).to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let resp = test::call_service(
        &app,
        json_post("/login", json!({ "username": "alice", "password": "pw1" })).to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);

    let cookie = resp
        .response()
        .cookies()
        .find(|cookie| cookie.name() == "desk_session")
        .unwrap()
        .into_owned();
    assert!(cookie.http_only().unwrap_or(false));

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["sessionToken"].as_str().unwrap(), cookie.value());
    assert_eq!(body["openWindows"], json!([]));

    // Cookie alone authenticates
    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/session")
            .cookie(cookie)
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_json_include!(actual: body, expected: json!({ "username": "alice" }));
}

#[actix_web::test]
async fn logout_is_idempotent() {
    let model = Model::test().await.unwrap();
    let app = App::new().configure(service::configure(Settings::default(), model));
    let app = test::init_service(app).await;

    // Anonymous logout is a no-op
    let resp = test::call_service(&app, test::TestRequest::post().uri("/logout").to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = test::call_service(
        &app,
        json_post("/signup", json!({ "username": "alice", "password": "pw1" })).to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let resp = test::call_service(
        &app,
        json_post("/login", json!({ "username": "alice", "password": "pw1" })).to_request(),
    )
    .await;
    let body: Value = test::read_body_json(resp).await;
    let token = body["sessionToken"].as_str().unwrap().to_owned();

    for _ in 0..2 {
        let resp = test::call_service(
            &app,
            with_session(test::TestRequest::post().uri("/logout"), &token).to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    let resp = test::call_service(
        &app,
        with_session(test::TestRequest::get().uri("/session"), &token).to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn garbage_session_is_anonymous() {
    let model = Model::test().await.unwrap();
    let app = App::new().configure(service::configure(Settings::default(), model));
    let app = test::init_service(app).await;

    let resp = test::call_service(
        &app,
        with_session(test::TestRequest::get().uri("/session"), "fake_token").to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: Value = test::read_body_json(resp).await;
    assert_json_include!(actual: body, expected: json!({ "error": "Unauthorized" }));
}
