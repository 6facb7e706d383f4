mod common;

use actix_web::{dev::Payload, test, web, App, FromRequest};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use catalog_api::auth::{authenticate, Auth};
use catalog_api::config;
use catalog_api::repo::UserRepo;
use catalog_api::routes::TokenResponse;
use common::{bearer, fixture, seed_user};

#[actix_web::test]
async fn login_then_protected_call_scenario() {
    let fx = fixture(60);
    seed_user(&fx.repo, "alice", "p1").await;
    let app = test::init_service(
        App::new()
            .wrap(fx.gateway.clone())
            .app_data(web::Data::new(fx.state.clone()))
            .configure(config),
    )
    .await;

    let req = test::TestRequest::post()
        .uri("/api/v1/token")
        .set_form([("username", "alice"), ("password", "p1")])
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let body: TokenResponse = test::read_body_json(resp).await;
    assert!(!body.access_token.is_empty());
    assert_eq!(body.token_type, "bearer");

    // token works on a protected route
    let req = test::TestRequest::get()
        .uri("/api/v1/products")
        .insert_header(bearer(&body.access_token))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);

    // no header
    let req = test::TestRequest::get().uri("/api/v1/products").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);
    assert_eq!(resp.headers().get("www-authenticate").unwrap(), "Bearer");

    // garbage token
    let req = test::TestRequest::get()
        .uri("/api/v1/products")
        .insert_header(("Authorization", "Bearer garbage"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);
    assert_eq!(resp.headers().get("www-authenticate").unwrap(), "Bearer");
}

#[actix_web::test]
async fn wrong_password_and_unknown_user_look_the_same() {
    let fx = fixture(60);
    seed_user(&fx.repo, "alice", "p1").await;
    let app = test::init_service(App::new().app_data(web::Data::new(fx.state.clone())).configure(config)).await;

    let mut bodies = Vec::new();
    for (u, p) in [("alice", "nope"), ("mallory", "p1")] {
        let req = test::TestRequest::post()
            .uri("/api/v1/token")
            .set_form([("username", u), ("password", p)])
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 401);
        bodies.push(test::read_body(resp).await);
    }
    assert_eq!(bodies[0], bodies[1]);
    assert!(!String::from_utf8_lossy(&bodies[0]).contains("access_token"));
}

#[actix_web::test]
async fn authenticate_matches_exact_username_only() {
    let fx = fixture(60);
    let alice = seed_user(&fx.repo, "alice", "p1").await;
    assert_eq!(authenticate(&fx.repo, "alice", "p1").await.map(|u| u.id), Some(alice.id));
    assert!(authenticate(&fx.repo, "Alice", "p1").await.is_none());
    assert!(authenticate(&fx.repo, "alice", "P1").await.is_none());
    assert!(authenticate(&fx.repo, "", "").await.is_none());
}

#[actix_web::test]
async fn extractor_resolves_caller_record() {
    let fx = fixture(60);
    let alice = seed_user(&fx.repo, "alice", "p1").await;
    let token = fx.state.tokens.issue("alice", alice.id).unwrap();
    let req = test::TestRequest::default()
        .insert_header(bearer(&token))
        .app_data(web::Data::new(fx.state.clone()))
        .to_http_request();
    let mut pl = Payload::None;
    let auth = Auth::from_request(&req, &mut pl).await.expect("extract");
    assert_eq!(auth.0.username, "alice");
}

#[actix_web::test]
async fn extractor_rejects_token_of_deleted_user() {
    let fx = fixture(60);
    let alice = seed_user(&fx.repo, "alice", "p1").await;
    let token = fx.state.tokens.issue("alice", alice.id).unwrap();
    fx.repo.delete_user(alice.id).await.unwrap();
    let req = test::TestRequest::default()
        .insert_header(bearer(&token))
        .app_data(web::Data::new(fx.state.clone()))
        .to_http_request();
    let mut pl = Payload::None;
    assert!(Auth::from_request(&req, &mut pl).await.is_err());
}

#[actix_web::test]
async fn malformed_headers_are_rejected_uniformly() {
    let fx = fixture(60);
    let alice = seed_user(&fx.repo, "alice", "p1").await;
    let token = fx.state.tokens.issue("alice", alice.id).unwrap();
    let app = test::init_service(App::new().app_data(web::Data::new(fx.state.clone())).configure(config)).await;

    let mut bodies = Vec::new();
    for value in [format!("Basic {token}"), token.clone(), "Bearer".to_string(), "Bearer ".to_string()] {
        let req = test::TestRequest::get()
            .uri("/api/v1/users")
            .insert_header(("Authorization", value))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 401);
        assert_eq!(resp.headers().get("www-authenticate").unwrap(), "Bearer");
        bodies.push(test::read_body(resp).await);
    }
    assert!(bodies.windows(2).all(|w| w[0] == w[1]));
}

#[actix_web::test]
async fn expired_token_is_rejected() {
    let fx = fixture(60);
    let alice = seed_user(&fx.repo, "alice", "p1").await;
    let token = fx.state.tokens.issue("alice", alice.id).unwrap();
    let app = test::init_service(App::new().app_data(web::Data::new(fx.state.clone())).configure(config)).await;

    fx.clock.advance(3599);
    let req = test::TestRequest::get().uri("/api/v1/products").insert_header(bearer(&token)).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 200);

    fx.clock.advance(1);
    let req = test::TestRequest::get().uri("/api/v1/products").insert_header(bearer(&token)).to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 401);
}

#[actix_web::test]
async fn unsigned_token_with_alg_none_is_rejected() {
    let fx = fixture(60);
    let alice = seed_user(&fx.repo, "alice", "p1").await;
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let claims = URL_SAFE_NO_PAD.encode(
        format!(r#"{{"sub":"alice","uid":{},"iat":{},"exp":{}}}"#, alice.id, common::T0, common::T0 + 3600).as_bytes(),
    );
    let forged = format!("{header}.{claims}.");
    assert!(fx.state.tokens.validate(&forged).is_err());

    // same claims re-labelled as HS512 while keeping the HS256 signature
    let genuine = fx.state.tokens.issue("alice", alice.id).unwrap();
    let sig = genuine.rsplit('.').next().unwrap();
    let relabelled = format!("{}.{claims}.{sig}", URL_SAFE_NO_PAD.encode(br#"{"alg":"HS512","typ":"JWT"}"#));
    assert!(fx.state.tokens.validate(&relabelled).is_err());
}
