mod common;

use actix_web::{test, web, App};
use catalog_api::config;
use common::fixture;

fn remaining<B>(resp: &actix_web::dev::ServiceResponse<B>) -> u64 {
    resp.headers()
        .get("x-ratelimit-remaining")
        .unwrap()
        .to_str()
        .unwrap()
        .parse()
        .unwrap()
}

fn status_req(ip: &str) -> test::TestRequest {
    test::TestRequest::get()
        .uri("/api/v1/api-status")
        .peer_addr(format!("{ip}:40000").parse().unwrap())
}

#[actix_web::test]
async fn sixty_one_requests_clamp_at_zero() {
    let fx = fixture(60);
    let app = test::init_service(
        App::new()
            .wrap(fx.gateway.clone())
            .app_data(web::Data::new(fx.state.clone()))
            .configure(config),
    )
    .await;

    let mut seen = Vec::new();
    for _ in 0..61 {
        let resp = test::call_service(&app, status_req("10.0.0.1").to_request()).await;
        assert_eq!(resp.status(), 200, "limiter is advisory and never rejects");
        assert_eq!(resp.headers().get("x-ratelimit-limit").unwrap(), "60");
        seen.push(remaining(&resp));
    }
    let expected: Vec<u64> = (0..61).map(|i| 59u64.saturating_sub(i)).collect();
    assert_eq!(seen, expected);
    assert_eq!(seen[59], 0);
    assert_eq!(seen[60], 0);
}

#[actix_web::test]
async fn clients_do_not_share_budgets() {
    let fx = fixture(5);
    let app = test::init_service(
        App::new()
            .wrap(fx.gateway.clone())
            .app_data(web::Data::new(fx.state.clone()))
            .configure(config),
    )
    .await;

    for _ in 0..5 {
        test::call_service(&app, status_req("10.0.0.1").to_request()).await;
    }
    let a = test::call_service(&app, status_req("10.0.0.1").to_request()).await;
    let b = test::call_service(&app, status_req("10.0.0.2").to_request()).await;
    assert_eq!(remaining(&a), 0);
    assert_eq!(remaining(&b), 4);
}

#[actix_web::test]
async fn minute_rollover_restores_budget() {
    let fx = fixture(10);
    let app = test::init_service(
        App::new()
            .wrap(fx.gateway.clone())
            .app_data(web::Data::new(fx.state.clone()))
            .configure(config),
    )
    .await;

    for _ in 0..12 {
        test::call_service(&app, status_req("10.0.0.1").to_request()).await;
    }
    fx.clock.advance(20); // crosses the minute boundary
    let resp = test::call_service(&app, status_req("10.0.0.1").to_request()).await;
    assert_eq!(remaining(&resp), 9);
    let reset: i64 = resp.headers().get("x-ratelimit-reset").unwrap().to_str().unwrap().parse().unwrap();
    assert_eq!(reset, (common::T0 / 60 + 2) * 60);
}
