//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use catalog_api::clock::{ManualClock, SharedClock};
use catalog_api::gateway::MemoryAccessLog;
use catalog_api::models::{User, UserRecord};
use catalog_api::password::hash_password;
use catalog_api::rate_limit::WindowRateLimiter;
use catalog_api::repo::{InMemRepo, UserRepo};
use catalog_api::token::TokenService;
use catalog_api::{AppState, RequestGateway};
use jsonwebtoken::Algorithm;

pub const SECRET: &[u8] = b"test-secret-must-be-32-bytes-long!!";
/// 20 seconds before a minute boundary.
pub const T0: i64 = 1_700_000_020;

pub struct Fixture {
    pub clock: Arc<ManualClock>,
    pub repo: InMemRepo,
    pub state: AppState,
    pub log: Arc<MemoryAccessLog>,
    pub gateway: RequestGateway,
}

pub fn fixture(limit: u64) -> Fixture {
    let clock = Arc::new(ManualClock::new(T0));
    let shared: SharedClock = clock.clone();
    let repo = InMemRepo::ephemeral();
    let state = AppState {
        repo: Arc::new(repo.clone()),
        tokens: TokenService::new(SECRET, Algorithm::HS256, 60, shared.clone()),
        clock: shared.clone(),
    };
    let log = Arc::new(MemoryAccessLog::default());
    let gateway = RequestGateway::new(WindowRateLimiter::new(limit, shared.clone()), shared).with_sink(log.clone());
    Fixture { clock, repo, state, log, gateway }
}

pub async fn seed_user(repo: &InMemRepo, username: &str, password: &str) -> User {
    repo.create_user(UserRecord {
        username: username.into(),
        name: format!("{username} display"),
        password_hash: hash_password(password).unwrap(),
        role: Some("admin".into()),
    })
    .await
    .unwrap()
}

pub fn bearer(token: &str) -> (&'static str, String) {
    ("Authorization", format!("Bearer {token}"))
}
