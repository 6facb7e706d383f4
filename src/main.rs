use actix_web::{web, App, HttpServer};
use utoipa_swagger_ui::SwaggerUi;

use catalog_api::clock::system_clock;
use catalog_api::config::AppConfig;
use catalog_api::openapi::ApiDoc;
use catalog_api::rate_limit::WindowRateLimiter;
use catalog_api::repo::InMemRepo;
use catalog_api::token::TokenService;
use catalog_api::{config, AppState, RequestGateway};
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi; // bring trait into scope for ApiDoc::openapi()

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load .env automatically only in debug builds to reduce manual setup overhead.
    if cfg!(debug_assertions) {
        let _ = dotenv::dotenv();
    }

    let cfg = match AppConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("configuration error: {e}");
            std::process::exit(1);
        }
    };

    // Structured logging initialisation
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    info!("Bootstrapping catalog API");
    info!(
        algorithm = ?cfg.jwt_algorithm,
        token_ttl_minutes = cfg.token_ttl_minutes,
        rate_limit_per_minute = cfg.rate_limit_per_minute,
        data_dir = %cfg.data_dir.display(),
        "configuration loaded"
    );

    catalog_api::password::warm_up();

    let clock = system_clock();
    let repo = InMemRepo::open(&cfg.data_dir);
    let state = AppState {
        repo: Arc::new(repo),
        tokens: TokenService::from_config(&cfg, clock.clone()),
        clock: clock.clone(),
    };
    // one limiter shared by every worker
    let gateway = RequestGateway::new(WindowRateLimiter::new(cfg.rate_limit_per_minute, clock.clone()), clock);
    let openapi = ApiDoc::openapi();

    let server = HttpServer::new(move || {
        App::new()
            .wrap(gateway.clone())
            .app_data(web::Data::new(state.clone()))
            .configure(config)
            .service(SwaggerUi::new("/docs/{_:.*}").url("/docs/openapi.json", openapi.clone()))
    })
    .bind(cfg.bind_addr.as_str())?;

    info!("Listening on http://{}", cfg.bind_addr);

    server.run().await
}
