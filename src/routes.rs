use std::sync::Arc;

use actix_web::http::header;
use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use utoipa::ToSchema;

use crate::auth::{authenticate, Auth};
use crate::clock::SharedClock;
use crate::error::ApiError;
use crate::models::*;
use crate::password::hash_password;
use crate::repo::{HealthCheck, ProductRepo, Repo, UserRepo};
use crate::token::TokenService;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .app_data(query_config())
            .service(web::resource("/token").route(web::post().to(issue_token)))
            .service(web::resource("/api-status").route(web::get().to(api_status)))
            .service(
                web::resource("/products")
                    .route(web::get().to(list_products))
                    .route(web::post().to(create_product)),
            )
            .service(
                web::resource("/products/{id}")
                    .route(web::get().to(get_product))
                    .route(web::put().to(update_product))
                    .route(web::delete().to(delete_product)),
            )
            .service(
                web::resource("/users")
                    .route(web::get().to(list_users))
                    .route(web::post().to(create_user)),
            )
            .service(
                web::resource("/users/{id}")
                    .route(web::get().to(get_user))
                    .route(web::put().to(update_user))
                    .route(web::delete().to(delete_user)),
            ),
    );
}

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn Repo>,
    pub tokens: TokenService,
    pub clock: SharedClock,
}

/// Unparseable query strings (e.g. `page=-1`) are validation failures, like
/// out-of-range ones.
fn query_config() -> web::QueryConfig {
    web::QueryConfig::default()
        .error_handler(|err, _req| ApiError::Validation(err.to_string()).into())
}

const TOTAL_COUNT_HEADER: &str = "X-Total-Count";

fn page_from(page: Option<u32>, size: Option<u32>) -> Result<Page, ApiError> {
    let page = page.unwrap_or(1);
    let size = size.unwrap_or(20);
    if page < 1 {
        return Err(ApiError::Validation("page must be >= 1".into()));
    }
    if !(1..=Page::MAX_SIZE).contains(&size) {
        return Err(ApiError::Validation(format!("size must be between 1 and {}", Page::MAX_SIZE)));
    }
    Ok(Page { page, size })
}

async fn hash_blocking(password: String) -> Result<String, ApiError> {
    web::block(move || hash_password(&password))
        .await
        .map_err(|e| {
            error!(error = %e, "hashing task failed");
            ApiError::Internal
        })?
        .map_err(|e| {
            error!(error = %e, "password hashing failed");
            ApiError::Internal
        })
}

// ---------------- token / status -----------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct TokenRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
}

#[utoipa::path(
    post,
    path = "/api/v1/token",
    tag = "auth",
    request_body(content = TokenRequest, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Access token issued", body = TokenResponse),
        (status = 401, description = "Bad credentials")
    )
)]
pub async fn issue_token(
    data: web::Data<AppState>,
    form: web::Form<TokenRequest>,
) -> Result<HttpResponse, ApiError> {
    let TokenRequest { username, password } = form.into_inner();
    let user = authenticate(&*data.repo, &username, &password)
        .await
        .ok_or(ApiError::Unauthorized)?;
    let access_token = data.tokens.issue(&user.username, user.id).map_err(|e| {
        error!(error = %e, "token issuance failed");
        ApiError::Internal
    })?;
    info!(user_id = user.id, "access token issued");
    Ok(HttpResponse::Ok().json(TokenResponse { access_token, token_type: "bearer".into() }))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ApiStatus {
    pub status: String,
    pub database: StorageStatus,
    pub timestamp: i64,
}

#[utoipa::path(
    get,
    path = "/api/v1/api-status",
    tag = "status",
    responses((status = 200, description = "Service and storage health", body = ApiStatus))
)]
pub async fn api_status(data: web::Data<AppState>) -> HttpResponse {
    let database = data.repo.ping().await;
    let status = if database.connected { "ok" } else { "error" };
    HttpResponse::Ok().json(ApiStatus {
        status: status.into(),
        database,
        timestamp: data.clock.now_unix(),
    })
}

// ---------------- products -----------------------------------------

#[utoipa::path(
    get,
    path = "/api/v1/products",
    tag = "products",
    params(ProductListParams),
    responses(
        (status = 200, description = "Page of products; X-Total-Count carries the match count", body = [Product]),
        (status = 401, description = "Unauthorized"),
        (status = 422, description = "Invalid page or size")
    ),
    security(("bearer" = []))
)]
pub async fn list_products(
    _auth: Auth,
    data: web::Data<AppState>,
    params: web::Query<ProductListParams>,
) -> Result<HttpResponse, ApiError> {
    let p = params.into_inner();
    let query = ProductQuery {
        page: page_from(p.page, p.size)?,
        sort_by: ProductSort::parse(p.sort_by.as_deref()),
        order: SortOrder::parse(p.sort_order.as_deref()),
        q: p.q,
        min_price: p.min_price,
        max_price: p.max_price,
    };
    let (items, total) = data.repo.list_products(&query).await?;
    Ok(HttpResponse::Ok().insert_header((TOTAL_COUNT_HEADER, total.to_string())).json(items))
}

#[utoipa::path(
    post,
    path = "/api/v1/products",
    tag = "products",
    request_body = NewProduct,
    responses(
        (status = 201, description = "Product created", body = Product),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer" = []))
)]
pub async fn create_product(
    _auth: Auth,
    data: web::Data<AppState>,
    payload: web::Json<NewProduct>,
) -> Result<HttpResponse, ApiError> {
    let product = data.repo.create_product(payload.into_inner()).await?;
    Ok(HttpResponse::Created()
        .insert_header((header::LOCATION, format!("/api/v1/products/{}", product.id)))
        .json(product))
}

#[utoipa::path(
    get,
    path = "/api/v1/products/{id}",
    tag = "products",
    params(("id" = Id, Path, description = "Product id")),
    responses(
        (status = 200, description = "Product", body = Product),
        (status = 404, description = "Product not found")
    ),
    security(("bearer" = []))
)]
pub async fn get_product(_auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let product = data.repo.get_product(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(product))
}

#[utoipa::path(
    put,
    path = "/api/v1/products/{id}",
    tag = "products",
    params(("id" = Id, Path, description = "Product id")),
    request_body = UpdateProduct,
    responses(
        (status = 200, description = "Product updated", body = Product),
        (status = 404, description = "Product not found")
    ),
    security(("bearer" = []))
)]
pub async fn update_product(
    _auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<UpdateProduct>,
) -> Result<HttpResponse, ApiError> {
    let product = data.repo.update_product(path.into_inner(), payload.into_inner()).await?;
    Ok(HttpResponse::Ok().json(product))
}

#[utoipa::path(
    delete,
    path = "/api/v1/products/{id}",
    tag = "products",
    params(("id" = Id, Path, description = "Product id")),
    responses(
        (status = 204, description = "Product deleted"),
        (status = 404, description = "Product not found")
    ),
    security(("bearer" = []))
)]
pub async fn delete_product(_auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    data.repo.delete_product(path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

// ---------------- users --------------------------------------------

#[utoipa::path(
    get,
    path = "/api/v1/users",
    tag = "users",
    params(UserListParams),
    responses(
        (status = 200, description = "Page of users; X-Total-Count carries the match count", body = [UserRead]),
        (status = 401, description = "Unauthorized"),
        (status = 422, description = "Invalid page or size")
    ),
    security(("bearer" = []))
)]
pub async fn list_users(
    _auth: Auth,
    data: web::Data<AppState>,
    params: web::Query<UserListParams>,
) -> Result<HttpResponse, ApiError> {
    let p = params.into_inner();
    let query = UserQuery {
        page: page_from(p.page, p.size)?,
        sort_by: UserSort::parse(p.sort_by.as_deref()),
        order: SortOrder::parse(p.sort_order.as_deref()),
        q: p.q,
        role: p.role,
    };
    let (items, total) = data.repo.list_users(&query).await?;
    let items: Vec<UserRead> = items.into_iter().map(UserRead::from).collect();
    Ok(HttpResponse::Ok().insert_header((TOTAL_COUNT_HEADER, total.to_string())).json(items))
}

#[utoipa::path(
    post,
    path = "/api/v1/users",
    tag = "users",
    request_body = NewUser,
    responses(
        (status = 201, description = "User created", body = UserRead),
        (status = 409, description = "Username already taken")
    ),
    security(("bearer" = []))
)]
pub async fn create_user(
    _auth: Auth,
    data: web::Data<AppState>,
    payload: web::Json<NewUser>,
) -> Result<HttpResponse, ApiError> {
    let NewUser { username, name, password, role } = payload.into_inner();
    let password_hash = hash_blocking(password).await?;
    let user = data.repo.create_user(UserRecord { username, name, password_hash, role }).await?;
    Ok(HttpResponse::Created()
        .insert_header((header::LOCATION, format!("/api/v1/users/{}", user.id)))
        .json(UserRead::from(user)))
}

#[utoipa::path(
    get,
    path = "/api/v1/users/{id}",
    tag = "users",
    params(("id" = Id, Path, description = "User id")),
    responses(
        (status = 200, description = "User", body = UserRead),
        (status = 404, description = "User not found")
    ),
    security(("bearer" = []))
)]
pub async fn get_user(_auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let user = data.repo.get_user(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(UserRead::from(user)))
}

#[utoipa::path(
    put,
    path = "/api/v1/users/{id}",
    tag = "users",
    params(("id" = Id, Path, description = "User id")),
    request_body = UpdateUser,
    responses(
        (status = 200, description = "User updated", body = UserRead),
        (status = 404, description = "User not found"),
        (status = 409, description = "Username already taken")
    ),
    security(("bearer" = []))
)]
pub async fn update_user(
    _auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<UpdateUser>,
) -> Result<HttpResponse, ApiError> {
    let UpdateUser { username, name, password, role } = payload.into_inner();
    let password_hash = match password.filter(|p| !p.is_empty()) {
        Some(p) => Some(hash_blocking(p).await?),
        None => None,
    };
    let changes = UserChanges { username, name, password_hash, role };
    let user = data.repo.update_user(path.into_inner(), changes).await?;
    Ok(HttpResponse::Ok().json(UserRead::from(user)))
}

#[utoipa::path(
    delete,
    path = "/api/v1/users/{id}",
    tag = "users",
    params(("id" = Id, Path, description = "User id")),
    responses(
        (status = 204, description = "User deleted"),
        (status = 404, description = "User not found")
    ),
    security(("bearer" = []))
)]
pub async fn delete_user(_auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    data.repo.delete_user(path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}
