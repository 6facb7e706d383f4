use crate::models::{NewProduct, NewUser, Product, StorageStatus, UpdateProduct, UpdateUser, UserRead};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::issue_token,
        crate::routes::api_status,
        crate::routes::list_products,
        crate::routes::create_product,
        crate::routes::get_product,
        crate::routes::update_product,
        crate::routes::delete_product,
        crate::routes::list_users,
        crate::routes::create_user,
        crate::routes::get_user,
        crate::routes::update_user,
        crate::routes::delete_user,
    ),
    components(schemas(
        Product, NewProduct, UpdateProduct, UserRead, NewUser, UpdateUser, StorageStatus,
        crate::routes::TokenRequest, crate::routes::TokenResponse, crate::routes::ApiStatus
    )),
    modifiers(&BearerScheme),
    tags(
        (name = "auth", description = "Token issuance"),
        (name = "status", description = "Service health"),
        (name = "products", description = "Product operations"),
        (name = "users", description = "User operations"),
    )
)]
pub struct ApiDoc;

struct BearerScheme;

impl Modify for BearerScheme {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).bearer_format("JWT").build()),
            );
        }
    }
}
