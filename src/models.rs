use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use utoipa::{IntoParams, ToSchema};

pub type Id = i64;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Product {
    pub id: Id,
    pub name: String,
    pub description: Option<String>,
    pub price: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewProduct {
    pub name: String,
    pub description: Option<String>,
    pub price: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct UpdateProduct {
    pub name: Option<String>,
    /// Absent leaves the description alone; `null` clears it.
    #[serde(default, deserialize_with = "explicit_null", skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>, nullable)]
    pub description: Option<Option<String>>,
    pub price: Option<f64>,
}

/// Stored credential record. Only ever serialised into the storage snapshot;
/// API responses go through `UserRead`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Id,
    pub username: String,
    pub name: String,
    pub password_hash: String,
    pub role: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserRead {
    pub id: Id,
    pub username: String,
    pub name: String,
    pub role: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<User> for UserRead {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            username: u.username,
            name: u.name,
            role: u.role,
            created_at: u.created_at,
            updated_at: u.updated_at,
        }
    }
}

/// Request body for user creation; `password` is plaintext and hashed before storage.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct NewUser {
    pub username: String,
    pub name: String,
    pub password: String,
    pub role: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct UpdateUser {
    pub username: Option<String>,
    pub name: Option<String>,
    pub password: Option<String>,
    /// Absent leaves the role alone; `null` clears it.
    #[serde(default, deserialize_with = "explicit_null")]
    #[schema(value_type = Option<String>, nullable)]
    pub role: Option<Option<String>>,
}

/// Distinguishes a field set to `null` (`Some(None)`) from a missing one (`None`).
fn explicit_null<'de, D, T>(de: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(de).map(Some)
}

/// What the repository stores for a new user, after hashing.
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub username: String,
    pub name: String,
    pub password_hash: String,
    pub role: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub username: Option<String>,
    pub name: Option<String>,
    pub password_hash: Option<String>,
    pub role: Option<Option<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    /// Anything other than `desc` sorts ascending.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some(s) if s.eq_ignore_ascii_case("desc") => SortOrder::Desc,
            _ => SortOrder::Asc,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: u32,
    pub size: u32,
}

impl Page {
    pub const MAX_SIZE: u32 = 200;

    pub fn offset(&self) -> usize {
        (self.page as usize - 1) * self.size as usize
    }
}

impl Default for Page {
    fn default() -> Self {
        Self { page: 1, size: 20 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProductSort { Id, Name, Price, CreatedAt, UpdatedAt }

impl ProductSort {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.unwrap_or("name") {
            "name" => ProductSort::Name,
            "price" => ProductSort::Price,
            "created_at" => ProductSort::CreatedAt,
            "updated_at" => ProductSort::UpdatedAt,
            _ => ProductSort::Id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserSort { Id, Username, Name, Role, CreatedAt, UpdatedAt }

impl UserSort {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.unwrap_or("username") {
            "username" => UserSort::Username,
            "name" => UserSort::Name,
            "role" => UserSort::Role,
            "created_at" => UserSort::CreatedAt,
            "updated_at" => UserSort::UpdatedAt,
            _ => UserSort::Id,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProductQuery {
    pub q: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub sort_by: ProductSort,
    pub order: SortOrder,
    pub page: Page,
}

#[derive(Debug, Clone)]
pub struct UserQuery {
    pub q: Option<String>,
    pub role: Option<String>,
    pub sort_by: UserSort,
    pub order: SortOrder,
    pub page: Page,
}

/// Raw query string of `GET /api/v1/products`.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ProductListParams {
    pub page: Option<u32>,
    pub size: Option<u32>,
    pub q: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
}

/// Raw query string of `GET /api/v1/users`.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct UserListParams {
    pub page: Option<u32>,
    pub size: Option<u32>,
    pub q: Option<String>,
    pub role: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct StorageStatus {
    pub connected: bool,
    pub driver: String,
}
