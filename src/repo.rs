use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::models::*;

#[derive(thiserror::Error, Debug)]
pub enum RepoError {
    #[error("not found")] NotFound,
    #[error("conflict")] Conflict,
    #[error("internal: {0}")] Internal(String),
}

pub type RepoResult<T> = Result<T, RepoError>;

#[async_trait]
pub trait ProductRepo: Send + Sync {
    /// Returns the requested page and the total number of matches.
    async fn list_products(&self, query: &ProductQuery) -> RepoResult<(Vec<Product>, usize)>;
    async fn get_product(&self, id: Id) -> RepoResult<Product>;
    async fn create_product(&self, new: NewProduct) -> RepoResult<Product>;
    async fn update_product(&self, id: Id, upd: UpdateProduct) -> RepoResult<Product>;
    async fn delete_product(&self, id: Id) -> RepoResult<()>;
}

#[async_trait]
pub trait UserRepo: Send + Sync {
    async fn list_users(&self, query: &UserQuery) -> RepoResult<(Vec<User>, usize)>;
    async fn get_user(&self, id: Id) -> RepoResult<User>;
    async fn get_user_by_username(&self, username: &str) -> RepoResult<User>;
    async fn create_user(&self, new: UserRecord) -> RepoResult<User>;
    async fn update_user(&self, id: Id, changes: UserChanges) -> RepoResult<User>;
    async fn delete_user(&self, id: Id) -> RepoResult<()>;
}

#[async_trait]
pub trait HealthCheck: Send + Sync {
    async fn ping(&self) -> StorageStatus;
}

pub trait Repo: ProductRepo + UserRepo + HealthCheck {}

impl<T> Repo for T where T: ProductRepo + UserRepo + HealthCheck {}

const SNAPSHOT_FILE: &str = "state.json";
const SNAPSHOT_TMP: &str = "state.json.tmp";

#[derive(Default, Serialize, Deserialize)]
struct State {
    products: HashMap<Id, Product>,
    users: HashMap<Id, User>,
    next_id: Id,
}

/// In-memory store, optionally snapshotted to `<dir>/state.json` after each write.
#[derive(Clone)]
pub struct InMemRepo {
    state: Arc<RwLock<State>>,
    snapshot_path: Option<Arc<PathBuf>>,
    // held across serialise + write + rename so snapshots land in mutation order
    persist_lock: Arc<Mutex<()>>,
}

impl InMemRepo {
    /// Store without persistence.
    pub fn ephemeral() -> Self {
        Self {
            state: Arc::new(RwLock::new(State::default())),
            snapshot_path: None,
            persist_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Store backed by a snapshot in `dir`; loads the existing snapshot if any.
    pub fn open(dir: &Path) -> Self {
        let path = dir.join(SNAPSHOT_FILE);
        let state = Self::load_state_from(&path);
        Self {
            state: Arc::new(RwLock::new(state)),
            snapshot_path: Some(Arc::new(path)),
            persist_lock: Arc::new(Mutex::new(())),
        }
    }

    fn load_state_from(path: &Path) -> State {
        match std::fs::read(path) {
            Ok(bytes) => match serde_json::from_slice::<State>(&bytes) {
                Ok(s) => {
                    info!(path = %path.display(), "loaded snapshot");
                    s
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to parse snapshot, starting empty");
                    State::default()
                }
            },
            Err(e) => {
                info!(path = %path.display(), error = %e, "no snapshot, starting empty");
                State::default()
            }
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    fn persist(&self) {
        let Some(path) = self.snapshot_path.as_ref() else { return };
        let _guard = self.persist_lock.lock().unwrap_or_else(|e| e.into_inner());
        let bytes = match serde_json::to_vec_pretty(&*self.read()) {
            Ok(b) => b,
            Err(e) => {
                warn!(error = %e, "failed to serialise snapshot");
                return;
            }
        };
        if let Some(dir) = path.parent() {
            let _ = std::fs::create_dir_all(dir);
        }
        let tmp = path.with_file_name(SNAPSHOT_TMP);
        if let Err(e) = std::fs::write(&tmp, bytes) {
            warn!(path = %tmp.display(), error = %e, "failed to write snapshot");
            return;
        }
        if let Err(e) = std::fs::rename(&tmp, path.as_path()) {
            warn!(path = %path.display(), error = %e, "failed to replace snapshot");
        }
    }

    fn next_id(state: &mut State) -> Id {
        state.next_id += 1;
        state.next_id
    }
}

fn contains_ci(haystack: &str, needle_lower: &str) -> bool {
    haystack.to_lowercase().contains(needle_lower)
}

fn paginate<T>(items: Vec<T>, page: Page) -> Vec<T> {
    items.into_iter().skip(page.offset()).take(page.size as usize).collect()
}

#[async_trait]
impl ProductRepo for InMemRepo {
    async fn list_products(&self, query: &ProductQuery) -> RepoResult<(Vec<Product>, usize)> {
        let needle = query.q.as_deref().filter(|q| !q.is_empty()).map(str::to_lowercase);
        let mut v: Vec<Product> = {
            let s = self.read();
            s.products
                .values()
                .filter(|p| match &needle {
                    Some(n) => contains_ci(&p.name, n) || p.description.as_deref().is_some_and(|d| contains_ci(d, n)),
                    None => true,
                })
                .filter(|p| query.min_price.map_or(true, |min| p.price >= min))
                .filter(|p| query.max_price.map_or(true, |max| p.price <= max))
                .cloned()
                .collect()
        };
        v.sort_by_key(|p| p.id);
        match query.sort_by {
            ProductSort::Id => {}
            ProductSort::Name => v.sort_by(|a, b| a.name.cmp(&b.name)),
            ProductSort::Price => v.sort_by(|a, b| a.price.total_cmp(&b.price)),
            ProductSort::CreatedAt => v.sort_by_key(|p| p.created_at),
            ProductSort::UpdatedAt => v.sort_by_key(|p| p.updated_at),
        }
        if query.order == SortOrder::Desc {
            v.reverse();
        }
        let total = v.len();
        Ok((paginate(v, query.page), total))
    }

    async fn get_product(&self, id: Id) -> RepoResult<Product> {
        self.read().products.get(&id).cloned().ok_or(RepoError::NotFound)
    }

    async fn create_product(&self, new: NewProduct) -> RepoResult<Product> {
        let mut s = self.write();
        let now = Utc::now();
        let id = Self::next_id(&mut s);
        let product = Product {
            id,
            name: new.name,
            description: new.description,
            price: new.price,
            created_at: now,
            updated_at: now,
        };
        s.products.insert(id, product.clone());
        drop(s); // release lock before persisting
        self.persist();
        Ok(product)
    }

    async fn update_product(&self, id: Id, upd: UpdateProduct) -> RepoResult<Product> {
        let mut s = self.write();
        let product = s.products.get_mut(&id).ok_or(RepoError::NotFound)?;
        if let Some(name) = upd.name { product.name = name; }
        if let Some(description) = upd.description { product.description = description; }
        if let Some(price) = upd.price { product.price = price; }
        product.updated_at = Utc::now();
        let updated = product.clone();
        drop(s);
        self.persist();
        Ok(updated)
    }

    async fn delete_product(&self, id: Id) -> RepoResult<()> {
        let removed = self.write().products.remove(&id);
        if removed.is_none() {
            return Err(RepoError::NotFound);
        }
        self.persist();
        Ok(())
    }
}

#[async_trait]
impl UserRepo for InMemRepo {
    async fn list_users(&self, query: &UserQuery) -> RepoResult<(Vec<User>, usize)> {
        let needle = query.q.as_deref().filter(|q| !q.is_empty()).map(str::to_lowercase);
        let role = query.role.as_deref().filter(|r| !r.is_empty());
        let mut v: Vec<User> = {
            let s = self.read();
            s.users
                .values()
                .filter(|u| match &needle {
                    Some(n) => contains_ci(&u.username, n) || contains_ci(&u.name, n),
                    None => true,
                })
                .filter(|u| role.map_or(true, |r| u.role.as_deref() == Some(r)))
                .cloned()
                .collect()
        };
        v.sort_by_key(|u| u.id);
        match query.sort_by {
            UserSort::Id => {}
            UserSort::Username => v.sort_by(|a, b| a.username.cmp(&b.username)),
            UserSort::Name => v.sort_by(|a, b| a.name.cmp(&b.name)),
            UserSort::Role => v.sort_by(|a, b| a.role.cmp(&b.role)),
            UserSort::CreatedAt => v.sort_by_key(|u| u.created_at),
            UserSort::UpdatedAt => v.sort_by_key(|u| u.updated_at),
        }
        if query.order == SortOrder::Desc {
            v.reverse();
        }
        let total = v.len();
        Ok((paginate(v, query.page), total))
    }

    async fn get_user(&self, id: Id) -> RepoResult<User> {
        self.read().users.get(&id).cloned().ok_or(RepoError::NotFound)
    }

    async fn get_user_by_username(&self, username: &str) -> RepoResult<User> {
        self.read()
            .users
            .values()
            .find(|u| u.username == username)
            .cloned()
            .ok_or(RepoError::NotFound)
    }

    async fn create_user(&self, new: UserRecord) -> RepoResult<User> {
        let mut s = self.write();
        if s.users.values().any(|u| u.username == new.username) {
            return Err(RepoError::Conflict);
        }
        let now = Utc::now();
        let id = Self::next_id(&mut s);
        let user = User {
            id,
            username: new.username,
            name: new.name,
            password_hash: new.password_hash,
            role: new.role,
            created_at: now,
            updated_at: now,
        };
        s.users.insert(id, user.clone());
        drop(s);
        self.persist();
        Ok(user)
    }

    async fn update_user(&self, id: Id, changes: UserChanges) -> RepoResult<User> {
        let mut s = self.write();

        // uniqueness check before taking the mutable borrow
        if let Some(ref username) = changes.username {
            if s.users.values().any(|u| u.username == *username && u.id != id) {
                return Err(RepoError::Conflict);
            }
        }

        let user = s.users.get_mut(&id).ok_or(RepoError::NotFound)?;
        if let Some(username) = changes.username { user.username = username; }
        if let Some(name) = changes.name { user.name = name; }
        if let Some(hash) = changes.password_hash { user.password_hash = hash; }
        if let Some(role) = changes.role { user.role = role; }
        user.updated_at = Utc::now();
        let updated = user.clone();
        drop(s);
        self.persist();
        Ok(updated)
    }

    async fn delete_user(&self, id: Id) -> RepoResult<()> {
        let removed = self.write().users.remove(&id);
        if removed.is_none() {
            return Err(RepoError::NotFound);
        }
        self.persist();
        Ok(())
    }
}

#[async_trait]
impl HealthCheck for InMemRepo {
    async fn ping(&self) -> StorageStatus {
        StorageStatus { connected: !self.state.is_poisoned(), driver: "memory".into() }
    }
}
