use actix_web::{dev::Payload, web, FromRequest, HttpMessage, HttpRequest};
use actix_web_httpauth::extractors::bearer::BearerAuth;
use futures_util::future::LocalBoxFuture;
use tracing::{debug, error};

use crate::error::ApiError;
use crate::gateway::RequestContext;
use crate::models::User;
use crate::password::{verify_dummy, verify_password};
use crate::repo::{Repo, RepoError, UserRepo};
use crate::routes::AppState;

/// Check a username/password pair against the stored credential record.
///
/// An unknown username and a wrong password both return `None`. The unknown
/// case still pays for one argon2 verification.
pub async fn authenticate(repo: &dyn Repo, username: &str, password: &str) -> Option<User> {
    let user = match repo.get_user_by_username(username).await {
        Ok(u) => Some(u),
        Err(RepoError::NotFound) => None,
        Err(e) => {
            error!(error = %e, "credential lookup failed");
            None
        }
    };
    let password = password.to_owned();
    let verified = web::block(move || match user {
        Some(u) => match verify_password(&u.password_hash, &password) {
            Ok(true) => Some(u),
            Ok(false) => None,
            Err(e) => {
                error!(user_id = u.id, error = %e, "stored password hash unreadable");
                None
            }
        },
        None => {
            verify_dummy(&password);
            None
        }
    })
    .await;
    verified.unwrap_or_else(|e| {
        error!(error = %e, "password verification task failed");
        None
    })
}

/// Extractor for protected routes, yielding the caller's user record.
///
/// Missing header, malformed header, bad token and unknown user all produce
/// the same `ApiError::Unauthorized`.
pub struct Auth(pub User);

impl FromRequest for Auth {
    type Error = ApiError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, pl: &mut Payload) -> Self::Future {
        // Delegate to BearerAuth to parse the header.
        let bearer = BearerAuth::from_request(req, pl).into_inner();
        let req = req.clone();
        Box::pin(async move {
            let bearer = bearer.map_err(|_| {
                debug!("missing or malformed Authorization header");
                ApiError::Unauthorized
            })?;
            let state = req.app_data::<web::Data<AppState>>().cloned().ok_or_else(|| {
                error!("AppState not registered; cannot authenticate");
                ApiError::Internal
            })?;
            let claims = state.tokens.validate(bearer.token())?;
            let user = state.repo.get_user(claims.uid).await.map_err(|e| match e {
                RepoError::NotFound => {
                    debug!(uid = claims.uid, "token subject no longer exists");
                    ApiError::Unauthorized
                }
                other => ApiError::from(other),
            })?;
            if let Some(ctx) = req.extensions_mut().get_mut::<RequestContext>() {
                ctx.caller = Some(user.id);
            }
            Ok(Auth(user))
        })
    }
}
