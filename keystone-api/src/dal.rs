//! Request-scoped data access
//!
//! The auth layer stores a fresh [`RequestCache`] next to the
//! [`AuthContext`]. Handlers extract a [`Dal`], which loads the current user
//! and the caller's role in an organization at most once per request, no
//! matter how many times a handler asks.
//!
//! Loading the current user also enforces that the account still exists and
//! is not banned, and replaces the token's platform role with the stored one.

use crate::{app::AppState, error::{ApiError, ApiResult}};
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use keystone_shared::{
    auth::{
        authorization::{require_admin, resolve_org_actor, OrgActor},
        middleware::AuthContext,
    },
    models::user::User,
    services::{accounts, ServiceContext},
};
use std::{
    collections::HashMap,
    future::Future,
    sync::Arc,
};
use tokio::sync::{Mutex, OnceCell};
use uuid::Uuid;

/// Memoized lookups for one request
#[derive(Clone, Default)]
pub struct RequestCache {
    inner: Arc<CacheInner>,
}

#[derive(Default)]
struct CacheInner {
    user: OnceCell<User>,
    actors: Mutex<HashMap<Uuid, OrgActor>>,
}

impl RequestCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached user, running `load` only on the first call.
    pub async fn user_or_load<F, Fut>(&self, load: F) -> ApiResult<User>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ApiResult<User>>,
    {
        self.inner.user.get_or_try_init(load).await.cloned()
    }

    /// Returns the cached actor for `organization_id`, running `resolve`
    /// only when it is not cached yet. Failures are not cached.
    pub async fn actor_or_resolve<F, Fut>(&self, organization_id: Uuid, resolve: F) -> ApiResult<OrgActor>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ApiResult<OrgActor>>,
    {
        let mut actors = self.inner.actors.lock().await;
        if let Some(actor) = actors.get(&organization_id) {
            return Ok(*actor);
        }

        let actor = resolve().await?;
        actors.insert(organization_id, actor);
        Ok(actor)
    }
}

/// Authenticated data access for a handler
pub struct Dal {
    services: ServiceContext,
    auth: AuthContext,
    cache: RequestCache,
}

impl Dal {
    pub fn new(services: ServiceContext, auth: AuthContext, cache: RequestCache) -> Self {
        Self {
            services,
            auth,
            cache,
        }
    }

    pub fn services(&self) -> &ServiceContext {
        &self.services
    }

    /// Identity as carried by the access token
    pub fn token(&self) -> &AuthContext {
        &self.auth
    }

    pub fn user_id(&self) -> Uuid {
        self.auth.user_id
    }

    /// The current user; rejects deleted and banned accounts.
    pub async fn current_user(&self) -> ApiResult<User> {
        self.cache
            .user_or_load(|| async {
                Ok(accounts::load_active_user(&self.services, self.auth.user_id).await?)
            })
            .await
    }

    /// Auth context with the platform role as currently stored.
    pub async fn auth(&self) -> ApiResult<AuthContext> {
        let user = self.current_user().await?;
        Ok(AuthContext {
            role: user.role,
            ..self.auth.clone()
        })
    }

    /// Auth context of a platform admin, or 403.
    pub async fn admin(&self) -> ApiResult<AuthContext> {
        let auth = self.auth().await?;
        require_admin(&auth)?;
        Ok(auth)
    }

    /// The caller's role in an organization.
    pub async fn actor(&self, organization_id: Uuid) -> ApiResult<OrgActor> {
        let auth = self.auth().await?;
        self.cache
            .actor_or_resolve(organization_id, || async {
                Ok(resolve_org_actor(&self.services.db, organization_id, &auth).await?)
            })
            .await
    }
}

#[async_trait]
impl FromRequestParts<AppState> for Dal {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let auth = parts
            .extensions
            .get::<AuthContext>()
            .cloned()
            .ok_or_else(|| ApiError::Unauthorized("Missing credentials".to_string()))?;

        // Routes outside the auth layer get an empty cache of their own
        let cache = parts.extensions.get::<RequestCache>().cloned().unwrap_or_default();

        Ok(Dal::new(state.services.clone(), auth, cache))
    }
}
