/// Application state and router builder
///
/// This module defines the shared application state and provides
/// a function to build the Axum router with all routes and middleware.
///
/// # Example
///
/// ```no_run
/// use keystone_api::{app::AppState, config::Config};
/// use sqlx::PgPool;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// let pool = PgPool::connect(&config.database.url).await?;
/// let state = AppState::new(pool, config)?;
/// let app = keystone_api::app::build_router(state);
/// # Ok(())
/// # }
/// ```

use crate::{
    config::Config,
    middleware::{
        auth::{admin_guard, optional_auth, require_auth},
        features::{require_billing, require_blog, require_registration},
        security::SecurityHeadersLayer,
    },
    routes,
};
use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    middleware::from_fn_with_state,
    routing::{get, patch, post},
    Router,
};
use keystone_shared::{
    billing, email,
    rate_limit::RateLimiters,
    services::ServiceContext,
    storage,
};
use sqlx::PgPool;
use std::{ops::Deref, sync::Arc};
use tower_http::{
    compression::CompressionLayer,
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

/// Room for request framing on top of the largest allowed upload
const UPLOAD_BODY_OVERHEAD: usize = 64 * 1024;

/// Shared application state
///
/// Cloned for each request handler via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<Config>,

    /// Database pool and provider adapters used by the services
    pub services: ServiceContext,
}

impl Deref for AppState {
    type Target = ServiceContext;

    fn deref(&self) -> &Self::Target {
        &self.services
    }
}

impl AppState {
    /// Creates application state, selecting each provider adapter from
    /// configuration.
    pub fn new(db: PgPool, config: Config) -> anyhow::Result<Self> {
        let services = ServiceContext {
            db,
            storage: storage::from_config(&config.storage)?,
            mailer: email::from_config(&config.email)?,
            payments: billing::from_config(&config.billing)?,
            limiters: RateLimiters::from_config(&config.rate_limits),
            settings: Arc::new(config.service_settings()),
        };

        Ok(Self::with_services(config, services))
    }

    /// Creates application state around prepared services (tests swap in
    /// in-memory adapters this way).
    pub fn with_services(config: Config, services: ServiceContext) -> Self {
        Self {
            config: Arc::new(config),
            services,
        }
    }

    /// Gets JWT secret for token operations
    pub fn jwt_secret(&self) -> &str {
        &self.config.jwt.secret
    }
}

/// Builds the complete Axum router with all routes and middleware
///
/// # Architecture
///
/// ```text
/// /
/// ├── /health                         # Health check (public)
/// └── /v1/
///     ├── /auth/                      # Sign-up, sign-in, profile
///     ├── /organizations/:org_id/     # Members, invitations, projects,
///     │                               # tasks, files, subscription
///     ├── /invitations/accept
///     ├── /billing/                   # Plans and provider webhook
///     ├── /posts/                     # Public blog
///     ├── /notifications/
///     └── /admin/                     # Platform administration
/// ```
///
/// # Middleware Stack
///
/// Applied in order (outermost first):
/// 1. Security headers
/// 2. CORS (tower-http CorsLayer)
/// 3. Logging (tower-http TraceLayer)
/// 4. Feature flags, authentication and admin guard (per route group)
pub fn build_router(state: AppState) -> Router {
    let auth = || from_fn_with_state(state.clone(), require_auth);

    let health_routes = Router::new().route("/health", get(routes::health::health_check));

    let registration_routes = Router::new()
        .route("/register", post(routes::auth::register))
        .route_layer(from_fn_with_state(state.clone(), require_registration));

    let session_routes = Router::new()
        .route("/me", get(routes::auth::me).patch(routes::auth::update_me))
        .route("/password", post(routes::auth::change_password))
        .route("/switch-organization", post(routes::auth::switch_organization))
        .route_layer(auth());

    let auth_routes = Router::new()
        .merge(registration_routes)
        .route("/login", post(routes::auth::login))
        .route("/refresh", post(routes::auth::refresh))
        .merge(session_routes);

    let upload_limit = state.config.upload.max_bytes.saturating_add(UPLOAD_BODY_OVERHEAD);

    let organization_routes = Router::new()
        .route(
            "/",
            get(routes::organizations::list).post(routes::organizations::create),
        )
        .route(
            "/:org_id",
            get(routes::organizations::get)
                .patch(routes::organizations::update)
                .delete(routes::organizations::delete),
        )
        .route("/:org_id/members", get(routes::organizations::list_members))
        .route(
            "/:org_id/members/:user_id",
            patch(routes::organizations::update_member)
                .delete(routes::organizations::remove_member),
        )
        .route(
            "/:org_id/invitations",
            get(routes::organizations::list_invitations).post(routes::organizations::invite),
        )
        .route(
            "/:org_id/invitations/:invitation_id",
            axum::routing::delete(routes::organizations::revoke_invitation),
        )
        .route(
            "/:org_id/projects",
            get(routes::projects::list).post(routes::projects::create),
        )
        .route(
            "/:org_id/projects/:project_id",
            get(routes::projects::get)
                .patch(routes::projects::update)
                .delete(routes::projects::delete),
        )
        .route(
            "/:org_id/projects/:project_id/tasks",
            get(routes::tasks::list).post(routes::tasks::create),
        )
        .route(
            "/:org_id/projects/:project_id/tasks/:task_id",
            patch(routes::tasks::update).delete(routes::tasks::delete),
        )
        .route(
            "/:org_id/files",
            get(routes::files::list)
                .post(routes::files::upload)
                .layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/:org_id/files/usage", get(routes::files::usage))
        .route(
            "/:org_id/files/:file_id",
            get(routes::files::download).delete(routes::files::delete),
        )
        .merge(
            Router::new()
                .route("/:org_id/subscription", get(routes::billing::subscription))
                .route("/:org_id/billing/checkout", post(routes::billing::checkout))
                .route("/:org_id/billing/cancel", post(routes::billing::cancel))
                .route_layer(from_fn_with_state(state.clone(), require_billing)),
        )
        .route_layer(auth());

    let invitation_routes = Router::new()
        .route("/accept", post(routes::organizations::accept_invitation))
        .route_layer(auth());

    let billing_routes = Router::new()
        .route("/plans", get(routes::billing::plans))
        .route("/webhook", post(routes::billing::webhook))
        .route_layer(from_fn_with_state(state.clone(), require_billing));

    let post_routes = Router::new()
        .route("/", get(routes::posts::list))
        .route("/categories", get(routes::posts::categories))
        .route(
            "/:slug",
            get(routes::posts::get).route_layer(from_fn_with_state(state.clone(), optional_auth)),
        )
        .route("/:slug/view", post(routes::posts::view))
        .route("/:slug/like", post(routes::posts::like).route_layer(auth()))
        .route_layer(from_fn_with_state(state.clone(), require_blog));

    let notification_routes = Router::new()
        .route("/", get(routes::notifications::list))
        .route("/unread-count", get(routes::notifications::unread_count))
        .route("/read-all", post(routes::notifications::mark_all_read))
        .route("/:id/read", post(routes::notifications::mark_read))
        .route("/:id", axum::routing::delete(routes::notifications::delete))
        .route_layer(auth());

    let admin_post_routes = Router::new()
        .route(
            "/posts",
            get(routes::admin::list_posts).post(routes::admin::create_post),
        )
        .route(
            "/posts/:id",
            get(routes::admin::get_post)
                .patch(routes::admin::update_post)
                .delete(routes::admin::delete_post),
        )
        .route("/posts/:id/publish", post(routes::admin::publish_post))
        .route("/posts/:id/archive", post(routes::admin::archive_post))
        .route(
            "/categories",
            get(routes::posts::categories).post(routes::admin::create_category),
        )
        .route(
            "/categories/:id",
            axum::routing::delete(routes::admin::delete_category),
        )
        .route_layer(from_fn_with_state(state.clone(), require_blog));

    // Layers run bottom-up: authenticate, then check the stored platform role
    let admin_routes = Router::new()
        .route("/users", get(routes::admin::list_users))
        .route(
            "/users/:id",
            axum::routing::delete(routes::admin::delete_user),
        )
        .route("/users/:id/role", post(routes::admin::set_role))
        .route("/users/:id/ban", post(routes::admin::ban))
        .route("/users/:id/unban", post(routes::admin::unban))
        .route("/organizations", get(routes::admin::list_organizations))
        .route("/stats", get(routes::admin::stats))
        .merge(admin_post_routes)
        .route_layer(from_fn_with_state(state.clone(), admin_guard))
        .route_layer(auth());

    let v1_routes = Router::new()
        .nest("/auth", auth_routes)
        .nest("/organizations", organization_routes)
        .nest("/invitations", invitation_routes)
        .nest("/billing", billing_routes)
        .nest("/posts", post_routes)
        .nest("/notifications", notification_routes)
        .nest("/admin", admin_routes);

    // Configure CORS based on environment
    let cors = if state.config.api.allows_any_origin() {
        // Development mode: permissive CORS
        CorsLayer::permissive()
    } else {
        let origins: Vec<HeaderValue> = state
            .config
            .api
            .cors_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PATCH,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
            .allow_credentials(true)
            .max_age(std::time::Duration::from_secs(3600))
    };

    let production = state.config.api.production;

    Router::new()
        .merge(health_routes)
        .nest("/v1", v1_routes)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(CompressionLayer::new())
        .layer(cors)
        .layer(SecurityHeadersLayer::new(production))
        .with_state(state)
}
