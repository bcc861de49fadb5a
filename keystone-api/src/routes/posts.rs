/// Public blog endpoints
///
/// # Endpoints
///
/// - `GET /v1/posts?locale=&category=&hashtag=&page=&per_page=`
/// - `GET /v1/posts/categories`
/// - `GET /v1/posts/:slug?locale=` - Falls back to English when the locale
///   has no translation; includes `liked` for signed-in readers
/// - `POST /v1/posts/:slug/view` - Rate limited per client address
/// - `POST /v1/posts/:slug/like` - Toggle; rate limited per user
///
/// Routed only while the `blog` feature is enabled.

use crate::{
    app::AppState,
    dal::Dal,
    error::ApiResult,
    extract::{Path, Query},
    response::ApiResponse,
};
use axum::{extract::State, http::HeaderMap};
use keystone_shared::{
    auth::middleware::AuthContext,
    models::post::{Category, PostListItem},
    pagination::{PageParams, Paginated},
    services::posts::{self, LikeState, PostQuery, PublishedPost, ViewCount},
};
use serde::Deserialize;

const ANONYMOUS_CLIENT: &str = "anonymous";

#[derive(Debug, Default, Deserialize)]
pub struct LocaleQuery {
    pub locale: Option<String>,
}

/// Client address used to rate limit anonymous views
///
/// Takes the first `X-Forwarded-For` entry, then `X-Real-IP`.
pub fn client_key(headers: &HeaderMap) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    let real_ip = || {
        headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    forwarded
        .or_else(real_ip)
        .unwrap_or(ANONYMOUS_CLIENT)
        .to_string()
}

pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<PostQuery>,
    Query(page): Query<PageParams>,
) -> ApiResult<ApiResponse<Paginated<PostListItem>>> {
    let posts = posts::list_published(&state, query, page).await?;
    Ok(ApiResponse::ok(posts))
}

pub async fn categories(State(state): State<AppState>) -> ApiResult<ApiResponse<Vec<Category>>> {
    let categories = posts::list_categories(&state).await?;
    Ok(ApiResponse::ok(categories))
}

pub async fn get(
    State(state): State<AppState>,
    reader: Option<AuthContext>,
    Path(slug): Path<String>,
    Query(query): Query<LocaleQuery>,
) -> ApiResult<ApiResponse<PublishedPost>> {
    let reader = reader.map(|auth| auth.user_id);
    let post = posts::get_published(&state, &slug, query.locale.as_deref(), reader).await?;
    Ok(ApiResponse::ok(post))
}

pub async fn view(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(slug): Path<String>,
) -> ApiResult<ApiResponse<ViewCount>> {
    let count = posts::record_view(&state, &client_key(&headers), &slug).await?;
    Ok(ApiResponse::ok(count))
}

pub async fn like(dal: Dal, Path(slug): Path<String>) -> ApiResult<ApiResponse<LikeState>> {
    dal.current_user().await?;
    let state = posts::toggle_like(dal.services(), dal.user_id(), &slug).await?;
    Ok(ApiResponse::ok(state))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_client_key_prefers_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7, 10.0.0.1"));
        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.2"));

        assert_eq!(client_key(&headers), "203.0.113.7");
    }

    #[test]
    fn test_client_key_fallbacks() {
        let mut headers = HeaderMap::new();
        assert_eq!(client_key(&headers), ANONYMOUS_CLIENT);

        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.2"));
        assert_eq!(client_key(&headers), "198.51.100.2");

        headers.insert("x-forwarded-for", HeaderValue::from_static(" "));
        assert_eq!(client_key(&headers), "198.51.100.2");
    }
}
