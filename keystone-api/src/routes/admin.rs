/// Platform administration endpoints
///
/// Every route here sits behind the admin guard, which checks the stored
/// platform role; the services check it again.
///
/// # Endpoints
///
/// - `GET /v1/admin/users?search=&page=&per_page=`
/// - `DELETE /v1/admin/users/:id`
/// - `POST /v1/admin/users/:id/role`
/// - `POST /v1/admin/users/:id/ban` / `unban`
/// - `GET /v1/admin/organizations?search=`
/// - `GET /v1/admin/stats`
/// - `GET|POST /v1/admin/posts`, `GET|PATCH|DELETE /v1/admin/posts/:id`
/// - `POST /v1/admin/posts/:id/publish` / `archive`
/// - `GET|POST /v1/admin/categories`, `DELETE /v1/admin/categories/:id`

use crate::{
    dal::Dal,
    error::ApiResult,
    extract::{Json, Path, Query},
    response::{ApiResponse, Deleted},
};
use keystone_shared::{
    db::pool::{get_pool_stats, PoolStats},
    models::{
        organization::OrganizationSummary,
        post::{Category, Post},
        user::User,
    },
    pagination::{PageParams, Paginated},
    services::{
        admin::{self, BanInput, PlatformStats, SearchQuery, SetRoleInput},
        posts::{self, AdminPostFilter, CategoryInput, CreatePostInput, PostDetails, UpdatePostInput},
    },
};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    #[serde(flatten)]
    pub platform: PlatformStats,
    pub database_pool: PoolStats,
}

pub async fn list_users(
    dal: Dal,
    Query(query): Query<SearchQuery>,
    Query(page): Query<PageParams>,
) -> ApiResult<ApiResponse<Paginated<User>>> {
    let auth = dal.admin().await?;
    let users = admin::list_users(dal.services(), &auth, query, page).await?;
    Ok(ApiResponse::ok(users))
}

/// Grant or revoke platform admin. Admins cannot change their own role.
pub async fn set_role(
    dal: Dal,
    Path(id): Path<Uuid>,
    Json(req): Json<SetRoleInput>,
) -> ApiResult<ApiResponse<User>> {
    let auth = dal.admin().await?;
    let user = admin::set_role(dal.services(), &auth, id, req).await?;
    Ok(ApiResponse::ok(user))
}

pub async fn ban(
    dal: Dal,
    Path(id): Path<Uuid>,
    Json(req): Json<BanInput>,
) -> ApiResult<ApiResponse<User>> {
    let auth = dal.admin().await?;
    let user = admin::ban(dal.services(), &auth, id, req).await?;
    Ok(ApiResponse::ok(user))
}

pub async fn unban(dal: Dal, Path(id): Path<Uuid>) -> ApiResult<ApiResponse<User>> {
    let auth = dal.admin().await?;
    let user = admin::unban(dal.services(), &auth, id).await?;
    Ok(ApiResponse::ok(user))
}

pub async fn delete_user(dal: Dal, Path(id): Path<Uuid>) -> ApiResult<ApiResponse<Deleted>> {
    let auth = dal.admin().await?;
    admin::delete_user(dal.services(), &auth, id).await?;
    Ok(ApiResponse::deleted())
}

pub async fn list_organizations(
    dal: Dal,
    Query(query): Query<SearchQuery>,
    Query(page): Query<PageParams>,
) -> ApiResult<ApiResponse<Paginated<OrganizationSummary>>> {
    let auth = dal.admin().await?;
    let organizations = admin::list_organizations(dal.services(), &auth, query, page).await?;
    Ok(ApiResponse::ok(organizations))
}

pub async fn stats(dal: Dal) -> ApiResult<ApiResponse<StatsResponse>> {
    let auth = dal.admin().await?;
    let platform = admin::stats(dal.services(), &auth).await?;

    Ok(ApiResponse::ok(StatsResponse {
        platform,
        database_pool: get_pool_stats(&dal.services().db),
    }))
}

pub async fn list_posts(
    dal: Dal,
    Query(filter): Query<AdminPostFilter>,
    Query(page): Query<PageParams>,
) -> ApiResult<ApiResponse<Paginated<Post>>> {
    let auth = dal.admin().await?;
    let items = posts::list_all(dal.services(), &auth, filter, page).await?;
    Ok(ApiResponse::ok(items))
}

pub async fn get_post(dal: Dal, Path(id): Path<Uuid>) -> ApiResult<ApiResponse<PostDetails>> {
    let auth = dal.admin().await?;
    let post = posts::get(dal.services(), &auth, id).await?;
    Ok(ApiResponse::ok(post))
}

/// Create a draft post
///
/// The slug defaults to one derived from the English title.
pub async fn create_post(
    dal: Dal,
    Json(req): Json<CreatePostInput>,
) -> ApiResult<ApiResponse<PostDetails>> {
    let auth = dal.admin().await?;
    let post = posts::create(dal.services(), &auth, req).await?;
    Ok(ApiResponse::created(post))
}

pub async fn update_post(
    dal: Dal,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdatePostInput>,
) -> ApiResult<ApiResponse<PostDetails>> {
    let auth = dal.admin().await?;
    let post = posts::update(dal.services(), &auth, id, req).await?;
    Ok(ApiResponse::ok(post))
}

/// Publish a post; it needs an English translation first (422).
pub async fn publish_post(dal: Dal, Path(id): Path<Uuid>) -> ApiResult<ApiResponse<Post>> {
    let auth = dal.admin().await?;
    let post = posts::publish(dal.services(), &auth, id).await?;
    Ok(ApiResponse::ok(post))
}

pub async fn archive_post(dal: Dal, Path(id): Path<Uuid>) -> ApiResult<ApiResponse<Post>> {
    let auth = dal.admin().await?;
    let post = posts::archive(dal.services(), &auth, id).await?;
    Ok(ApiResponse::ok(post))
}

pub async fn delete_post(dal: Dal, Path(id): Path<Uuid>) -> ApiResult<ApiResponse<Deleted>> {
    let auth = dal.admin().await?;
    posts::delete(dal.services(), &auth, id).await?;
    Ok(ApiResponse::deleted())
}

pub async fn create_category(
    dal: Dal,
    Json(req): Json<CategoryInput>,
) -> ApiResult<ApiResponse<Category>> {
    let auth = dal.admin().await?;
    let category = posts::create_category(dal.services(), &auth, req).await?;
    Ok(ApiResponse::created(category))
}

pub async fn delete_category(dal: Dal, Path(id): Path<Uuid>) -> ApiResult<ApiResponse<Deleted>> {
    let auth = dal.admin().await?;
    posts::delete_category(dal.services(), &auth, id).await?;
    Ok(ApiResponse::deleted())
}
