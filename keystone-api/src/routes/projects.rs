/// Project endpoints
///
/// # Endpoints
///
/// - `GET /v1/organizations/:org_id/projects?include_archived=&page=&per_page=`
/// - `POST /v1/organizations/:org_id/projects`
/// - `GET|PATCH|DELETE /v1/organizations/:org_id/projects/:project_id`
///
/// Creating a project counts against the plan's project limit (402 when
/// reached). Members manage the projects they created; admins manage all.

use crate::{
    dal::Dal,
    error::ApiResult,
    extract::{Json, Path, Query},
    response::{ApiResponse, Deleted},
};
use keystone_shared::{
    models::project::Project,
    pagination::{PageParams, Paginated},
    services::projects::{self, CreateProjectInput, ProjectFilter, UpdateProjectInput},
};
use uuid::Uuid;

pub async fn list(
    dal: Dal,
    Path(org_id): Path<Uuid>,
    Query(filter): Query<ProjectFilter>,
    Query(page): Query<PageParams>,
) -> ApiResult<ApiResponse<Paginated<Project>>> {
    let actor = dal.actor(org_id).await?;
    let projects = projects::list(dal.services(), &actor, filter, page).await?;
    Ok(ApiResponse::ok(projects))
}

pub async fn create(
    dal: Dal,
    Path(org_id): Path<Uuid>,
    Json(req): Json<CreateProjectInput>,
) -> ApiResult<ApiResponse<Project>> {
    let actor = dal.actor(org_id).await?;
    let project = projects::create(dal.services(), &actor, req).await?;
    Ok(ApiResponse::created(project))
}

pub async fn get(
    dal: Dal,
    Path((org_id, project_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<ApiResponse<Project>> {
    let actor = dal.actor(org_id).await?;
    let project = projects::get(dal.services(), &actor, project_id).await?;
    Ok(ApiResponse::ok(project))
}

pub async fn update(
    dal: Dal,
    Path((org_id, project_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<UpdateProjectInput>,
) -> ApiResult<ApiResponse<Project>> {
    let actor = dal.actor(org_id).await?;
    let project = projects::update(dal.services(), &actor, project_id, req).await?;
    Ok(ApiResponse::ok(project))
}

/// Delete a project and its tasks
pub async fn delete(
    dal: Dal,
    Path((org_id, project_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<ApiResponse<Deleted>> {
    let actor = dal.actor(org_id).await?;
    projects::delete(dal.services(), &actor, project_id).await?;
    Ok(ApiResponse::deleted())
}
