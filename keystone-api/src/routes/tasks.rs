//! Task endpoints, nested under a project
//!
//! Assignees may change the status of tasks assigned to them; any other
//! change needs the creator or an organization admin.

use crate::{
    dal::Dal,
    error::ApiResult,
    extract::{Json, Path, Query},
    response::{ApiResponse, Deleted},
};
use keystone_shared::{
    models::task::Task,
    pagination::{PageParams, Paginated},
    services::tasks::{self, CreateTaskInput, TaskFilter, UpdateTaskInput},
};
use uuid::Uuid;

pub async fn list(
    dal: Dal,
    Path((org_id, project_id)): Path<(Uuid, Uuid)>,
    Query(filter): Query<TaskFilter>,
    Query(page): Query<PageParams>,
) -> ApiResult<ApiResponse<Paginated<Task>>> {
    let actor = dal.actor(org_id).await?;
    let tasks = tasks::list(dal.services(), &actor, project_id, filter, page).await?;
    Ok(ApiResponse::ok(tasks))
}

pub async fn create(
    dal: Dal,
    Path((org_id, project_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<CreateTaskInput>,
) -> ApiResult<ApiResponse<Task>> {
    let actor = dal.actor(org_id).await?;
    let task = tasks::create(dal.services(), &actor, project_id, req).await?;
    Ok(ApiResponse::created(task))
}

pub async fn update(
    dal: Dal,
    Path((org_id, project_id, task_id)): Path<(Uuid, Uuid, Uuid)>,
    Json(req): Json<UpdateTaskInput>,
) -> ApiResult<ApiResponse<Task>> {
    let actor = dal.actor(org_id).await?;
    let task = tasks::update(dal.services(), &actor, project_id, task_id, req).await?;
    Ok(ApiResponse::ok(task))
}

pub async fn delete(
    dal: Dal,
    Path((org_id, project_id, task_id)): Path<(Uuid, Uuid, Uuid)>,
) -> ApiResult<ApiResponse<Deleted>> {
    let actor = dal.actor(org_id).await?;
    tasks::delete(dal.services(), &actor, project_id, task_id).await?;
    Ok(ApiResponse::deleted())
}
