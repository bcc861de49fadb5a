//! Tasks inside a project
//!
//! Creators and Admins may change anything on a task. The assignee may only
//! move its status. Assigning someone notifies them, and only members of
//! the organization can be assigned.

use chrono::NaiveDate;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use super::{
    clean_optional, intercept,
    notifications::{kinds, notify},
    nullable, projects, validate, ServiceContext, ServiceError, ServiceResult,
};
use crate::{
    auth::authorization::{
        can_manage_resource, has_role, require_permission, AuthzError, OrgActor, ResourcePermission,
    },
    models::{
        membership::{Membership, MembershipRole},
        notification::CreateNotification,
        project::Project,
        task::{CreateTask, Task, TaskPriority, TaskStatus, UpdateTask},
    },
    pagination::{PageParams, Paginated},
};

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateTaskInput {
    #[validate(length(min = 1, max = 200, message = "Title must be 1-200 characters"))]
    pub title: String,

    #[validate(length(max = 5000, message = "Description must be at most 5000 characters"))]
    pub description: Option<String>,

    #[serde(default)]
    pub priority: TaskPriority,

    pub assignee_id: Option<Uuid>,

    pub due_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateTaskInput {
    #[validate(length(min = 1, max = 200, message = "Title must be 1-200 characters"))]
    pub title: Option<String>,

    #[serde(default, deserialize_with = "nullable")]
    pub description: Option<Option<String>>,

    pub status: Option<TaskStatus>,

    pub priority: Option<TaskPriority>,

    #[serde(default, deserialize_with = "nullable")]
    pub assignee_id: Option<Option<Uuid>>,

    #[serde(default, deserialize_with = "nullable")]
    pub due_date: Option<Option<NaiveDate>>,
}

impl From<UpdateTaskInput> for UpdateTask {
    fn from(input: UpdateTaskInput) -> Self {
        UpdateTask {
            title: input.title.map(|t| t.trim().to_string()),
            description: input.description.map(clean_optional),
            status: input.status,
            priority: input.priority,
            assignee_id: input.assignee_id,
            due_date: input.due_date,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
}

/// Whether the actor may apply `update` to `task`.
fn can_update(actor: &OrgActor, task: &Task, update: &UpdateTask) -> bool {
    if can_manage_resource(actor, task.created_by) {
        return true;
    }

    update.is_status_only()
        && task.assignee_id == Some(actor.user_id)
        && has_role(actor.role, MembershipRole::Member)
}

async fn ensure_assignable(ctx: &ServiceContext, actor: &OrgActor, user_id: Uuid) -> ServiceResult<()> {
    match Membership::get_role(&ctx.db, actor.organization_id, user_id).await? {
        Some(_) => Ok(()),
        None => Err(ServiceError::invalid(
            "assignee_id",
            "Assignee must be a member of the organization",
        )),
    }
}

async fn notify_assignee(ctx: &ServiceContext, actor: &OrgActor, project: &Project, task: &Task) {
    let Some(assignee) = task.assignee_id else {
        return;
    };
    if assignee == actor.user_id {
        return;
    }

    notify(
        ctx,
        CreateNotification {
            user_id: assignee,
            organization_id: Some(actor.organization_id),
            kind: kinds::TASK_ASSIGNED.to_string(),
            title: format!("You were assigned \"{}\"", task.title),
            body: Some(format!("In project {}", project.name)),
            link: Some(format!(
                "/organizations/{}/projects/{}/tasks/{}",
                actor.organization_id, project.id, task.id
            )),
        },
    )
    .await;
}

async fn load_task(ctx: &ServiceContext, project_id: Uuid, task_id: Uuid) -> ServiceResult<Task> {
    Task::find(&ctx.db, project_id, task_id)
        .await?
        .ok_or(ServiceError::NotFound("Task"))
}

pub async fn list(
    ctx: &ServiceContext,
    actor: &OrgActor,
    project_id: Uuid,
    filter: TaskFilter,
    page: PageParams,
) -> ServiceResult<Paginated<Task>> {
    intercept("tasks.list", async move {
        require_permission(actor, ResourcePermission::Read)?;
        let project = projects::load(ctx, actor, project_id).await?;

        let items =
            Task::list_by_project(&ctx.db, project.id, filter.status, page.limit(), page.offset())
                .await?;
        let total = Task::count_by_project(&ctx.db, project.id, filter.status).await?;

        Ok(Paginated::new(items, page, total))
    })
    .await
}

pub async fn create(
    ctx: &ServiceContext,
    actor: &OrgActor,
    project_id: Uuid,
    input: CreateTaskInput,
) -> ServiceResult<Task> {
    intercept("tasks.create", async move {
        require_permission(actor, ResourcePermission::Write)?;
        validate(&input)?;
        let project = projects::load(ctx, actor, project_id).await?;

        if let Some(assignee) = input.assignee_id {
            ensure_assignable(ctx, actor, assignee).await?;
        }

        let task = Task::create(
            &ctx.db,
            CreateTask {
                project_id: project.id,
                title: input.title.trim().to_string(),
                description: clean_optional(input.description),
                priority: input.priority,
                assignee_id: input.assignee_id,
                due_date: input.due_date,
                created_by: actor.user_id,
            },
        )
        .await?;

        notify_assignee(ctx, actor, &project, &task).await;
        Ok(task)
    })
    .await
}

pub async fn update(
    ctx: &ServiceContext,
    actor: &OrgActor,
    project_id: Uuid,
    task_id: Uuid,
    input: UpdateTaskInput,
) -> ServiceResult<Task> {
    intercept("tasks.update", async move {
        validate(&input)?;
        let project = projects::load(ctx, actor, project_id).await?;
        let task = load_task(ctx, project.id, task_id).await?;

        let changes = UpdateTask::from(input);
        if !can_update(actor, &task, &changes) {
            return Err(AuthzError::NotAuthorized.into());
        }

        let new_assignee = match changes.assignee_id {
            Some(Some(assignee)) if task.assignee_id != Some(assignee) => Some(assignee),
            _ => None,
        };
        if let Some(assignee) = new_assignee {
            ensure_assignable(ctx, actor, assignee).await?;
        }

        let updated = Task::update(&ctx.db, project.id, task.id, changes)
            .await?
            .ok_or(ServiceError::NotFound("Task"))?;

        if new_assignee.is_some() {
            notify_assignee(ctx, actor, &project, &updated).await;
        }
        Ok(updated)
    })
    .await
}

pub async fn delete(
    ctx: &ServiceContext,
    actor: &OrgActor,
    project_id: Uuid,
    task_id: Uuid,
) -> ServiceResult<()> {
    intercept("tasks.delete", async move {
        let project = projects::load(ctx, actor, project_id).await?;
        let task = load_task(ctx, project.id, task_id).await?;

        if !can_manage_resource(actor, task.created_by) {
            return Err(AuthzError::NotAuthorized.into());
        }

        if !Task::delete(&ctx.db, project.id, task.id).await? {
            return Err(ServiceError::NotFound("Task"));
        }
        Ok(())
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn actor(role: MembershipRole) -> OrgActor {
        OrgActor {
            user_id: Uuid::new_v4(),
            organization_id: Uuid::new_v4(),
            role,
            via_platform_admin: false,
        }
    }

    fn task(created_by: Option<Uuid>, assignee_id: Option<Uuid>) -> Task {
        Task {
            id: Uuid::new_v4(),
            project_id: Uuid::new_v4(),
            title: "Write docs".into(),
            description: None,
            status: TaskStatus::Todo,
            priority: TaskPriority::Medium,
            assignee_id,
            due_date: None,
            created_by,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn status_only() -> UpdateTask {
        UpdateTask {
            status: Some(TaskStatus::Done),
            ..Default::default()
        }
    }

    fn retitle() -> UpdateTask {
        UpdateTask {
            title: Some("New".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_creator_and_admin_can_update_anything() {
        let member = actor(MembershipRole::Member);
        let own = task(Some(member.user_id), None);
        assert!(can_update(&member, &own, &retitle()));

        let admin = actor(MembershipRole::Admin);
        let other = task(Some(Uuid::new_v4()), None);
        assert!(can_update(&admin, &other, &retitle()));
    }

    #[test]
    fn test_assignee_can_only_change_status() {
        let member = actor(MembershipRole::Member);
        let assigned = task(Some(Uuid::new_v4()), Some(member.user_id));

        assert!(can_update(&member, &assigned, &status_only()));
        assert!(!can_update(&member, &assigned, &retitle()));
    }

    #[test]
    fn test_viewer_cannot_update() {
        let viewer = actor(MembershipRole::Viewer);
        let assigned = task(Some(viewer.user_id), Some(viewer.user_id));

        assert!(!can_update(&viewer, &assigned, &status_only()));
        assert!(!can_update(&viewer, &assigned, &retitle()));
    }

    #[test]
    fn test_update_input_clears_assignee() {
        let input: UpdateTaskInput = serde_json::from_str(r#"{"assignee_id": null}"#).unwrap();
        let update = UpdateTask::from(input);
        assert_eq!(update.assignee_id, Some(None));
        assert!(!update.is_status_only());
    }
}
