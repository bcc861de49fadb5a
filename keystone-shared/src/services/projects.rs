//! Projects
//!
//! Every member can read projects. Members create them within the plan's
//! project limit; the creator or an Admin may change or delete one.

use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use super::{clean_optional, intercept, nullable, validate, ServiceContext, ServiceError, ServiceResult};
use crate::{
    auth::authorization::{require_permission, require_resource_access, OrgActor, ResourcePermission},
    limits,
    models::{
        organization::{is_valid_slug, slugify},
        project::{CreateProject, Project, UpdateProject},
    },
    pagination::{PageParams, Paginated},
};

const SLUG_MESSAGE: &str =
    "Slug must be 2-48 characters of lowercase letters, digits and single hyphens";

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateProjectInput {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: String,

    pub slug: Option<String>,

    #[validate(length(max = 2000, message = "Description must be at most 2000 characters"))]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateProjectInput {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: Option<String>,

    pub slug: Option<String>,

    #[serde(default, deserialize_with = "nullable")]
    pub description: Option<Option<String>>,

    pub archived: Option<bool>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct ProjectFilter {
    #[serde(default)]
    pub include_archived: bool,
}

fn project_slug(requested: Option<String>, name: &str) -> ServiceResult<String> {
    let slug = match requested {
        Some(slug) => slug.trim().to_lowercase(),
        None => slugify(name),
    };

    if is_valid_slug(&slug) {
        Ok(slug)
    } else {
        Err(ServiceError::invalid("slug", SLUG_MESSAGE))
    }
}

/// Loads a project inside the actor's organization.
pub(crate) async fn load(ctx: &ServiceContext, actor: &OrgActor, project_id: Uuid) -> ServiceResult<Project> {
    Project::find(&ctx.db, actor.organization_id, project_id)
        .await?
        .ok_or(ServiceError::NotFound("Project"))
}

pub async fn list(
    ctx: &ServiceContext,
    actor: &OrgActor,
    filter: ProjectFilter,
    page: PageParams,
) -> ServiceResult<Paginated<Project>> {
    intercept("projects.list", async move {
        require_permission(actor, ResourcePermission::Read)?;

        let items = Project::list(
            &ctx.db,
            actor.organization_id,
            filter.include_archived,
            page.limit(),
            page.offset(),
        )
        .await?;
        let total = Project::count(&ctx.db, actor.organization_id, filter.include_archived).await?;

        Ok(Paginated::new(items, page, total))
    })
    .await
}

pub async fn get(ctx: &ServiceContext, actor: &OrgActor, project_id: Uuid) -> ServiceResult<Project> {
    intercept("projects.get", async move {
        require_permission(actor, ResourcePermission::Read)?;
        load(ctx, actor, project_id).await
    })
    .await
}

pub async fn create(
    ctx: &ServiceContext,
    actor: &OrgActor,
    input: CreateProjectInput,
) -> ServiceResult<Project> {
    intercept("projects.create", async move {
        require_permission(actor, ResourcePermission::Write)?;
        validate(&input)?;

        let name = input.name.trim().to_string();
        let slug = project_slug(input.slug, &name)?;

        limits::check_project_limit(&ctx.db, actor.organization_id).await?;

        let project = Project::create(
            &ctx.db,
            CreateProject {
                organization_id: actor.organization_id,
                name,
                slug,
                description: clean_optional(input.description),
                created_by: actor.user_id,
            },
        )
        .await?;

        tracing::info!(
            project_id = %project.id,
            organization_id = %project.organization_id,
            "Project created"
        );
        Ok(project)
    })
    .await
}

pub async fn update(
    ctx: &ServiceContext,
    actor: &OrgActor,
    project_id: Uuid,
    input: UpdateProjectInput,
) -> ServiceResult<Project> {
    intercept("projects.update", async move {
        validate(&input)?;
        let project = load(ctx, actor, project_id).await?;
        require_resource_access(actor, project.created_by)?;

        let slug = match input.slug {
            Some(slug) => Some(project_slug(Some(slug), &project.name)?),
            None => None,
        };

        let changes = UpdateProject {
            name: input.name.map(|n| n.trim().to_string()),
            slug,
            description: input.description.map(clean_optional),
            archived: input.archived,
        };
        if changes.is_empty() {
            return Ok(project);
        }

        Project::update(&ctx.db, actor.organization_id, project_id, changes)
            .await?
            .ok_or(ServiceError::NotFound("Project"))
    })
    .await
}

pub async fn delete(ctx: &ServiceContext, actor: &OrgActor, project_id: Uuid) -> ServiceResult<()> {
    intercept("projects.delete", async move {
        let project = load(ctx, actor, project_id).await?;
        require_resource_access(actor, project.created_by)?;

        if !Project::delete(&ctx.db, actor.organization_id, project_id).await? {
            return Err(ServiceError::NotFound("Project"));
        }

        tracing::info!(project_id = %project_id, deleted_by = %actor.user_id, "Project deleted");
        Ok(())
    })
    .await
}
