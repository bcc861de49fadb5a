/// Onboarding workflow steps
///
/// Each email job kind maps to one [`WorkflowStep`]. A step receives the
/// job's user and either sends its email or decides there is nothing to do.
/// Returning an error makes the queue retry the job.
///
/// | Job kind    | Step             | Sends when                      |
/// |-------------|------------------|---------------------------------|
/// | `welcome`   | [`WelcomeStep`]  | always                          |
/// | `follow_up` | [`FollowUpStep`] | the user has created no project |
///
/// # Example
///
/// ```no_run
/// use keystone_worker::steps::{StepContext, WelcomeStep, WorkflowStep};
/// use keystone_shared::models::user::User;
///
/// # async fn example(ctx: StepContext, user: User) -> Result<(), Box<dyn std::error::Error>> {
/// let outcome = WelcomeStep.run(&ctx, &user).await?;
/// println!("{:?}", outcome);
/// # Ok(())
/// # }
/// ```

use async_trait::async_trait;
use keystone_shared::{
    email::{templates, EmailError, EmailSender},
    models::{email_job::EmailJobKind, project::Project, user::User},
};
use sqlx::PgPool;
use std::{collections::HashMap, sync::Arc};

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("Email delivery failed: {0}")]
    Email(#[from] EmailError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type StepResult<T> = Result<T, StepError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Sent,
    Skipped(&'static str),
}

/// Collaborators available to every step
#[derive(Clone)]
pub struct StepContext {
    pub db: PgPool,
    pub mailer: Arc<dyn EmailSender>,
    /// Public frontend URL for links in emails
    pub app_url: String,
}

impl StepContext {
    pub fn new(db: PgPool, mailer: Arc<dyn EmailSender>, app_url: impl Into<String>) -> Self {
        Self {
            db,
            mailer,
            app_url: app_url.into(),
        }
    }
}

#[async_trait]
pub trait WorkflowStep: Send + Sync {
    /// The job kind this step handles
    fn kind(&self) -> EmailJobKind;

    async fn run(&self, ctx: &StepContext, user: &User) -> StepResult<StepOutcome>;
}

/// Greets a newly registered user
#[derive(Debug, Clone, Copy, Default)]
pub struct WelcomeStep;

#[async_trait]
impl WorkflowStep for WelcomeStep {
    fn kind(&self) -> EmailJobKind {
        EmailJobKind::Welcome
    }

    async fn run(&self, ctx: &StepContext, user: &User) -> StepResult<StepOutcome> {
        let message = templates::welcome(&user.email, user.display_name(), &ctx.app_url);
        ctx.mailer.send(&message).await?;
        Ok(StepOutcome::Sent)
    }
}

/// Nudges users who have not created a project since signing up
#[derive(Debug, Clone, Copy, Default)]
pub struct FollowUpStep;

impl FollowUpStep {
    /// Only users without projects get the nudge.
    pub fn should_nudge(projects_created: i64) -> bool {
        projects_created == 0
    }
}

#[async_trait]
impl WorkflowStep for FollowUpStep {
    fn kind(&self) -> EmailJobKind {
        EmailJobKind::FollowUp
    }

    async fn run(&self, ctx: &StepContext, user: &User) -> StepResult<StepOutcome> {
        let projects = Project::count_by_creator(&ctx.db, user.id).await?;
        if !Self::should_nudge(projects) {
            return Ok(StepOutcome::Skipped("user already created a project"));
        }

        let message = templates::follow_up(&user.email, user.display_name(), &ctx.app_url);
        ctx.mailer.send(&message).await?;
        Ok(StepOutcome::Sent)
    }
}

/// Steps keyed by the job kind they handle
#[derive(Clone, Default)]
pub struct StepRegistry {
    steps: HashMap<EmailJobKind, Arc<dyn WorkflowStep>>,
}

impl StepRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the welcome and follow-up steps
    pub fn onboarding() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(WelcomeStep));
        registry.register(Arc::new(FollowUpStep));
        registry
    }

    pub fn register(&mut self, step: Arc<dyn WorkflowStep>) {
        tracing::debug!(kind = step.kind().as_str(), "Registering workflow step");
        self.steps.insert(step.kind(), step);
    }

    pub fn get(&self, kind: EmailJobKind) -> Option<Arc<dyn WorkflowStep>> {
        self.steps.get(&kind).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use keystone_shared::{email::MemoryEmailSender, models::user::UserRole};
    use sqlx::postgres::PgPoolOptions;
    use uuid::Uuid;

    fn user(name: Option<&str>) -> User {
        User {
            id: Uuid::new_v4(),
            email: "lin@example.com".to_string(),
            password_hash: String::new(),
            name: name.map(str::to_string),
            avatar_url: None,
            role: UserRole::User,
            banned: false,
            ban_reason: None,
            last_login_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn context(mailer: Arc<MemoryEmailSender>) -> StepContext {
        // The welcome step never touches the database
        let db = PgPoolOptions::new()
            .connect_lazy("postgresql://keystone@127.0.0.1:1/unused")
            .unwrap();
        StepContext::new(db, mailer, "https://app.example.com")
    }

    #[tokio::test]
    async fn test_welcome_step_sends_email() {
        let mailer = Arc::new(MemoryEmailSender::new());
        let ctx = context(mailer.clone());

        let outcome = WelcomeStep.run(&ctx, &user(Some("Lin"))).await.unwrap();

        assert_eq!(outcome, StepOutcome::Sent);
        let sent = mailer.sent_to("lin@example.com");
        assert_eq!(sent.len(), 1);
        assert!(sent[0].text.contains("Lin"));
        assert!(sent[0].text.contains("https://app.example.com/dashboard"));
    }

    #[tokio::test]
    async fn test_welcome_step_surfaces_delivery_errors() {
        let mailer = Arc::new(MemoryEmailSender::new());
        mailer.set_failing(true);
        let ctx = context(mailer.clone());

        let result = WelcomeStep.run(&ctx, &user(None)).await;

        assert!(matches!(result, Err(StepError::Email(_))));
    }

    #[test]
    fn test_follow_up_only_without_projects() {
        assert!(FollowUpStep::should_nudge(0));
        assert!(!FollowUpStep::should_nudge(1));
        assert!(!FollowUpStep::should_nudge(12));
    }

    #[test]
    fn test_registry_maps_kinds() {
        let registry = StepRegistry::onboarding();

        assert_eq!(registry.get(EmailJobKind::Welcome).unwrap().kind(), EmailJobKind::Welcome);
        assert_eq!(registry.get(EmailJobKind::FollowUp).unwrap().kind(), EmailJobKind::FollowUp);
        assert!(StepRegistry::new().get(EmailJobKind::Welcome).is_none());
    }
}
