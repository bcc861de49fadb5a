//! End-to-end service flows against a live database
//!
//! Skipped unless `DATABASE_URL` is set. Providers are the in-memory
//! adapters, so mail, storage and checkout calls can be inspected.

mod common;

use bytes::Bytes;
use chrono::Utc;
use common::fixtures::*;
use keystone_shared::auth::middleware::AuthContext;
use keystone_shared::auth::token::{hash_token, INVITE_TOKEN_LENGTH};
use keystone_shared::models::invitation::Invitation;
use keystone_shared::billing::sign_payload;
use keystone_shared::models::email_job::{EmailJob, EmailJobKind};
use keystone_shared::models::membership::{CreateMembership, Membership, MembershipRole};
use keystone_shared::models::plan::Plan;
use keystone_shared::models::subscription::{Subscription, SubscriptionStatus};
use keystone_shared::models::task::TaskPriority;
use keystone_shared::models::user::{User, UserRole};
use keystone_shared::pagination::PageParams;
use keystone_shared::rate_limit::{ActionLimiter, RateLimiters};
use keystone_shared::services::accounts::{self, LoginInput, RegisterInput, Session};
use keystone_shared::services::billing::{self, CheckoutInput, WebhookOutcome};
use keystone_shared::services::files::{self, FileUpload};
use keystone_shared::services::notifications::{self, kinds, NotificationFilter};
use keystone_shared::services::organizations::{self, InviteInput, UpdateMemberRoleInput};
use keystone_shared::services::posts::{self, CreatePostInput, TranslationInput, UpdatePostInput};
use keystone_shared::services::projects::{self, CreateProjectInput};
use keystone_shared::services::tasks::{self, CreateTaskInput};
use keystone_shared::services::ServiceError;
use std::sync::Arc;
use uuid::Uuid;

/// Registers a user and adds them to `owner`'s organization with `role`.
async fn join(env: &TestEnv, owner: &Session, name: &str, role: MembershipRole) -> Session {
    let session = env.register(name).await;
    Membership::create(
        &env.ctx.db,
        CreateMembership {
            organization_id: owner.organization_id.unwrap(),
            user_id: session.user.id,
            role,
        },
    )
    .await
    .unwrap();
    session
}

fn project_input(name: &str) -> CreateProjectInput {
    CreateProjectInput {
        name: name.to_string(),
        slug: None,
        description: None,
    }
}

fn task_input(title: &str, assignee_id: Option<Uuid>) -> CreateTaskInput {
    CreateTaskInput {
        title: title.to_string(),
        description: None,
        priority: TaskPriority::Medium,
        assignee_id,
        due_date: None,
    }
}

#[tokio::test]
async fn test_register_creates_owned_workspace_and_onboarding_jobs() {
    let Some(env) = TestEnv::new().await else {
        return;
    };

    let session = env.register("Ada").await;
    let org_id = session.organization_id.expect("personal organization");

    let role = Membership::get_role(&env.ctx.db, org_id, session.user.id)
        .await
        .unwrap();
    assert_eq!(role, Some(MembershipRole::Owner));

    let profile = accounts::profile(&env.ctx, session.user.id).await.unwrap();
    assert_eq!(profile.organizations.len(), 1);
    assert_eq!(profile.organizations[0].name, "Ada's Workspace");

    let jobs = EmailJob::list_for_user(&env.ctx.db, session.user.id).await.unwrap();
    let welcome = jobs.iter().find(|j| j.kind == EmailJobKind::Welcome).unwrap();
    let follow_up = jobs.iter().find(|j| j.kind == EmailJobKind::FollowUp).unwrap();
    assert!(follow_up.run_at > welcome.run_at + chrono::Duration::hours(71));
}

#[tokio::test]
async fn test_register_rejects_duplicate_email() {
    let Some(env) = TestEnv::new().await else {
        return;
    };

    let session = env.register("Grace").await;
    let result = accounts::register(
        &env.ctx,
        RegisterInput {
            email: session.user.email.to_uppercase(),
            password: PASSWORD.to_string(),
            name: None,
            organization_name: None,
        },
    )
    .await;

    assert!(matches!(result, Err(ServiceError::Conflict(_))));
}

#[tokio::test]
async fn test_login_checks_password_and_ban() {
    let Some(env) = TestEnv::new().await else {
        return;
    };

    let session = env.register("Linus").await;
    let email = session.user.email.clone();

    let wrong = accounts::authenticate(
        &env.ctx,
        LoginInput {
            email: email.clone(),
            password: "not-the-password".to_string(),
        },
    )
    .await;
    assert!(matches!(wrong, Err(ServiceError::Unauthorized(_))));

    let ok = accounts::authenticate(
        &env.ctx,
        LoginInput {
            email: email.clone(),
            password: PASSWORD.to_string(),
        },
    )
    .await
    .unwrap();
    assert_eq!(ok.organization_id, session.organization_id);

    User::set_banned(&env.ctx.db, session.user.id, true, Some("spam".to_string()))
        .await
        .unwrap();

    let banned = accounts::authenticate(
        &env.ctx,
        LoginInput {
            email,
            password: PASSWORD.to_string(),
        },
    )
    .await;
    assert!(matches!(banned, Err(ServiceError::Unauthorized(_))));

    let refreshed = accounts::refresh(&env.ctx, &ok.tokens.refresh_token).await;
    assert!(matches!(refreshed, Err(ServiceError::Unauthorized(_))));
}

#[tokio::test]
async fn test_invitation_flow() {
    let Some(env) = TestEnv::new().await else {
        return;
    };

    let owner = env.register("Owner").await;
    let invitee_email = unique_email("invitee");

    let invitation = organizations::invite(
        &env.ctx,
        &owner_actor(&owner),
        InviteInput {
            email: invitee_email.clone(),
            role: MembershipRole::Member,
        },
    )
    .await
    .unwrap();
    assert_eq!(invitation.email, invitee_email);

    let sent = env.mailer.sent_to(&invitee_email);
    assert_eq!(sent.len(), 1);
    let start = sent[0].text.find("token=").unwrap() + "token=".len();
    let token = sent[0].text[start..start + INVITE_TOKEN_LENGTH].to_string();

    // A different account cannot use the link
    let stranger = env.register("Stranger").await;
    let wrong_user = organizations::accept_invitation(&env.ctx, stranger.user.id, &token).await;
    assert!(matches!(wrong_user, Err(ServiceError::Forbidden(_))));

    let invitee = accounts::register(
        &env.ctx,
        RegisterInput {
            email: invitee_email,
            password: PASSWORD.to_string(),
            name: Some("Invitee".to_string()),
            organization_name: None,
        },
    )
    .await
    .unwrap();

    let accepted = organizations::accept_invitation(&env.ctx, invitee.user.id, &token)
        .await
        .unwrap();
    assert_eq!(accepted.role, MembershipRole::Member);
    assert_eq!(Some(accepted.organization.id), owner.organization_id);

    let again = organizations::accept_invitation(&env.ctx, invitee.user.id, &token).await;
    assert!(matches!(again, Err(ServiceError::Conflict(_))));

    let members = organizations::list_members(&env.ctx, &owner_actor(&owner))
        .await
        .unwrap();
    assert_eq!(members.len(), 2);
}

#[tokio::test]
async fn test_failed_invitation_email_removes_invitation() {
    let Some(env) = TestEnv::new().await else {
        return;
    };

    let owner = env.register("Owner").await;
    env.mailer.set_failing(true);

    let result = organizations::invite(
        &env.ctx,
        &owner_actor(&owner),
        InviteInput {
            email: unique_email("lost"),
            role: MembershipRole::Member,
        },
    )
    .await;
    assert!(matches!(result, Err(ServiceError::Email(_))));

    env.mailer.set_failing(false);
    let pending = organizations::list_invitations(&env.ctx, &owner_actor(&owner))
        .await
        .unwrap();
    assert!(pending.is_empty());
}

#[tokio::test]
async fn test_owner_rules() {
    let Some(env) = TestEnv::new().await else {
        return;
    };

    let owner = env.register("Owner").await;
    let org_id = owner.organization_id.unwrap();
    let admin = join(&env, &owner, "Admin", MembershipRole::Admin).await;
    let member = join(&env, &owner, "Member", MembershipRole::Member).await;

    // The only owner cannot leave
    let leave = organizations::remove_member(&env.ctx, &owner_actor(&owner), owner.user.id).await;
    assert!(matches!(leave, Err(ServiceError::Conflict(_))));

    // Admins cannot hand out ownership
    let admin_actor = actor(&admin, org_id, MembershipRole::Admin);
    let promote = organizations::update_member_role(
        &env.ctx,
        &admin_actor,
        member.user.id,
        UpdateMemberRoleInput {
            role: MembershipRole::Owner,
        },
    )
    .await;
    assert!(matches!(promote, Err(ServiceError::Forbidden(_))));

    // Members cannot remove anyone else
    let member_actor = actor(&member, org_id, MembershipRole::Member);
    let removal = organizations::remove_member(&env.ctx, &member_actor, admin.user.id).await;
    assert!(matches!(removal, Err(ServiceError::Forbidden(_))));

    // Owners can promote, and the member hears about it
    let promoted = organizations::update_member_role(
        &env.ctx,
        &owner_actor(&owner),
        member.user.id,
        UpdateMemberRoleInput {
            role: MembershipRole::Admin,
        },
    )
    .await
    .unwrap();
    assert_eq!(promoted.role, MembershipRole::Admin);

    let inbox = notifications::list(
        &env.ctx,
        member.user.id,
        NotificationFilter::default(),
        PageParams::default(),
    )
    .await
    .unwrap();
    assert!(inbox.items.iter().any(|n| n.kind == kinds::MEMBER_ROLE_CHANGED));
}

#[tokio::test]
async fn test_free_plan_project_limit() {
    let Some(env) = TestEnv::new().await else {
        return;
    };

    let owner = env.register("Builder").await;
    let actor = owner_actor(&owner);

    for name in ["Alpha", "Beta", "Gamma"] {
        projects::create(&env.ctx, &actor, project_input(name)).await.unwrap();
    }

    let fourth = projects::create(&env.ctx, &actor, project_input("Delta")).await;
    assert!(matches!(fourth, Err(ServiceError::LimitExceeded(_))));
}

#[tokio::test]
async fn test_task_assignment() {
    let Some(env) = TestEnv::new().await else {
        return;
    };

    let owner = env.register("Lead").await;
    let member = join(&env, &owner, "Dev", MembershipRole::Member).await;
    let actor = owner_actor(&owner);

    let project = projects::create(&env.ctx, &actor, project_input("Roadmap"))
        .await
        .unwrap();

    let outsider = tasks::create(
        &env.ctx,
        &actor,
        project.id,
        task_input("Nobody", Some(Uuid::new_v4())),
    )
    .await;
    assert!(matches!(outsider, Err(ServiceError::Validation(_))));

    let task = tasks::create(
        &env.ctx,
        &actor,
        project.id,
        task_input("Ship it", Some(member.user.id)),
    )
    .await
    .unwrap();
    assert_eq!(task.assignee_id, Some(member.user.id));

    let unread = notifications::unread_count(&env.ctx, member.user.id).await.unwrap();
    assert_eq!(unread.unread, 1);

    let marked = notifications::mark_all_read(&env.ctx, member.user.id).await.unwrap();
    assert_eq!(marked.updated, 1);
}

#[tokio::test]
async fn test_file_lifecycle() {
    let Some(env) = TestEnv::new().await else {
        return;
    };

    let owner = env.register("Archivist").await;
    let actor = owner_actor(&owner);

    let file = files::upload(
        &env.ctx,
        &actor,
        FileUpload {
            file_name: "notes.txt".to_string(),
            content_type: Some("text/plain".to_string()),
            data: Bytes::from_static(b"hello world"),
        },
    )
    .await
    .unwrap();
    assert_eq!(file.size_bytes, 11);
    assert!(env.storage.content_type(&file.storage_key).await.is_some());

    let downloaded = files::download(&env.ctx, &actor, file.id).await.unwrap();
    assert_eq!(downloaded.data, Bytes::from_static(b"hello world"));

    let usage = files::usage(&env.ctx, &actor).await.unwrap();
    assert_eq!(usage.used_bytes, 11);
    assert_eq!(usage.file_count, 1);

    let rejected = files::upload(
        &env.ctx,
        &actor,
        FileUpload {
            file_name: "run.sh".to_string(),
            content_type: Some("application/x-sh".to_string()),
            data: Bytes::from_static(b"#!/bin/sh"),
        },
    )
    .await;
    assert!(matches!(rejected, Err(ServiceError::Validation(_))));

    files::delete(&env.ctx, &actor, file.id).await.unwrap();
    assert!(env.storage.content_type(&file.storage_key).await.is_none());
    assert!(matches!(
        files::download(&env.ctx, &actor, file.id).await,
        Err(ServiceError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_checkout_requires_owner_and_paid_plan() {
    let Some(env) = TestEnv::new().await else {
        return;
    };

    let owner = env.register("Payer").await;
    let org_id = owner.organization_id.unwrap();
    let admin = join(&env, &owner, "Helper", MembershipRole::Admin).await;

    let by_admin = billing::checkout(
        &env.ctx,
        &actor(&admin, org_id, MembershipRole::Admin),
        CheckoutInput { plan: "pro".to_string() },
    )
    .await;
    assert!(matches!(by_admin, Err(ServiceError::Forbidden(_))));

    let free = billing::checkout(
        &env.ctx,
        &owner_actor(&owner),
        CheckoutInput { plan: "free".to_string() },
    )
    .await;
    assert!(matches!(free, Err(ServiceError::Validation(_))));

    let session = billing::checkout(
        &env.ctx,
        &owner_actor(&owner),
        CheckoutInput { plan: "pro".to_string() },
    )
    .await
    .unwrap();
    assert!(session.url.starts_with("https://"));

    let checkouts = env.payments.checkouts.lock().unwrap().clone();
    assert_eq!(checkouts.len(), 1);
    assert_eq!(checkouts[0].organization_id, org_id);
    assert_eq!(checkouts[0].price_id, "price_pro_monthly");
    assert!(checkouts[0].success_url.ends_with("checkout=success"));

    // Nothing changes locally until the provider reports back
    let overview = billing::subscription(&env.ctx, &owner_actor(&owner)).await.unwrap();
    assert_eq!(overview.plan.slug, "free");
    assert!(overview.subscription.is_none());
}

fn subscription_event(event_type: &str, org_id: Uuid, subscription_id: &str, status: &str) -> Vec<u8> {
    serde_json::json!({
        "id": format!("evt_{}", Uuid::new_v4().simple()),
        "type": event_type,
        "created": Utc::now().timestamp(),
        "data": {
            "object": {
                "id": subscription_id,
                "customer": "cus_test",
                "status": status,
                "current_period_end": Utc::now().timestamp() + 30 * 86_400,
                "cancel_at_period_end": false,
                "items": { "data": [ { "price": { "id": "price_pro_monthly" } } ] },
                "metadata": { "organization_id": org_id.to_string() },
            }
        }
    })
    .to_string()
    .into_bytes()
}

fn signed(payload: &[u8]) -> String {
    sign_payload(payload, WEBHOOK_SECRET, Utc::now().timestamp()).unwrap()
}

#[tokio::test]
async fn test_webhook_applies_once() {
    let Some(env) = TestEnv::new().await else {
        return;
    };

    let owner = env.register("Subscriber").await;
    let org_id = owner.organization_id.unwrap();
    let subscription_id = format!("sub_{}", Uuid::new_v4().simple());

    let payload = subscription_event("customer.subscription.updated", org_id, &subscription_id, "active");
    let header = signed(&payload);

    let first = billing::handle_webhook(&env.ctx, &payload, Some(&header)).await.unwrap();
    assert_eq!(first, WebhookOutcome::Processed);

    let second = billing::handle_webhook(&env.ctx, &payload, Some(&header)).await.unwrap();
    assert_eq!(second, WebhookOutcome::Duplicate);

    let subscription = Subscription::find_by_organization(&env.ctx.db, org_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(subscription.status, SubscriptionStatus::Active);
    assert_eq!(
        Plan::for_organization(&env.ctx.db, org_id).await.unwrap().slug,
        "pro"
    );
    assert_eq!(env.mailer.sent_to(&owner.user.email).len(), 1);

    let deleted = subscription_event("customer.subscription.deleted", org_id, &subscription_id, "canceled");
    let outcome = billing::handle_webhook(&env.ctx, &deleted, Some(&signed(&deleted)))
        .await
        .unwrap();
    assert_eq!(outcome, WebhookOutcome::Processed);
    assert_eq!(
        Plan::for_organization(&env.ctx.db, org_id).await.unwrap().slug,
        "free"
    );
}

#[tokio::test]
async fn test_webhook_rejects_bad_signature_and_ignores_unknown_events() {
    let Some(env) = TestEnv::new().await else {
        return;
    };

    let owner = env.register("Skeptic").await;
    let org_id = owner.organization_id.unwrap();
    let payload = subscription_event("customer.subscription.updated", org_id, "sub_forged", "active");

    let forged = sign_payload(&payload, "whsec_wrong", Utc::now().timestamp()).unwrap();
    let result = billing::handle_webhook(&env.ctx, &payload, Some(&forged)).await;
    assert!(matches!(result, Err(ServiceError::Signature(_))));

    let missing = billing::handle_webhook(&env.ctx, &payload, None).await;
    assert!(matches!(missing, Err(ServiceError::Signature(_))));

    let other = subscription_event("invoice.paid", org_id, "sub_other", "active");
    let outcome = billing::handle_webhook(&env.ctx, &other, Some(&signed(&other)))
        .await
        .unwrap();
    assert_eq!(outcome, WebhookOutcome::Ignored);
    assert!(Subscription::find_by_organization(&env.ctx.db, org_id)
        .await
        .unwrap()
        .is_none());
}

/// Publishes an English post as a fresh platform admin; returns (admin, post id, slug).
async fn published_post(env: &TestEnv) -> (AuthContext, Uuid, String) {
    let editor = env.register("Editor").await;
    User::set_role(&env.ctx.db, editor.user.id, UserRole::Admin)
        .await
        .unwrap();
    let auth = AuthContext {
        user_id: editor.user.id,
        role: UserRole::Admin,
        organization_id: None,
    };

    let slug = format!("post-{}", &Uuid::new_v4().simple().to_string()[..8]);
    let details = posts::create(
        &env.ctx,
        &auth,
        CreatePostInput {
            slug: Some(slug.clone()),
            cover_image_url: None,
            translations: vec![TranslationInput {
                locale: "en".to_string(),
                title: "Hello".to_string(),
                excerpt: None,
                content: "First post".to_string(),
            }],
            category_ids: Vec::new(),
            hashtags: vec!["News".to_string()],
        },
    )
    .await
    .unwrap();
    posts::publish(&env.ctx, &auth, details.post.id).await.unwrap();
    (auth, details.post.id, slug)
}

#[tokio::test]
async fn test_post_interactions_are_rate_limited() {
    let limiters = RateLimiters {
        likes: Arc::new(ActionLimiter::per_minute("like", 2)),
        views: Arc::new(ActionLimiter::per_minute("view", 1)),
    };
    let Some(env) = TestEnv::with_limiters(limiters).await else {
        return;
    };

    let (_, _, slug) = published_post(&env).await;
    let reader = env.register("Reader").await;

    let liked = posts::toggle_like(&env.ctx, reader.user.id, &slug).await.unwrap();
    assert!(liked.liked);
    assert_eq!(liked.like_count, 1);

    let unliked = posts::toggle_like(&env.ctx, reader.user.id, &slug).await.unwrap();
    assert!(!unliked.liked);
    assert_eq!(unliked.like_count, 0);

    let third = posts::toggle_like(&env.ctx, reader.user.id, &slug).await;
    assert!(matches!(third, Err(ServiceError::RateLimited(_))));

    let viewed = posts::record_view(&env.ctx, "203.0.113.7", &slug).await.unwrap();
    assert_eq!(viewed.view_count, 1);
    let again = posts::record_view(&env.ctx, "203.0.113.7", &slug).await;
    assert!(matches!(again, Err(ServiceError::RateLimited(_))));

    // Other clients are counted separately
    let other = posts::record_view(&env.ctx, "198.51.100.2", &slug).await.unwrap();
    assert_eq!(other.view_count, 2);

    let page = posts::get_published(&env.ctx, &slug, Some("fr"), Some(reader.user.id))
        .await
        .unwrap();
    assert_eq!(page.translation.locale, "en");
    assert_eq!(page.liked, Some(false));
    assert_eq!(page.hashtags[0].name, "news");
}

#[tokio::test]
async fn test_rejected_post_update_writes_nothing() {
    let Some(env) = TestEnv::new().await else { return };
    let (auth, post_id, slug) = published_post(&env).await;

    let result = posts::update(
        &env.ctx,
        &auth,
        post_id,
        UpdatePostInput {
            slug: Some(format!("{}-renamed", slug)),
            translations: Some(vec![TranslationInput {
                locale: "fr".to_string(),
                title: "Bonjour".to_string(),
                excerpt: None,
                content: "Premier article".to_string(),
            }]),
            remove_locales: Some(vec!["en".to_string()]),
            ..Default::default()
        },
    )
    .await;
    assert!(matches!(result, Err(ServiceError::Validation(_))));

    let details = posts::get(&env.ctx, &auth, post_id).await.unwrap();
    assert_eq!(details.post.slug, slug);
    let locales: Vec<_> = details.translations.iter().map(|t| t.locale.as_str()).collect();
    assert_eq!(locales, vec!["en"]);
}

#[tokio::test]
async fn test_failed_acceptance_keeps_invitation_usable() {
    let Some(env) = TestEnv::new().await else {
        return;
    };

    let owner = env.register("Owner").await;
    let org_id = owner.organization_id.unwrap();
    let invitee_email = unique_email("invitee");
    organizations::invite(
        &env.ctx,
        &owner_actor(&owner),
        InviteInput {
            email: invitee_email.clone(),
            role: MembershipRole::Admin,
        },
    )
    .await
    .unwrap();

    let sent = env.mailer.sent_to(&invitee_email);
    let start = sent[0].text.find("token=").unwrap() + "token=".len();
    let token = sent[0].text[start..start + INVITE_TOKEN_LENGTH].to_string();

    let invitee = accounts::register(
        &env.ctx,
        RegisterInput {
            email: invitee_email,
            password: PASSWORD.to_string(),
            name: None,
            organization_name: None,
        },
    )
    .await
    .unwrap();

    // The membership insert collides, so nothing is committed
    Membership::create(
        &env.ctx.db,
        CreateMembership {
            organization_id: org_id,
            user_id: invitee.user.id,
            role: MembershipRole::Viewer,
        },
    )
    .await
    .unwrap();
    let collided = organizations::accept_invitation(&env.ctx, invitee.user.id, &token).await;
    assert!(collided.is_err());

    let invitation = Invitation::find_by_token_hash(&env.ctx.db, &hash_token(&token))
        .await
        .unwrap()
        .unwrap();
    assert!(invitation.accepted_at.is_none());

    Membership::delete(&env.ctx.db, org_id, invitee.user.id).await.unwrap();
    let accepted = organizations::accept_invitation(&env.ctx, invitee.user.id, &token)
        .await
        .unwrap();
    assert_eq!(accepted.role, MembershipRole::Admin);
    assert_eq!(
        Membership::get_role(&env.ctx.db, org_id, invitee.user.id).await.unwrap(),
        Some(MembershipRole::Admin)
    );
}
