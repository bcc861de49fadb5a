//! Blog
//!
//! Readers see published posts in their locale, falling back to the default
//! locale when a translation is missing. Views are counted at most once per
//! client and post within the view window, and likes are throttled per
//! user. Writing posts and categories is reserved to platform admins.

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::{clean_optional, intercept, nullable, validate, ServiceContext, ServiceError, ServiceResult};
use crate::{
    auth::{authorization::require_admin, middleware::AuthContext},
    models::{
        organization::{is_valid_slug, slugify},
        post::{
            is_valid_locale, normalize_hashtag, Category, CreatePost, Hashtag, Post, PostFilter,
            PostListItem, PostStatus, PostTranslation, UpdatePost, UpsertTranslation,
            DEFAULT_LOCALE,
        },
    },
    pagination::{PageParams, Paginated},
};

const SLUG_MESSAGE: &str =
    "Slug must be 2-48 characters of lowercase letters, digits and single hyphens";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PostQuery {
    pub locale: Option<String>,
    pub category: Option<String>,
    pub hashtag: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct TranslationInput {
    pub locale: String,

    #[validate(length(min = 1, max = 200, message = "Title must be 1-200 characters"))]
    pub title: String,

    #[validate(length(max = 500, message = "Excerpt must be at most 500 characters"))]
    pub excerpt: Option<String>,

    #[validate(length(min = 1, message = "Content is required"))]
    pub content: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreatePostInput {
    pub slug: Option<String>,

    pub cover_image_url: Option<String>,

    #[validate(length(min = 1, message = "At least one translation is required"))]
    pub translations: Vec<TranslationInput>,

    #[serde(default)]
    pub category_ids: Vec<Uuid>,

    #[serde(default)]
    pub hashtags: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdatePostInput {
    pub slug: Option<String>,

    #[serde(default, deserialize_with = "nullable")]
    pub cover_image_url: Option<Option<String>>,

    /// Translations to add or replace, keyed by locale
    pub translations: Option<Vec<TranslationInput>>,

    /// Locales whose translations are removed
    pub remove_locales: Option<Vec<String>>,

    pub category_ids: Option<Vec<Uuid>>,

    pub hashtags: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CategoryInput {
    #[validate(length(min = 1, max = 60, message = "Name must be 1-60 characters"))]
    pub name: String,

    pub slug: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct AdminPostFilter {
    pub status: Option<PostStatus>,
}

/// A published post as readers see it
#[derive(Debug, Clone, Serialize)]
pub struct PublishedPost {
    #[serde(flatten)]
    pub post: Post,
    pub translation: PostTranslation,
    pub categories: Vec<Category>,
    pub hashtags: Vec<Hashtag>,
    /// Whether the signed-in reader liked the post; absent for anonymous readers
    #[serde(skip_serializing_if = "Option::is_none")]
    pub liked: Option<bool>,
}

/// A post with every translation, for editing
#[derive(Debug, Clone, Serialize)]
pub struct PostDetails {
    #[serde(flatten)]
    pub post: Post,
    pub translations: Vec<PostTranslation>,
    pub categories: Vec<Category>,
    pub hashtags: Vec<Hashtag>,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ViewCount {
    pub view_count: i64,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct LikeState {
    pub liked: bool,
    pub like_count: i64,
}

fn check_slug(slug: String) -> ServiceResult<String> {
    let slug = slug.trim().to_lowercase();
    if is_valid_slug(&slug) {
        Ok(slug)
    } else {
        Err(ServiceError::invalid("slug", SLUG_MESSAGE))
    }
}

fn check_locale(locale: &str) -> ServiceResult<()> {
    if is_valid_locale(locale) {
        Ok(())
    } else {
        Err(ServiceError::invalid("locale", format!("Unsupported locale: {}", locale)))
    }
}

fn to_upsert(input: TranslationInput) -> ServiceResult<UpsertTranslation> {
    validate(&input)?;
    check_locale(&input.locale)?;
    Ok(UpsertTranslation {
        locale: input.locale,
        title: input.title.trim().to_string(),
        excerpt: clean_optional(input.excerpt),
        content: input.content,
    })
}

fn published_only(post: Option<Post>) -> ServiceResult<Post> {
    match post {
        Some(post) if post.status == PostStatus::Published => Ok(post),
        _ => Err(ServiceError::NotFound("Post")),
    }
}

async fn load_post(ctx: &ServiceContext, id: Uuid) -> ServiceResult<Post> {
    Post::find_by_id(&ctx.db, id)
        .await?
        .ok_or(ServiceError::NotFound("Post"))
}

async fn details(ctx: &ServiceContext, post: Post) -> ServiceResult<PostDetails> {
    let translations = Post::translations(&ctx.db, post.id).await?;
    let categories = Post::categories(&ctx.db, post.id).await?;
    let hashtags = Post::hashtags(&ctx.db, post.id).await?;

    Ok(PostDetails {
        post,
        translations,
        categories,
        hashtags,
    })
}

pub async fn list_published(
    ctx: &ServiceContext,
    query: PostQuery,
    page: PageParams,
) -> ServiceResult<Paginated<PostListItem>> {
    intercept("posts.list_published", async move {
        let locale = query.locale.unwrap_or_else(|| DEFAULT_LOCALE.to_string());
        check_locale(&locale)?;

        let filter = PostFilter {
            locale: Some(locale),
            category: clean_optional(query.category),
            hashtag: query
                .hashtag
                .as_deref()
                .and_then(normalize_hashtag),
        };

        let items = Post::list_published(&ctx.db, &filter, page.limit(), page.offset()).await?;
        let total = Post::count_published(&ctx.db, &filter).await?;

        Ok(Paginated::new(items, page, total))
    })
    .await
}

pub async fn get_published(
    ctx: &ServiceContext,
    slug: &str,
    locale: Option<&str>,
    reader: Option<Uuid>,
) -> ServiceResult<PublishedPost> {
    intercept("posts.get_published", async move {
        let locale = locale.unwrap_or(DEFAULT_LOCALE);
        check_locale(locale)?;

        let post = published_only(Post::find_by_slug(&ctx.db, slug).await?)?;
        let translation = Post::translation_for(&ctx.db, post.id, locale)
            .await?
            .ok_or(ServiceError::NotFound("Post"))?;
        let categories = Post::categories(&ctx.db, post.id).await?;
        let hashtags = Post::hashtags(&ctx.db, post.id).await?;

        let liked = match reader {
            Some(user_id) => Some(Post::is_liked_by(&ctx.db, post.id, user_id).await?),
            None => None,
        };

        Ok(PublishedPost {
            post,
            translation,
            categories,
            hashtags,
            liked,
        })
    })
    .await
}

pub async fn list_categories(ctx: &ServiceContext) -> ServiceResult<Vec<Category>> {
    intercept("posts.list_categories", async move {
        Ok(Category::list_all(&ctx.db).await?)
    })
    .await
}

/// Counts a view. `client_key` identifies the reader (user id or address);
/// repeated views from the same client are throttled per post.
pub async fn record_view(ctx: &ServiceContext, client_key: &str, slug: &str) -> ServiceResult<ViewCount> {
    intercept("posts.record_view", async move {
        let post = published_only(Post::find_by_slug(&ctx.db, slug).await?)?;
        ctx.limiters.views.check(&format!("{}:{}", client_key, post.id))?;

        let view_count = Post::increment_views(&ctx.db, post.id)
            .await?
            .ok_or(ServiceError::NotFound("Post"))?;

        Ok(ViewCount { view_count })
    })
    .await
}

pub async fn toggle_like(ctx: &ServiceContext, user_id: Uuid, slug: &str) -> ServiceResult<LikeState> {
    intercept("posts.toggle_like", async move {
        let post = published_only(Post::find_by_slug(&ctx.db, slug).await?)?;
        ctx.limiters.likes.check(&user_id.to_string())?;

        let (liked, like_count) = Post::toggle_like(&ctx.db, post.id, user_id).await?;
        Ok(LikeState { liked, like_count })
    })
    .await
}

pub async fn list_all(
    ctx: &ServiceContext,
    auth: &AuthContext,
    filter: AdminPostFilter,
    page: PageParams,
) -> ServiceResult<Paginated<Post>> {
    intercept("posts.list_all", async move {
        require_admin(auth)?;

        let items = Post::list_all(&ctx.db, filter.status, page.limit(), page.offset()).await?;
        let total = Post::count_all(&ctx.db, filter.status).await?;

        Ok(Paginated::new(items, page, total))
    })
    .await
}

pub async fn get(ctx: &ServiceContext, auth: &AuthContext, id: Uuid) -> ServiceResult<PostDetails> {
    intercept("posts.get", async move {
        require_admin(auth)?;
        let post = load_post(ctx, id).await?;
        details(ctx, post).await
    })
    .await
}

/// Creates a draft.
pub async fn create(
    ctx: &ServiceContext,
    auth: &AuthContext,
    input: CreatePostInput,
) -> ServiceResult<PostDetails> {
    intercept("posts.create", async move {
        require_admin(auth)?;
        validate(&input)?;

        let slug = match input.slug {
            Some(slug) => check_slug(slug)?,
            None => {
                let title = input
                    .translations
                    .iter()
                    .find(|t| t.locale == DEFAULT_LOCALE)
                    .or_else(|| input.translations.first())
                    .map(|t| t.title.as_str())
                    .unwrap_or_default();
                check_slug(slugify(title))?
            }
        };
        let translations = input
            .translations
            .into_iter()
            .map(to_upsert)
            .collect::<ServiceResult<Vec<_>>>()?;

        let post = Post::create(
            &ctx.db,
            CreatePost {
                author_id: auth.user_id,
                slug,
                cover_image_url: clean_optional(input.cover_image_url),
            },
        )
        .await?;

        for translation in translations {
            Post::upsert_translation(&ctx.db, post.id, translation).await?;
        }
        if !input.category_ids.is_empty() {
            Post::set_categories(&ctx.db, post.id, &input.category_ids).await?;
        }
        if !input.hashtags.is_empty() {
            Post::set_hashtags(&ctx.db, post.id, &input.hashtags).await?;
        }

        tracing::info!(post_id = %post.id, slug = %post.slug, "Post created");
        details(ctx, post).await
    })
    .await
}

pub async fn update(
    ctx: &ServiceContext,
    auth: &AuthContext,
    id: Uuid,
    input: UpdatePostInput,
) -> ServiceResult<PostDetails> {
    intercept("posts.update", async move {
        require_admin(auth)?;
        validate(&input)?;

        let mut post = load_post(ctx, id).await?;

        // Every check runs before the first write
        let slug = input.slug.map(check_slug).transpose()?;
        let translations = input
            .translations
            .unwrap_or_default()
            .into_iter()
            .map(to_upsert)
            .collect::<ServiceResult<Vec<_>>>()?;
        let remove_locales = input.remove_locales.unwrap_or_default();
        if post.status == PostStatus::Published && remove_locales.iter().any(|l| l == DEFAULT_LOCALE) {
            return Err(ServiceError::invalid(
                "remove_locales",
                "A published post must keep its default translation",
            ));
        }

        if slug.is_some() || input.cover_image_url.is_some() {
            post = Post::update(
                &ctx.db,
                post.id,
                UpdatePost {
                    slug,
                    cover_image_url: input.cover_image_url.map(clean_optional),
                },
            )
            .await?
            .ok_or(ServiceError::NotFound("Post"))?;
        }

        for translation in translations {
            Post::upsert_translation(&ctx.db, post.id, translation).await?;
        }
        for locale in &remove_locales {
            Post::delete_translation(&ctx.db, post.id, locale).await?;
        }
        if let Some(category_ids) = input.category_ids {
            Post::set_categories(&ctx.db, post.id, &category_ids).await?;
        }
        if let Some(hashtags) = input.hashtags {
            Post::set_hashtags(&ctx.db, post.id, &hashtags).await?;
        }

        details(ctx, post).await
    })
    .await
}

/// Publishes a post. It needs a default-locale translation so every reader
/// has something to fall back to.
pub async fn publish(ctx: &ServiceContext, auth: &AuthContext, id: Uuid) -> ServiceResult<Post> {
    intercept("posts.publish", async move {
        require_admin(auth)?;
        let post = load_post(ctx, id).await?;

        let has_default = Post::translations(&ctx.db, post.id)
            .await?
            .iter()
            .any(|t| t.locale == DEFAULT_LOCALE);
        if !has_default {
            return Err(ServiceError::invalid(
                "translations",
                format!("A '{}' translation is required to publish", DEFAULT_LOCALE),
            ));
        }

        let post = Post::set_status(&ctx.db, post.id, PostStatus::Published)
            .await?
            .ok_or(ServiceError::NotFound("Post"))?;
        tracing::info!(post_id = %post.id, "Post published");
        Ok(post)
    })
    .await
}

pub async fn archive(ctx: &ServiceContext, auth: &AuthContext, id: Uuid) -> ServiceResult<Post> {
    intercept("posts.archive", async move {
        require_admin(auth)?;
        Post::set_status(&ctx.db, id, PostStatus::Archived)
            .await?
            .ok_or(ServiceError::NotFound("Post"))
    })
    .await
}

pub async fn delete(ctx: &ServiceContext, auth: &AuthContext, id: Uuid) -> ServiceResult<()> {
    intercept("posts.delete", async move {
        require_admin(auth)?;
        if Post::delete(&ctx.db, id).await? {
            Ok(())
        } else {
            Err(ServiceError::NotFound("Post"))
        }
    })
    .await
}

pub async fn create_category(
    ctx: &ServiceContext,
    auth: &AuthContext,
    input: CategoryInput,
) -> ServiceResult<Category> {
    intercept("posts.create_category", async move {
        require_admin(auth)?;
        validate(&input)?;

        let name = input.name.trim().to_string();
        let slug = check_slug(input.slug.unwrap_or_else(|| slugify(&name)))?;

        Ok(Category::create(&ctx.db, &slug, &name).await?)
    })
    .await
}

pub async fn delete_category(ctx: &ServiceContext, auth: &AuthContext, id: Uuid) -> ServiceResult<()> {
    intercept("posts.delete_category", async move {
        require_admin(auth)?;
        if Category::delete(&ctx.db, id).await? {
            Ok(())
        } else {
            Err(ServiceError::NotFound("Category"))
        }
    })
    .await
}
