//! Blog/CMS models
//!
//! A [`Post`] holds the locale-independent parts of an article (slug, status,
//! counters). Titles and bodies live in [`PostTranslation`] rows keyed by
//! `(post_id, locale)`. Readers asking for a locale without a translation get
//! the [`DEFAULT_LOCALE`] version instead.
//!
//! Posts are tagged with admin-managed [`Category`] rows and free-form
//! [`Hashtag`]s.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

/// Locale used when a post has no translation for the requested one
pub const DEFAULT_LOCALE: &str = "en";

const POST_COLUMNS: &str = "id, author_id, slug, status, cover_image_url, published_at, \
     view_count, like_count, created_at, updated_at";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "post_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    Draft,
    Published,
    Archived,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Post {
    pub id: Uuid,
    pub author_id: Option<Uuid>,
    pub slug: String,
    pub status: PostStatus,
    pub cover_image_url: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub view_count: i64,
    pub like_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PostTranslation {
    pub post_id: Uuid,
    pub locale: String,
    pub title: String,
    pub excerpt: Option<String>,
    pub content: String,
    pub updated_at: DateTime<Utc>,
}

/// Public listing row: a published post with its best-matching translation
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PostListItem {
    pub id: Uuid,
    pub slug: String,
    pub cover_image_url: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub view_count: i64,
    pub like_count: i64,
    pub locale: String,
    pub title: String,
    pub excerpt: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Category {
    pub id: Uuid,
    pub slug: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Hashtag {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePost {
    pub author_id: Uuid,
    pub slug: String,
    pub cover_image_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdatePost {
    pub slug: Option<String>,
    pub cover_image_url: Option<Option<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpsertTranslation {
    pub locale: String,
    pub title: String,
    pub excerpt: Option<String>,
    pub content: String,
}

/// Filters for the public post listing
#[derive(Debug, Clone, Default)]
pub struct PostFilter {
    pub locale: Option<String>,
    pub category: Option<String>,
    pub hashtag: Option<String>,
}

/// Lowercases a hashtag and strips a leading `#`. Returns `None` for empty
/// tags or tags containing whitespace.
pub fn normalize_hashtag(tag: &str) -> Option<String> {
    let tag = tag.trim().trim_start_matches('#').to_lowercase();
    if tag.is_empty() || tag.len() > 64 || tag.chars().any(char::is_whitespace) {
        None
    } else {
        Some(tag)
    }
}

/// Accepts `en`, `pt`, `pt-BR` style locale tags.
pub fn is_valid_locale(locale: &str) -> bool {
    let mut parts = locale.split('-');
    let lang_ok = parts
        .next()
        .map(|p| (2..=3).contains(&p.len()) && p.chars().all(|c| c.is_ascii_lowercase()))
        .unwrap_or(false);
    let region_ok = match parts.next() {
        None => true,
        Some(r) => r.len() == 2 && r.chars().all(|c| c.is_ascii_uppercase()),
    };

    lang_ok && region_ok && parts.next().is_none()
}

const PUBLISHED_FILTER: &str = r#"
    p.status = 'published'
    AND ($2::text IS NULL OR EXISTS (
        SELECT 1 FROM post_categories pc JOIN categories c ON c.id = pc.category_id
        WHERE pc.post_id = p.id AND c.slug = $2))
    AND ($3::text IS NULL OR EXISTS (
        SELECT 1 FROM post_hashtags ph JOIN hashtags h ON h.id = ph.hashtag_id
        WHERE ph.post_id = p.id AND h.name = $3))
"#;

impl Post {
    pub async fn create(pool: &PgPool, data: CreatePost) -> Result<Self, sqlx::Error> {
        let query = format!(
            "INSERT INTO posts (author_id, slug, cover_image_url) VALUES ($1, $2, $3) RETURNING {}",
            POST_COLUMNS
        );

        sqlx::query_as::<_, Post>(&query)
            .bind(data.author_id)
            .bind(data.slug)
            .bind(data.cover_image_url)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let query = format!("SELECT {} FROM posts WHERE id = $1", POST_COLUMNS);

        sqlx::query_as::<_, Post>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_slug(pool: &PgPool, slug: &str) -> Result<Option<Self>, sqlx::Error> {
        let query = format!("SELECT {} FROM posts WHERE slug = $1", POST_COLUMNS);

        sqlx::query_as::<_, Post>(&query)
            .bind(slug)
            .fetch_optional(pool)
            .await
    }

    pub async fn update(
        pool: &PgPool,
        id: Uuid,
        data: UpdatePost,
    ) -> Result<Option<Self>, sqlx::Error> {
        let mut query = String::from("UPDATE posts SET updated_at = NOW()");
        let mut bind_count = 1;

        if data.slug.is_some() {
            bind_count += 1;
            query.push_str(&format!(", slug = ${}", bind_count));
        }
        if data.cover_image_url.is_some() {
            bind_count += 1;
            query.push_str(&format!(", cover_image_url = ${}", bind_count));
        }

        query.push_str(&format!(" WHERE id = $1 RETURNING {}", POST_COLUMNS));

        let mut q = sqlx::query_as::<_, Post>(&query).bind(id);

        if let Some(slug) = data.slug {
            q = q.bind(slug);
        }
        if let Some(cover_image_url) = data.cover_image_url {
            q = q.bind(cover_image_url);
        }

        q.fetch_optional(pool).await
    }

    /// Changes the status. The first publish stamps `published_at`; later
    /// re-publishes keep the original date.
    pub async fn set_status(
        pool: &PgPool,
        id: Uuid,
        status: PostStatus,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!(
            "UPDATE posts SET status = $2, updated_at = NOW(), \
             published_at = CASE WHEN $2 = 'published'::post_status \
                                 THEN COALESCE(published_at, NOW()) ELSE published_at END \
             WHERE id = $1 RETURNING {}",
            POST_COLUMNS
        );

        sqlx::query_as::<_, Post>(&query)
            .bind(id)
            .bind(status)
            .fetch_optional(pool)
            .await
    }

    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM posts WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Published posts, newest first, each with the translation for the
    /// requested locale or the default one.
    pub async fn list_published(
        pool: &PgPool,
        filter: &PostFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<PostListItem>, sqlx::Error> {
        let query = format!(
            r#"
            SELECT p.id, p.slug, p.cover_image_url, p.published_at, p.view_count, p.like_count,
                   t.locale, t.title, t.excerpt
            FROM posts p
            JOIN LATERAL (
                SELECT locale, title, excerpt FROM post_translations
                WHERE post_id = p.id AND locale IN ($1, '{default}')
                ORDER BY (locale = $1) DESC
                LIMIT 1
            ) t ON true
            WHERE {filter}
            ORDER BY p.published_at DESC
            LIMIT $4 OFFSET $5
            "#,
            default = DEFAULT_LOCALE,
            filter = PUBLISHED_FILTER
        );

        sqlx::query_as::<_, PostListItem>(&query)
            .bind(filter.locale.as_deref().unwrap_or(DEFAULT_LOCALE))
            .bind(filter.category.as_deref())
            .bind(filter.hashtag.as_deref())
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }

    pub async fn count_published(pool: &PgPool, filter: &PostFilter) -> Result<i64, sqlx::Error> {
        let query = format!(
            r#"
            SELECT COUNT(*) FROM posts p
            WHERE EXISTS (
                SELECT 1 FROM post_translations
                WHERE post_id = p.id AND locale IN ($1, '{default}'))
            AND {filter}
            "#,
            default = DEFAULT_LOCALE,
            filter = PUBLISHED_FILTER
        );

        sqlx::query_scalar(&query)
            .bind(filter.locale.as_deref().unwrap_or(DEFAULT_LOCALE))
            .bind(filter.category.as_deref())
            .bind(filter.hashtag.as_deref())
            .fetch_one(pool)
            .await
    }

    /// Back-office listing across all statuses.
    pub async fn list_all(
        pool: &PgPool,
        status: Option<PostStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let query = format!(
            "SELECT {} FROM posts WHERE ($1::post_status IS NULL OR status = $1) \
             ORDER BY updated_at DESC LIMIT $2 OFFSET $3",
            POST_COLUMNS
        );

        sqlx::query_as::<_, Post>(&query)
            .bind(status)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }

    pub async fn count_all(pool: &PgPool, status: Option<PostStatus>) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM posts WHERE ($1::post_status IS NULL OR status = $1)")
            .bind(status)
            .fetch_one(pool)
            .await
    }

    pub async fn upsert_translation(
        pool: &PgPool,
        post_id: Uuid,
        data: UpsertTranslation,
    ) -> Result<PostTranslation, sqlx::Error> {
        sqlx::query_as::<_, PostTranslation>(
            r#"
            INSERT INTO post_translations (post_id, locale, title, excerpt, content)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (post_id, locale) DO UPDATE
            SET title = EXCLUDED.title,
                excerpt = EXCLUDED.excerpt,
                content = EXCLUDED.content,
                updated_at = NOW()
            RETURNING post_id, locale, title, excerpt, content, updated_at
            "#,
        )
        .bind(post_id)
        .bind(data.locale)
        .bind(data.title)
        .bind(data.excerpt)
        .bind(data.content)
        .fetch_one(pool)
        .await
    }

    pub async fn translations(
        pool: &PgPool,
        post_id: Uuid,
    ) -> Result<Vec<PostTranslation>, sqlx::Error> {
        sqlx::query_as::<_, PostTranslation>(
            r#"
            SELECT post_id, locale, title, excerpt, content, updated_at
            FROM post_translations WHERE post_id = $1 ORDER BY locale
            "#,
        )
        .bind(post_id)
        .fetch_all(pool)
        .await
    }

    /// Translation for `locale`, falling back to [`DEFAULT_LOCALE`].
    pub async fn translation_for(
        pool: &PgPool,
        post_id: Uuid,
        locale: &str,
    ) -> Result<Option<PostTranslation>, sqlx::Error> {
        sqlx::query_as::<_, PostTranslation>(
            r#"
            SELECT post_id, locale, title, excerpt, content, updated_at
            FROM post_translations
            WHERE post_id = $1 AND locale IN ($2, $3)
            ORDER BY (locale = $2) DESC
            LIMIT 1
            "#,
        )
        .bind(post_id)
        .bind(locale)
        .bind(DEFAULT_LOCALE)
        .fetch_optional(pool)
        .await
    }

    pub async fn delete_translation(
        pool: &PgPool,
        post_id: Uuid,
        locale: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM post_translations WHERE post_id = $1 AND locale = $2")
            .bind(post_id)
            .bind(locale)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Replaces the post's categories.
    pub async fn set_categories(
        pool: &PgPool,
        post_id: Uuid,
        category_ids: &[Uuid],
    ) -> Result<(), sqlx::Error> {
        let mut tx = pool.begin().await?;

        sqlx::query("DELETE FROM post_categories WHERE post_id = $1")
            .bind(post_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO post_categories (post_id, category_id)
            SELECT $1, id FROM categories WHERE id = ANY($2)
            "#,
        )
        .bind(post_id)
        .bind(category_ids.to_vec())
        .execute(&mut *tx)
        .await?;

        tx.commit().await
    }

    /// Replaces the post's hashtags, creating unknown tags on the fly.
    pub async fn set_hashtags(
        pool: &PgPool,
        post_id: Uuid,
        names: &[String],
    ) -> Result<(), sqlx::Error> {
        let names: Vec<String> = names.iter().filter_map(|n| normalize_hashtag(n)).collect();
        let mut tx = pool.begin().await?;

        sqlx::query("INSERT INTO hashtags (name) SELECT unnest($1::text[]) ON CONFLICT (name) DO NOTHING")
            .bind(names.clone())
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM post_hashtags WHERE post_id = $1")
            .bind(post_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO post_hashtags (post_id, hashtag_id)
            SELECT $1, id FROM hashtags WHERE name = ANY($2)
            "#,
        )
        .bind(post_id)
        .bind(names.clone())
        .execute(&mut *tx)
        .await?;

        tx.commit().await
    }

    pub async fn categories(pool: &PgPool, post_id: Uuid) -> Result<Vec<Category>, sqlx::Error> {
        sqlx::query_as::<_, Category>(
            r#"
            SELECT c.id, c.slug, c.name, c.created_at
            FROM categories c JOIN post_categories pc ON pc.category_id = c.id
            WHERE pc.post_id = $1 ORDER BY c.name
            "#,
        )
        .bind(post_id)
        .fetch_all(pool)
        .await
    }

    pub async fn hashtags(pool: &PgPool, post_id: Uuid) -> Result<Vec<Hashtag>, sqlx::Error> {
        sqlx::query_as::<_, Hashtag>(
            r#"
            SELECT h.id, h.name
            FROM hashtags h JOIN post_hashtags ph ON ph.hashtag_id = h.id
            WHERE ph.post_id = $1 ORDER BY h.name
            "#,
        )
        .bind(post_id)
        .fetch_all(pool)
        .await
    }

    /// Bumps the view counter and returns the new value.
    pub async fn increment_views(pool: &PgPool, id: Uuid) -> Result<Option<i64>, sqlx::Error> {
        sqlx::query_scalar(
            "UPDATE posts SET view_count = view_count + 1 WHERE id = $1 AND status = 'published' \
             RETURNING view_count",
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// Likes the post for this user, or removes the like if present.
    /// Returns whether the post is now liked and the updated count.
    pub async fn toggle_like(
        pool: &PgPool,
        post_id: Uuid,
        user_id: Uuid,
    ) -> Result<(bool, i64), sqlx::Error> {
        let mut tx = pool.begin().await?;

        let removed = sqlx::query("DELETE FROM post_likes WHERE post_id = $1 AND user_id = $2")
            .bind(post_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?
            .rows_affected()
            > 0;

        let (liked, delta) = if removed {
            (false, -1_i64)
        } else {
            let inserted = sqlx::query(
                "INSERT INTO post_likes (post_id, user_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
            )
            .bind(post_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?
            .rows_affected()
                > 0;
            (true, if inserted { 1 } else { 0 })
        };

        let like_count: i64 = sqlx::query_scalar(
            "UPDATE posts SET like_count = GREATEST(like_count + $2, 0) WHERE id = $1 RETURNING like_count",
        )
        .bind(post_id)
        .bind(delta)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok((liked, like_count))
    }

    pub async fn is_liked_by(pool: &PgPool, post_id: Uuid, user_id: Uuid) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM post_likes WHERE post_id = $1 AND user_id = $2)",
        )
        .bind(post_id)
        .bind(user_id)
        .fetch_one(pool)
        .await
    }
}

impl Category {
    pub async fn create(pool: &PgPool, slug: &str, name: &str) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Category>(
            "INSERT INTO categories (slug, name) VALUES ($1, $2) RETURNING id, slug, name, created_at",
        )
        .bind(slug)
        .bind(name)
        .fetch_one(pool)
        .await
    }

    pub async fn list_all(pool: &PgPool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Category>("SELECT id, slug, name, created_at FROM categories ORDER BY name")
            .fetch_all(pool)
            .await
    }

    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM categories WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_hashtag() {
        assert_eq!(normalize_hashtag("#Rust"), Some("rust".to_string()));
        assert_eq!(normalize_hashtag("  async  "), Some("async".to_string()));
        assert_eq!(normalize_hashtag("#"), None);
        assert_eq!(normalize_hashtag("two words"), None);
        assert_eq!(normalize_hashtag(&"x".repeat(65)), None);
    }

    #[test]
    fn test_is_valid_locale() {
        assert!(is_valid_locale("en"));
        assert!(is_valid_locale("pt-BR"));
        assert!(is_valid_locale("fil"));
        assert!(!is_valid_locale("EN"));
        assert!(!is_valid_locale("pt-br"));
        assert!(!is_valid_locale("english"));
        assert!(!is_valid_locale("pt-BR-x"));
        assert!(!is_valid_locale(""));
    }

    #[test]
    fn test_post_status_serde() {
        assert_eq!(
            serde_json::to_string(&PostStatus::Published).unwrap(),
            "\"published\""
        );
    }
}
