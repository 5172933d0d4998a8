//! Album database operations
//!
//! Albums mirror the directory tree of the library root; a NULL parent
//! marks a root album. The listing queries here are the read side consumed
//! by the gallery API.

use lumika_common::db::models::AlbumRecord;
use lumika_common::{Error, Result};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use std::path::Path;
use uuid::Uuid;

fn album_from_row(row: &SqliteRow) -> Result<AlbumRecord> {
    let guid_str: String = row.get("guid");
    let guid = Uuid::parse_str(&guid_str)
        .map_err(|e| Error::Internal(format!("Invalid album guid in database: {}", e)))?;

    let parent_str: Option<String> = row.get("parent_album_id");
    let parent_album_id = parent_str
        .map(|s| Uuid::parse_str(&s))
        .transpose()
        .map_err(|e| Error::Internal(format!("Invalid parent album guid in database: {}", e)))?;

    Ok(AlbumRecord {
        guid,
        title: row.get("title"),
        path: row.get("path"),
        parent_album_id,
    })
}

/// Look up an album by directory path
pub async fn find_by_path(pool: &SqlitePool, path: &str) -> Result<Option<AlbumRecord>> {
    let row = sqlx::query(
        "SELECT guid, title, path, parent_album_id FROM albums WHERE path = ?",
    )
    .bind(path)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(album_from_row).transpose()
}

/// Load an album by id
pub async fn load_album(pool: &SqlitePool, album_id: Uuid) -> Result<Option<AlbumRecord>> {
    let row = sqlx::query(
        "SELECT guid, title, path, parent_album_id FROM albums WHERE guid = ?",
    )
    .bind(album_id.to_string())
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(album_from_row).transpose()
}

/// Look up or create the album mirroring one library directory.
///
/// Concurrent-safe the same way media registration is: path uniqueness at
/// the storage layer plus a conflict-tolerant insert and re-read.
pub async fn get_or_create_album(
    pool: &SqlitePool,
    path: &Path,
    title: &str,
    parent_album_id: Option<Uuid>,
) -> Result<AlbumRecord> {
    let path_str = path.to_string_lossy();

    if let Some(existing) = find_by_path(pool, &path_str).await? {
        return Ok(existing);
    }

    let album = AlbumRecord::new(title.to_string(), path, parent_album_id);
    let result = sqlx::query(
        r#"
        INSERT INTO albums (guid, title, path, parent_album_id)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(path) DO NOTHING
        "#,
    )
    .bind(album.guid.to_string())
    .bind(&album.title)
    .bind(&album.path)
    .bind(album.parent_album_id.map(|id| id.to_string()))
    .execute(pool)
    .await?;

    if result.rows_affected() > 0 {
        return Ok(album);
    }

    // Lost the race; the competing writer's row is the album
    find_by_path(pool, &path_str)
        .await?
        .ok_or_else(|| Error::Internal(format!("Album vanished after insert conflict: {}", path_str)))
}

/// Ordering for album listings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AlbumOrder {
    #[default]
    Title,
    CreatedAt,
}

/// Listing filters for album queries
#[derive(Debug, Clone, Default)]
pub struct AlbumFilter {
    /// Only albums without a parent
    pub only_root: bool,
    /// Include albums owning no media
    pub show_empty: bool,
    /// Restrict to albums containing media favorited by this user.
    /// Only applies when empty albums are hidden, matching the gallery UI.
    pub only_with_favorites: Option<Uuid>,
    pub order: AlbumOrder,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// List albums matching the filter
pub async fn list_albums(pool: &SqlitePool, filter: &AlbumFilter) -> Result<Vec<AlbumRecord>> {
    let mut sql =
        String::from("SELECT guid, title, path, parent_album_id FROM albums WHERE 1=1");

    if filter.only_root {
        sql.push_str(" AND parent_album_id IS NULL");
    }

    let favorites_user = if filter.show_empty {
        None
    } else {
        if filter.only_with_favorites.is_some() {
            sql.push_str(
                " AND EXISTS (SELECT 1 FROM media \
                 WHERE media.album_id = albums.guid \
                 AND EXISTS (SELECT 1 FROM user_favorites \
                 WHERE user_favorites.media_id = media.guid \
                 AND user_favorites.user_id = ?))",
            );
        } else {
            sql.push_str(
                " AND EXISTS (SELECT 1 FROM media WHERE media.album_id = albums.guid)",
            );
        }
        filter.only_with_favorites
    };

    sql.push_str(match filter.order {
        AlbumOrder::Title => " ORDER BY title",
        AlbumOrder::CreatedAt => " ORDER BY created_at",
    });

    match (filter.limit, filter.offset) {
        (Some(limit), Some(offset)) => sql.push_str(&format!(" LIMIT {} OFFSET {}", limit, offset)),
        (Some(limit), None) => sql.push_str(&format!(" LIMIT {}", limit)),
        // SQLite requires a LIMIT clause before OFFSET; -1 means unbounded
        (None, Some(offset)) => sql.push_str(&format!(" LIMIT -1 OFFSET {}", offset)),
        (None, None) => {}
    }

    let mut query = sqlx::query(&sql);
    if let Some(user) = favorites_user {
        query = query.bind(user.to_string());
    }

    let rows = query.fetch_all(pool).await?;
    rows.iter().map(album_from_row).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumika_common::db::models::{MediaKind, MediaRecord};

    async fn setup_test_db() -> SqlitePool {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        sqlx::query("PRAGMA foreign_keys = ON")
            .execute(&pool)
            .await
            .unwrap();
        lumika_common::db::init::init_schema(&pool).await.unwrap();
        pool
    }

    async fn add_media(pool: &SqlitePool, album_id: Uuid, path: &str) -> MediaRecord {
        let record = MediaRecord::new(
            Path::new(path)
                .file_name()
                .unwrap()
                .to_string_lossy()
                .into_owned(),
            Path::new(path),
            album_id,
            MediaKind::Photo,
            chrono::Utc::now(),
        );
        assert!(crate::db::media::insert_media(pool, &record).await.unwrap());
        record
    }

    #[tokio::test]
    async fn get_or_create_is_idempotent() {
        let pool = setup_test_db().await;

        let first = get_or_create_album(&pool, Path::new("/library"), "library", None)
            .await
            .unwrap();
        let second = get_or_create_album(&pool, Path::new("/library"), "library", None)
            .await
            .unwrap();

        assert_eq!(first.guid, second.guid);
        assert!(first.parent_album_id.is_none());
    }

    #[tokio::test]
    async fn child_albums_reference_their_parent() {
        let pool = setup_test_db().await;

        let root = get_or_create_album(&pool, Path::new("/library"), "library", None)
            .await
            .unwrap();
        let child =
            get_or_create_album(&pool, Path::new("/library/2020"), "2020", Some(root.guid))
                .await
                .unwrap();

        assert_eq!(child.parent_album_id, Some(root.guid));

        let roots = list_albums(
            &pool,
            &AlbumFilter {
                only_root: true,
                show_empty: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0].guid, root.guid);
    }

    #[tokio::test]
    async fn empty_albums_are_hidden_by_default() {
        let pool = setup_test_db().await;

        let root = get_or_create_album(&pool, Path::new("/library"), "library", None)
            .await
            .unwrap();
        let empty = get_or_create_album(&pool, Path::new("/library/empty"), "empty", Some(root.guid))
            .await
            .unwrap();
        add_media(&pool, root.guid, "/library/a.jpg").await;

        let visible = list_albums(&pool, &AlbumFilter::default()).await.unwrap();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].guid, root.guid);

        let all = list_albums(
            &pool,
            &AlbumFilter {
                show_empty: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(all.len(), 2);
        assert!(all.iter().any(|a| a.guid == empty.guid));
    }

    #[tokio::test]
    async fn favorites_filter_restricts_to_marked_media() {
        let pool = setup_test_db().await;

        let root = get_or_create_album(&pool, Path::new("/library"), "library", None)
            .await
            .unwrap();
        let other = get_or_create_album(&pool, Path::new("/library/other"), "other", Some(root.guid))
            .await
            .unwrap();

        let favorite = add_media(&pool, root.guid, "/library/fav.jpg").await;
        add_media(&pool, other.guid, "/library/other/plain.jpg").await;

        let user_id = Uuid::new_v4();
        sqlx::query("INSERT INTO user_favorites (user_id, media_id) VALUES (?, ?)")
            .bind(user_id.to_string())
            .bind(favorite.guid.to_string())
            .execute(&pool)
            .await
            .unwrap();

        let favorited = list_albums(
            &pool,
            &AlbumFilter {
                only_with_favorites: Some(user_id),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        assert_eq!(favorited.len(), 1);
        assert_eq!(favorited[0].guid, root.guid);
    }
}
