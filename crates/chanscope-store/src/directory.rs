//! Channel and user directory.
//!
//! Channels are created when an admin links the bot to them and updated when
//! their username changes. They are never deleted here. Users are upserted
//! lazily, the first time an author or admin is seen.

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use tracing::{debug, instrument};

use crate::schema::{to_millis, Channel};
use crate::Store;

/// Strip a leading `@` and surrounding whitespace; empty names become `None`.
pub fn normalize_username(username: Option<&str>) -> Option<String> {
    username
        .map(|name| name.trim().trim_start_matches('@').trim())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
}

impl Store {
    /// Look up a channel by its external chat id.
    pub async fn find_channel_by_chat_id(&self, chat_id: i64) -> Result<Option<Channel>> {
        let row = sqlx::query_as::<_, (i64, i64, Option<String>)>(
            "SELECT id, chat_id, username FROM channels WHERE chat_id = ?1",
        )
        .bind(chat_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(id, chat_id, username)| Channel {
            id,
            chat_id,
            username,
        }))
    }

    /// Create the channel or refresh its username.
    ///
    /// A `None` username keeps whatever is stored. A username already held by
    /// another channel is moved to this one, since public names can be reassigned.
    #[instrument(skip(self))]
    pub async fn upsert_channel(&self, chat_id: i64, username: Option<&str>) -> Result<Channel> {
        let mut tx = self.pool.begin().await?;
        let channel = upsert_channel(&mut tx, chat_id, username).await?;
        tx.commit().await?;
        Ok(channel)
    }

    /// Upsert a user by external id and return its row id.
    pub async fn upsert_user(&self, external_id: i64) -> Result<i64> {
        let mut conn = self.pool.acquire().await?;
        upsert_user(&mut conn, external_id).await
    }

    /// Link an admin account to a channel, creating both sides as needed.
    #[instrument(skip(self))]
    pub async fn link_admin_channel(
        &self,
        admin_external_id: i64,
        chat_id: i64,
        username: Option<&str>,
        linked_at: DateTime<Utc>,
    ) -> Result<Channel> {
        let mut tx = self.pool.begin().await?;
        let user_id = upsert_user(&mut tx, admin_external_id).await?;
        let channel = upsert_channel(&mut tx, chat_id, username).await?;

        sqlx::query(
            "INSERT INTO admin_channels (user_id, channel_id, linked_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(user_id, channel_id) DO UPDATE SET linked_at = excluded.linked_at",
        )
        .bind(user_id)
        .bind(channel.id)
        .bind(to_millis(linked_at))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        debug!(
            "Linked admin {} to channel {} (id={})",
            admin_external_id, chat_id, channel.id
        );
        Ok(channel)
    }

    /// Channels an admin has linked, ordered by chat id.
    pub async fn channels_for_admin(&self, admin_external_id: i64) -> Result<Vec<Channel>> {
        let rows = sqlx::query_as::<_, (i64, i64, Option<String>)>(
            "SELECT c.id, c.chat_id, c.username
             FROM admin_channels ac
             JOIN users u ON u.id = ac.user_id
             JOIN channels c ON c.id = ac.channel_id
             WHERE u.external_id = ?1
             ORDER BY c.chat_id",
        )
        .bind(admin_external_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, chat_id, username)| Channel {
                id,
                chat_id,
                username,
            })
            .collect())
    }
}

async fn upsert_channel(
    conn: &mut SqliteConnection,
    chat_id: i64,
    username: Option<&str>,
) -> Result<Channel> {
    let username = normalize_username(username);

    if let Some(name) = username.as_deref() {
        sqlx::query("UPDATE channels SET username = NULL WHERE username = ?1 AND chat_id != ?2")
            .bind(name)
            .bind(chat_id)
            .execute(&mut *conn)
            .await?;
    }

    let (id, chat_id, username) = sqlx::query_as::<_, (i64, i64, Option<String>)>(
        "INSERT INTO channels (chat_id, username) VALUES (?1, ?2)
         ON CONFLICT(chat_id) DO UPDATE SET
            username = COALESCE(excluded.username, channels.username)
         RETURNING id, chat_id, username",
    )
    .bind(chat_id)
    .bind(username)
    .fetch_one(&mut *conn)
    .await?;

    Ok(Channel {
        id,
        chat_id,
        username,
    })
}

pub(crate) async fn upsert_user(conn: &mut SqliteConnection, external_id: i64) -> Result<i64> {
    // The no-op update makes RETURNING yield the existing row on conflict.
    let id: i64 = sqlx::query_scalar(
        "INSERT INTO users (external_id) VALUES (?1)
         ON CONFLICT(external_id) DO UPDATE SET external_id = excluded.external_id
         RETURNING id",
    )
    .bind(external_id)
    .fetch_one(&mut *conn)
    .await?;
    Ok(id)
}
