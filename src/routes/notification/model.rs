use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, postgres::PgExecutor};
use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    FriendRequest,
    FriendAccepted,
    GroupJoined,
    GroupRoleChanged,
    GroupRemoved,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::FriendRequest => "friend_request",
            NotificationKind::FriendAccepted => "friend_accepted",
            NotificationKind::GroupJoined => "group_joined",
            NotificationKind::GroupRoleChanged => "group_role_changed",
            NotificationKind::GroupRemoved => "group_removed",
        }
    }
}

/// 通知记录：由其他工作流写入，之后只允许翻转已读/删除标记
#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct Notification {
    pub notification_id: String,
    pub recipient_id: String,
    pub sender_id: Option<String>,
    pub kind: String,
    pub title: String,
    pub message: String,
    pub payload: serde_json::Value,
    pub is_read: bool,
    #[serde(skip_serializing)]
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    /// 作为其他工作流的副作用写入，接受事务执行器以便和主写入一起提交
    pub async fn create<'e>(
        executor: impl PgExecutor<'e>,
        recipient_id: &str,
        sender_id: Option<&str>,
        kind: NotificationKind,
        title: &str,
        message: &str,
        payload: serde_json::Value,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO notifications
                (notification_id, recipient_id, sender_id, kind, title, message, payload)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(recipient_id)
        .bind(sender_id)
        .bind(kind.as_str())
        .bind(title)
        .bind(message)
        .bind(payload)
        .execute(executor)
        .await?;
        Ok(())
    }

    pub async fn list(
        pool: &PgPool,
        recipient_id: &str,
        page: u32,
        page_size: u32,
    ) -> Result<(Vec<Self>, u64), AppError> {
        let offset = (page.saturating_sub(1) as i64) * page_size as i64;

        let items: Vec<Notification> = sqlx::query_as(
            r#"
            SELECT notification_id, recipient_id, sender_id, kind, title, message,
                   payload, is_read, is_deleted, created_at
            FROM notifications
            WHERE recipient_id = $1 AND NOT is_deleted
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(recipient_id)
        .bind(page_size as i64)
        .bind(offset)
        .fetch_all(pool)
        .await?;

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM notifications WHERE recipient_id = $1 AND NOT is_deleted",
        )
        .bind(recipient_id)
        .fetch_one(pool)
        .await?;

        Ok((items, total as u64))
    }

    pub async fn mark_read(
        pool: &PgPool,
        recipient_id: &str,
        notification_id: &str,
    ) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            UPDATE notifications SET is_read = TRUE
            WHERE notification_id = $1 AND recipient_id = $2 AND NOT is_deleted
            "#,
        )
        .bind(notification_id)
        .bind(recipient_id)
        .execute(pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("notification not found".to_string()));
        }
        Ok(())
    }

    pub async fn mark_all_read(pool: &PgPool, recipient_id: &str) -> Result<u64, AppError> {
        let result = sqlx::query(
            "UPDATE notifications SET is_read = TRUE WHERE recipient_id = $1 AND NOT is_read AND NOT is_deleted",
        )
        .bind(recipient_id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// 软删除：只翻转标记，记录保留
    pub async fn delete(
        pool: &PgPool,
        recipient_id: &str,
        notification_id: &str,
    ) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            UPDATE notifications SET is_deleted = TRUE
            WHERE notification_id = $1 AND recipient_id = $2 AND NOT is_deleted
            "#,
        )
        .bind(notification_id)
        .bind(recipient_id)
        .execute(pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("notification not found".to_string()));
        }
        Ok(())
    }
}
