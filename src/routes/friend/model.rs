use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::domain::friendship;
use crate::error::AppError;
use crate::gateway::GatewayOp;
use crate::outbox;
use crate::routes::notification::{Notification, NotificationKind};
use crate::routes::user::User;

pub const STATUS_PENDING: &str = "pending";
pub const STATUS_ACCEPTED: &str = "accepted";

/// 好友请求只有 pending/accepted 两个状态，没有拒绝或撤回
/// （沿用原有产品行为，缺口已在测试里标注）
#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct FriendRequest {
    pub request_id: String,
    pub sender_id: String,
    pub recipient_id: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
}

const REQUEST_COLUMNS: &str =
    "request_id, sender_id, recipient_id, status, created_at, responded_at";

impl FriendRequest {
    /// 无序对上是否已有请求记录（任意方向、任意状态）
    async fn exists_between(pool: &PgPool, a: &str, b: &str) -> Result<bool, AppError> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM friend_requests
                WHERE (sender_id = $1 AND recipient_id = $2)
                   OR (sender_id = $2 AND recipient_id = $1)
            )
            "#,
        )
        .bind(a)
        .bind(b)
        .fetch_one(pool)
        .await?;
        Ok(exists)
    }

    pub async fn find_by_id(pool: &PgPool, request_id: &str) -> Result<Option<Self>, AppError> {
        let request = sqlx::query_as(&format!(
            "SELECT {REQUEST_COLUMNS} FROM friend_requests WHERE request_id = $1"
        ))
        .bind(request_id)
        .fetch_optional(pool)
        .await?;
        Ok(request)
    }

    pub async fn send(
        pool: &PgPool,
        sender_id: &str,
        recipient_id: &str,
    ) -> Result<Self, AppError> {
        let sender = User::find_by_id(pool, sender_id)
            .await?
            .ok_or_else(|| AppError::NotFound("sender not found".to_string()))?;
        let recipient = User::find_by_id(pool, recipient_id)
            .await?
            .ok_or_else(|| AppError::NotFound("recipient not found".to_string()))?;

        let exists = Self::exists_between(pool, sender_id, recipient_id).await?;
        friendship::ensure_can_send(&sender.edges(), &recipient.edges(), exists)?;

        let mut tx = pool.begin().await?;

        let request: FriendRequest = sqlx::query_as(&format!(
            r#"
            INSERT INTO friend_requests (request_id, sender_id, recipient_id, status)
            VALUES ($1, $2, $3, '{STATUS_PENDING}')
            RETURNING {REQUEST_COLUMNS}
            "#,
        ))
        .bind(Uuid::new_v4().to_string())
        .bind(sender_id)
        .bind(recipient_id)
        .fetch_one(&mut *tx)
        .await?;

        Notification::create(
            &mut *tx,
            recipient_id,
            Some(sender_id),
            NotificationKind::FriendRequest,
            "New friend request",
            &format!("{} sent you a friend request", sender.nickname),
            serde_json::json!({ "request_id": request.request_id }),
        )
        .await?;

        tx.commit().await?;
        Ok(request)
    }

    /// 接受请求：状态翻转、双向好友写入和通知在一个事务里提交，
    /// 网关同步入队后由worker异步投递
    pub async fn accept(
        pool: &PgPool,
        request_id: &str,
        actor_id: &str,
    ) -> Result<Self, AppError> {
        let request = Self::find_by_id(pool, request_id)
            .await?
            .ok_or_else(|| AppError::NotFound("friend request not found".to_string()))?;

        let sender = User::find_by_id(pool, &request.sender_id)
            .await?
            .ok_or_else(|| AppError::NotFound("sender not found".to_string()))?;
        let recipient = User::find_by_id(pool, &request.recipient_id)
            .await?
            .ok_or_else(|| AppError::NotFound("recipient not found".to_string()))?;

        // 拉黑可能晚于请求创建，接受时重新校验
        friendship::ensure_can_accept(
            &request.recipient_id,
            actor_id,
            request.status == STATUS_ACCEPTED,
            &sender.edges(),
            &recipient.edges(),
        )?;

        let mut tx = pool.begin().await?;

        let request: FriendRequest = sqlx::query_as(&format!(
            r#"
            UPDATE friend_requests
            SET status = '{STATUS_ACCEPTED}', responded_at = NOW()
            WHERE request_id = $1
            RETURNING {REQUEST_COLUMNS}
            "#,
        ))
        .bind(request_id)
        .fetch_one(&mut *tx)
        .await?;

        // 幂等的集合写入：已在好友集合里就不重复追加
        for (owner, friend) in [
            (&request.sender_id, &request.recipient_id),
            (&request.recipient_id, &request.sender_id),
        ] {
            sqlx::query(
                r#"
                UPDATE users SET friend_ids = array_append(friend_ids, $2)
                WHERE user_id = $1 AND NOT ($2 = ANY(friend_ids))
                "#,
            )
            .bind(owner)
            .bind(friend)
            .execute(&mut *tx)
            .await?;
        }

        Notification::create(
            &mut *tx,
            &request.sender_id,
            Some(&request.recipient_id),
            NotificationKind::FriendAccepted,
            "Friend request accepted",
            &format!("{} accepted your friend request", recipient.nickname),
            serde_json::json!({ "request_id": request.request_id }),
        )
        .await?;

        for user in [&sender, &recipient] {
            outbox::enqueue(
                &mut *tx,
                &GatewayOp::UpsertUser {
                    user_id: user.user_id.clone(),
                    name: user.nickname.clone(),
                    image: user.avatar_url.clone(),
                },
            )
            .await?;
        }

        tx.commit().await?;
        Ok(request)
    }

    pub async fn incoming(pool: &PgPool, user_id: &str) -> Result<Vec<Self>, AppError> {
        let requests = sqlx::query_as(&format!(
            r#"
            SELECT {REQUEST_COLUMNS} FROM friend_requests
            WHERE recipient_id = $1 AND status = '{STATUS_PENDING}'
            ORDER BY created_at DESC
            "#,
        ))
        .bind(user_id)
        .fetch_all(pool)
        .await?;
        Ok(requests)
    }

    pub async fn outgoing(pool: &PgPool, user_id: &str) -> Result<Vec<Self>, AppError> {
        let requests = sqlx::query_as(&format!(
            r#"
            SELECT {REQUEST_COLUMNS} FROM friend_requests
            WHERE sender_id = $1 AND status = '{STATUS_PENDING}'
            ORDER BY created_at DESC
            "#,
        ))
        .bind(user_id)
        .fetch_all(pool)
        .await?;
        Ok(requests)
    }
}
