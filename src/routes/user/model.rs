use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, types::Json};
use uuid::Uuid;

use crate::domain::friendship::{self, SocialEdges};
use crate::error::AppError;
use crate::gateway::GatewayOp;
use crate::outbox;
use crate::utils::{hash_password, verify_password};

pub const AVAILABILITY_VALUES: [&str; 3] = ["available", "busy", "away"];

/// 用户偏好子文档，与其他实体无交叉约束
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    pub theme: String,
    pub email_notifications: bool,
    pub push_notifications: bool,
    pub show_online_status: bool,
    pub discoverable: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            theme: "light".to_string(),
            email_notifications: true,
            push_notifications: true,
            show_online_status: true,
            discoverable: true,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct User {
    pub user_id: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub nickname: String,
    pub bio: String,
    pub avatar_url: Option<String>,
    pub cover_url: Option<String>,
    pub native_language: String,
    pub learning_language: String,
    pub location: String,
    pub interests: Vec<String>,
    pub availability: String,
    pub status_line: String,
    pub friend_ids: Vec<String>,
    #[serde(skip_serializing)]
    pub blocked_ids: Vec<String>,
    pub preferences: Json<Preferences>,
    pub created_at: DateTime<Utc>,
}

/// 对外展示的用户摘要（好友列表、群成员等）
#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct UserSummary {
    pub user_id: String,
    pub nickname: String,
    pub bio: String,
    pub avatar_url: Option<String>,
    pub native_language: String,
    pub learning_language: String,
    pub location: String,
    pub availability: String,
    pub status_line: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub nickname: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user_id: String,
    pub nickname: String,
    pub token: String,
    pub expires_at: i64,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub nickname: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub cover_url: Option<String>,
    pub native_language: Option<String>,
    pub learning_language: Option<String>,
    pub location: Option<String>,
    pub interests: Option<Vec<String>>,
    pub availability: Option<String>,
    pub status_line: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TargetUserRequest {
    pub target_id: String,
}

const USER_COLUMNS: &str = r#"
    user_id, email, password_hash, nickname, bio, avatar_url, cover_url,
    native_language, learning_language, location, interests, availability,
    status_line, friend_ids, blocked_ids, preferences, created_at
"#;

const SUMMARY_COLUMNS: &str = r#"
    user_id, nickname, bio, avatar_url, native_language, learning_language,
    location, availability, status_line
"#;

impl User {
    /// 注册：凭证先哈希再入库，网关同步与主写入同事务入队
    pub async fn create(pool: &PgPool, req: RegisterRequest) -> Result<Self, AppError> {
        if !req.email.contains('@') || req.email.len() < 5 {
            return Err(AppError::Validation("invalid email address".to_string()));
        }
        if req.password.len() < 6 || req.password.len() > 64 {
            return Err(AppError::Validation(
                "password must be between 6 and 64 characters".to_string(),
            ));
        }
        if req.nickname.len() < 2 || req.nickname.len() > 32 {
            return Err(AppError::Validation(
                "nickname must be between 2 and 32 characters".to_string(),
            ));
        }

        let password_hash = hash_password(&req.password)
            .map_err(|e| AppError::Internal(format!("failed to hash password: {}", e)))?;

        let mut tx = pool.begin().await?;

        let user: User = sqlx::query_as(&format!(
            r#"
            INSERT INTO users (user_id, email, password_hash, nickname, preferences)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {USER_COLUMNS}
            "#,
        ))
        .bind(Uuid::new_v4().to_string())
        .bind(req.email.to_lowercase())
        .bind(password_hash)
        .bind(&req.nickname)
        .bind(Json(Preferences::default()))
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                AppError::DuplicateState("email is already registered".to_string())
            }
            _ => AppError::Database(e),
        })?;

        outbox::enqueue(&mut *tx, &user.upsert_op()).await?;
        tx.commit().await?;

        Ok(user)
    }

    /// 同步到外部网关的用户资料投影
    pub fn upsert_op(&self) -> GatewayOp {
        GatewayOp::UpsertUser {
            user_id: self.user_id.clone(),
            name: self.nickname.clone(),
            image: self.avatar_url.clone(),
        }
    }

    pub async fn find_by_id(pool: &PgPool, user_id: &str) -> Result<Option<Self>, AppError> {
        let user = sqlx::query_as(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE user_id = $1"
        ))
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
        Ok(user)
    }

    pub async fn find_by_email(pool: &PgPool, email: &str) -> Result<Option<Self>, AppError> {
        let user = sqlx::query_as(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email.to_lowercase())
        .fetch_optional(pool)
        .await?;
        Ok(user)
    }

    pub fn verify_login(&self, password: &str) -> Result<bool, bcrypt::BcryptError> {
        verify_password(password, &self.password_hash)
    }

    pub fn edges(&self) -> SocialEdges {
        SocialEdges {
            user_id: self.user_id.clone(),
            friend_ids: self.friend_ids.clone(),
            blocked_ids: self.blocked_ids.clone(),
        }
    }

    pub async fn update_profile(
        pool: &PgPool,
        user_id: &str,
        req: UpdateProfileRequest,
    ) -> Result<Self, AppError> {
        if let Some(nickname) = &req.nickname {
            if nickname.len() < 2 || nickname.len() > 32 {
                return Err(AppError::Validation(
                    "nickname must be between 2 and 32 characters".to_string(),
                ));
            }
        }
        if let Some(availability) = &req.availability {
            if !AVAILABILITY_VALUES.contains(&availability.as_str()) {
                return Err(AppError::Validation(
                    "availability must be one of: available, busy, away".to_string(),
                ));
            }
        }

        let mut tx = pool.begin().await?;

        let user: User = sqlx::query_as(&format!(
            r#"
            UPDATE users SET
                nickname = COALESCE($2, nickname),
                bio = COALESCE($3, bio),
                avatar_url = COALESCE($4, avatar_url),
                cover_url = COALESCE($5, cover_url),
                native_language = COALESCE($6, native_language),
                learning_language = COALESCE($7, learning_language),
                location = COALESCE($8, location),
                interests = COALESCE($9, interests),
                availability = COALESCE($10, availability),
                status_line = COALESCE($11, status_line)
            WHERE user_id = $1
            RETURNING {USER_COLUMNS}
            "#,
        ))
        .bind(user_id)
        .bind(req.nickname)
        .bind(req.bio)
        .bind(req.avatar_url)
        .bind(req.cover_url)
        .bind(req.native_language)
        .bind(req.learning_language)
        .bind(req.location)
        .bind(req.interests)
        .bind(req.availability)
        .bind(req.status_line)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("user not found".to_string()))?;

        // 昵称/头像在聊天界面展示，资料变动同事务入队同步
        outbox::enqueue(&mut *tx, &user.upsert_op()).await?;
        tx.commit().await?;

        Ok(user)
    }

    pub async fn update_preferences(
        pool: &PgPool,
        user_id: &str,
        preferences: Preferences,
    ) -> Result<Self, AppError> {
        let user = sqlx::query_as(&format!(
            r#"
            UPDATE users SET preferences = $2
            WHERE user_id = $1
            RETURNING {USER_COLUMNS}
            "#,
        ))
        .bind(user_id)
        .bind(Json(preferences))
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("user not found".to_string()))?;

        Ok(user)
    }

    // 边集合的锁行读取，写回前防止并发改写丢更新
    async fn edges_locked(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        user_id: &str,
    ) -> Result<Option<SocialEdges>, AppError> {
        let row: Option<(String, Vec<String>, Vec<String>)> = sqlx::query_as(
            "SELECT user_id, friend_ids, blocked_ids FROM users WHERE user_id = $1 FOR UPDATE",
        )
        .bind(user_id)
        .fetch_optional(&mut **tx)
        .await?;
        Ok(row.map(|(user_id, friend_ids, blocked_ids)| SocialEdges {
            user_id,
            friend_ids,
            blocked_ids,
        }))
    }

    /// 单向拉黑；双向好友关系在同一个事务里拆除。
    /// 边变更由domain计算，这里只负责锁行和写回。
    pub async fn block(pool: &PgPool, user_id: &str, target_id: &str) -> Result<(), AppError> {
        let mut tx = pool.begin().await?;

        // 固定按ID顺序加锁，避免双向拉黑互相等待
        let (mut actor_edges, mut target_edges) = if user_id <= target_id {
            let actor = Self::edges_locked(&mut tx, user_id)
                .await?
                .ok_or_else(|| AppError::NotFound("user not found".to_string()))?;
            let target = Self::edges_locked(&mut tx, target_id)
                .await?
                .ok_or_else(|| AppError::NotFound("target user not found".to_string()))?;
            (actor, target)
        } else {
            let target = Self::edges_locked(&mut tx, target_id)
                .await?
                .ok_or_else(|| AppError::NotFound("target user not found".to_string()))?;
            let actor = Self::edges_locked(&mut tx, user_id)
                .await?
                .ok_or_else(|| AppError::NotFound("user not found".to_string()))?;
            (actor, target)
        };

        friendship::ensure_can_block(&actor_edges, target_id)?;
        friendship::apply_block(&mut actor_edges, &mut target_edges);

        sqlx::query("UPDATE users SET blocked_ids = $2, friend_ids = $3 WHERE user_id = $1")
            .bind(user_id)
            .bind(&actor_edges.blocked_ids)
            .bind(&actor_edges.friend_ids)
            .execute(&mut *tx)
            .await?;

        sqlx::query("UPDATE users SET friend_ids = $2 WHERE user_id = $1")
            .bind(target_id)
            .bind(&target_edges.friend_ids)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    /// 解除拉黑不恢复之前的好友关系
    pub async fn unblock(pool: &PgPool, user_id: &str, target_id: &str) -> Result<(), AppError> {
        let mut tx = pool.begin().await?;

        let mut actor_edges = Self::edges_locked(&mut tx, user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("user not found".to_string()))?;

        friendship::ensure_can_unblock(&actor_edges, target_id)?;
        friendship::apply_unblock(&mut actor_edges, target_id);

        sqlx::query("UPDATE users SET blocked_ids = $2 WHERE user_id = $1")
            .bind(user_id)
            .bind(&actor_edges.blocked_ids)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    pub async fn friends(pool: &PgPool, user_id: &str) -> Result<Vec<UserSummary>, AppError> {
        let friends = sqlx::query_as(&format!(
            r#"
            SELECT {SUMMARY_COLUMNS} FROM users
            WHERE user_id = ANY(SELECT unnest(friend_ids) FROM users WHERE user_id = $1)
            ORDER BY nickname
            "#,
        ))
        .bind(user_id)
        .fetch_all(pool)
        .await?;
        Ok(friends)
    }

    pub async fn summaries(
        pool: &PgPool,
        user_ids: &[String],
    ) -> Result<Vec<UserSummary>, AppError> {
        let users = sqlx::query_as(&format!(
            "SELECT {SUMMARY_COLUMNS} FROM users WHERE user_id = ANY($1)"
        ))
        .bind(user_ids)
        .fetch_all(pool)
        .await?;
        Ok(users)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_user() -> User {
        User {
            user_id: "u1".to_string(),
            email: "mei@example.com".to_string(),
            password_hash: "$2b$irrelevant".to_string(),
            nickname: "Mei".to_string(),
            bio: String::new(),
            avatar_url: Some("https://cdn.example.com/avatar.png".to_string()),
            cover_url: None,
            native_language: "zh".to_string(),
            learning_language: "en".to_string(),
            location: String::new(),
            interests: vec![],
            availability: "available".to_string(),
            status_line: String::new(),
            friend_ids: vec![],
            blocked_ids: vec![],
            preferences: Json(Preferences::default()),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn gateway_projection_carries_nickname_and_avatar() {
        let user = sample_user();
        match user.upsert_op() {
            GatewayOp::UpsertUser {
                user_id,
                name,
                image,
            } => {
                assert_eq!(user_id, "u1");
                assert_eq!(name, "Mei");
                assert_eq!(
                    image,
                    Some("https://cdn.example.com/avatar.png".to_string())
                );
            }
            other => panic!("unexpected op: {:?}", other),
        }
    }
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            user_id: user.user_id.clone(),
            nickname: user.nickname.clone(),
            bio: user.bio.clone(),
            avatar_url: user.avatar_url.clone(),
            native_language: user.native_language.clone(),
            learning_language: user.learning_language.clone(),
            location: user.location.clone(),
            availability: user.availability.clone(),
            status_line: user.status_line.clone(),
        }
    }
}
