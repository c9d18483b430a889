use chrono::{DateTime, Utc};
use redis::{AsyncCommands, Client as RedisClient};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, types::Json};
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::membership::{GroupMember, JoinDenial, Roster};
use crate::domain::role::{Capability, GroupRole};
use crate::error::AppError;
use crate::gateway::{self, GatewayOp};
use crate::outbox;
use crate::routes::notification::{Notification, NotificationKind};
use crate::routes::user::{User, UserSummary};

pub const LEVEL_VALUES: [&str; 4] = ["beginner", "intermediate", "advanced", "all"];
pub const MIN_MEMBERS: i32 = 2;
pub const MAX_MEMBERS: i32 = 100;

// 群组频道统一用这个类型
const GROUP_CHANNEL_TYPE: &str = "messaging";

// 缓存相关常量
const GROUP_CACHE_EXPIRE: u64 = 600; // 群组缓存过期时间，单位秒
const GROUP_ID_CACHE_PREFIX: &str = "group:id:"; // 群组ID缓存前缀

#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct Group {
    pub group_id: String,
    pub name: String,
    pub description: String,
    pub native_language: String,
    pub learning_language: String,
    pub level: String,
    pub max_members: i32,
    pub is_private: bool,
    pub is_active: bool,
    pub creator_id: String,
    pub channel_id: String,
    pub members: Json<Roster>,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateGroupRequest {
    pub name: String,
    pub description: Option<String>,
    pub native_language: String,
    pub learning_language: String,
    pub level: Option<String>,
    pub max_members: i32,
    pub is_private: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateGroupRequest {
    pub group_id: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub level: Option<String>,
    pub max_members: Option<i32>,
    pub is_private: Option<bool>,
}

/// 对外展示的群组信息，不暴露完整名单
#[derive(Debug, Serialize)]
pub struct GroupInfo {
    pub group_id: String,
    pub name: String,
    pub description: String,
    pub native_language: String,
    pub learning_language: String,
    pub level: String,
    pub member_count: i32,
    pub max_members: i32,
    pub is_private: bool,
    pub creator_id: String,
    pub channel_id: String,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

/// 成员列表条目：名单记录加上用户摘要
#[derive(Debug, Serialize)]
pub struct GroupMemberInfo {
    pub user_id: String,
    pub role: GroupRole,
    pub joined_at: DateTime<Utc>,
    pub nickname: Option<String>,
    pub avatar_url: Option<String>,
}

impl From<Group> for GroupInfo {
    fn from(group: Group) -> Self {
        Self {
            group_id: group.group_id,
            name: group.name,
            description: group.description,
            native_language: group.native_language,
            learning_language: group.learning_language,
            level: group.level,
            member_count: group.members.0.len() as i32,
            max_members: group.max_members,
            is_private: group.is_private,
            creator_id: group.creator_id,
            channel_id: group.channel_id,
            created_at: group.created_at,
            last_activity: group.last_activity,
        }
    }
}

const GROUP_COLUMNS: &str = r#"
    group_id, name, description, native_language, learning_language, level,
    max_members, is_private, is_active, creator_id, channel_id, members,
    created_at, last_activity
"#;

impl Group {
    /// 建群：创建者同时作为admin写入名单（空名单必然通过容量检查），
    /// 外部频道创建走outbox
    pub async fn create(
        pool: &PgPool,
        req: CreateGroupRequest,
        creator_id: &str,
    ) -> Result<Self, AppError> {
        if req.name.len() < 2 || req.name.len() > 64 {
            return Err(AppError::Validation(
                "group name must be between 2 and 64 characters".to_string(),
            ));
        }
        if req.max_members < MIN_MEMBERS || req.max_members > MAX_MEMBERS {
            return Err(AppError::Validation(format!(
                "max_members must be between {} and {}",
                MIN_MEMBERS, MAX_MEMBERS
            )));
        }
        let level = req.level.unwrap_or_else(|| "all".to_string());
        if !LEVEL_VALUES.contains(&level.as_str()) {
            return Err(AppError::Validation(
                "level must be one of: beginner, intermediate, advanced, all".to_string(),
            ));
        }
        if req.native_language.is_empty() || req.learning_language.is_empty() {
            return Err(AppError::Validation(
                "both native_language and learning_language are required".to_string(),
            ));
        }

        let group_id = Uuid::new_v4().to_string();
        let channel_id = gateway::derive_channel_id(&group_id);

        let mut roster = Roster::new();
        roster.add_member(creator_id, GroupRole::Admin, req.max_members);

        let mut tx = pool.begin().await?;

        let group: Group = sqlx::query_as(&format!(
            r#"
            INSERT INTO groups (
                group_id, name, description, native_language, learning_language,
                level, max_members, is_private, creator_id, channel_id, members
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING {GROUP_COLUMNS}
            "#,
        ))
        .bind(&group_id)
        .bind(&req.name)
        .bind(req.description.unwrap_or_default())
        .bind(&req.native_language)
        .bind(&req.learning_language)
        .bind(&level)
        .bind(req.max_members)
        .bind(req.is_private.unwrap_or(false))
        .bind(creator_id)
        .bind(&channel_id)
        .bind(Json(&roster))
        .fetch_one(&mut *tx)
        .await?;

        outbox::enqueue(
            &mut *tx,
            &GatewayOp::CreateChannel {
                channel_type: GROUP_CHANNEL_TYPE.to_string(),
                channel_id,
                members: vec![creator_id.to_string()],
                created_by: creator_id.to_string(),
            },
        )
        .await?;

        tx.commit().await?;
        Ok(group)
    }

    /// 按ID查询，带短TTL缓存。写路径必须走find_by_id_db拿新鲜数据。
    pub async fn find_by_id(
        pool: &PgPool,
        redis: &Arc<RedisClient>,
        group_id: &str,
    ) -> Result<Option<Self>, AppError> {
        let cache_key = format!("{}{}", GROUP_ID_CACHE_PREFIX, group_id);

        if let Ok(mut conn) = redis.get_multiplexed_async_connection().await {
            let cached: redis::RedisResult<String> = conn.get(&cache_key).await;

            if let Ok(json_str) = cached {
                if let Ok(group) = serde_json::from_str::<Group>(&json_str) {
                    tracing::debug!("Get group from cache: {}", cache_key);
                    return Ok(Some(group));
                }
            }
        }

        let group = Self::find_by_id_db(pool, group_id).await?;

        if let Some(ref g) = group {
            if let Ok(mut conn) = redis.get_multiplexed_async_connection().await {
                if let Ok(json_str) = serde_json::to_string(g) {
                    let _: Result<(), redis::RedisError> =
                        conn.set_ex(&cache_key, json_str, GROUP_CACHE_EXPIRE).await;
                    tracing::debug!("Set group to cache: {}", cache_key);
                }
            }
        }

        Ok(group)
    }

    pub async fn find_by_id_db(pool: &PgPool, group_id: &str) -> Result<Option<Self>, AppError> {
        let group = sqlx::query_as(&format!(
            "SELECT {GROUP_COLUMNS} FROM groups WHERE group_id = $1"
        ))
        .bind(group_id)
        .fetch_optional(pool)
        .await?;
        Ok(group)
    }

    // 名单改写前必须在事务里锁行重读，
    // 否则会把并发join追加的成员覆盖掉
    async fn find_by_id_locked(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        group_id: &str,
    ) -> Result<Option<Self>, AppError> {
        let group = sqlx::query_as(&format!(
            "SELECT {GROUP_COLUMNS} FROM groups WHERE group_id = $1 FOR UPDATE"
        ))
        .bind(group_id)
        .fetch_optional(&mut **tx)
        .await?;
        Ok(group)
    }

    // 写路径变更后清除缓存
    async fn invalidate_cache(redis: &Arc<RedisClient>, group_id: &str) {
        if let Ok(mut conn) = redis.get_multiplexed_async_connection().await {
            let cache_key = format!("{}{}", GROUP_ID_CACHE_PREFIX, group_id);
            let _: Result<(), redis::RedisError> = conn.del(&cache_key).await;
        }
    }

    /// 搜索公开且活跃的群组（名称/语言/等级）
    pub async fn search(
        pool: &PgPool,
        name: Option<&str>,
        language: Option<&str>,
        level: Option<&str>,
    ) -> Result<Vec<Self>, AppError> {
        let groups = sqlx::query_as(&format!(
            r#"
            SELECT {GROUP_COLUMNS} FROM groups
            WHERE is_active AND NOT is_private
              AND ($1::text IS NULL OR name ILIKE '%' || $1 || '%')
              AND ($2::text IS NULL OR native_language = $2 OR learning_language = $2)
              AND ($3::text IS NULL OR level = $3)
            ORDER BY last_activity DESC
            LIMIT 50
            "#,
        ))
        .bind(name)
        .bind(language)
        .bind(level)
        .fetch_all(pool)
        .await?;
        Ok(groups)
    }

    /// 当前用户所在的所有活跃群组
    pub async fn find_by_member(pool: &PgPool, user_id: &str) -> Result<Vec<Self>, AppError> {
        let membership_probe = serde_json::json!([{ "user_id": user_id }]);
        let groups = sqlx::query_as(&format!(
            r#"
            SELECT {GROUP_COLUMNS} FROM groups
            WHERE is_active AND members @> $1
            ORDER BY last_activity DESC
            "#,
        ))
        .bind(membership_probe)
        .fetch_all(pool)
        .await?;
        Ok(groups)
    }

    /// 加入群组。容量检查放在UPDATE谓词里原子完成，
    /// 并发加入不会超出maxMembers。
    pub async fn join(
        pool: &PgPool,
        redis: &Arc<RedisClient>,
        group_id: &str,
        user_id: &str,
    ) -> Result<(), AppError> {
        let group = Self::find_by_id_db(pool, group_id)
            .await?
            .filter(|g| g.is_active)
            .ok_or_else(|| AppError::NotFound("group not found".to_string()))?;

        if group.members.0.is_member(user_id) {
            return Err(AppError::DuplicateState(
                "user is already a member of this group".to_string(),
            ));
        }

        let new_member = serde_json::to_value(vec![GroupMember {
            user_id: user_id.to_string(),
            role: GroupRole::Member,
            joined_at: Utc::now(),
        }])
        .map_err(|e| AppError::Internal(format!("failed to encode member: {}", e)))?;
        let membership_probe = serde_json::json!([{ "user_id": user_id }]);

        let mut tx = pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE groups
            SET members = members || $2, last_activity = NOW()
            WHERE group_id = $1 AND is_active
              AND jsonb_array_length(members) < max_members
              AND NOT members @> $3
            "#,
        )
        .bind(group_id)
        .bind(new_member)
        .bind(membership_probe)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            // 谓词落空的几种情况分开报告：群组刚被解散、
            // 并发重复加入抢先命中、或者确实满员
            let fresh = Self::find_by_id_locked(&mut tx, group_id)
                .await?
                .filter(|g| g.is_active)
                .ok_or_else(|| AppError::NotFound("group not found".to_string()))?;
            return Err(
                match fresh.members.0.join_denial(user_id, fresh.max_members) {
                    Some(JoinDenial::AlreadyMember) => AppError::DuplicateState(
                        "user is already a member of this group".to_string(),
                    ),
                    _ => AppError::InvariantViolation("group is at capacity".to_string()),
                },
            );
        }

        Notification::create(
            &mut *tx,
            &group.creator_id,
            Some(user_id),
            NotificationKind::GroupJoined,
            "New group member",
            &format!("A new member joined {}", group.name),
            serde_json::json!({ "group_id": group_id }),
        )
        .await?;

        outbox::enqueue(
            &mut *tx,
            &GatewayOp::AddMembers {
                channel_type: GROUP_CHANNEL_TYPE.to_string(),
                channel_id: group.channel_id.clone(),
                member_ids: vec![user_id.to_string()],
            },
        )
        .await?;

        tx.commit().await?;
        Self::invalidate_cache(redis, group_id).await;
        Ok(())
    }

    pub async fn leave(
        pool: &PgPool,
        redis: &Arc<RedisClient>,
        group_id: &str,
        user_id: &str,
    ) -> Result<(), AppError> {
        let mut tx = pool.begin().await?;

        let group = Self::find_by_id_locked(&mut tx, group_id)
            .await?
            .filter(|g| g.is_active)
            .ok_or_else(|| AppError::NotFound("group not found".to_string()))?;

        let mut roster = group.members.0.clone();
        roster.leave(&group.creator_id, user_id)?;

        Self::persist_roster(&mut tx, group_id, &roster).await?;

        outbox::enqueue(
            &mut *tx,
            &GatewayOp::RemoveMembers {
                channel_type: GROUP_CHANNEL_TYPE.to_string(),
                channel_id: group.channel_id.clone(),
                member_ids: vec![user_id.to_string()],
            },
        )
        .await?;

        tx.commit().await?;
        Self::invalidate_cache(redis, group_id).await;
        Ok(())
    }

    pub async fn set_member_role(
        pool: &PgPool,
        redis: &Arc<RedisClient>,
        group_id: &str,
        actor_id: &str,
        target_id: &str,
        new_role: &str,
    ) -> Result<(), AppError> {
        let new_role = GroupRole::parse(new_role).ok_or_else(|| {
            AppError::Validation("role must be one of: member, moderator, admin".to_string())
        })?;

        let mut tx = pool.begin().await?;

        let group = Self::find_by_id_locked(&mut tx, group_id)
            .await?
            .filter(|g| g.is_active)
            .ok_or_else(|| AppError::NotFound("group not found".to_string()))?;

        let mut roster = group.members.0.clone();
        roster.change_role(&group.creator_id, actor_id, target_id, new_role)?;

        Self::persist_roster(&mut tx, group_id, &roster).await?;

        Notification::create(
            &mut *tx,
            target_id,
            Some(actor_id),
            NotificationKind::GroupRoleChanged,
            "Group role changed",
            &format!("Your role in {} is now {}", group.name, new_role.as_str()),
            serde_json::json!({ "group_id": group_id, "role": new_role.as_str() }),
        )
        .await?;

        tx.commit().await?;
        Self::invalidate_cache(redis, group_id).await;
        Ok(())
    }

    pub async fn remove_member(
        pool: &PgPool,
        redis: &Arc<RedisClient>,
        group_id: &str,
        actor_id: &str,
        target_id: &str,
    ) -> Result<(), AppError> {
        let mut tx = pool.begin().await?;

        let group = Self::find_by_id_locked(&mut tx, group_id)
            .await?
            .filter(|g| g.is_active)
            .ok_or_else(|| AppError::NotFound("group not found".to_string()))?;

        let mut roster = group.members.0.clone();
        roster.remove_member_authorized(&group.creator_id, actor_id, target_id)?;

        Self::persist_roster(&mut tx, group_id, &roster).await?;

        Notification::create(
            &mut *tx,
            target_id,
            Some(actor_id),
            NotificationKind::GroupRemoved,
            "Removed from group",
            &format!("You were removed from {}", group.name),
            serde_json::json!({ "group_id": group_id }),
        )
        .await?;

        outbox::enqueue(
            &mut *tx,
            &GatewayOp::RemoveMembers {
                channel_type: GROUP_CHANNEL_TYPE.to_string(),
                channel_id: group.channel_id.clone(),
                member_ids: vec![target_id.to_string()],
            },
        )
        .await?;

        tx.commit().await?;
        Self::invalidate_cache(redis, group_id).await;
        Ok(())
    }

    pub async fn update(
        pool: &PgPool,
        redis: &Arc<RedisClient>,
        actor_id: &str,
        req: UpdateGroupRequest,
    ) -> Result<Self, AppError> {
        let group = Self::find_by_id_db(pool, &req.group_id)
            .await?
            .filter(|g| g.is_active)
            .ok_or_else(|| AppError::NotFound("group not found".to_string()))?;

        let actor_role = group.members.0.role_of(actor_id).ok_or_else(|| {
            AppError::PermissionDenied("actor is not a member of this group".to_string())
        })?;
        if !actor_role.can(Capability::ManageSettings) {
            return Err(AppError::PermissionDenied(
                "actor may not manage group settings".to_string(),
            ));
        }

        if let Some(name) = &req.name {
            if name.len() < 2 || name.len() > 64 {
                return Err(AppError::Validation(
                    "group name must be between 2 and 64 characters".to_string(),
                ));
            }
        }
        if let Some(level) = &req.level {
            if !LEVEL_VALUES.contains(&level.as_str()) {
                return Err(AppError::Validation(
                    "level must be one of: beginner, intermediate, advanced, all".to_string(),
                ));
            }
        }
        if let Some(max_members) = req.max_members {
            if !(MIN_MEMBERS..=MAX_MEMBERS).contains(&max_members) {
                return Err(AppError::Validation(format!(
                    "max_members must be between {} and {}",
                    MIN_MEMBERS, MAX_MEMBERS
                )));
            }
            // 容量不能低于现有成员数
            if max_members < group.members.0.len() as i32 {
                return Err(AppError::InvariantViolation(
                    "max_members cannot be lower than the current member count".to_string(),
                ));
            }
        }

        let updated: Group = sqlx::query_as(&format!(
            r#"
            UPDATE groups SET
                name = COALESCE($2, name),
                description = COALESCE($3, description),
                level = COALESCE($4, level),
                max_members = COALESCE($5, max_members),
                is_private = COALESCE($6, is_private),
                last_activity = NOW()
            WHERE group_id = $1
            RETURNING {GROUP_COLUMNS}
            "#,
        ))
        .bind(&req.group_id)
        .bind(req.name)
        .bind(req.description)
        .bind(req.level)
        .bind(req.max_members)
        .bind(req.is_private)
        .fetch_one(pool)
        .await?;

        Self::invalidate_cache(redis, &req.group_id).await;
        Ok(updated)
    }

    /// 软删除：名单和历史保留，群组从常规查询中消失
    pub async fn deactivate(
        pool: &PgPool,
        redis: &Arc<RedisClient>,
        group_id: &str,
        actor_id: &str,
    ) -> Result<(), AppError> {
        let group = Self::find_by_id_db(pool, group_id)
            .await?
            .filter(|g| g.is_active)
            .ok_or_else(|| AppError::NotFound("group not found".to_string()))?;

        if actor_id != group.creator_id {
            return Err(AppError::PermissionDenied(
                "only the creator may deactivate the group".to_string(),
            ));
        }

        sqlx::query("UPDATE groups SET is_active = FALSE, last_activity = NOW() WHERE group_id = $1")
            .bind(group_id)
            .execute(pool)
            .await?;

        Self::invalidate_cache(redis, group_id).await;
        Ok(())
    }

    pub async fn members(
        pool: &PgPool,
        redis: &Arc<RedisClient>,
        group_id: &str,
    ) -> Result<Vec<GroupMemberInfo>, AppError> {
        let group = Self::find_by_id(pool, redis, group_id)
            .await?
            .filter(|g| g.is_active)
            .ok_or_else(|| AppError::NotFound("group not found".to_string()))?;

        let ids: Vec<String> = group
            .members
            .0
            .iter()
            .map(|m| m.user_id.clone())
            .collect();
        let summaries = User::summaries(pool, &ids).await?;

        let infos = group
            .members
            .0
            .iter()
            .map(|m| {
                let user = summaries.iter().find(|u| u.user_id == m.user_id);
                GroupMemberInfo {
                    user_id: m.user_id.clone(),
                    role: m.role,
                    joined_at: m.joined_at,
                    nickname: user.map(|u| u.nickname.clone()),
                    avatar_url: user.and_then(|u: &UserSummary| u.avatar_url.clone()),
                }
            })
            .collect();

        Ok(infos)
    }

    async fn persist_roster(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        group_id: &str,
        roster: &Roster,
    ) -> Result<(), AppError> {
        sqlx::query("UPDATE groups SET members = $2, last_activity = NOW() WHERE group_id = $1")
            .bind(group_id)
            .bind(Json(roster))
            .execute(&mut **tx)
            .await?;
        Ok(())
    }
}
