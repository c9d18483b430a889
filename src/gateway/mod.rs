use std::collections::HashMap;

use chrono::Utc;
use jsonwebtoken::{EncodingKey, Header, encode};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::config::Config;

/// 外部聊天/通话服务(Stream)的适配层。除 issue_token 是本地签名外，
/// 其余都是对服务端REST接口的透传调用。
pub struct StreamGateway {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    api_secret: String,
    token_expiration_secs: u64,
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("gateway http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("gateway token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
}

#[derive(Debug, Serialize, Deserialize)]
struct StreamClaims {
    user_id: String,
    iat: i64,
    exp: i64,
}

/// 需要同步到外部网关的操作，经由 outbox 异步执行
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum GatewayOp {
    UpsertUser {
        user_id: String,
        name: String,
        image: Option<String>,
    },
    CreateChannel {
        channel_type: String,
        channel_id: String,
        members: Vec<String>,
        created_by: String,
    },
    AddMembers {
        channel_type: String,
        channel_id: String,
        member_ids: Vec<String>,
    },
    RemoveMembers {
        channel_type: String,
        channel_id: String,
        member_ids: Vec<String>,
    },
}

impl GatewayOp {
    pub fn name(&self) -> &'static str {
        match self {
            GatewayOp::UpsertUser { .. } => "upsert_user",
            GatewayOp::CreateChannel { .. } => "create_channel",
            GatewayOp::AddMembers { .. } => "add_members",
            GatewayOp::RemoveMembers { .. } => "remove_members",
        }
    }
}

/// 群组的消息频道ID由群组ID派生，稳定且不泄露内部ID
pub fn derive_channel_id(group_id: &str) -> String {
    let digest = format!("{:x}", Sha256::digest(group_id.as_bytes()));
    digest[..32].to_string()
}

impl StreamGateway {
    pub fn new(config: &Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.stream_base_url.trim_end_matches('/').to_string(),
            api_key: config.stream_api_key.clone(),
            api_secret: config.stream_api_secret.clone(),
            token_expiration_secs: config.jwt_expiration_secs,
        }
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// 给前端SDK用的用户token，本地用服务密钥签名，不走网络
    pub fn issue_token(&self, user_id: &str) -> Result<String, GatewayError> {
        let now = Utc::now().timestamp();
        let claims = StreamClaims {
            user_id: user_id.to_string(),
            iat: now,
            exp: now + self.token_expiration_secs as i64,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.api_secret.as_bytes()),
        )?;
        Ok(token)
    }

    // 服务端到服务端调用所用的凭证
    fn server_token(&self) -> Result<String, GatewayError> {
        self.issue_token("*server*")
    }

    pub async fn dispatch(&self, op: &GatewayOp) -> Result<(), GatewayError> {
        match op {
            GatewayOp::UpsertUser {
                user_id,
                name,
                image,
            } => self.upsert_user(user_id, name, image.as_deref()).await,
            GatewayOp::CreateChannel {
                channel_type,
                channel_id,
                members,
                created_by,
            } => {
                self.create_channel(channel_type, channel_id, members, created_by)
                    .await
            }
            GatewayOp::AddMembers {
                channel_type,
                channel_id,
                member_ids,
            } => self.add_members(channel_type, channel_id, member_ids).await,
            GatewayOp::RemoveMembers {
                channel_type,
                channel_id,
                member_ids,
            } => {
                self.remove_members(channel_type, channel_id, member_ids)
                    .await
            }
        }
    }

    pub async fn upsert_user(
        &self,
        user_id: &str,
        name: &str,
        image: Option<&str>,
    ) -> Result<(), GatewayError> {
        let mut user = serde_json::json!({ "id": user_id, "name": name });
        if let Some(image) = image {
            user["image"] = serde_json::Value::String(image.to_string());
        }
        let mut users = HashMap::new();
        users.insert(user_id.to_string(), user);

        self.post(
            &format!("{}/users", self.base_url),
            &serde_json::json!({ "users": users }),
        )
        .await
    }

    pub async fn create_channel(
        &self,
        channel_type: &str,
        channel_id: &str,
        members: &[String],
        created_by: &str,
    ) -> Result<(), GatewayError> {
        self.post(
            &format!("{}/channels/{}/{}", self.base_url, channel_type, channel_id),
            &serde_json::json!({
                "data": { "members": members, "created_by_id": created_by }
            }),
        )
        .await
    }

    pub async fn add_members(
        &self,
        channel_type: &str,
        channel_id: &str,
        member_ids: &[String],
    ) -> Result<(), GatewayError> {
        self.post(
            &format!("{}/channels/{}/{}", self.base_url, channel_type, channel_id),
            &serde_json::json!({ "add_members": member_ids }),
        )
        .await
    }

    pub async fn remove_members(
        &self,
        channel_type: &str,
        channel_id: &str,
        member_ids: &[String],
    ) -> Result<(), GatewayError> {
        self.post(
            &format!("{}/channels/{}/{}", self.base_url, channel_type, channel_id),
            &serde_json::json!({ "remove_members": member_ids }),
        )
        .await
    }

    async fn post(&self, url: &str, body: &serde_json::Value) -> Result<(), GatewayError> {
        let token = self.server_token()?;
        self.http
            .post(url)
            .query(&[("api_key", self.api_key.as_str())])
            .header("Authorization", token)
            .header("stream-auth-type", "jwt")
            .json(body)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{DecodingKey, Validation, decode};

    fn test_gateway() -> StreamGateway {
        StreamGateway {
            http: reqwest::Client::new(),
            base_url: "https://chat.stream-io-api.com".into(),
            api_key: "key".into(),
            api_secret: "secret".into(),
            token_expiration_secs: 3600,
        }
    }

    #[test]
    fn issued_token_carries_user_id() {
        let gateway = test_gateway();
        let token = gateway.issue_token("u1").unwrap();
        let data = decode::<StreamClaims>(
            &token,
            &DecodingKey::from_secret(b"secret"),
            &Validation::default(),
        )
        .unwrap();
        assert_eq!(data.claims.user_id, "u1");
    }

    #[test]
    fn channel_id_is_stable_and_opaque() {
        let a = derive_channel_id("group-1");
        let b = derive_channel_id("group-1");
        let c = derive_channel_id("group-2");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 32);
        assert!(!a.contains("group"));
    }

    #[test]
    fn gateway_op_serializes_with_tag() {
        let op = GatewayOp::AddMembers {
            channel_type: "messaging".into(),
            channel_id: "abc".into(),
            member_ids: vec!["u1".into()],
        };
        let value = serde_json::to_value(&op).unwrap();
        assert_eq!(value["op"], "add_members");
        let back: GatewayOp = serde_json::from_value(value).unwrap();
        assert_eq!(back, op);
    }
}
