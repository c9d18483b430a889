use axum::Json;
use bcrypt::{DEFAULT_COST, hash, verify};
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::routes::common::ApiResponse;

pub fn hash_password(password: &str) -> Result<String, bcrypt::BcryptError> {
    hash(password.as_bytes(), DEFAULT_COST)
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool, bcrypt::BcryptError> {
    verify(password.as_bytes(), hash)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // 用户ID
    pub exp: i64,    // 过期时间
    pub iat: i64,    // 签发时间
}

pub fn generate_token(
    user_id: &str,
    config: &Config,
) -> Result<(String, i64), jsonwebtoken::errors::Error> {
    let expiration = Utc::now()
        .checked_add_signed(Duration::seconds(config.jwt_expiration().as_secs() as i64))
        .expect("valid timestamp")
        .timestamp();

    let claims = Claims {
        sub: user_id.to_string(),
        exp: expiration,
        iat: Utc::now().timestamp(),
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )?;

    Ok((token, expiration))
}

pub fn verify_token(token: &str, config: &Config) -> Result<Claims, jsonwebtoken::errors::Error> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.jwt_secret.as_bytes()),
        &Validation::default(),
    )?;

    Ok(token_data.claims)
}

pub fn success_to_api_response<T: Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse {
        code: 0,
        msg: "success".into(),
        resp_data: Some(data),
    })
}

pub fn error_to_api_response<T>(code: i32, msg: String) -> Json<ApiResponse<T>> {
    Json(ApiResponse {
        code,
        msg,
        resp_data: None,
    })
}

pub mod error_codes {
    pub const SUCCESS: i32 = 0;
    pub const VALIDATION_ERROR: i32 = 1000;
    pub const USER_EXISTS: i32 = 1001;
    pub const AUTH_FAILED: i32 = 1002;
    pub const PERMISSION_DENIED: i32 = 1003;
    pub const NOT_FOUND: i32 = 1004;
    pub const RATE_LIMIT: i32 = 1005;
    pub const DUPLICATE_STATE: i32 = 1006;
    pub const INVARIANT_VIOLATION: i32 = 1007;
    pub const INTERNAL_ERROR: i32 = 5000;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Config {
        Config {
            database_url: "postgres://localhost/test".into(),
            redis_url: "redis://localhost".into(),
            jwt_secret: "test-secret".into(),
            jwt_expiration_secs: 3600,
            rate_limit_window_secs: 60,
            rate_limit_requests: 100,
            server_host: "127.0.0.1".into(),
            server_port: 3000,
            stream_api_key: "key".into(),
            stream_api_secret: "secret".into(),
            stream_base_url: "https://chat.stream-io-api.com".into(),
            outbox_poll_interval_secs: 5,
        }
    }

    #[test]
    fn token_roundtrip() {
        let config = test_config();
        let (token, exp) = generate_token("u1", &config).unwrap();
        let claims = verify_token(&token, &config).unwrap();
        assert_eq!(claims.sub, "u1");
        assert_eq!(claims.exp, exp);
    }

    #[test]
    fn token_rejects_wrong_secret() {
        let config = test_config();
        let (token, _) = generate_token("u1", &config).unwrap();
        let mut other = test_config();
        other.jwt_secret = "another-secret".into();
        assert!(verify_token(&token, &other).is_err());
    }

    #[test]
    fn password_hash_verify() {
        let hash = hash_password("hunter42").unwrap();
        assert!(verify_password("hunter42", &hash).unwrap());
        assert!(!verify_password("hunter43", &hash).unwrap());
    }
}
