use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::domain::friendship::FriendshipError;
use crate::domain::membership::MembershipError;
use crate::routes::common::ApiResponse;
use crate::utils::error_codes;

/// 应用级错误，对应一个错误码和一个HTTP状态
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),
    #[error("authentication failed: {0}")]
    AuthFailed(String),
    #[error("{0}")]
    PermissionDenied(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    InvariantViolation(String),
    #[error("{0}")]
    DuplicateState(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    fn code(&self) -> i32 {
        match self {
            AppError::Validation(_) => error_codes::VALIDATION_ERROR,
            AppError::AuthFailed(_) => error_codes::AUTH_FAILED,
            AppError::PermissionDenied(_) => error_codes::PERMISSION_DENIED,
            AppError::NotFound(_) => error_codes::NOT_FOUND,
            AppError::InvariantViolation(_) => error_codes::INVARIANT_VIOLATION,
            AppError::DuplicateState(_) => error_codes::DUPLICATE_STATE,
            AppError::Database(_) | AppError::Internal(_) => error_codes::INTERNAL_ERROR,
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::AuthFailed(_) => StatusCode::UNAUTHORIZED,
            AppError::PermissionDenied(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvariantViolation(_) => StatusCode::CONFLICT,
            AppError::DuplicateState(_) => StatusCode::CONFLICT,
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // 内部错误不向客户端泄露细节
        let msg = match &self {
            AppError::Database(e) => {
                tracing::error!("database error: {}", e);
                "internal server error".to_string()
            }
            AppError::Internal(e) => {
                tracing::error!("internal error: {}", e);
                "internal server error".to_string()
            }
            other => other.to_string(),
        };

        let body = Json(ApiResponse::<()> {
            code: self.code(),
            msg,
            resp_data: None,
        });

        (self.status(), body).into_response()
    }
}

impl From<MembershipError> for AppError {
    fn from(e: MembershipError) -> Self {
        match e {
            MembershipError::PermissionDenied(msg) => AppError::PermissionDenied(msg.to_string()),
            MembershipError::NotFound => {
                AppError::NotFound("member not found in group".to_string())
            }
            MembershipError::NotMember => {
                AppError::NotFound("user is not a member of this group".to_string())
            }
            MembershipError::InvariantViolation(msg) => {
                AppError::InvariantViolation(msg.to_string())
            }
        }
    }
}

impl From<FriendshipError> for AppError {
    fn from(e: FriendshipError) -> Self {
        match e {
            FriendshipError::SelfReferential => {
                AppError::Validation("operation cannot target yourself".to_string())
            }
            FriendshipError::BlockRelationship => {
                AppError::PermissionDenied("a block exists between these users".to_string())
            }
            FriendshipError::AlreadyFriends => {
                AppError::DuplicateState("users are already friends".to_string())
            }
            FriendshipError::DuplicateRequest => {
                AppError::DuplicateState("a friend request already exists between these users".to_string())
            }
            FriendshipError::AlreadyAccepted => {
                AppError::DuplicateState("friend request already accepted".to_string())
            }
            FriendshipError::NotRecipient => {
                AppError::PermissionDenied("only the recipient may accept this request".to_string())
            }
            FriendshipError::AlreadyBlocked => {
                AppError::DuplicateState("user is already blocked".to_string())
            }
            FriendshipError::NotBlocked => {
                AppError::NotFound("user is not blocked".to_string())
            }
        }
    }
}
