//! # Testament Service エラー定義
//!
//! Testament Service 固有のエラーと、HTTP レスポンスへの変換を定義する。
//!
//! レスポンスボディは [`ErrorResponse`]（RFC 9457 Problem Details）。
//! 500 系は内部情報を返さず、ログにだけ詳細を残す。

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use warisin_domain::DomainError;
use warisin_infra::{InfraError, InfraErrorKind};
use warisin_shared::{
    ErrorResponse,
    event_log::error::{category, kind},
};

/// Testament Service で発生するエラー
#[derive(Debug, Error)]
pub enum ServiceError {
    /// 不正なリクエスト（入力値・ポリシーの検証失敗）
    #[error("不正なリクエスト: {0}")]
    BadRequest(String),

    /// 権限不足（作成者の不一致、古いシークレット）
    #[error("権限がありません: {0}")]
    Forbidden(String),

    /// リソースまたはアクションが見つからない
    #[error("リソースが見つかりません: {0}")]
    NotFound(String),

    /// すべての送信がベンダー全体の失敗に終わった
    #[error("メールを送信できません: {0}")]
    DeliveryUnavailable(String),

    /// データベース・暗号化エラー
    #[error("データベースエラー: {0}")]
    Database(#[from] InfraError),

    /// 内部エラー
    #[error("内部エラー: {0}")]
    Internal(String),
}

impl From<DomainError> for ServiceError {
    fn from(error: DomainError) -> Self {
        match error {
            DomainError::Validation(msg) => Self::BadRequest(msg),
            DomainError::Forbidden(msg) => Self::Forbidden(msg),
            e @ DomainError::NotFound { .. } => Self::NotFound(e.to_string()),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let body = match &self {
            ServiceError::BadRequest(msg) => ErrorResponse::validation_error(msg.clone()),
            ServiceError::Forbidden(msg) => ErrorResponse::forbidden(msg.clone()),
            ServiceError::NotFound(msg) => ErrorResponse::not_found(msg.clone()),
            ServiceError::DeliveryUnavailable(msg) => {
                tracing::warn!(
                    error.category = category::EXTERNAL_SERVICE,
                    error.kind = kind::MAIL_VENDOR,
                    "メールを送信できません: {}",
                    msg
                );
                ErrorResponse::delivery_unavailable(msg.clone())
            }
            ServiceError::Database(e) => {
                let error_kind = match e.kind() {
                    InfraErrorKind::Encryption(_) => kind::ENCRYPTION,
                    _ => kind::DATABASE,
                };
                tracing::error!(
                    error.category = category::INFRASTRUCTURE,
                    error.kind = error_kind,
                    span_trace = %e.span_trace(),
                    "インフラエラー: {}",
                    e
                );
                ErrorResponse::internal_error()
            }
            ServiceError::Internal(msg) => {
                tracing::error!(
                    error.category = category::INFRASTRUCTURE,
                    error.kind = kind::INTERNAL,
                    "内部エラー: {}",
                    msg
                );
                ErrorResponse::internal_error()
            }
        };

        let status =
            StatusCode::from_u16(body.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(body)).into_response()
    }
}
