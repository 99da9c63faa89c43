//! # 静的シークレット検証ミドルウェア
//!
//! スケジューラ API は外部のトリガーからだけ呼ばれる。
//! `x-static-secret` ヘッダーを設定値と定数時間で比較する。
//!
//! ```rust,ignore
//! use axum::middleware::from_fn_with_state;
//!
//! Router::new()
//!     .route("/api/scheduler", post(handle_scheduler_action))
//!     .layer(from_fn_with_state(StaticSecretState::new(secret), require_static_secret))
//! ```

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use subtle::ConstantTimeEq;

use crate::error::ServiceError;

/// 静的シークレットを運ぶヘッダー
pub const STATIC_SECRET_HEADER: &str = "x-static-secret";

/// 静的シークレット検証の状態
#[derive(Clone)]
pub struct StaticSecretState {
    secret: Arc<str>,
}

impl StaticSecretState {
    pub fn new(secret: impl Into<Arc<str>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }
}

/// 静的シークレット検証ミドルウェア
///
/// ヘッダーがない、または一致しない場合は 403 Forbidden を返す。
pub async fn require_static_secret(
    State(state): State<StaticSecretState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let matches = request
        .headers()
        .get(STATIC_SECRET_HEADER)
        .is_some_and(|presented| bool::from(presented.as_bytes().ct_eq(state.secret.as_bytes())));

    if !matches {
        tracing::warn!("静的シークレットが一致しないリクエストを拒否");
        return ServiceError::Forbidden("静的シークレットが一致しません".to_string())
            .into_response();
    }

    next.run(request).await
}
