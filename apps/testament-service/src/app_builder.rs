//! # Testament Service アプリケーション構築
//!
//! State を受け取り、ルーターとレイヤーを組み立てる。
//! `main.rs` はインフラ初期化とサーバー起動に集中する。

use std::sync::Arc;

use axum::{
    Router,
    middleware::from_fn_with_state,
    routing::{get, post},
};
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use warisin_shared::observability::{MakeRequestUuidV7, make_request_span};

use crate::{
    handler::{
        MessageState,
        SchedulerState,
        handle_capability,
        handle_message_action,
        handle_scheduler_action,
        health_check,
    },
    middleware::{StaticSecretState, require_static_secret},
};

/// ルーターを構築する
///
/// | ルート | 認可 |
/// |--------|------|
/// | `GET /health` | なし |
/// | `POST /api/messages` | `X-Creator-Email`（延長・配信停止はケイパビリティ） |
/// | `GET /api/messages/capability` | ケイパビリティ |
/// | `POST /api/scheduler` | `x-static-secret` |
pub fn build_app(
    message_state: Arc<MessageState>,
    scheduler_state: Arc<SchedulerState>,
    static_secret: StaticSecretState,
) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/messages", post(handle_message_action))
        .route("/api/messages/capability", get(handle_capability))
        .with_state(message_state)
        .merge(
            Router::new()
                .route("/api/scheduler", post(handle_scheduler_action))
                .layer(from_fn_with_state(static_secret, require_static_secret))
                .with_state(scheduler_state),
        )
        // Request ID レイヤー（下に書いたものが外側）
        // 1. SetRequestIdLayer（最外）: UUID v7 を生成（またはクライアント提供値を使用）
        // 2. TraceLayer: スパンに request_id を含め、全ログに自動注入
        // 3. PropagateRequestIdLayer: レスポンスヘッダーに X-Request-Id をコピー
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http().make_span_with(make_request_span))
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuidV7))
}
