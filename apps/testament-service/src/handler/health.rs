//! # ヘルスチェックハンドラ
//!
//! `/health` は Liveness Check で、常に `"healthy"` を返す。

use axum::Json;
use warisin_shared::HealthResponse;

/// ヘルスチェックエンドポイント
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse::healthy(env!("CARGO_PKG_VERSION")))
}
