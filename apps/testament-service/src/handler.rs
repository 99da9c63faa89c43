//! # HTTP リクエストハンドラ
//!
//! axum のルートに対応するハンドラ関数を定義する。
//!
//! ## 設計方針
//!
//! - 各ハンドラはサブモジュールに配置
//! - 親モジュール（この `handler.rs`）で re-export し、フラットな API を提供
//! - ハンドラは薄く保ち、ビジネスロジックはユースケースに委譲
//! - メッセージ API とスケジューラ API は `{"action": ..., "data": ...}` で操作を振り分ける

pub mod capability;
pub mod health;
pub mod message;
pub mod scheduler;

pub use capability::{CapabilityQuery, handle_capability};
pub use health::health_check;
pub use message::{MessageDto, MessageState, handle_message_action};
pub use scheduler::{SchedulerState, handle_scheduler_action};
use serde::{Deserialize, de::DeserializeOwned};

use crate::error::ServiceError;

/// アクションで振り分けるリクエスト
#[derive(Debug, Deserialize)]
pub struct ActionRequest {
    pub action: String,
    #[serde(default)]
    pub data:   serde_json::Value,
}

/// アクション名を列挙型に変換する
///
/// 未知のアクションは `NotFound`。
fn parse_action<A: std::str::FromStr>(action: &str) -> Result<A, ServiceError> {
    action
        .parse()
        .map_err(|_| ServiceError::NotFound(format!("不明なアクションです: {action}")))
}

/// `data` を操作ごとのペイロードに変換する
fn parse_data<T: DeserializeOwned>(data: serde_json::Value) -> Result<T, ServiceError> {
    serde_json::from_value(data)
        .map_err(|e| ServiceError::BadRequest(format!("data が不正です: {e}")))
}
