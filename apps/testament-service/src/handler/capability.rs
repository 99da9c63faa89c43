//! # ケイパビリティリンクハンドラ
//!
//! メールに埋め込んだリンク（`?action=&id=&secret=`）で延長・配信停止を行う。
//! シークレットを持っていること自体が認可になる。

use std::sync::Arc;

use axum::{
    Json,
    extract::{Query, State},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use warisin_domain::{message::MessageId, secret::Secret};
use warisin_shared::ApiResponse;

use super::{message::MessageState, parse_action};
use crate::error::ServiceError;

/// ケイパビリティで実行できるアクション
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::EnumString, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum CapabilityAction {
    ExtendMessage,
    UnsubscribeMessage,
}

/// `GET /api/messages/capability` のクエリ
#[derive(Debug, Deserialize)]
pub struct CapabilityQuery {
    pub action: String,
    pub id:     String,
    pub secret: String,
}

/// 延長結果 DTO
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtendedDto {
    pub id:               String,
    pub inactive_at:      String,
    pub next_reminder_at: String,
}

/// 配信停止結果 DTO
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsubscribedDto {
    pub id:           String,
    pub unsubscribed: bool,
}

/// ケイパビリティリンクのエントリポイント
#[tracing::instrument(skip_all, fields(action = %query.action))]
pub async fn handle_capability(
    State(state): State<Arc<MessageState>>,
    Query(query): Query<CapabilityQuery>,
) -> Result<Response, ServiceError> {
    let action: CapabilityAction = parse_action(&query.action)?;
    run_capability(&state, action, &query.id, &query.secret).await
}

/// 延長・配信停止を実行する
///
/// `POST /api/messages` の同名アクションからも呼ばれる。
pub(crate) async fn run_capability(
    state: &MessageState,
    action: CapabilityAction,
    id: &str,
    secret: &str,
) -> Result<Response, ServiceError> {
    let id = parse_message_id(id)?;
    let secret = Secret::new(secret)?;

    match action {
        CapabilityAction::ExtendMessage => {
            let message = state.usecase.extend_message(&id, &secret).await?;
            Ok(Json(ApiResponse::new(ExtendedDto {
                id:               message.id().to_string(),
                inactive_at:      message.inactive_at().to_rfc3339(),
                next_reminder_at: message.next_reminder_at().to_rfc3339(),
            }))
            .into_response())
        }
        CapabilityAction::UnsubscribeMessage => {
            state.usecase.unsubscribe_receiver(&id, &secret).await?;
            Ok(Json(ApiResponse::new(UnsubscribedDto {
                id:           id.to_string(),
                unsubscribed: true,
            }))
            .into_response())
        }
    }
}

fn parse_message_id(id: &str) -> Result<MessageId, ServiceError> {
    Uuid::parse_str(id)
        .map(MessageId::from_uuid)
        .map_err(|_| ServiceError::BadRequest(format!("メッセージ ID が不正です: {id}")))
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("insert-message")]
    #[case("select-messages")]
    #[case("")]
    fn test_延長と配信停止以外のアクションは受け付けない(#[case] name: &str) {
        assert!(CapabilityAction::from_str(name).is_err());
    }

    #[test]
    fn test_uuidでないidはbad_request() {
        assert!(matches!(
            parse_message_id("123"),
            Err(ServiceError::BadRequest(_))
        ));
    }
}
