//! # メッセージ API ハンドラ
//!
//! `POST /api/messages` の `action` で作成者向けの操作を振り分ける。
//!
//! 作成者の識別は上流のゲートウェイが JWT を検証したうえで付与する
//! `X-Creator-Email` ヘッダーで行う。延長・配信停止はヘッダーではなく
//! ケイパビリティトークン（`data.id` と `data.secret`）で認可する。

use std::sync::Arc;

use axum::{
    Json,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use warisin_domain::{
    email::{EmailAddress, parse_address_list},
    message::{
        Deadlines,
        InactivePeriodDays,
        Message,
        MessageContent,
        MessageId,
        MessageWithReceivers,
        ReminderIntervalDays,
    },
};
use warisin_shared::ApiResponse;

use super::{
    ActionRequest,
    capability::{CapabilityAction, run_capability},
    parse_action,
    parse_data,
};
use crate::{
    error::ServiceError,
    usecase::{CreateMessageInput, MessageUseCaseImpl, MessageView, UpdateMessageInput},
};

/// 作成者を示すヘッダー
pub const CREATOR_HEADER: &str = "x-creator-email";

/// メッセージ API の State
pub struct MessageState {
    pub usecase: MessageUseCaseImpl,
}

/// メッセージ API のアクション
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::EnumString, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum MessageAction {
    InsertMessage,
    SelectMessages,
    UpdateMessage,
    DeleteMessage,
    ExtendMessage,
    UnsubscribeMessage,
}

/// メッセージ作成のペイロード
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertMessageData {
    pub email_receivers:        Vec<String>,
    #[serde(default)]
    pub message_content:        String,
    pub inactive_period_days:   i32,
    pub reminder_interval_days: i32,
    /// 指定する場合は `next_reminder_at` と両方
    pub inactive_at:            Option<DateTime<Utc>>,
    pub next_reminder_at:       Option<DateTime<Utc>>,
}

impl InsertMessageData {
    fn into_input(self, creator: EmailAddress) -> Result<CreateMessageInput, ServiceError> {
        let deadlines = match (self.inactive_at, self.next_reminder_at) {
            (Some(inactive_at), Some(next_reminder_at)) => Some(Deadlines {
                inactive_at,
                next_reminder_at,
            }),
            (None, None) => None,
            _ => {
                return Err(ServiceError::BadRequest(
                    "inactiveAt と nextReminderAt は両方指定してください".to_string(),
                ));
            }
        };

        Ok(CreateMessageInput {
            creator,
            content: MessageContent::new(self.message_content)?,
            receivers: parse_address_list(self.email_receivers)?,
            inactive_period_days: InactivePeriodDays::new(self.inactive_period_days)?,
            reminder_interval_days: ReminderIntervalDays::new(self.reminder_interval_days)?,
            deadlines,
        })
    }
}

/// メッセージ更新のペイロード
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMessageData {
    pub id:                     Uuid,
    pub email_receivers:        Vec<String>,
    #[serde(default)]
    pub message_content:        String,
    pub inactive_period_days:   i32,
    pub reminder_interval_days: i32,
    pub is_active:              bool,
}

impl UpdateMessageData {
    fn into_input(self, creator: EmailAddress) -> Result<UpdateMessageInput, ServiceError> {
        Ok(UpdateMessageInput {
            id: MessageId::from_uuid(self.id),
            creator,
            content: MessageContent::new(self.message_content)?,
            receivers: parse_address_list(self.email_receivers)?,
            inactive_period_days: InactivePeriodDays::new(self.inactive_period_days)?,
            reminder_interval_days: ReminderIntervalDays::new(self.reminder_interval_days)?,
            is_active: self.is_active,
        })
    }
}

/// ID だけのペイロード
#[derive(Debug, Deserialize)]
pub struct MessageIdData {
    pub id: Uuid,
}

/// ケイパビリティトークンのペイロード
#[derive(Debug, Deserialize)]
pub struct CapabilityData {
    pub id:     String,
    pub secret: String,
}

/// メッセージ DTO
///
/// シークレットは含めない。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDto {
    pub id:                     String,
    pub created_at:             String,
    pub email_creator:          String,
    pub email_receivers:        Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_content:        Option<String>,
    pub inactive_period_days:   i32,
    pub reminder_interval_days: i32,
    pub is_active:              bool,
    pub inactive_at:            String,
    pub next_reminder_at:       String,
    pub sent_counter:           i32,
}

impl MessageDto {
    fn new(message: &Message, email_receivers: Vec<String>, content: Option<String>) -> Self {
        Self {
            id: message.id().to_string(),
            created_at: message.created_at().to_rfc3339(),
            email_creator: message.email_creator().to_string(),
            email_receivers,
            message_content: content,
            inactive_period_days: message.inactive_period_days().value(),
            reminder_interval_days: message.reminder_interval_days().value(),
            is_active: message.is_active(),
            inactive_at: message.inactive_at().to_rfc3339(),
            next_reminder_at: message.next_reminder_at().to_rfc3339(),
            sent_counter: message.sent_counter(),
        }
    }
}

impl From<MessageView> for MessageDto {
    fn from(view: MessageView) -> Self {
        let receivers = view.receivers.into_iter().map(String::from).collect();
        Self::new(&view.message, receivers, Some(view.content))
    }
}

/// スケジューラの選択結果用（本文は含めない）
impl From<MessageWithReceivers> for MessageDto {
    fn from(entry: MessageWithReceivers) -> Self {
        let receivers = entry
            .receivers
            .iter()
            .map(|r| r.email_receiver().to_string())
            .collect();
        Self::new(&entry.message, receivers, None)
    }
}

/// 削除結果 DTO
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletedDto {
    pub id:      String,
    pub deleted: bool,
}

/// メッセージ API のエントリポイント
#[tracing::instrument(skip_all, fields(action = %request.action))]
pub async fn handle_message_action(
    State(state): State<Arc<MessageState>>,
    headers: HeaderMap,
    Json(request): Json<ActionRequest>,
) -> Result<Response, ServiceError> {
    let action: MessageAction = parse_action(&request.action)?;

    match action {
        MessageAction::InsertMessage => {
            let creator = creator_from(&headers)?;
            let data: InsertMessageData = parse_data(request.data)?;
            let view = state
                .usecase
                .create_message(data.into_input(creator)?)
                .await?;
            Ok((
                StatusCode::CREATED,
                Json(ApiResponse::new(MessageDto::from(view))),
            )
                .into_response())
        }
        MessageAction::SelectMessages => {
            let creator = creator_from(&headers)?;
            let views = state.usecase.list_messages(&creator).await?;
            let dtos: Vec<MessageDto> = views.into_iter().map(MessageDto::from).collect();
            Ok(Json(ApiResponse::new(dtos)).into_response())
        }
        MessageAction::UpdateMessage => {
            let creator = creator_from(&headers)?;
            let data: UpdateMessageData = parse_data(request.data)?;
            let view = state
                .usecase
                .update_message(data.into_input(creator)?)
                .await?;
            Ok(Json(ApiResponse::new(MessageDto::from(view))).into_response())
        }
        MessageAction::DeleteMessage => {
            let creator = creator_from(&headers)?;
            let data: MessageIdData = parse_data(request.data)?;
            let id = MessageId::from_uuid(data.id);
            state.usecase.delete_message(&id, &creator).await?;
            Ok(Json(ApiResponse::new(DeletedDto {
                id:      id.to_string(),
                deleted: true,
            }))
            .into_response())
        }
        MessageAction::ExtendMessage => {
            let data: CapabilityData = parse_data(request.data)?;
            run_capability(&state, CapabilityAction::ExtendMessage, &data.id, &data.secret).await
        }
        MessageAction::UnsubscribeMessage => {
            let data: CapabilityData = parse_data(request.data)?;
            run_capability(
                &state,
                CapabilityAction::UnsubscribeMessage,
                &data.id,
                &data.secret,
            )
            .await
        }
    }
}

/// `X-Creator-Email` ヘッダーから作成者を取得する
///
/// ヘッダーがなければ `Forbidden`、アドレスとして不正なら `BadRequest`。
fn creator_from(headers: &HeaderMap) -> Result<EmailAddress, ServiceError> {
    let value = headers
        .get(CREATOR_HEADER)
        .ok_or_else(|| ServiceError::Forbidden("作成者を特定できません".to_string()))?;
    let value = value.to_str().map_err(|_| {
        ServiceError::BadRequest("作成者ヘッダーが不正です".to_string())
    })?;
    Ok(EmailAddress::new(value)?)
}
