//! # スケジューラ API ハンドラ
//!
//! `POST /api/scheduler` の `action` で期限到来の選択と送信を振り分ける。
//! 静的シークレットの検証はミドルウェア（`require_static_secret`）で行う。

use std::sync::Arc;

use axum::{
    Json,
    extract::State,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use warisin_shared::ApiResponse;

use super::{ActionRequest, MessageDto, parse_action};
use crate::{
    error::ServiceError,
    usecase::{DispatchSummary, ItemOutcome, SchedulerUseCaseImpl},
};

/// スケジューラ API の State
pub struct SchedulerState {
    pub usecase: SchedulerUseCaseImpl,
}

/// スケジューラ API のアクション
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::EnumString, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum SchedulerAction {
    SelectMessagesNeedReminding,
    SelectInactiveMessages,
    SendReminderMessages,
    SendTestaments,
}

/// 1 通ごとの結果 DTO
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemOutcomeDto {
    pub message_id: String,
    pub emails:     Vec<String>,
    pub vendor_id:  Option<String>,
    pub status:     String,
    pub error:      Option<String>,
}

impl From<ItemOutcome> for ItemOutcomeDto {
    fn from(outcome: ItemOutcome) -> Self {
        Self {
            message_id: outcome.message_id.to_string(),
            emails:     outcome.emails,
            vendor_id:  outcome.vendor_id,
            status:     outcome.status.to_string(),
            error:      outcome.error,
        }
    }
}

/// 送信集計 DTO
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchSummaryDto {
    pub total:             usize,
    pub sent:              usize,
    pub rejected:          usize,
    pub unavailable:       usize,
    pub skipped:           usize,
    pub write_back_failed: usize,
    pub items:             Vec<ItemOutcomeDto>,
}

impl From<DispatchSummary> for DispatchSummaryDto {
    fn from(summary: DispatchSummary) -> Self {
        Self {
            total:             summary.total,
            sent:              summary.sent,
            rejected:          summary.rejected,
            unavailable:       summary.unavailable,
            skipped:           summary.skipped,
            write_back_failed: summary.write_back_failed,
            items:             summary.items.into_iter().map(ItemOutcomeDto::from).collect(),
        }
    }
}

/// スケジューラ API のエントリポイント
#[tracing::instrument(skip_all, fields(action = %request.action))]
pub async fn handle_scheduler_action(
    State(state): State<Arc<SchedulerState>>,
    Json(request): Json<ActionRequest>,
) -> Result<Response, ServiceError> {
    let action: SchedulerAction = parse_action(&request.action)?;

    match action {
        SchedulerAction::SelectMessagesNeedReminding => {
            let due = state.usecase.select_due_reminders().await?;
            let dtos: Vec<MessageDto> = due.into_iter().map(MessageDto::from).collect();
            Ok(Json(ApiResponse::new(dtos)).into_response())
        }
        SchedulerAction::SelectInactiveMessages => {
            let due = state.usecase.select_due_deliveries().await?;
            let dtos: Vec<MessageDto> = due.into_iter().map(MessageDto::from).collect();
            Ok(Json(ApiResponse::new(dtos)).into_response())
        }
        SchedulerAction::SendReminderMessages => {
            let summary = state.usecase.send_reminders().await?;
            Ok(Json(ApiResponse::new(DispatchSummaryDto::from(summary))).into_response())
        }
        SchedulerAction::SendTestaments => {
            let summary = state.usecase.send_testaments().await?;
            Ok(Json(ApiResponse::new(DispatchSummaryDto::from(summary))).into_response())
        }
    }
}
