//! # スケジューラユースケース
//!
//! 外部のトリガー（cron など）から呼ばれ、期限到来のメッセージを選んで
//! リマインダー・遺言を送信し、結果をタイマーと評判台帳に書き戻す。
//!
//! ## 処理の流れ
//!
//! ```text
//! 選択（1 トランザクション）
//!   → メール組み立て
//!   → MailDispatcher で送信（トランザクション外）
//!   → 書き戻し（1 トランザクション、メッセージごとにセーブポイント）
//! ```
//!
//! 1 通ごとの失敗はその通の結果として記録し、次回の実行で再送される。
//! すべての通がベンダー全体の失敗に終わった場合だけ `DeliveryUnavailable` を返す。

mod reminder;
mod select_due;
mod testament;
mod write_back;

use std::sync::Arc;

use warisin_domain::{
    clock::Clock,
    mail::{MailItem, SendResult},
    message::MessageId,
    policy::DeliveryPolicy,
};
use warisin_infra::{ContentCipher, MailDispatcher};

use crate::{
    error::ServiceError,
    usecase::{MailComposer, Repositories},
};

/// 1 通ごとの最終状態
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum ItemStatus {
    /// 送信に成功し、書き戻しも完了した
    Sent,
    /// ベンダーに拒否された（送信先は非アクティブ化済み）
    Rejected,
    /// ベンダー全体の失敗で送信できなかった
    Unavailable,
    /// 本文の復号かメールの組み立てに失敗し、送信しなかった
    Skipped,
    /// 送信結果の書き戻しに失敗した
    WriteBackFailed,
}

/// 1 通ごとの結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemOutcome {
    pub message_id: MessageId,
    pub emails:     Vec<String>,
    pub vendor_id:  Option<String>,
    pub status:     ItemStatus,
    pub error:      Option<String>,
}

impl ItemOutcome {
    fn from_result(message_id: MessageId, result: SendResult) -> Self {
        let status = if result.is_success() {
            ItemStatus::Sent
        } else if result.is_rejected() {
            ItemStatus::Rejected
        } else {
            ItemStatus::Unavailable
        };
        Self {
            message_id,
            emails: result.emails,
            vendor_id: Some(result.vendor_id),
            status,
            error: result.error.map(|failure| failure.message),
        }
    }

    fn skipped(message_id: MessageId, emails: Vec<String>, reason: String) -> Self {
        Self {
            message_id,
            emails,
            vendor_id: None,
            status: ItemStatus::Skipped,
            error: Some(reason),
        }
    }
}

/// 送信の集計
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    pub total:             usize,
    pub sent:              usize,
    pub rejected:          usize,
    pub unavailable:       usize,
    pub skipped:           usize,
    pub write_back_failed: usize,
    pub items:             Vec<ItemOutcome>,
}

impl DispatchSummary {
    fn from_outcomes(items: Vec<ItemOutcome>) -> Self {
        let count = |status: ItemStatus| items.iter().filter(|i| i.status == status).count();
        Self {
            total: items.len(),
            sent: count(ItemStatus::Sent),
            rejected: count(ItemStatus::Rejected),
            unavailable: count(ItemStatus::Unavailable),
            skipped: count(ItemStatus::Skipped),
            write_back_failed: count(ItemStatus::WriteBackFailed),
            items,
        }
    }

    /// ビジネスイベントの結果フィールド
    fn event_result(&self) -> &'static str {
        use warisin_shared::event_log::event::result;

        if self.sent == self.total {
            result::SUCCESS
        } else if self.sent == 0 {
            result::FAILURE
        } else {
            result::PARTIAL
        }
    }
}

/// 送信するメールの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MailKind {
    Reminder,
    Testament,
}

/// メール組み立ての失敗をログの `error.kind` に対応づける
///
/// 組み立て中のインフラ操作は本文の復号だけ。
fn compose_error_kind(error: &ServiceError) -> &'static str {
    use warisin_shared::event_log::error::kind;

    match error {
        ServiceError::Database(_) => kind::ENCRYPTION,
        _ => kind::INTERNAL,
    }
}

/// 送信待ちの 1 通
struct PendingMail {
    message_id: MessageId,
    item:       MailItem,
}

/// スケジューラユースケース
pub struct SchedulerUseCaseImpl {
    repos:           Repositories,
    cipher:          Arc<dyn ContentCipher>,
    dispatcher:      Arc<MailDispatcher>,
    composer:        Arc<MailComposer>,
    clock:           Arc<dyn Clock>,
    delivery_policy: DeliveryPolicy,
}

impl SchedulerUseCaseImpl {
    pub fn new(
        repos: Repositories,
        cipher: Arc<dyn ContentCipher>,
        dispatcher: Arc<MailDispatcher>,
        composer: Arc<MailComposer>,
        clock: Arc<dyn Clock>,
        delivery_policy: DeliveryPolicy,
    ) -> Self {
        Self {
            repos,
            cipher,
            dispatcher,
            composer,
            clock,
            delivery_policy,
        }
    }

    /// 送信して結果を書き戻す
    ///
    /// `skipped` は送信せずに失敗として記録する通。
    async fn dispatch_and_write_back(
        &self,
        kind: MailKind,
        pending: Vec<PendingMail>,
        skipped: Vec<ItemOutcome>,
    ) -> Result<DispatchSummary, ServiceError> {
        if pending.is_empty() {
            return Ok(DispatchSummary::from_outcomes(skipped));
        }
        if !self.dispatcher.has_available_vendor() {
            return Err(ServiceError::DeliveryUnavailable(
                "認証情報を持つメールベンダーがありません".to_string(),
            ));
        }

        let items: Vec<MailItem> = pending.iter().map(|p| p.item.clone()).collect();
        let results = self.dispatcher.dispatch(&items).await;
        if results.iter().all(SendResult::is_vendor_unavailable) {
            return Err(ServiceError::DeliveryUnavailable(format!(
                "{} 件すべてがベンダー全体の失敗で送信できませんでした",
                results.len()
            )));
        }

        let outcomes: Vec<ItemOutcome> = pending
            .into_iter()
            .zip(results)
            .map(|(p, result)| ItemOutcome::from_result(p.message_id, result))
            .collect();
        let mut outcomes = self.write_back(kind, outcomes).await?;
        outcomes.extend(skipped);

        Ok(DispatchSummary::from_outcomes(outcomes))
    }
}
