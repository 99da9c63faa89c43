//! 送信結果の書き戻し
//!
//! メッセージごとにセーブポイントを張り、1 件の失敗が他のメッセージの
//! 書き戻しを巻き込まないようにする。

use chrono::{DateTime, Utc};
use warisin_domain::{email::EmailAddress, message::MessageId};
use warisin_infra::TxContext;
use warisin_shared::{
    event_log::{
        error::{category, kind},
        event,
    },
    log_business_event,
};

use super::{ItemOutcome, ItemStatus, MailKind, SchedulerUseCaseImpl};
use crate::{error::ServiceError, usecase::commit};

const WRITE_BACK_SAVEPOINT: &str = "message_write_back";

impl SchedulerUseCaseImpl {
    /// 送信結果をタイマーと評判台帳に書き戻す
    ///
    /// - 成功した通が 1 つでもあるメッセージ: タイマーを進める
    /// - 拒否された通: 送信先を台帳で非アクティブにする
    ///
    /// 書き戻しに失敗したメッセージの通は `WriteBackFailed` になる。
    pub(super) async fn write_back(
        &self,
        mail_kind: MailKind,
        mut outcomes: Vec<ItemOutcome>,
    ) -> Result<Vec<ItemOutcome>, ServiceError> {
        let now = self.clock.now();
        let mut tx = self.repos.begin().await?;

        for (message_id, indices) in group_by_message(&outcomes) {
            let any_sent = indices
                .iter()
                .any(|&i| outcomes[i].status == ItemStatus::Sent);
            let rejected: Vec<String> = indices
                .iter()
                .filter(|&&i| outcomes[i].status == ItemStatus::Rejected)
                .flat_map(|&i| outcomes[i].emails.clone())
                .collect();

            tx.savepoint(WRITE_BACK_SAVEPOINT).await?;
            let applied = self
                .apply(&mut tx, mail_kind, &message_id, any_sent, &rejected, now)
                .await;
            match applied {
                Ok(()) => tx.release_savepoint(WRITE_BACK_SAVEPOINT).await?,
                Err(e) => {
                    tracing::error!(
                        error.category = category::INFRASTRUCTURE,
                        error.kind = kind::WRITE_BACK,
                        message_id = %message_id,
                        "送信結果の書き戻しに失敗: {}",
                        e
                    );
                    tx.rollback_to_savepoint(WRITE_BACK_SAVEPOINT).await?;
                    tx.release_savepoint(WRITE_BACK_SAVEPOINT).await?;
                    for &i in &indices {
                        outcomes[i].status = ItemStatus::WriteBackFailed;
                        outcomes[i].error = Some(e.to_string());
                    }
                }
            }
        }

        commit(tx).await?;
        Ok(outcomes)
    }

    async fn apply(
        &self,
        tx: &mut TxContext,
        mail_kind: MailKind,
        message_id: &MessageId,
        any_sent: bool,
        rejected: &[String],
        now: DateTime<Utc>,
    ) -> Result<(), ServiceError> {
        if any_sent {
            match mail_kind {
                MailKind::Reminder => {
                    self.repos.messages.advance_reminder(tx, message_id).await?;
                }
                MailKind::Testament => {
                    self.repos
                        .messages
                        .record_delivery(
                            tx,
                            message_id,
                            self.delivery_policy.deactivate_on_delivery,
                        )
                        .await?;
                }
            }
        }

        for email in rejected {
            let address = EmailAddress::new(email.as_str())?;
            self.repos.emails.deactivate(tx, &address, now).await?;

            log_business_event!(
                event.category = event::category::REPUTATION,
                event.action = event::action::ADDRESS_DOWNGRADED,
                event.entity_type = event::entity_type::EMAIL,
                event.result = event::result::SUCCESS,
                message_id = %message_id,
                "送信先を非アクティブ化"
            );
        }

        Ok(())
    }
}

/// 結果をメッセージ単位にまとめる（初出順）
fn group_by_message(outcomes: &[ItemOutcome]) -> Vec<(MessageId, Vec<usize>)> {
    let mut groups: Vec<(MessageId, Vec<usize>)> = Vec::new();
    for (index, outcome) in outcomes.iter().enumerate() {
        match groups.iter_mut().find(|(id, _)| *id == outcome.message_id) {
            Some((_, indices)) => indices.push(index),
            None => groups.push((outcome.message_id.clone(), vec![index])),
        }
    }
    groups
}
