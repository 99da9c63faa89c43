//! 遺言の送信

use warisin_domain::message::{MessageContent, MessageWithReceivers};
use warisin_shared::{
    event_log::{error::category, event},
    log_business_event,
};

use super::{
    DispatchSummary,
    ItemOutcome,
    MailKind,
    PendingMail,
    SchedulerUseCaseImpl,
    compose_error_kind,
};
use crate::error::ServiceError;

impl SchedulerUseCaseImpl {
    /// 配信期限を過ぎたメッセージの遺言を受信者に送信する
    ///
    /// （メッセージ, 受信者）ごとに 1 通。1 通でも成功したメッセージは
    /// `inactive_at` を猶予期間だけ先送りし、`sent_counter` を増やす。
    /// 本文の復号やメールの組み立てに失敗したメッセージは送信せず、
    /// その受信者分を `Skipped` として記録する。
    #[tracing::instrument(skip_all)]
    pub async fn send_testaments(&self) -> Result<DispatchSummary, ServiceError> {
        let due = self.select_due_deliveries().await?;

        let mut pending = Vec::new();
        let mut skipped = Vec::new();
        for entry in &due {
            match self.compose_testaments(entry) {
                Ok(mails) => pending.extend(mails),
                Err(e) => {
                    tracing::error!(
                        error.category = category::INFRASTRUCTURE,
                        error.kind = compose_error_kind(&e),
                        message_id = %entry.message.id(),
                        "遺言を組み立てられないため送信しません: {}",
                        e
                    );
                    skipped.extend(entry.receivers.iter().map(|receiver| {
                        ItemOutcome::skipped(
                            entry.message.id().clone(),
                            vec![receiver.email_receiver().as_str().to_string()],
                            e.to_string(),
                        )
                    }));
                }
            }
        }

        let summary = self
            .dispatch_and_write_back(MailKind::Testament, pending, skipped)
            .await?;

        log_business_event!(
            event.category = event::category::SCHEDULER,
            event.action = event::action::TESTAMENTS_SENT,
            event.result = summary.event_result(),
            total = summary.total,
            sent = summary.sent,
            rejected = summary.rejected,
            unavailable = summary.unavailable,
            skipped = summary.skipped,
            write_back_failed = summary.write_back_failed,
            "遺言送信"
        );

        Ok(summary)
    }

    /// 1 メッセージ分の遺言を受信者ごとに組み立てる
    fn compose_testaments(
        &self,
        entry: &MessageWithReceivers,
    ) -> Result<Vec<PendingMail>, ServiceError> {
        let message = &entry.message;
        let content = MessageContent::new(self.cipher.decrypt(message.content_encrypted())?)?;

        entry
            .receivers
            .iter()
            .map(|receiver| -> Result<PendingMail, ServiceError> {
                Ok(PendingMail {
                    message_id: message.id().clone(),
                    item:       self.composer.testament(message, &content, receiver)?,
                })
            })
            .collect()
    }
}
