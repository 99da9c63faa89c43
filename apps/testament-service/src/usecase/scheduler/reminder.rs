//! リマインダーの送信

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
    /// 期限到来のリマインダーを作成者に送信する
    ///
    /// メッセージごとに 1 通。成功すれば `next_reminder_at` を
    /// `reminder_interval_days` だけ進める。組み立てに失敗したメッセージは
    /// `Skipped` として記録し、他のメッセージの送信は続ける。
    #[tracing::instrument(skip_all)]
    pub async fn send_reminders(&self) -> Result<DispatchSummary, ServiceError> {
        let due = self.select_due_reminders().await?;

        let mut pending = Vec::new();
        let mut skipped = Vec::new();
        for entry in &due {
            let message = &entry.message;
            match self.composer.reminder(entry) {
                Ok(item) => pending.push(PendingMail {
                    message_id: message.id().clone(),
                    item,
                }),
                Err(e) => {
                    tracing::error!(
                        error.category = category::INFRASTRUCTURE,
                        error.kind = compose_error_kind(&e),
                        message_id = %message.id(),
                        "リマインダーを組み立てられないため送信しません: {}",
                        e
                    );
                    skipped.push(ItemOutcome::skipped(
                        message.id().clone(),
                        vec![message.email_creator().as_str().to_string()],
                        e.to_string(),
                    ));
                }
            }
        }

        let summary = self
            .dispatch_and_write_back(MailKind::Reminder, pending, skipped)
            .await?;

        log_business_event!(
            event.category = event::category::SCHEDULER,
            event.action = event::action::REMINDERS_SENT,
            event.result = summary.event_result(),
            total = summary.total,
            sent = summary.sent,
            rejected = summary.rejected,
            unavailable = summary.unavailable,
            skipped = summary.skipped,
            write_back_failed = summary.write_back_failed,
            "リマインダー送信"
        );

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration as StdDuration};

    use async_trait::async_trait;
    use chrono::{DateTime, Duration, Utc};
    use pretty_assertions::assert_eq;
    use warisin_domain::{
        email::EmailAddress,
        mail::MailAddress,
        message::{Message, MessageId, MessageWithReceivers},
        policy::DeliveryPolicy,
    };
    use warisin_infra::{
        InfraError,
        MailDispatcher,
        TxContext,
        VendorSlot,
        mock::MockMessageRepository,
        repository::MessageRepository,
    };

    use super::*;
    use crate::{
        test_utils::{MessageTestBuilder, StubVendor, addr},
        usecase::{ItemStatus, MailComposer},
    };

    #[tokio::test]
    async fn test_作成者にリマインダーを送りタイマーを進める() {
        // Given
        let builder = MessageTestBuilder::new();
        let vendor = StubVendor::accepting("STUB");
        let setup = builder.build_scheduler_usecase(vendor.clone());
        let message = builder.seed_reminder_due_message(
            &setup.store,
            "creator@example.com",
            &["a@example.com", "b@example.com"],
        );

        // When
        let summary = setup.sut.send_reminders().await.unwrap();

        // Then
        assert_eq!(summary.total, 1);
        assert_eq!(summary.sent, 1);
        assert_eq!(summary.items[0].vendor_id.as_deref(), Some("STUB"));

        let sent = vendor.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].recipient_emails(), vec!["creator@example.com"]);
        assert!(sent[0].text_body.contains("a@example.com"));
        assert!(sent[0].text_body.contains("b@example.com"));
        assert!(sent[0].text_body.contains("action=extend-message"));

        let stored = setup.store.message(message.id()).unwrap();
        assert_eq!(
            stored.next_reminder_at(),
            message.next_reminder_at() + Duration::days(15)
        );
        assert_eq!(stored.inactive_at(), message.inactive_at());
    }

    #[tokio::test]
    async fn test_拒否された作成者は非アクティブになりタイマーは進まない() {
        let builder = MessageTestBuilder::new();
        let setup =
            builder.build_scheduler_usecase(StubVendor::rejecting("STUB", &["creator@example.com"]));
        let message = builder.seed_reminder_due_message(
            &setup.store,
            "creator@example.com",
            &["a@example.com"],
        );

        let summary = setup.sut.send_reminders().await.unwrap();

        assert_eq!(summary.rejected, 1);
        assert_eq!(summary.items[0].status, ItemStatus::Rejected);
        assert!(!setup.store.email(&addr("creator@example.com")).unwrap().is_active());
        assert_eq!(setup.store.message(message.id()).unwrap(), message);
    }

    #[tokio::test]
    async fn test_すべてベンダー全体の失敗ならdelivery_unavailableで何も変えない() {
        let builder = MessageTestBuilder::new();
        let setup = builder.build_scheduler_usecase(StubVendor::unavailable("STUB"));
        let message = builder.seed_reminder_due_message(
            &setup.store,
            "creator@example.com",
            &["a@example.com"],
        );

        let result = setup.sut.send_reminders().await;

        assert!(matches!(result, Err(ServiceError::DeliveryUnavailable(_))));
        assert_eq!(setup.store.message(message.id()).unwrap(), message);
        assert!(setup.store.email(&addr("creator@example.com")).is_none());
    }

    #[tokio::test]
    async fn test_認証情報を持つベンダーがなければdelivery_unavailable() {
        let builder = MessageTestBuilder::new();
        let vendor = StubVendor::without_credentials("STUB");
        let setup = builder.build_scheduler_usecase(vendor.clone());
        builder.seed_reminder_due_message(&setup.store, "creator@example.com", &["a@example.com"]);

        let result = setup.sut.send_reminders().await;

        assert!(matches!(result, Err(ServiceError::DeliveryUnavailable(_))));
        assert!(vendor.sent().is_empty());
    }

    #[tokio::test]
    async fn test_対象がなければベンダーがなくても空の集計() {
        let builder = MessageTestBuilder::new();
        let setup = builder.build_scheduler_usecase(StubVendor::without_credentials("STUB"));
        builder.seed_message(&setup.store, "creator@example.com", &["a@example.com"]);

        let summary = setup.sut.send_reminders().await.unwrap();

        assert_eq!(summary, DispatchSummary::default());
    }

    #[tokio::test]
    async fn test_組み立てに失敗したメッセージだけ送信せず他は送る() {
        // Given: 受信者に broken@example.com を含むメッセージの本文は生成に失敗する
        let builder = MessageTestBuilder::new();
        let store = warisin_infra::mock::MockStore::new();
        let broken =
            builder.seed_reminder_due_message(&store, "one@example.com", &["broken@example.com"]);
        let healthy = builder.seed_reminder_due_message(&store, "two@example.com", &["b@example.com"]);

        let composer = MailComposer::with_templates(
            MailAddress::new("noreply@warisin.test", "Warisin Service"),
            "https://warisin.test",
            vec![
                (
                    "reminder.html",
                    include_str!("../../../templates/mail/reminder.html"),
                ),
                (
                    "reminder.txt",
                    "{% for receiver in email_receivers %}\
                     {% if receiver == \"broken@example.com\" %}{{ undefined_value }}{% endif %}\
                     {{ receiver }}{% endfor %}",
                ),
            ],
        )
        .unwrap();
        let vendor = StubVendor::accepting("STUB");
        let sut = SchedulerUseCaseImpl::new(
            builder.repositories(&store),
            builder.cipher(),
            Arc::new(MailDispatcher::new(
                vec![VendorSlot::new(vendor.clone(), 100)],
                StdDuration::from_secs(5),
            )),
            Arc::new(composer),
            builder.clock(),
            DeliveryPolicy::default(),
        );

        // When
        let summary = sut.send_reminders().await.unwrap();

        // Then
        assert_eq!(summary.total, 2);
        assert_eq!(summary.sent, 1);
        assert_eq!(summary.skipped, 1);
        let skipped = summary
            .items
            .iter()
            .find(|i| i.status == ItemStatus::Skipped)
            .unwrap();
        assert_eq!(skipped.message_id, *broken.id());
        assert_eq!(skipped.emails, vec!["one@example.com"]);

        assert_eq!(vendor.sent().len(), 1);
        assert_eq!(vendor.sent()[0].recipient_emails(), vec!["two@example.com"]);
        assert_eq!(store.message(broken.id()).unwrap(), broken);
        assert_eq!(
            store.message(healthy.id()).unwrap().next_reminder_at(),
            healthy.next_reminder_at() + Duration::days(15)
        );
    }

    /// 指定したメッセージの書き戻しだけ失敗するリポジトリ
    struct FailingAdvanceRepository {
        inner:   MockMessageRepository,
        failing: MessageId,
    }

    #[async_trait]
    impl MessageRepository for FailingAdvanceRepository {
        async fn insert(&self, tx: &mut TxContext, message: &Message) -> Result<(), InfraError> {
            self.inner.insert(tx, message).await
        }

        async fn find_by_id(
            &self,
            tx: &mut TxContext,
            id: &MessageId,
        ) -> Result<Option<Message>, InfraError> {
            self.inner.find_by_id(tx, id).await
        }

        async fn update(&self, tx: &mut TxContext, message: &Message) -> Result<(), InfraError> {
            self.inner.update(tx, message).await
        }

        async fn delete_owned(
            &self,
            tx: &mut TxContext,
            id: &MessageId,
            creator: &EmailAddress,
        ) -> Result<bool, InfraError> {
            self.inner.delete_owned(tx, id, creator).await
        }

        async fn find_by_creator_with_receivers(
            &self,
            tx: &mut TxContext,
            creator: &EmailAddress,
        ) -> Result<Vec<MessageWithReceivers>, InfraError> {
            self.inner.find_by_creator_with_receivers(tx, creator).await
        }

        async fn count_visible_receivers_by_creator(
            &self,
            tx: &mut TxContext,
            creator: &EmailAddress,
            excluding: Option<&MessageId>,
        ) -> Result<usize, InfraError> {
            self.inner
                .count_visible_receivers_by_creator(tx, creator, excluding)
                .await
        }

        async fn find_due_for_reminder(
            &self,
            tx: &mut TxContext,
            now: DateTime<Utc>,
        ) -> Result<Vec<MessageWithReceivers>, InfraError> {
            self.inner.find_due_for_reminder(tx, now).await
        }

        async fn find_due_for_delivery(
            &self,
            tx: &mut TxContext,
            now: DateTime<Utc>,
        ) -> Result<Vec<MessageWithReceivers>, InfraError> {
            self.inner.find_due_for_delivery(tx, now).await
        }

        async fn advance_reminder(
            &self,
            tx: &mut TxContext,
            id: &MessageId,
        ) -> Result<bool, InfraError> {
            if *id == self.failing {
                return Err(InfraError::unexpected("書き戻し失敗"));
            }
            self.inner.advance_reminder(tx, id).await
        }

        async fn record_delivery(
            &self,
            tx: &mut TxContext,
            id: &MessageId,
            deactivate: bool,
        ) -> Result<bool, InfraError> {
            self.inner.record_delivery(tx, id, deactivate).await
        }
    }

    #[tokio::test]
    async fn test_書き戻しの失敗は他のメッセージに波及しない() {
        // Given: 2 件のうち 1 件目の書き戻しだけ失敗する
        let builder = MessageTestBuilder::new();
        let store = warisin_infra::mock::MockStore::new();
        let failing = builder.seed_reminder_due_message(&store, "one@example.com", &["a@example.com"]);
        let healthy = builder.seed_reminder_due_message(&store, "two@example.com", &["b@example.com"]);

        let mut repos = builder.repositories(&store);
        repos.messages = Arc::new(FailingAdvanceRepository {
            inner:   MockMessageRepository::new(store.clone()),
            failing: failing.id().clone(),
        });
        let vendor = StubVendor::accepting("STUB");
        let sut = builder.scheduler_usecase(repos, vec![VendorSlot::new(vendor, 100)]);

        // When
        let summary = sut.send_reminders().await.unwrap();

        // Then
        assert_eq!(summary.total, 2);
        assert_eq!(summary.sent, 1);
        assert_eq!(summary.write_back_failed, 1);
        let failed = summary
            .items
            .iter()
            .find(|i| i.message_id == *failing.id())
            .unwrap();
        assert_eq!(failed.status, ItemStatus::WriteBackFailed);
        assert!(failed.error.is_some());

        assert_eq!(store.message(failing.id()).unwrap(), failing);
        assert_eq!(
            store.message(healthy.id()).unwrap().next_reminder_at(),
            healthy.next_reminder_at() + Duration::days(15)
        );
    }
}
