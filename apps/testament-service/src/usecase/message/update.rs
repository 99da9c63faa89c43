//! メッセージの更新

use itertools::Itertools;
use warisin_domain::{
    message::MessageUpdate,
    receiver::{ExistingReceiver, Receiver, ReceiverAction, reconcile},
};
use warisin_shared::{event_log::event, log_business_event};

use super::{MessageUseCaseImpl, MessageView, UpdateMessageInput};
use crate::{
    error::ServiceError,
    usecase::{commit, helpers::FindResultExt},
};

impl MessageUseCaseImpl {
    /// メッセージを更新する
    ///
    /// ## 処理フロー
    ///
    /// 1. 存在と所有者を確認
    /// 2. 配信停止済みを含む既存の受信者と、新しい一覧の差分を計算
    /// 3. 追加する受信者の評判台帳と、作成者ごとの上限（ポリシーによる）を確認
    /// 4. 本文を再暗号化し、延長用シークレットを再発行
    /// 5. 差分の insert / delete だけを書き込む
    ///
    /// タイマー（`inactive_at` / `next_reminder_at`）は変更しない。
    ///
    /// ## エラー
    ///
    /// - メッセージが見つからない: `NotFound`
    /// - 作成者が一致しない: `Forbidden`
    /// - 受信者数・上限・台帳の検証失敗: `BadRequest`
    pub async fn update_message(
        &self,
        input: UpdateMessageInput,
    ) -> Result<MessageView, ServiceError> {
        let requested: Vec<_> = input.receivers.into_iter().unique().collect();
        self.receiver_policy.check_per_message(requested.len())?;

        let mut tx = self.repos.begin().await?;

        let message = self
            .repos
            .messages
            .find_by_id(&mut tx, &input.id)
            .await
            .or_not_found("メッセージ")?;
        message.ensure_owned_by(&input.creator)?;

        let existing: Vec<ExistingReceiver> = self
            .repos
            .receivers
            .find_by_message(&mut tx, &input.id)
            .await?
            .iter()
            .map(ExistingReceiver::from)
            .collect();
        let plan = reconcile(&existing, &requested);

        let inserts: Vec<_> = plan
            .addresses_with(ReceiverAction::Insert)
            .into_iter()
            .cloned()
            .collect();
        self.ensure_all_deliverable(&mut tx, "受信者", &inserts)
            .await?;

        let visible: Vec<_> = plan.visible().into_iter().cloned().collect();
        if self.receiver_policy.cap_applies_on_update {
            let others = self
                .repos
                .messages
                .count_visible_receivers_by_creator(&mut tx, &input.creator, Some(&input.id))
                .await?;
            self.receiver_policy
                .check_per_creator(others, visible.len())?;
        }

        let content_encrypted = self.cipher.encrypt(input.content.as_str())?;
        let message = message.updated(MessageUpdate {
            content_encrypted,
            inactive_period_days: input.inactive_period_days,
            reminder_interval_days: input.reminder_interval_days,
            is_active: input.is_active,
            extension_secret: self.secrets.generate(),
        });
        self.repos.messages.update(&mut tx, &message).await?;

        for address in &inserts {
            let receiver = Receiver::new(
                message.id().clone(),
                address.clone(),
                self.secrets.generate(),
            );
            self.repos.receivers.insert(&mut tx, &receiver).await?;
        }
        for address in plan.addresses_with(ReceiverAction::Delete) {
            self.repos
                .receivers
                .delete(&mut tx, message.id(), address)
                .await?;
        }
        let registered: Vec<_> = inserts.iter().collect();
        self.register_all(&mut tx, &registered).await?;

        commit(tx).await?;

        let summary = plan.summary();
        log_business_event!(
            event.category = event::category::MESSAGE,
            event.action = event::action::MESSAGE_UPDATED,
            event.entity_type = event::entity_type::MESSAGE,
            event.entity_id = %message.id(),
            event.result = event::result::SUCCESS,
            receivers.inserted = summary.inserted,
            receivers.deleted = summary.deleted,
            receivers.ignored = summary.ignored,
            receivers.hidden = summary.hidden,
            "メッセージ更新"
        );

        Ok(MessageView {
            message,
            content: input.content.into_string(),
            receivers: visible,
        })
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use warisin_domain::{
        email::EmailReputation,
        message::{InactivePeriodDays, MessageContent, MessageId, ReminderIntervalDays},
        policy::ReceiverPolicy,
    };

    use super::*;
    use crate::test_utils::{MessageTestBuilder, addr, addrs};

    fn input(id: &MessageId, creator: &str, receivers: &[&str]) -> UpdateMessageInput {
        UpdateMessageInput {
            id:                     id.clone(),
            creator:                addr(creator),
            content:                MessageContent::new("更新後の本文").unwrap(),
            receivers:              addrs(receivers),
            inactive_period_days:   InactivePeriodDays::new(60).unwrap(),
            reminder_interval_days: ReminderIntervalDays::new(20).unwrap(),
            is_active:              true,
        }
    }

    fn emails(receivers: &[Receiver]) -> Vec<&str> {
        receivers
            .iter()
            .map(|r| r.email_receiver().as_str())
            .collect()
    }

    #[tokio::test]
    async fn test_受信者の入れ替えは差分だけを書き込む() {
        // Given: a, b, c（c は配信停止済み）
        let builder = MessageTestBuilder::new();
        let setup = builder.build_message_usecase();
        let message = builder.seed_message(
            &setup.store,
            "creator@example.com",
            &["a@example.com", "b@example.com", "c@example.com"],
        );
        builder.unsubscribe(&setup.store, &message, "c@example.com");
        let secret_of_a = setup.store.receivers_of(message.id())[0]
            .unsubscribe_secret()
            .clone();

        // When: b, c, d
        let view = setup
            .sut
            .update_message(input(
                message.id(),
                "creator@example.com",
                &["b@example.com", "c@example.com", "d@example.com"],
            ))
            .await
            .unwrap();

        // Then: a は削除、b は維持、c は非表示のまま、d は追加
        assert_eq!(view.receivers, addrs(&["b@example.com", "d@example.com"]));

        let receivers = setup.store.receivers_of(message.id());
        let mut stored = emails(&receivers);
        stored.sort_unstable();
        assert_eq!(stored, vec!["b@example.com", "c@example.com", "d@example.com"]);
        let c = receivers
            .iter()
            .find(|r| r.email_receiver().as_str() == "c@example.com")
            .unwrap();
        assert!(c.is_unsubscribed());
        assert!(
            receivers
                .iter()
                .all(|r| r.unsubscribe_secret() != &secret_of_a)
        );
        assert!(setup.store.email(&addr("d@example.com")).unwrap().is_active());
    }

    #[tokio::test]
    async fn test_配信停止済みのアドレスは再度指定しても復活しない() {
        let builder = MessageTestBuilder::new();
        let setup = builder.build_message_usecase();
        let message = builder.seed_message(&setup.store, "creator@example.com", &["a@example.com"]);
        builder.unsubscribe(&setup.store, &message, "a@example.com");

        let view = setup
            .sut
            .update_message(input(message.id(), "creator@example.com", &["a@example.com"]))
            .await
            .unwrap();

        assert!(view.receivers.is_empty());
        let receivers = setup.store.receivers_of(message.id());
        assert_eq!(receivers.len(), 1);
        assert!(receivers[0].is_unsubscribed());
    }

    #[tokio::test]
    async fn test_更新は本文を再暗号化しシークレットを再発行するがタイマーは変えない() {
        let builder = MessageTestBuilder::new();
        let setup = builder.build_message_usecase();
        let before = builder.seed_message(&setup.store, "creator@example.com", &["a@example.com"]);

        let mut request = input(before.id(), "creator@example.com", &["a@example.com"]);
        request.is_active = false;
        setup.sut.update_message(request).await.unwrap();

        let after = setup.store.message(before.id()).unwrap();
        assert_eq!(
            builder.cipher().decrypt(after.content_encrypted()).unwrap(),
            "更新後の本文"
        );
        assert_ne!(after.extension_secret(), before.extension_secret());
        assert_eq!(after.inactive_period_days().value(), 60);
        assert_eq!(after.reminder_interval_days().value(), 20);
        assert!(!after.is_active());
        assert_eq!(after.deadlines(), before.deadlines());
        assert_eq!(after.created_at(), before.created_at());
    }

    #[tokio::test]
    async fn test_存在しないメッセージはnot_found() {
        let setup = MessageTestBuilder::new().build_message_usecase();

        let result = setup
            .sut
            .update_message(input(&MessageId::new(), "creator@example.com", &["a@example.com"]))
            .await;

        assert!(matches!(result, Err(ServiceError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_作成者が一致しなければforbiddenで何も変えない() {
        let builder = MessageTestBuilder::new();
        let setup = builder.build_message_usecase();
        let before = builder.seed_message(&setup.store, "creator@example.com", &["a@example.com"]);

        let result = setup
            .sut
            .update_message(input(before.id(), "other@example.com", &["b@example.com"]))
            .await;

        assert!(matches!(result, Err(ServiceError::Forbidden(_))));
        assert_eq!(setup.store.message(before.id()).unwrap(), before);
        assert_eq!(emails(&setup.store.receivers_of(before.id())), vec!["a@example.com"]);
    }

    #[tokio::test]
    async fn test_追加する受信者が台帳で非アクティブならbad_request() {
        let builder = MessageTestBuilder::new();
        let setup = builder.build_message_usecase();
        let message = builder.seed_message(&setup.store, "creator@example.com", &["a@example.com"]);
        setup.store.add_email(
            EmailReputation::first_seen(addr("bounced@example.com"), builder.now()).downgraded(),
        );

        let result = setup
            .sut
            .update_message(input(
                message.id(),
                "creator@example.com",
                &["a@example.com", "bounced@example.com"],
            ))
            .await;

        assert!(matches!(result, Err(ServiceError::BadRequest(_))));
        assert_eq!(emails(&setup.store.receivers_of(message.id())), vec!["a@example.com"]);
    }

    #[tokio::test]
    async fn test_維持する受信者は台帳で非アクティブでも拒否しない() {
        let builder = MessageTestBuilder::new();
        let setup = builder.build_message_usecase();
        let message = builder.seed_message(&setup.store, "creator@example.com", &["a@example.com"]);
        setup.store.add_email(
            EmailReputation::first_seen(addr("a@example.com"), builder.now()).downgraded(),
        );

        let result = setup
            .sut
            .update_message(input(message.id(), "creator@example.com", &["a@example.com"]))
            .await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_更新時の上限はポリシーで切り替えられる() {
        // Given: 他のメッセージで 9 件、更新対象は 1 件
        let builder = MessageTestBuilder::new();
        let enforced = builder.build_message_usecase();
        for n in 0..3 {
            builder.seed_message(
                &enforced.store,
                "creator@example.com",
                &[
                    format!("r{n}a@example.com"),
                    format!("r{n}b@example.com"),
                    format!("r{n}c@example.com"),
                ],
            );
        }
        let target = builder.seed_message(&enforced.store, "creator@example.com", &["a@example.com"]);
        let request = input(
            target.id(),
            "creator@example.com",
            &["a@example.com", "b@example.com"],
        );

        // When / Then: 上限を適用する場合は 9 + 2 = 11 件で拒否
        let result = enforced.sut.update_message(request.clone()).await;
        assert!(matches!(result, Err(ServiceError::BadRequest(_))));

        // When / Then: 適用しない場合は許可
        let relaxed = builder
            .clone()
            .with_receiver_policy(ReceiverPolicy {
                cap_applies_on_update: false,
            })
            .build_message_usecase_with_store(enforced.store.clone());
        let view = relaxed.sut.update_message(request).await.unwrap();
        assert_eq!(view.receivers.len(), 2);
    }
}
