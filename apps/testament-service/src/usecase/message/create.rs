//! メッセージの作成

use itertools::Itertools;
use warisin_domain::{
    message::{Message, MessageId, NewMessage},
    receiver::Receiver,
};
use warisin_shared::{event_log::event, log_business_event};

use super::{CreateMessageInput, MessageUseCaseImpl, MessageView};
use crate::{error::ServiceError, usecase::commit};

impl MessageUseCaseImpl {
    /// メッセージを作成する
    ///
    /// ## 処理フロー
    ///
    /// 1. 受信者数（1〜3 件、重複は 1 件にまとめる）を検証
    /// 2. 作成者と受信者の評判台帳を確認
    /// 3. 作成者ごとの受信者数の上限を確認
    /// 4. 本文を暗号化し、延長用・配信停止用シークレットを発行
    /// 5. メッセージと受信者を保存し、全アドレスを台帳に登録
    ///
    /// ## エラー
    ///
    /// - 受信者数・上限・台帳の検証失敗: `BadRequest`
    /// - データベース・暗号化エラー: `Database`
    pub async fn create_message(
        &self,
        input: CreateMessageInput,
    ) -> Result<MessageView, ServiceError> {
        let receivers: Vec<_> = input.receivers.into_iter().unique().collect();
        self.receiver_policy.check_per_message(receivers.len())?;

        let mut tx = self.repos.begin().await?;

        self.ensure_all_deliverable(&mut tx, "作成者", std::slice::from_ref(&input.creator))
            .await?;
        self.ensure_all_deliverable(&mut tx, "受信者", &receivers)
            .await?;

        let existing = self
            .repos
            .messages
            .count_visible_receivers_by_creator(&mut tx, &input.creator, None)
            .await?;
        self.receiver_policy
            .check_per_creator(existing, receivers.len())?;

        let content_encrypted = self.cipher.encrypt(input.content.as_str())?;
        let message = Message::new(NewMessage {
            id: MessageId::new(),
            email_creator: input.creator,
            content_encrypted,
            inactive_period_days: input.inactive_period_days,
            reminder_interval_days: input.reminder_interval_days,
            extension_secret: self.secrets.generate(),
            deadlines: input.deadlines,
            now: self.clock.now(),
        });

        self.repos.messages.insert(&mut tx, &message).await?;
        for address in &receivers {
            let receiver = Receiver::new(
                message.id().clone(),
                address.clone(),
                self.secrets.generate(),
            );
            self.repos.receivers.insert(&mut tx, &receiver).await?;
        }

        let ledger_entries: Vec<_> = std::iter::once(message.email_creator())
            .chain(&receivers)
            .collect();
        self.register_all(&mut tx, &ledger_entries).await?;

        commit(tx).await?;

        log_business_event!(
            event.category = event::category::MESSAGE,
            event.action = event::action::MESSAGE_CREATED,
            event.entity_type = event::entity_type::MESSAGE,
            event.entity_id = %message.id(),
            event.result = event::result::SUCCESS,
            receivers = receivers.len(),
            "メッセージ作成"
        );

        Ok(MessageView {
            message,
            content: input.content.into_string(),
            receivers,
        })
    }
}
