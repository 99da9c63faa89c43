//! 作成者のメッセージ一覧

use warisin_domain::email::EmailAddress;

use super::{MessageUseCaseImpl, MessageView};
use crate::{error::ServiceError, usecase::commit};

impl MessageUseCaseImpl {
    /// 作成者のメッセージを作成日時、ID の順で取得する
    ///
    /// 本文は復号し、受信者は配信停止済みを除いて返す。
    pub async fn list_messages(
        &self,
        creator: &EmailAddress,
    ) -> Result<Vec<MessageView>, ServiceError> {
        let mut tx = self.repos.begin().await?;

        let entries = self
            .repos
            .messages
            .find_by_creator_with_receivers(&mut tx, creator)
            .await?;

        commit(tx).await?;

        entries
            .into_iter()
            .map(|entry| -> Result<MessageView, ServiceError> {
                let content = self.cipher.decrypt(entry.message.content_encrypted())?;
                Ok(MessageView {
                    message: entry.message,
                    content,
                    receivers: entry
                        .receivers
                        .into_iter()
                        .map(|r| r.email_receiver().clone())
                        .collect(),
                })
            })
            .collect()
    }
}
