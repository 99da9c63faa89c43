//! メッセージの削除

use warisin_domain::{email::EmailAddress, message::MessageId};
use warisin_shared::{event_log::event, log_business_event};

use super::MessageUseCaseImpl;
use crate::{error::ServiceError, usecase::commit};

impl MessageUseCaseImpl {
    /// メッセージを削除する
    ///
    /// ID と作成者の両方が一致する行だけを削除する。受信者行は CASCADE で消える。
    /// 一致する行がない場合（他人のメッセージを含む）は `NotFound` を返す。
    pub async fn delete_message(
        &self,
        id: &MessageId,
        creator: &EmailAddress,
    ) -> Result<(), ServiceError> {
        let mut tx = self.repos.begin().await?;

        let deleted = self
            .repos
            .messages
            .delete_owned(&mut tx, id, creator)
            .await?;
        if !deleted {
            return Err(ServiceError::NotFound(
                "メッセージが見つかりません".to_string(),
            ));
        }

        commit(tx).await?;

        log_business_event!(
            event.category = event::category::MESSAGE,
            event.action = event::action::MESSAGE_DELETED,
            event.entity_type = event::entity_type::MESSAGE,
            event.entity_id = %id,
            event.result = event::result::SUCCESS,
            "メッセージ削除"
        );

        Ok(())
    }
}
