//! ケイパビリティトークンによる配信停止

use warisin_domain::{message::MessageId, secret::Secret};
use warisin_shared::{event_log::event, log_business_event};

use super::MessageUseCaseImpl;
use crate::{error::ServiceError, usecase::commit};

impl MessageUseCaseImpl {
    /// 配信停止シークレットが一致する受信者を配信停止にする
    ///
    /// 冪等で、配信停止済みの行に対して繰り返しても成功する。
    /// 配信停止した行は削除されず、以降の更新でも復活しない。
    ///
    /// ## エラー
    ///
    /// - 一致する受信者がない: `Forbidden`
    pub async fn unsubscribe_receiver(
        &self,
        id: &MessageId,
        secret: &Secret,
    ) -> Result<(), ServiceError> {
        let mut tx = self.repos.begin().await?;

        let unsubscribed = self
            .repos
            .receivers
            .unsubscribe(&mut tx, id, secret)
            .await?;
        if !unsubscribed {
            return Err(ServiceError::Forbidden(
                "配信停止用シークレットが一致しません".to_string(),
            ));
        }

        commit(tx).await?;

        log_business_event!(
            event.category = event::category::MESSAGE,
            event.action = event::action::RECEIVER_UNSUBSCRIBED,
            event.entity_type = event::entity_type::RECEIVER,
            event.entity_id = %id,
            event.result = event::result::SUCCESS,
            "配信停止"
        );

        Ok(())
    }
}
