//! ケイパビリティトークンによる延長

use warisin_domain::{
    message::{Message, MessageId},
    secret::Secret,
};
use warisin_shared::{event_log::event, log_business_event};

use super::MessageUseCaseImpl;
use crate::{
    error::ServiceError,
    usecase::{
        commit,
        helpers::{FindResultExt, secrets_match},
    },
};

impl MessageUseCaseImpl {
    /// 非アクティブ期限を延長する（チェックイン）
    ///
    /// 延長用シークレットを定数時間で照合し、一致すれば
    /// シークレットを再発行して期限を当日 0 時（UTC）から再計算する。
    /// 配信待ちのメッセージを取り消せるのはこの操作だけ。
    ///
    /// ## エラー
    ///
    /// - メッセージが見つからない: `NotFound`
    /// - シークレットが一致しない（再発行済みの古いリンクを含む）: `Forbidden`
    pub async fn extend_message(
        &self,
        id: &MessageId,
        secret: &Secret,
    ) -> Result<Message, ServiceError> {
        let mut tx = self.repos.begin().await?;

        let message = self
            .repos
            .messages
            .find_by_id(&mut tx, id)
            .await
            .or_not_found("メッセージ")?;
        if !secrets_match(message.extension_secret(), secret) {
            return Err(ServiceError::Forbidden(
                "延長用シークレットが一致しません".to_string(),
            ));
        }

        let message = message.extended(self.secrets.generate(), self.clock.now());
        self.repos.messages.update(&mut tx, &message).await?;

        commit(tx).await?;

        log_business_event!(
            event.category = event::category::MESSAGE,
            event.action = event::action::MESSAGE_EXTENDED,
            event.entity_type = event::entity_type::MESSAGE,
            event.entity_id = %message.id(),
            event.result = event::result::SUCCESS,
            inactive_at = %message.inactive_at(),
            "メッセージ延長"
        );

        Ok(message)
    }
}
