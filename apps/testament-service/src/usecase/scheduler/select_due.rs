//! 期限到来メッセージの選択

use warisin_domain::message::MessageWithReceivers;

use super::SchedulerUseCaseImpl;
use crate::{error::ServiceError, usecase::commit};

impl SchedulerUseCaseImpl {
    /// リマインダー送信対象のメッセージを取得する
    ///
    /// 受信者は表示中のもの（リマインダー本文に載せる一覧）。
    pub async fn select_due_reminders(&self) -> Result<Vec<MessageWithReceivers>, ServiceError> {
        let mut tx = self.repos.begin().await?;
        let due = self
            .repos
            .messages
            .find_due_for_reminder(&mut tx, self.clock.now())
            .await?;
        commit(tx).await?;
        Ok(due)
    }

    /// 遺言配信対象のメッセージを取得する
    ///
    /// 受信者は配信停止しておらず、台帳で非アクティブでないもの。
    pub async fn select_due_deliveries(&self) -> Result<Vec<MessageWithReceivers>, ServiceError> {
        let mut tx = self.repos.begin().await?;
        let due = self
            .repos
            .messages
            .find_due_for_delivery(&mut tx, self.clock.now())
            .await?;
        commit(tx).await?;
        Ok(due)
    }
}
