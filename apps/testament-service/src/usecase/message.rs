//! # メッセージユースケース
//!
//! 作成者による作成・更新・削除・一覧取得と、
//! ケイパビリティトークンによる延長・配信停止を実装する。
//!
//! 検証エラーと権限エラーは、すべての書き込みより前に検出する。

mod create;
mod delete;
mod extend;
mod select;
mod unsubscribe;
mod update;

use std::sync::Arc;

use warisin_domain::{
    clock::Clock,
    email::{EmailAddress, ensure_deliverable},
    message::{
        Deadlines,
        InactivePeriodDays,
        Message,
        MessageContent,
        MessageId,
        ReminderIntervalDays,
    },
    policy::ReceiverPolicy,
};
use warisin_infra::{ContentCipher, SecretGenerator, TxContext};

use crate::{error::ServiceError, usecase::Repositories};

/// メッセージ作成の入力
#[derive(Debug, Clone)]
pub struct CreateMessageInput {
    pub creator:                EmailAddress,
    pub content:                MessageContent,
    pub receivers:              Vec<EmailAddress>,
    pub inactive_period_days:   InactivePeriodDays,
    pub reminder_interval_days: ReminderIntervalDays,
    /// 指定がなければ当日 0 時から計算する
    pub deadlines:              Option<Deadlines>,
}

/// メッセージ更新の入力
#[derive(Debug, Clone)]
pub struct UpdateMessageInput {
    pub id:                     MessageId,
    pub creator:                EmailAddress,
    pub content:                MessageContent,
    pub receivers:              Vec<EmailAddress>,
    pub inactive_period_days:   InactivePeriodDays,
    pub reminder_interval_days: ReminderIntervalDays,
    pub is_active:              bool,
}

/// 作成者に返すメッセージ
///
/// 本文は復号済み、受信者は表示中のものだけを含む。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageView {
    pub message:   Message,
    pub content:   String,
    pub receivers: Vec<EmailAddress>,
}

/// メッセージユースケース
pub struct MessageUseCaseImpl {
    repos:           Repositories,
    cipher:          Arc<dyn ContentCipher>,
    secrets:         Arc<dyn SecretGenerator>,
    clock:           Arc<dyn Clock>,
    receiver_policy: ReceiverPolicy,
}

impl MessageUseCaseImpl {
    pub fn new(
        repos: Repositories,
        cipher: Arc<dyn ContentCipher>,
        secrets: Arc<dyn SecretGenerator>,
        clock: Arc<dyn Clock>,
        receiver_policy: ReceiverPolicy,
    ) -> Self {
        Self {
            repos,
            cipher,
            secrets,
            clock,
            receiver_policy,
        }
    }

    /// 評判台帳で非アクティブなアドレスを拒否する
    ///
    /// 台帳に行がないアドレスは初回利用として許可する。
    async fn ensure_all_deliverable(
        &self,
        tx: &mut TxContext,
        role: &str,
        addresses: &[EmailAddress],
    ) -> Result<(), ServiceError> {
        let ledger = self.repos.emails.find_many(tx, addresses).await?;
        for address in addresses {
            let reputation = ledger.iter().find(|r| r.email() == address);
            ensure_deliverable(role, address, reputation)?;
        }
        Ok(())
    }

    /// 台帳に未登録のアドレスを登録する
    async fn register_all(
        &self,
        tx: &mut TxContext,
        addresses: &[&EmailAddress],
    ) -> Result<(), ServiceError> {
        let now = self.clock.now();
        for address in addresses {
            self.repos.emails.insert_if_absent(tx, address, now).await?;
        }
        Ok(())
    }
}
