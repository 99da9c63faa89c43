//! # ユースケース層
//!
//! Testament Service のビジネスロジックを実装する。
//!
//! ## 設計方針
//!
//! - **依存性注入**: リポジトリを `Arc<dyn Trait>` で外部から注入
//! - **薄いハンドラ**: ハンドラは薄く保ち、ロジックはユースケースに集約
//! - **1 操作 = 1 トランザクション**: すべての読み書きを `TxContext` 経由で行う
//!
//! ## モジュール構成
//!
//! - `message`: 作成者・ケイパビリティトークン経由のメッセージ操作
//! - `scheduler`: 期限到来の選択、リマインダー・遺言の送信と書き戻し
//! - `mail_composer`: メール本文の組み立て

pub(crate) mod helpers;

pub mod mail_composer;
pub mod message;
pub mod scheduler;

use std::sync::Arc;

pub use mail_composer::MailComposer;
pub use message::{CreateMessageInput, MessageUseCaseImpl, MessageView, UpdateMessageInput};
pub use scheduler::{DispatchSummary, ItemOutcome, ItemStatus, SchedulerUseCaseImpl};
use warisin_infra::{
    TransactionManager,
    TxContext,
    repository::{EmailRepository, MessageRepository, ReceiverRepository},
};

use crate::error::ServiceError;

/// ユースケースが共有するリポジトリ群
#[derive(Clone)]
pub struct Repositories {
    pub tx_manager: Arc<dyn TransactionManager>,
    pub messages:   Arc<dyn MessageRepository>,
    pub receivers:  Arc<dyn ReceiverRepository>,
    pub emails:     Arc<dyn EmailRepository>,
}

impl Repositories {
    /// トランザクションを開始する
    pub(crate) async fn begin(&self) -> Result<TxContext, ServiceError> {
        Ok(self.tx_manager.begin().await?)
    }
}

/// トランザクションをコミットする
pub(crate) async fn commit(tx: TxContext) -> Result<(), ServiceError> {
    Ok(tx.commit().await?)
}
