//! # ReceiverRepository
//!
//! メッセージごとの受信者行（`messages_email_receivers`）を扱う。
//! 配信停止した行も削除せずに残し、差分計算の入力として返す。

use async_trait::async_trait;
use uuid::Uuid;
use warisin_domain::{
    email::EmailAddress,
    message::MessageId,
    receiver::Receiver,
    secret::Secret,
};

use crate::{db::TxContext, error::InfraError};

/// 受信者リポジトリトレイト
#[async_trait]
pub trait ReceiverRepository: Send + Sync {
    /// 受信者を挿入する
    async fn insert(&self, tx: &mut TxContext, receiver: &Receiver) -> Result<(), InfraError>;

    /// メッセージの受信者を配信停止済みも含めてすべて取得する
    async fn find_by_message(
        &self,
        tx: &mut TxContext,
        message_id: &MessageId,
    ) -> Result<Vec<Receiver>, InfraError>;

    /// 受信者を削除する
    async fn delete(
        &self,
        tx: &mut TxContext,
        message_id: &MessageId,
        email: &EmailAddress,
    ) -> Result<(), InfraError>;

    /// 配信停止シークレットが一致する受信者を配信停止にする
    ///
    /// 戻り値は一致する行があったかどうか。
    async fn unsubscribe(
        &self,
        tx: &mut TxContext,
        message_id: &MessageId,
        secret: &Secret,
    ) -> Result<bool, InfraError>;
}

/// PostgreSQL 実装の ReceiverRepository
#[derive(Debug, Clone, Default)]
pub struct PostgresReceiverRepository;

impl PostgresReceiverRepository {
    pub fn new() -> Self {
        Self
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ReceiverRow {
    message_id: Uuid,
    email_receiver: String,
    unsubscribe_secret: String,
    is_unsubscribed: bool,
}

impl TryFrom<ReceiverRow> for Receiver {
    type Error = InfraError;

    fn try_from(row: ReceiverRow) -> Result<Self, Self::Error> {
        Ok(Receiver::from_db(
            MessageId::from_uuid(row.message_id),
            EmailAddress::new(row.email_receiver)?,
            Secret::from_db(row.unsubscribe_secret),
            row.is_unsubscribed,
        ))
    }
}

#[async_trait]
impl ReceiverRepository for PostgresReceiverRepository {
    #[tracing::instrument(skip_all, level = "debug", fields(message_id = %receiver.message_id()))]
    async fn insert(&self, tx: &mut TxContext, receiver: &Receiver) -> Result<(), InfraError> {
        sqlx::query(
            r#"
            INSERT INTO messages_email_receivers (
                message_id, email_receiver, is_unsubscribed, unsubscribe_secret
            )
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(receiver.message_id().as_uuid())
        .bind(receiver.email_receiver().as_str())
        .bind(receiver.is_unsubscribed())
        .bind(receiver.unsubscribe_secret().as_str())
        .execute(tx.conn())
        .await?;

        Ok(())
    }

    #[tracing::instrument(skip_all, level = "debug", fields(%message_id))]
    async fn find_by_message(
        &self,
        tx: &mut TxContext,
        message_id: &MessageId,
    ) -> Result<Vec<Receiver>, InfraError> {
        let rows: Vec<ReceiverRow> = sqlx::query_as(
            r#"
            SELECT message_id, email_receiver, unsubscribe_secret, is_unsubscribed
            FROM messages_email_receivers
            WHERE message_id = $1
            ORDER BY email_receiver
            "#,
        )
        .bind(message_id.as_uuid())
        .fetch_all(tx.conn())
        .await?;

        rows.into_iter().map(Receiver::try_from).collect()
    }

    #[tracing::instrument(skip_all, level = "debug", fields(%message_id))]
    async fn delete(
        &self,
        tx: &mut TxContext,
        message_id: &MessageId,
        email: &EmailAddress,
    ) -> Result<(), InfraError> {
        sqlx::query(
            "DELETE FROM messages_email_receivers WHERE message_id = $1 AND email_receiver = $2",
        )
        .bind(message_id.as_uuid())
        .bind(email.as_str())
        .execute(tx.conn())
        .await?;

        Ok(())
    }

    #[tracing::instrument(skip_all, level = "debug", fields(%message_id))]
    async fn unsubscribe(
        &self,
        tx: &mut TxContext,
        message_id: &MessageId,
        secret: &Secret,
    ) -> Result<bool, InfraError> {
        let result = sqlx::query(
            r#"
            UPDATE messages_email_receivers
            SET is_unsubscribed = TRUE
            WHERE message_id = $1 AND unsubscribe_secret = $2
            "#,
        )
        .bind(message_id.as_uuid())
        .bind(secret.as_str())
        .execute(tx.conn())
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
