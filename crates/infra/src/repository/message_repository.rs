//! # MessageRepository
//!
//! メッセージの永続化と、スケジューラー向けの期限到来メッセージの選択を担当する。
//!
//! ## 設計方針
//!
//! - **結合行の畳み込み**: メッセージと受信者の結合行はフラットに取得し、
//!   [`fold_joined_rows`] でメッセージ単位にまとめる
//! - **書き戻しは SQL で原子的に**: リマインダー・遺言送信後のタイマー更新は
//!   読み出しを挟まず `UPDATE ... SET x = x + interval` で行う
//! - **評判台帳の参照**: 台帳に行がないアドレスは配信可能とみなす（`COALESCE(..., TRUE)`）

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;
use warisin_domain::{
    email::EmailAddress,
    message::{
        DELIVERY_GRACE_DAYS,
        InactivePeriodDays,
        Message,
        MessageId,
        MessageRecord,
        MessageWithReceivers,
        ReminderIntervalDays,
        fold_joined_rows,
    },
    receiver::Receiver,
    secret::Secret,
};

use crate::{db::TxContext, error::InfraError};

/// メッセージリポジトリトレイト
#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// メッセージを挿入する
    async fn insert(&self, tx: &mut TxContext, message: &Message) -> Result<(), InfraError>;

    /// ID でメッセージを検索する
    ///
    /// 同じトランザクション内の後続の書き込みに備えて行をロックする。
    async fn find_by_id(
        &self,
        tx: &mut TxContext,
        id: &MessageId,
    ) -> Result<Option<Message>, InfraError>;

    /// メッセージを更新する（タイマー・カウンタを含む全項目）
    async fn update(&self, tx: &mut TxContext, message: &Message) -> Result<(), InfraError>;

    /// 作成者が一致する行を削除する
    ///
    /// 受信者行は外部キーの CASCADE で削除される。
    /// 戻り値は削除できたかどうか。
    async fn delete_owned(
        &self,
        tx: &mut TxContext,
        id: &MessageId,
        creator: &EmailAddress,
    ) -> Result<bool, InfraError>;

    /// 作成者のメッセージを表示中の受信者付きで取得する
    ///
    /// `created_at`、`id` の順に並べる。
    async fn find_by_creator_with_receivers(
        &self,
        tx: &mut TxContext,
        creator: &EmailAddress,
    ) -> Result<Vec<MessageWithReceivers>, InfraError>;

    /// 作成者の表示中の受信者数を数える
    ///
    /// `excluding` を指定した場合、そのメッセージの受信者は数えない（更新時）。
    async fn count_visible_receivers_by_creator(
        &self,
        tx: &mut TxContext,
        creator: &EmailAddress,
        excluding: Option<&MessageId>,
    ) -> Result<usize, InfraError>;

    /// リマインダー送信対象を取得する
    ///
    /// アクティブで `next_reminder_at <= now < inactive_at`、かつ作成者の台帳行が
    /// アクティブ（または未登録）のメッセージ。受信者はリマインダー本文に載せるため
    /// 表示中のものを結合する。
    async fn find_due_for_reminder(
        &self,
        tx: &mut TxContext,
        now: DateTime<Utc>,
    ) -> Result<Vec<MessageWithReceivers>, InfraError>;

    /// 遺言配信対象を取得する
    ///
    /// アクティブで `inactive_at <= now` のメッセージと、配信停止しておらず
    /// 台帳行がアクティブ（または未登録）の受信者。
    async fn find_due_for_delivery(
        &self,
        tx: &mut TxContext,
        now: DateTime<Utc>,
    ) -> Result<Vec<MessageWithReceivers>, InfraError>;

    /// リマインダー送信成功を反映する（`next_reminder_at += reminder_interval_days`）
    async fn advance_reminder(&self, tx: &mut TxContext, id: &MessageId)
    -> Result<bool, InfraError>;

    /// 遺言配信成功を反映する
    ///
    /// `inactive_at += 15 日`、`sent_counter += 1`。
    /// `deactivate` が真なら `is_active = false` にする。
    async fn record_delivery(
        &self,
        tx: &mut TxContext,
        id: &MessageId,
        deactivate: bool,
    ) -> Result<bool, InfraError>;
}

/// PostgreSQL 実装の MessageRepository
#[derive(Debug, Clone, Default)]
pub struct PostgresMessageRepository;

impl PostgresMessageRepository {
    /// 新しいリポジトリインスタンスを作成
    pub fn new() -> Self {
        Self
    }
}

/// messages テーブルの行
#[derive(Debug, sqlx::FromRow)]
struct MessageRow {
    id: Uuid,
    email_creator: String,
    created_at: DateTime<Utc>,
    content_encrypted: String,
    inactive_period_days: i32,
    reminder_interval_days: i32,
    is_active: bool,
    extension_secret: String,
    inactive_at: DateTime<Utc>,
    next_reminder_at: DateTime<Utc>,
    sent_counter: i32,
}

impl TryFrom<MessageRow> for Message {
    type Error = InfraError;

    fn try_from(row: MessageRow) -> Result<Self, Self::Error> {
        Ok(Message::from_db(MessageRecord {
            id: MessageId::from_uuid(row.id),
            email_creator: EmailAddress::new(row.email_creator)?,
            created_at: row.created_at,
            content_encrypted: row.content_encrypted,
            inactive_period_days: InactivePeriodDays::new(row.inactive_period_days)?,
            reminder_interval_days: ReminderIntervalDays::new(row.reminder_interval_days)?,
            is_active: row.is_active,
            extension_secret: Secret::from_db(row.extension_secret),
            inactive_at: row.inactive_at,
            next_reminder_at: row.next_reminder_at,
            sent_counter: row.sent_counter,
        }))
    }
}

/// メッセージと受信者の結合行
#[derive(Debug, sqlx::FromRow)]
struct JoinedRow {
    #[sqlx(flatten)]
    message: MessageRow,
    receiver_email: Option<String>,
    receiver_secret: Option<String>,
    receiver_is_unsubscribed: Option<bool>,
}

impl JoinedRow {
    fn into_pair(self) -> Result<(Message, Option<Receiver>), InfraError> {
        let message = Message::try_from(self.message)?;
        let receiver = match (self.receiver_email, self.receiver_secret) {
            (Some(email), Some(secret)) => Some(Receiver::from_db(
                message.id().clone(),
                EmailAddress::new(email)?,
                Secret::from_db(secret),
                self.receiver_is_unsubscribed.unwrap_or(false),
            )),
            _ => None,
        };
        Ok((message, receiver))
    }
}

fn fold_rows(rows: Vec<JoinedRow>) -> Result<Vec<MessageWithReceivers>, InfraError> {
    let pairs = rows
        .into_iter()
        .map(JoinedRow::into_pair)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(fold_joined_rows(pairs))
}

const MESSAGE_COLUMNS: &str = r#"
    m.id,
    m.email_creator,
    m.created_at,
    m.content_encrypted,
    m.inactive_period_days,
    m.reminder_interval_days,
    m.is_active,
    m.extension_secret,
    m.inactive_at,
    m.next_reminder_at,
    m.sent_counter
"#;

const RECEIVER_COLUMNS: &str = r#"
    r.email_receiver AS receiver_email,
    r.unsubscribe_secret AS receiver_secret,
    r.is_unsubscribed AS receiver_is_unsubscribed
"#;

#[async_trait]
impl MessageRepository for PostgresMessageRepository {
    #[tracing::instrument(skip_all, level = "debug", fields(id = %message.id()))]
    async fn insert(&self, tx: &mut TxContext, message: &Message) -> Result<(), InfraError> {
        sqlx::query(
            r#"
            INSERT INTO messages (
                id, email_creator, created_at, content_encrypted,
                inactive_period_days, reminder_interval_days, is_active,
                extension_secret, inactive_at, next_reminder_at, sent_counter
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(message.id().as_uuid())
        .bind(message.email_creator().as_str())
        .bind(message.created_at())
        .bind(message.content_encrypted())
        .bind(message.inactive_period_days().value())
        .bind(message.reminder_interval_days().value())
        .bind(message.is_active())
        .bind(message.extension_secret().as_str())
        .bind(message.inactive_at())
        .bind(message.next_reminder_at())
        .bind(message.sent_counter())
        .execute(tx.conn())
        .await?;

        Ok(())
    }

    #[tracing::instrument(skip_all, level = "debug", fields(%id))]
    async fn find_by_id(
        &self,
        tx: &mut TxContext,
        id: &MessageId,
    ) -> Result<Option<Message>, InfraError> {
        let row: Option<MessageRow> = sqlx::query_as(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages m WHERE m.id = $1 FOR UPDATE"
        ))
        .bind(id.as_uuid())
        .fetch_optional(tx.conn())
        .await?;

        row.map(Message::try_from).transpose()
    }

    #[tracing::instrument(skip_all, level = "debug", fields(id = %message.id()))]
    async fn update(&self, tx: &mut TxContext, message: &Message) -> Result<(), InfraError> {
        sqlx::query(
            r#"
            UPDATE messages
            SET content_encrypted = $2,
                inactive_period_days = $3,
                reminder_interval_days = $4,
                is_active = $5,
                extension_secret = $6,
                inactive_at = $7,
                next_reminder_at = $8,
                sent_counter = $9
            WHERE id = $1
            "#,
        )
        .bind(message.id().as_uuid())
        .bind(message.content_encrypted())
        .bind(message.inactive_period_days().value())
        .bind(message.reminder_interval_days().value())
        .bind(message.is_active())
        .bind(message.extension_secret().as_str())
        .bind(message.inactive_at())
        .bind(message.next_reminder_at())
        .bind(message.sent_counter())
        .execute(tx.conn())
        .await?;

        Ok(())
    }

    #[tracing::instrument(skip_all, level = "debug", fields(%id))]
    async fn delete_owned(
        &self,
        tx: &mut TxContext,
        id: &MessageId,
        creator: &EmailAddress,
    ) -> Result<bool, InfraError> {
        let result = sqlx::query("DELETE FROM messages WHERE id = $1 AND email_creator = $2")
            .bind(id.as_uuid())
            .bind(creator.as_str())
            .execute(tx.conn())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[tracing::instrument(skip_all, level = "debug")]
    async fn find_by_creator_with_receivers(
        &self,
        tx: &mut TxContext,
        creator: &EmailAddress,
    ) -> Result<Vec<MessageWithReceivers>, InfraError> {
        let rows: Vec<JoinedRow> = sqlx::query_as(&format!(
            r#"
            SELECT {MESSAGE_COLUMNS}, {RECEIVER_COLUMNS}
            FROM messages m
            LEFT JOIN messages_email_receivers r
                ON r.message_id = m.id AND NOT r.is_unsubscribed
            WHERE m.email_creator = $1
            ORDER BY m.created_at, m.id, r.email_receiver
            "#
        ))
        .bind(creator.as_str())
        .fetch_all(tx.conn())
        .await?;

        fold_rows(rows)
    }

    #[tracing::instrument(skip_all, level = "debug")]
    async fn count_visible_receivers_by_creator(
        &self,
        tx: &mut TxContext,
        creator: &EmailAddress,
        excluding: Option<&MessageId>,
    ) -> Result<usize, InfraError> {
        let (count,): (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*)
            FROM messages_email_receivers r
            JOIN messages m ON m.id = r.message_id
            WHERE m.email_creator = $1
              AND NOT r.is_unsubscribed
              AND ($2::uuid IS NULL OR m.id <> $2)
            "#,
        )
        .bind(creator.as_str())
        .bind(excluding.map(|id| *id.as_uuid()))
        .fetch_one(tx.conn())
        .await?;

        usize::try_from(count).map_err(|e| InfraError::unexpected(format!("件数が不正です: {e}")))
    }

    #[tracing::instrument(skip_all, level = "debug", fields(%now))]
    async fn find_due_for_reminder(
        &self,
        tx: &mut TxContext,
        now: DateTime<Utc>,
    ) -> Result<Vec<MessageWithReceivers>, InfraError> {
        let rows: Vec<JoinedRow> = sqlx::query_as(&format!(
            r#"
            SELECT {MESSAGE_COLUMNS}, {RECEIVER_COLUMNS}
            FROM messages m
            LEFT JOIN emails e ON e.email = m.email_creator
            LEFT JOIN messages_email_receivers r
                ON r.message_id = m.id AND NOT r.is_unsubscribed
            WHERE m.is_active
              AND m.next_reminder_at <= $1
              AND m.inactive_at > $1
              AND COALESCE(e.is_active, TRUE)
            ORDER BY m.created_at, m.id, r.email_receiver
            "#
        ))
        .bind(now)
        .fetch_all(tx.conn())
        .await?;

        fold_rows(rows)
    }

    #[tracing::instrument(skip_all, level = "debug", fields(%now))]
    async fn find_due_for_delivery(
        &self,
        tx: &mut TxContext,
        now: DateTime<Utc>,
    ) -> Result<Vec<MessageWithReceivers>, InfraError> {
        let rows: Vec<JoinedRow> = sqlx::query_as(&format!(
            r#"
            SELECT {MESSAGE_COLUMNS}, {RECEIVER_COLUMNS}
            FROM messages m
            JOIN messages_email_receivers r
                ON r.message_id = m.id AND NOT r.is_unsubscribed
            LEFT JOIN emails e ON e.email = r.email_receiver
            WHERE m.is_active
              AND m.inactive_at <= $1
              AND COALESCE(e.is_active, TRUE)
            ORDER BY m.created_at, m.id, r.email_receiver
            "#
        ))
        .bind(now)
        .fetch_all(tx.conn())
        .await?;

        fold_rows(rows)
    }

    #[tracing::instrument(skip_all, level = "debug", fields(%id))]
    async fn advance_reminder(
        &self,
        tx: &mut TxContext,
        id: &MessageId,
    ) -> Result<bool, InfraError> {
        let result = sqlx::query(
            r#"
            UPDATE messages
            SET next_reminder_at = next_reminder_at + make_interval(days => reminder_interval_days)
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .execute(tx.conn())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    #[tracing::instrument(skip_all, level = "debug", fields(%id, deactivate))]
    async fn record_delivery(
        &self,
        tx: &mut TxContext,
        id: &MessageId,
        deactivate: bool,
    ) -> Result<bool, InfraError> {
        let result = sqlx::query(
            r#"
            UPDATE messages
            SET inactive_at = inactive_at + make_interval(days => $2),
                sent_counter = sent_counter + 1,
                is_active = is_active AND NOT $3
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .bind(DELIVERY_GRACE_DAYS)
        .bind(deactivate)
        .execute(tx.conn())
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_リポジトリはsendとsyncを実装している() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<PostgresMessageRepository>();
    }

    #[test]
    fn test_受信者列がnullの結合行は受信者なしになる() {
        let row = JoinedRow {
            message: MessageRow {
                id: Uuid::now_v7(),
                email_creator: "creator@example.com".to_string(),
                created_at: Utc::now(),
                content_encrypted: String::new(),
                inactive_period_days: 30,
                reminder_interval_days: 15,
                is_active: true,
                extension_secret: "s".repeat(69),
                inactive_at: Utc::now(),
                next_reminder_at: Utc::now(),
                sent_counter: 0,
            },
            receiver_email: None,
            receiver_secret: None,
            receiver_is_unsubscribed: None,
        };

        let (message, receiver) = row.into_pair().unwrap();

        assert!(receiver.is_none());
        assert_eq!(message.inactive_period_days().value(), 30);
    }
}
