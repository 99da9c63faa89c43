//! # EmailRepository
//!
//! アドレスの評判台帳（`emails` テーブル）を扱う。
//!
//! 行がないアドレスは配信可能とみなす。ベンダーに拒否されたアドレスは
//! `is_active = false` に落とし、以降は作成者・受信者のどちらとしても使えない。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use warisin_domain::email::{EmailAddress, EmailReputation};

use crate::{db::TxContext, error::InfraError};

/// 評判台帳リポジトリトレイト
#[async_trait]
pub trait EmailRepository: Send + Sync {
    /// 未登録のアドレスをアクティブとして登録する（登録済みなら何もしない）
    async fn insert_if_absent(
        &self,
        tx: &mut TxContext,
        email: &EmailAddress,
        now: DateTime<Utc>,
    ) -> Result<(), InfraError>;

    /// アドレスの台帳行を取得する
    async fn find(
        &self,
        tx: &mut TxContext,
        email: &EmailAddress,
    ) -> Result<Option<EmailReputation>, InfraError>;

    /// 複数アドレスの台帳行をまとめて取得する（行がないアドレスは含まれない）
    async fn find_many(
        &self,
        tx: &mut TxContext,
        emails: &[EmailAddress],
    ) -> Result<Vec<EmailReputation>, InfraError>;

    /// アドレスを非アクティブにする（未登録なら非アクティブとして登録する）
    async fn deactivate(
        &self,
        tx: &mut TxContext,
        email: &EmailAddress,
        now: DateTime<Utc>,
    ) -> Result<(), InfraError>;
}

/// PostgreSQL 実装の EmailRepository
#[derive(Debug, Clone, Default)]
pub struct PostgresEmailRepository;

impl PostgresEmailRepository {
    pub fn new() -> Self {
        Self
    }
}

#[derive(Debug, sqlx::FromRow)]
struct EmailRow {
    email: String,
    is_active: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<EmailRow> for EmailReputation {
    type Error = InfraError;

    fn try_from(row: EmailRow) -> Result<Self, Self::Error> {
        Ok(EmailReputation::from_db(
            EmailAddress::new(row.email)?,
            row.is_active,
            row.created_at,
        ))
    }
}

#[async_trait]
impl EmailRepository for PostgresEmailRepository {
    #[tracing::instrument(skip_all, level = "debug")]
    async fn insert_if_absent(
        &self,
        tx: &mut TxContext,
        email: &EmailAddress,
        now: DateTime<Utc>,
    ) -> Result<(), InfraError> {
        sqlx::query(
            r#"
            INSERT INTO emails (email, is_active, created_at)
            VALUES ($1, TRUE, $2)
            ON CONFLICT (email) DO NOTHING
            "#,
        )
        .bind(email.as_str())
        .bind(now)
        .execute(tx.conn())
        .await?;

        Ok(())
    }

    #[tracing::instrument(skip_all, level = "debug")]
    async fn find(
        &self,
        tx: &mut TxContext,
        email: &EmailAddress,
    ) -> Result<Option<EmailReputation>, InfraError> {
        let row: Option<EmailRow> =
            sqlx::query_as("SELECT email, is_active, created_at FROM emails WHERE email = $1")
                .bind(email.as_str())
                .fetch_optional(tx.conn())
                .await?;

        row.map(EmailReputation::try_from).transpose()
    }

    #[tracing::instrument(skip_all, level = "debug", fields(count = emails.len()))]
    async fn find_many(
        &self,
        tx: &mut TxContext,
        emails: &[EmailAddress],
    ) -> Result<Vec<EmailReputation>, InfraError> {
        if emails.is_empty() {
            return Ok(Vec::new());
        }

        let values: Vec<&str> = emails.iter().map(EmailAddress::as_str).collect();
        let rows: Vec<EmailRow> = sqlx::query_as(
            "SELECT email, is_active, created_at FROM emails WHERE email = ANY($1) ORDER BY email",
        )
        .bind(&values)
        .fetch_all(tx.conn())
        .await?;

        rows.into_iter().map(EmailReputation::try_from).collect()
    }

    #[tracing::instrument(skip_all, level = "debug")]
    async fn deactivate(
        &self,
        tx: &mut TxContext,
        email: &EmailAddress,
        now: DateTime<Utc>,
    ) -> Result<(), InfraError> {
        sqlx::query(
            r#"
            INSERT INTO emails (email, is_active, created_at)
            VALUES ($1, FALSE, $2)
            ON CONFLICT (email) DO UPDATE SET is_active = FALSE
            "#,
        )
        .bind(email.as_str())
        .bind(now)
        .execute(tx.conn())
        .await?;

        Ok(())
    }
}
