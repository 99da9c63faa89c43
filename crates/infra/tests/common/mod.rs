//! テスト共通フィクスチャ
//!
//! DB を使用する統合テストで共通利用するエンティティ生成ヘルパー。
//! Rust の統合テスト規約に従い `tests/common/mod.rs` に配置。

// 各テストファイルが独立したクレートとしてコンパイルされるため、
// 使用しない関数に dead_code 警告が出る。モジュール全体で抑制する。
#![allow(dead_code)]

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use warisin_domain::{
    clock::days,
    email::EmailAddress,
    message::{Deadlines, InactivePeriodDays, Message, MessageId, NewMessage, ReminderIntervalDays},
    receiver::Receiver,
    secret::Secret,
};
use warisin_infra::{
    db::{PgTransactionManager, TransactionManager, TxContext},
    repository::{
        MessageRepository,
        PostgresMessageRepository,
        PostgresReceiverRepository,
        ReceiverRepository,
    },
};

/// テスト用の固定日時（2023-11-14 22:13:20 UTC）
pub fn test_now() -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000, 0).unwrap()
}

pub fn email(value: &str) -> EmailAddress {
    EmailAddress::new(value).unwrap()
}

/// 連番から 69 文字のシークレットを作る
pub fn secret(n: u64) -> Secret {
    Secret::new(format!("{n:069}")).unwrap()
}

/// トランザクションを開始する
pub async fn begin(pool: &PgPool) -> TxContext {
    PgTransactionManager::new(pool.clone()).begin().await.unwrap()
}

/// デフォルト値で Message を作成（30 日 / 15 日）
pub fn create_test_message(creator: &str) -> Message {
    Message::new(NewMessage {
        id: MessageId::new(),
        email_creator: email(creator),
        content_encrypted: "encrypted-content".to_string(),
        inactive_period_days: InactivePeriodDays::new(30).unwrap(),
        reminder_interval_days: ReminderIntervalDays::new(15).unwrap(),
        extension_secret: secret(1),
        deadlines: None,
        now: test_now(),
    })
}

/// 期限を指定して Message を作成
///
/// `inactive_in` / `remind_in` は `test_now()` からの相対日数（負なら過去）。
pub fn create_message_with_deadlines(creator: &str, inactive_in: i32, remind_in: i32) -> Message {
    Message::new(NewMessage {
        id: MessageId::new(),
        email_creator: email(creator),
        content_encrypted: "encrypted-content".to_string(),
        inactive_period_days: InactivePeriodDays::new(30).unwrap(),
        reminder_interval_days: ReminderIntervalDays::new(15).unwrap(),
        extension_secret: secret(1),
        deadlines: Some(Deadlines {
            inactive_at:      test_now() + days(inactive_in),
            next_reminder_at: test_now() + days(remind_in),
        }),
        now: test_now(),
    })
}

/// メッセージと受信者を挿入してコミットする
pub async fn insert_message_with_receivers(
    pool: &PgPool,
    message: &Message,
    receivers: &[&str],
) -> Vec<Receiver> {
    let mut tx = begin(pool).await;
    PostgresMessageRepository::new()
        .insert(&mut tx, message)
        .await
        .unwrap();

    let mut inserted = Vec::new();
    for (i, address) in receivers.iter().enumerate() {
        let receiver = Receiver::new(message.id().clone(), email(address), secret(100 + i as u64));
        PostgresReceiverRepository::new()
            .insert(&mut tx, &receiver)
            .await
            .unwrap();
        inserted.push(receiver);
    }
    tx.commit().await.unwrap();
    inserted
}
