//! ReceiverRepository 統合テスト
//!
//! 実行方法:
//! ```bash
//! cargo test -p warisin-infra --test receiver_repository_test
//! ```

mod common;

use common::{begin, create_test_message, email, insert_message_with_receivers, secret};
use pretty_assertions::assert_eq;
use sqlx::PgPool;
use warisin_domain::message::MessageId;
use warisin_infra::repository::{PostgresReceiverRepository, ReceiverRepository};

#[sqlx::test(migrations = "../../migrations")]
async fn test_配信停止済みも含めて全受信者を返す(pool: PgPool) {
    let sut = PostgresReceiverRepository::new();
    let message = create_test_message("creator@example.com");
    insert_message_with_receivers(&pool, &message, &["b@example.com", "a@example.com"]).await;

    let mut tx = begin(&pool).await;
    sut.unsubscribe(&mut tx, message.id(), &secret(100)).await.unwrap();
    let receivers = sut.find_by_message(&mut tx, message.id()).await.unwrap();

    let rows: Vec<(&str, bool)> = receivers
        .iter()
        .map(|r| (r.email_receiver().as_str(), r.is_unsubscribed()))
        .collect();
    assert_eq!(rows, vec![("a@example.com", false), ("b@example.com", true)]);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_シークレットが一致しなければ配信停止しない(pool: PgPool) {
    let sut = PostgresReceiverRepository::new();
    let message = create_test_message("creator@example.com");
    insert_message_with_receivers(&pool, &message, &["a@example.com"]).await;

    let mut tx = begin(&pool).await;
    let wrong_secret = sut.unsubscribe(&mut tx, message.id(), &secret(999)).await.unwrap();
    let wrong_message = sut
        .unsubscribe(&mut tx, &MessageId::new(), &secret(100))
        .await
        .unwrap();

    assert!(!wrong_secret);
    assert!(!wrong_message);
    let receivers = sut.find_by_message(&mut tx, message.id()).await.unwrap();
    assert!(!receivers[0].is_unsubscribed());
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_配信停止は冪等(pool: PgPool) {
    let sut = PostgresReceiverRepository::new();
    let message = create_test_message("creator@example.com");
    insert_message_with_receivers(&pool, &message, &["a@example.com"]).await;

    let mut tx = begin(&pool).await;
    let first = sut.unsubscribe(&mut tx, message.id(), &secret(100)).await.unwrap();
    let second = sut.unsubscribe(&mut tx, message.id(), &secret(100)).await.unwrap();

    assert!(first);
    assert!(second);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_指定した受信者だけを削除する(pool: PgPool) {
    let sut = PostgresReceiverRepository::new();
    let message = create_test_message("creator@example.com");
    insert_message_with_receivers(&pool, &message, &["a@example.com", "b@example.com"]).await;

    let mut tx = begin(&pool).await;
    sut.delete(&mut tx, message.id(), &email("a@example.com"))
        .await
        .unwrap();
    let receivers = sut.find_by_message(&mut tx, message.id()).await.unwrap();

    assert_eq!(receivers.len(), 1);
    assert_eq!(receivers[0].email_receiver().as_str(), "b@example.com");
}
