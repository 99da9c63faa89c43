//! TxContext のセーブポイント統合テスト
//!
//! スケジューラーはメッセージごとにセーブポイントを張り、
//! 1 件の書き戻し失敗で他のメッセージの結果を失わないようにしている。
//!
//! 実行方法:
//! ```bash
//! cargo test -p warisin-infra --test transaction_test
//! ```

mod common;

use common::{begin, create_test_message, email, test_now};
use sqlx::PgPool;
use warisin_infra::repository::{
    EmailRepository,
    MessageRepository,
    PostgresEmailRepository,
    PostgresMessageRepository,
};

#[sqlx::test(migrations = "../../migrations")]
async fn test_セーブポイントまでロールバックすると以降の変更だけが消える(pool: PgPool) {
    let messages = PostgresMessageRepository::new();
    let emails = PostgresEmailRepository::new();
    let kept = create_test_message("kept@example.com");

    let mut tx = begin(&pool).await;
    messages.insert(&mut tx, &kept).await.unwrap();

    tx.savepoint("write_back").await.unwrap();
    emails
        .deactivate(&mut tx, &email("discarded@example.com"), test_now())
        .await
        .unwrap();
    tx.rollback_to_savepoint("write_back").await.unwrap();
    tx.commit().await.unwrap();

    let mut tx = begin(&pool).await;
    assert!(messages.find_by_id(&mut tx, kept.id()).await.unwrap().is_some());
    assert!(
        emails
            .find(&mut tx, &email("discarded@example.com"))
            .await
            .unwrap()
            .is_none()
    );
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_解放したセーブポイントの変更はコミットされる(pool: PgPool) {
    let emails = PostgresEmailRepository::new();

    let mut tx = begin(&pool).await;
    tx.savepoint("write_back").await.unwrap();
    emails
        .deactivate(&mut tx, &email("bounced@example.com"), test_now())
        .await
        .unwrap();
    tx.release_savepoint("write_back").await.unwrap();
    tx.commit().await.unwrap();

    let mut tx = begin(&pool).await;
    let found = emails
        .find(&mut tx, &email("bounced@example.com"))
        .await
        .unwrap()
        .unwrap();
    assert!(!found.is_active());
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_コミットせずにドロップするとロールバックされる(pool: PgPool) {
    let messages = PostgresMessageRepository::new();
    let message = create_test_message("creator@example.com");

    {
        let mut tx = begin(&pool).await;
        messages.insert(&mut tx, &message).await.unwrap();
    }

    let mut tx = begin(&pool).await;
    assert!(messages.find_by_id(&mut tx, message.id()).await.unwrap().is_none());
}
