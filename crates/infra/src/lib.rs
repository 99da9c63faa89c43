//! # Warisin インフラ層
//!
//! 外部システムとの接続・通信を担当するインフラストラクチャ層。
//!
//! ## 責務
//!
//! - **データベース接続**: PostgreSQL への接続プールとトランザクション管理
//! - **リポジトリ実装**: メッセージ・受信者・評判台帳の永続化
//! - **メール送信**: ベンダーごとの送信実装と、日次上限に基づく振り分け
//! - **暗号化**: 保存時のメッセージ本文の暗号化
//! - **シークレット生成**: 延長用・配信停止用のケイパビリティトークン
//!
//! ## 依存関係
//!
//! ```text
//! testament-service → infra → domain
//! ```
//!
//! ドメイン層はインフラ層に依存しない（依存性逆転の原則）。
//!
//! ## 使用例
//!
//! ```rust,ignore
//! use warisin_infra::{db, repository::PostgresMessageRepository};
//!
//! async fn setup() -> Result<(), Box<dyn std::error::Error>> {
//!     let pool = db::create_pool("postgres://localhost/warisin").await?;
//!     db::run_migrations(&pool).await?;
//!     Ok(())
//! }
//! ```

pub mod db;
pub mod encryption;
pub mod error;
pub mod mail;
#[cfg(any(test, feature = "test-utils"))]
pub mod mock;
pub mod repository;
pub mod secret;

pub use db::{PgTransactionManager, TransactionManager, TxContext};
pub use encryption::{AesGcmCipher, ContentCipher};
pub use error::{InfraError, InfraErrorKind};
pub use mail::{MailDispatcher, MailVendor, VendorSlot};
pub use secret::{RandomSecretGenerator, SecretGenerator};
