//! # リポジトリ実装
//!
//! 遺言メッセージ・受信者・評判台帳の永続化を担当する。
//!
//! ## 設計方針
//!
//! - **トランザクション必須**: すべてのメソッドが `&mut TxContext` を受け取る
//! - **ドメイン型で受け渡し**: 行構造体からの変換時に値オブジェクトの検証を通す
//! - **テスタビリティ**: トレイト経由でモック可能な設計

pub mod email_repository;
pub mod message_repository;
pub mod receiver_repository;

pub use email_repository::{EmailRepository, PostgresEmailRepository};
pub use message_repository::{MessageRepository, PostgresMessageRepository};
pub use receiver_repository::{PostgresReceiverRepository, ReceiverRepository};
