//! # Warisin ドメイン層
//!
//! 遺言メッセージ（testament）サービスのビジネスルールを定義する。
//!
//! ## 設計方針
//!
//! - **エンティティ**: 一意の識別子を持つオブジェクト（例: Message）
//! - **値オブジェクト**: 検証済みの不変オブジェクト（例: EmailAddress,
//!   InactivePeriodDays）
//! - **純粋関数**: 受信者の差分計算（[`receiver::reconcile`]）、
//!   メールベンダーへの配分（[`mail::split_by_capacity`]）
//! - **ドメインエラー**: ビジネスルール違反を表現するエラー型
//!
//! ## 依存関係の方向
//!
//! ```text
//! testament-service → infra → domain
//! ```
//!
//! ドメイン層はインフラ層（DB、メールベンダー）に一切依存しない。
//!
//! ## モジュール構成
//!
//! - [`clock`] - 時刻プロバイダ
//! - [`email`] - メールアドレスと評判台帳
//! - [`error`] - ドメインエラー
//! - [`mail`] - 送信メールと送信結果、ベンダー配分
//! - [`message`] - メッセージエンティティとライフサイクル
//! - [`policy`] - 受信者数上限・配信後の扱いなどの運用ポリシー
//! - [`receiver`] - 受信者と差分計算
//! - [`secret`] - ケイパビリティトークン
//!
//! ## 使用例
//!
//! ```rust
//! use warisin_domain::{DomainError, email::EmailAddress};
//!
//! let address = EmailAddress::new("alice@example.com").unwrap();
//! assert_eq!(address.as_str(), "alice@example.com");
//!
//! let error = EmailAddress::new("alice@localhost").unwrap_err();
//! assert!(matches!(error, DomainError::Validation(_)));
//! ```

#[macro_use]
mod macros;

pub mod clock;
pub mod email;
pub mod error;
pub mod mail;
pub mod message;
pub mod policy;
pub mod receiver;
pub mod secret;

pub use error::DomainError;
