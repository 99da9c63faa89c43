//! # ドメイン層エラー定義
//!
//! ビジネスルール違反やドメイン固有の例外状態を表現するエラー型。
//!
//! ## エラーの種類と HTTP ステータスの対応
//!
//! | エラー種別 | HTTP ステータス | 用途 |
//! |-----------|----------------|------|
//! | `Validation` | 400 Bad Request | 入力値・ポリシーの検証失敗 |
//! | `NotFound` | 404 Not Found | エンティティが存在しない |
//! | `Forbidden` | 403 Forbidden | 作成者の不一致、古いシークレット |
//!
//! ## 使用例
//!
//! ```rust
//! use warisin_domain::DomainError;
//!
//! fn validate_receivers(count: usize) -> Result<(), DomainError> {
//!     if count == 0 {
//!         return Err(DomainError::Validation("受信者は必須です".to_string()));
//!     }
//!     Ok(())
//! }
//!
//! assert!(validate_receivers(0).is_err());
//! ```

use thiserror::Error;

/// ドメイン層で発生するエラー
///
/// API 層でこのエラーを受け取り、適切な HTTP レスポンスに変換する。
#[derive(Debug, Error)]
pub enum DomainError {
    /// バリデーションエラー
    ///
    /// 入力値がビジネスルールに違反している場合に使用する。
    ///
    /// # 例
    ///
    /// - メールアドレスの形式不正
    /// - 本文の文字数超過
    /// - 受信者数の上限超過
    #[error("バリデーションエラー: {0}")]
    Validation(String),

    /// エンティティが見つからない
    #[error("{entity_type} が見つかりません: {id}")]
    NotFound {
        /// エンティティの種類（"Message" など）
        entity_type: &'static str,
        /// 検索に使用した識別子
        id:          String,
    },

    /// 権限エラー
    ///
    /// 認証済みの作成者が所有者でない場合や、
    /// ケイパビリティトークンが一致しない場合に使用する。
    #[error("権限がありません: {0}")]
    Forbidden(String),
}
