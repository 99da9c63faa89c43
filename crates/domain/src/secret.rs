//! # ケイパビリティトークン
//!
//! 延長用シークレット（作成者向け）と配信停止用シークレット（受信者向け）。
//! メール内のリンクに埋め込まれ、認証なしで本人確認を行うために使う。
//!
//! 延長用シークレットは作成・更新・延長のたびに必ず再発行され、
//! 古いシークレットの再利用を防ぐ。

use serde::{Deserialize, Serialize};

use crate::DomainError;

/// シークレットの固定長
pub const SECRET_LENGTH: usize = 69;

/// ケイパビリティトークン（値オブジェクト）
///
/// `Debug` 出力では値を伏せる。比較は定数時間で行うこと
/// （ユースケース層で `subtle` を使う）。
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    /// 長さを検証してシークレットを作成する
    ///
    /// # エラー
    ///
    /// 長さが [`SECRET_LENGTH`] でない場合は `DomainError::Validation` を返す。
    pub fn new(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into();
        if value.chars().count() != SECRET_LENGTH {
            return Err(DomainError::Validation(format!(
                "シークレットは {SECRET_LENGTH} 文字である必要があります"
            )));
        }
        Ok(Self(value))
    }

    /// DB から復元する（検証なし）
    pub fn from_db(value: String) -> Self {
        Self(value)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Secret(***)")
    }
}
