//! # メールアドレスと評判台帳
//!
//! 作成者・受信者として使われたアドレスはすべて評判台帳（`emails` テーブル）に
//! 1 行ずつ登録される。配信に失敗したアドレスは非アクティブ化され、
//! 以降は作成者・受信者として登録できなくなる。
//!
//! ## 台帳の不変条件
//!
//! - 初回利用時に登録する。重複登録は何もしない（`is_active` は変わらない）
//! - ベンダーに拒否された配信でのみ `is_active = false` に落とす
//! - 既存の受信者行は削除しない

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::DomainError;

/// メールアドレスの最大長
const MAX_EMAIL_LENGTH: usize = 255;

/// メールアドレス（値オブジェクト）
///
/// 生成時にバリデーションを実行し、不正な値の作成を防ぐ。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EmailAddress(String);

impl EmailAddress {
    /// メールアドレスを作成する
    ///
    /// # バリデーション
    ///
    /// - 空文字列ではない（前後の空白は除去する）
    /// - `local@domain` の形式（`@` は最後の 1 つで分割する）
    /// - 空白を含まない
    /// - ドメイン部に `.` を含み、空のラベルがない
    /// - 最大 255 文字
    ///
    /// # エラー
    ///
    /// バリデーションに失敗した場合は `DomainError::Validation` を返す。
    pub fn new(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into().trim().to_string();

        if value.is_empty() {
            return Err(DomainError::Validation(
                "メールアドレスは必須です".to_string(),
            ));
        }

        if value.len() > MAX_EMAIL_LENGTH {
            return Err(DomainError::Validation(format!(
                "メールアドレスは{MAX_EMAIL_LENGTH}文字以内である必要があります"
            )));
        }

        if value.chars().any(char::is_whitespace) {
            return Err(DomainError::Validation(format!(
                "メールアドレスに空白を含めることはできません: {value}"
            )));
        }

        let Some((local, domain)) = value.rsplit_once('@') else {
            return Err(DomainError::Validation(format!(
                "メールアドレスの形式が不正です: {value}"
            )));
        };

        if local.is_empty() || domain.is_empty() {
            return Err(DomainError::Validation(format!(
                "メールアドレスの形式が不正です: {value}"
            )));
        }

        // ドメイン部にはドットが必須（`user@localhost` は配信できない）
        if !domain.contains('.') || domain.split('.').any(str::is_empty) {
            return Err(DomainError::Validation(format!(
                "メールアドレスのドメインにドット (.) が含まれていません: {value}"
            )));
        }

        Ok(Self(value))
    }

    /// 文字列参照を取得する
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 所有権を持つ文字列に変換する
    pub fn into_string(self) -> String {
        self.0
    }
}

impl std::fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for EmailAddress {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<EmailAddress> for String {
    fn from(address: EmailAddress) -> Self {
        address.0
    }
}

/// アドレス一覧を検証する
///
/// 最初に失敗したアドレスの位置をエラーメッセージに含める。
pub fn parse_address_list<I, S>(values: I) -> Result<Vec<EmailAddress>, DomainError>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    values
        .into_iter()
        .enumerate()
        .map(|(index, value)| {
            EmailAddress::new(value).map_err(|e| match e {
                DomainError::Validation(msg) => {
                    DomainError::Validation(format!("{index} 番目の受信者: {msg}"))
                }
                other => other,
            })
        })
        .collect()
}

/// 評判台帳の 1 行
///
/// アドレスが配信可能かどうかを表す。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailReputation {
    email:      EmailAddress,
    is_active:  bool,
    created_at: DateTime<Utc>,
}

impl EmailReputation {
    /// 初回利用時の台帳行を作成する
    pub fn first_seen(email: EmailAddress, now: DateTime<Utc>) -> Self {
        Self {
            email,
            is_active: true,
            created_at: now,
        }
    }

    /// 既存のデータから復元する
    pub fn from_db(email: EmailAddress, is_active: bool, created_at: DateTime<Utc>) -> Self {
        Self {
            email,
            is_active,
            created_at,
        }
    }

    pub fn email(&self) -> &EmailAddress {
        &self.email
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// 配信失敗による降格
    pub fn downgraded(self) -> Self {
        Self {
            is_active: false,
            ..self
        }
    }
}

/// 台帳上で非アクティブなアドレスを拒否する
///
/// 台帳に行がないアドレスは初回利用とみなして許可する。
///
/// # 引数
///
/// - `role`: エラーメッセージ用の役割名（"作成者" / "受信者"）
/// - `reputation`: 台帳の行（未登録なら `None`）
pub fn ensure_deliverable(
    role: &str,
    address: &EmailAddress,
    reputation: Option<&EmailReputation>,
) -> Result<(), DomainError> {
    match reputation {
        Some(r) if !r.is_active() => Err(DomainError::Validation(format!(
            "{role}のメールアドレスは配信停止中です: {address}"
        ))),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("user@example.com")]
    #[case("first.last+tag@sub.example.co.jp")]
    #[case("weird@name@example.com")]
    fn test_メールアドレスは正常な形式を受け入れる(#[case] input: &str) {
        assert!(EmailAddress::new(input).is_ok());
    }

    #[test]
    fn test_メールアドレスの前後の空白は除去される() {
        let address = EmailAddress::new("  user@example.com\n").unwrap();

        assert_eq!(address.as_str(), "user@example.com");
    }

    #[rstest]
    #[case("", "空文字列")]
    #[case("no-at-sign", "@記号なし")]
    #[case("@", "@のみ")]
    #[case("@example.com", "ローカル部分が空")]
    #[case("user@", "ドメイン部分が空")]
    #[case("user@localhost", "ドメインにドットなし")]
    #[case("user@example.", "末尾のラベルが空")]
    #[case("user@.example.com", "先頭のラベルが空")]
    #[case("us er@example.com", "空白を含む")]
    #[case(&format!("{}@example.com", "a".repeat(256)), "255文字超過")]
    fn test_メールアドレスは不正な形式を拒否する(
        #[case] input: &str,
        #[case] _reason: &str,
    ) {
        assert!(EmailAddress::new(input).is_err());
    }

    #[test]
    fn test_アドレス一覧の検証は失敗した位置を含める() {
        let result = parse_address_list(["a@example.com", "broken"]);

        let Err(DomainError::Validation(msg)) = result else {
            panic!("Validation エラーを期待");
        };
        assert!(msg.starts_with("1 番目の受信者"));
    }

    #[test]
    fn test_デシリアライズ時にもバリデーションされる() {
        let ok: Result<EmailAddress, _> = serde_json::from_str("\"a@example.com\"");
        let ng: Result<EmailAddress, _> = serde_json::from_str("\"a@localhost\"");

        assert!(ok.is_ok());
        assert!(ng.is_err());
    }

    #[test]
    fn test_降格すると非アクティブになる() {
        let now = chrono::Utc::now();
        let reputation =
            EmailReputation::first_seen(EmailAddress::new("a@example.com").unwrap(), now);

        let downgraded = reputation.clone().downgraded();

        assert!(reputation.is_active());
        assert!(!downgraded.is_active());
        assert_eq!(downgraded.created_at(), now);
    }

    #[rstest]
    #[case(None, true)]
    #[case(Some(true), true)]
    #[case(Some(false), false)]
    fn test_非アクティブなアドレスのみ拒否される(
        #[case] is_active: Option<bool>,
        #[case] expected_ok: bool,
    ) {
        let address = EmailAddress::new("a@example.com").unwrap();
        let reputation = is_active
            .map(|active| EmailReputation::from_db(address.clone(), active, chrono::Utc::now()));

        let result = ensure_deliverable("受信者", &address, reputation.as_ref());

        assert_eq!(result.is_ok(), expected_ok);
    }
}
