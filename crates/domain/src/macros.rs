/// UUID ベースの ID 型を定義する宣言型マクロ
///
/// 以下のボイラープレートを一括生成する:
/// - Newtype 構造体（`Uuid` をラップ）
/// - `derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display)`
/// - `new()`: UUID v7 を生成
/// - `from_uuid()`: 既存 UUID から復元
/// - `as_uuid()`: 内部 UUID への参照
/// - `Default` impl（`new()` に委譲）
///
/// # 使用例
///
/// ```rust
/// use warisin_domain::message::MessageId;
///
/// let id = MessageId::new();
/// let restored = MessageId::from_uuid(*id.as_uuid());
/// assert_eq!(id, restored);
/// ```
macro_rules! define_uuid_id {
    (
        $(#[$meta:meta])*
        $vis:vis struct $Name:ident;
    ) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, PartialEq, Eq, Hash,
            serde::Serialize, serde::Deserialize,
            derive_more::Display,
        )]
        #[display("{_0}")]
        #[serde(transparent)]
        $vis struct $Name(uuid::Uuid);

        impl $Name {
            /// 新しい ID を生成する（UUID v7）
            pub fn new() -> Self {
                Self(uuid::Uuid::now_v7())
            }

            /// 既存の UUID から ID を作成する
            pub fn from_uuid(uuid: uuid::Uuid) -> Self {
                Self(uuid)
            }

            /// 内部の UUID 参照を取得する
            pub fn as_uuid(&self) -> &uuid::Uuid {
                &self.0
            }
        }

        impl Default for $Name {
            fn default() -> Self {
                Self::new()
            }
        }
    };
}

/// 範囲付きの日数 Newtype を定義する宣言型マクロ
///
/// 以下のボイラープレートを一括生成する:
/// - Newtype 構造体（`i32` をラップ、`Copy`）
/// - `new()`: 閉区間 `[$min, $max]` の範囲チェック
/// - `value()`: 内部値
/// - `MIN` / `MAX` 定数
///
/// # 引数
///
/// - `$label`: エラーメッセージに使うラベル（例: `"非アクティブ期間"`）
/// - `min` / `max`: 許容する日数（両端を含む）
macro_rules! define_bounded_days {
    (
        $(#[$meta:meta])*
        $vis:vis struct $Name:ident {
            label: $label:expr,
            min: $min:expr,
            max: $max:expr $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord,
            serde::Serialize, serde::Deserialize,
            derive_more::Display,
        )]
        #[display("{_0}")]
        #[serde(try_from = "i32", into = "i32")]
        $vis struct $Name(i32);

        impl $Name {
            /// 許容する最小日数
            pub const MIN: i32 = $min;
            /// 許容する最大日数
            pub const MAX: i32 = $max;

            pub fn new(value: i32) -> Result<Self, $crate::DomainError> {
                if !(Self::MIN..=Self::MAX).contains(&value) {
                    return Err($crate::DomainError::Validation(format!(
                        "{}は {} 日から {} 日の範囲で指定してください（指定値: {}）",
                        $label,
                        Self::MIN,
                        Self::MAX,
                        value
                    )));
                }
                Ok(Self(value))
            }

            /// 日数を取得する
            pub fn value(self) -> i32 {
                self.0
            }
        }

        impl TryFrom<i32> for $Name {
            type Error = $crate::DomainError;

            fn try_from(value: i32) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$Name> for i32 {
            fn from(days: $Name) -> Self {
                days.0
            }
        }
    };
}
