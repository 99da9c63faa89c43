//! # メール送信
//!
//! 複数のメールベンダーへの送信を担当するインフラストラクチャモジュール。
//!
//! ## 設計方針
//!
//! - **trait による抽象化**: `MailVendor` trait で「まとめて送信し、1 通ごとの成否を返す」
//!   だけを契約とする
//! - **4 つの実装**: Mailjet / Sendgrid（本番用 HTTP API）、SMTP（Mailpit 開発用）、
//!   Noop（ログ出力のみ）
//! - **配分と集約**: [`MailDispatcher`] が日次上限の比率で各ベンダーに振り分け、
//!   結果を入力順に並べ直す
//!
//! ## 失敗の扱い
//!
//! | 失敗 | 表現 | 評判への影響 |
//! |------|------|-------------|
//! | ベンダー呼び出し全体の失敗 | `Err(MailVendorError)` → スライス全件 `VendorUnavailable` | なし |
//! | 1 通ごとの拒否 | `SendResult { error: Some(Rejected) }` | 送信先を非アクティブ化 |

mod dispatcher;
mod mailjet;
mod noop;
mod sendgrid;
mod smtp;

use async_trait::async_trait;
pub use dispatcher::{MailDispatcher, VendorSlot};
pub use mailjet::MailjetVendor;
pub use noop::NoopVendor;
pub use sendgrid::SendgridVendor;
pub use smtp::SmtpVendor;
use warisin_domain::mail::{MailItem, MailVendorError, SendResult};

/// メールベンダー trait
///
/// 戻り値の `Vec<SendResult>` は `items` と同じ長さで、位置で対応すること。
/// 長さが違う場合、ディスパッチャーはベンダー全体の失敗として扱う。
#[async_trait]
pub trait MailVendor: Send + Sync {
    /// ベンダー識別子（"MAILJET" など）
    fn vendor_id(&self) -> &str;

    /// 認証情報が設定されているか
    ///
    /// 偽のベンダーは配分の対象から外れる。
    fn has_credentials(&self) -> bool;

    /// メールをまとめて送信する
    async fn send(&self, items: &[MailItem]) -> Result<Vec<SendResult>, MailVendorError>;
}
