//! Noop 送信実装
//!
//! メールを実際に送信せず、ログ出力のみ行う。
//! ローカル開発やメール送信を無効化したい環境で使用する。

use async_trait::async_trait;
use warisin_domain::mail::{MailItem, MailVendorError, SendResult};

use super::MailVendor;

const VENDOR_ID: &str = "NOOP";

/// Noop 送信（ログ出力のみ）
#[derive(Debug, Clone)]
pub struct NoopVendor;

#[async_trait]
impl MailVendor for NoopVendor {
    fn vendor_id(&self) -> &str {
        VENDOR_ID
    }

    fn has_credentials(&self) -> bool {
        true
    }

    async fn send(&self, items: &[MailItem]) -> Result<Vec<SendResult>, MailVendorError> {
        Ok(items
            .iter()
            .map(|item| {
                tracing::info!(
                    to = ?item.recipient_emails(),
                    subject = %item.subject,
                    "Noop: メール送信をスキップ"
                );
                SendResult::accepted(item, VENDOR_ID)
            })
            .collect())
    }
}
