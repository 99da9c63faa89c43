//! スタブのメールベンダー

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use warisin_domain::mail::{MailItem, MailVendorError, SendFailure, SendResult};
use warisin_infra::MailVendor;

/// 送信したメールを記録するスタブベンダー
pub struct StubVendor {
    vendor_id:   &'static str,
    credentials: bool,
    outage:      bool,
    rejected:    Vec<String>,
    sent:        Mutex<Vec<MailItem>>,
}

impl StubVendor {
    fn build(
        vendor_id: &'static str,
        credentials: bool,
        outage: bool,
        rejected: &[&str],
    ) -> Arc<Self> {
        Arc::new(Self {
            vendor_id,
            credentials,
            outage,
            rejected: rejected.iter().map(ToString::to_string).collect(),
            sent: Mutex::new(Vec::new()),
        })
    }

    /// すべて受け付ける
    pub fn accepting(vendor_id: &'static str) -> Arc<Self> {
        Self::build(vendor_id, true, false, &[])
    }

    /// 指定したアドレス宛てだけ拒否する
    pub fn rejecting(vendor_id: &'static str, addresses: &[&str]) -> Arc<Self> {
        Self::build(vendor_id, true, false, addresses)
    }

    /// 呼び出し全体が失敗する
    pub fn unavailable(vendor_id: &'static str) -> Arc<Self> {
        Self::build(vendor_id, true, true, &[])
    }

    /// 認証情報がない（配分の対象外）
    pub fn without_credentials(vendor_id: &'static str) -> Arc<Self> {
        Self::build(vendor_id, false, false, &[])
    }

    /// 受け付けたメール（拒否したものを含む）
    pub fn sent(&self) -> Vec<MailItem> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl MailVendor for StubVendor {
    fn vendor_id(&self) -> &str {
        self.vendor_id
    }

    fn has_credentials(&self) -> bool {
        self.credentials
    }

    async fn send(&self, items: &[MailItem]) -> Result<Vec<SendResult>, MailVendorError> {
        if self.outage {
            return Err(MailVendorError::Transport("stub outage".to_string()));
        }
        self.sent.lock().unwrap().extend(items.iter().cloned());
        Ok(items
            .iter()
            .map(|item| {
                let rejected = item
                    .recipient_emails()
                    .iter()
                    .any(|email| self.rejected.contains(email));
                if rejected {
                    SendResult::failed(item, self.vendor_id, SendFailure::rejected("stub rejection"))
                } else {
                    SendResult::accepted(item, self.vendor_id)
                }
            })
            .collect())
    }
}
