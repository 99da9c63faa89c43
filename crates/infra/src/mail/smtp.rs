//! SMTP 送信実装
//!
//! lettre の `AsyncSmtpTransport` を使用してメールを 1 通ずつ送信する。
//! 開発環境では Mailpit（ローカル SMTP サーバー）に接続する。
//!
//! SMTP の恒久的エラー（5xx 応答）とアドレス不正は拒否として扱う。
//! 一時的エラーや接続失敗はベンダー全体の失敗として扱い、
//! 全件が接続失敗ならクリティカルエラーを返す。

use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport,
    AsyncTransport,
    Tokio1Executor,
    message::{Mailbox, Message, MultiPart, SinglePart, header::ContentType},
};
use warisin_domain::mail::{MailAddress, MailItem, MailVendorError, SendFailure, SendResult};

use super::MailVendor;

const VENDOR_ID: &str = "SMTP";

/// SMTP 送信
///
/// `lettre::AsyncSmtpTransport<Tokio1Executor>` をラップする。
pub struct SmtpVendor {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpVendor {
    /// 新しい SMTP 送信インスタンスを作成
    ///
    /// # 引数
    ///
    /// - `host`: SMTP サーバーのホスト名（例: "localhost"）
    /// - `port`: SMTP サーバーのポート番号（例: 1025 for Mailpit）
    pub fn new(host: &str, port: u16) -> Self {
        // builder_dangerous: TLS なしで接続（Mailpit 等のローカル SMTP 向け）
        let transport = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
            .port(port)
            .build();

        Self { transport }
    }
}

fn mailbox(address: &MailAddress) -> Result<Mailbox, String> {
    let email = address
        .email
        .parse()
        .map_err(|e| format!("アドレス不正 {}: {e}", address.email))?;
    let name = (!address.name.is_empty()).then(|| address.name.clone());
    Ok(Mailbox::new(name, email))
}

fn build_message(item: &MailItem) -> Result<Message, String> {
    let mut builder = Message::builder()
        .from(mailbox(&item.from)?)
        .subject(&item.subject);
    for to in &item.to {
        builder = builder.to(mailbox(to)?);
    }

    builder
        .multipart(
            MultiPart::alternative()
                .singlepart(
                    SinglePart::builder()
                        .header(ContentType::TEXT_PLAIN)
                        .body(item.text_body.clone()),
                )
                .singlepart(
                    SinglePart::builder()
                        .header(ContentType::TEXT_HTML)
                        .body(item.html_body.clone()),
                ),
        )
        .map_err(|e| format!("メッセージ構築失敗: {e}"))
}

#[async_trait]
impl MailVendor for SmtpVendor {
    fn vendor_id(&self) -> &str {
        VENDOR_ID
    }

    fn has_credentials(&self) -> bool {
        // 接続先が設定されている場合にだけ構築されるため常に真
        true
    }

    #[tracing::instrument(skip_all, fields(vendor_id = VENDOR_ID, items = items.len()))]
    async fn send(&self, items: &[MailItem]) -> Result<Vec<SendResult>, MailVendorError> {
        let mut results = Vec::with_capacity(items.len());
        let mut connection_failures = 0usize;
        let mut last_connection_error = String::new();

        for item in items {
            let message = match build_message(item) {
                Ok(message) => message,
                Err(reason) => {
                    results.push(SendResult::failed(
                        item,
                        VENDOR_ID,
                        SendFailure::rejected(reason),
                    ));
                    continue;
                }
            };

            match self.transport.send(message).await {
                Ok(_) => results.push(SendResult::accepted(item, VENDOR_ID)),
                Err(e) if e.is_permanent() => results.push(SendResult::failed(
                    item,
                    VENDOR_ID,
                    SendFailure::rejected(format!("SMTP 送信拒否: {e}")),
                )),
                Err(e) => {
                    connection_failures += 1;
                    last_connection_error = e.to_string();
                    results.push(SendResult::failed(
                        item,
                        VENDOR_ID,
                        SendFailure::vendor_unavailable(format!("SMTP 送信失敗: {e}")),
                    ));
                }
            }
        }

        if !items.is_empty() && connection_failures == items.len() {
            return Err(MailVendorError::Transport(last_connection_error));
        }

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(to: &str) -> MailItem {
        MailItem {
            from:      MailAddress::new("noreply@warisin.com", "Warisin Service"),
            to:        vec![MailAddress::new(to, "Warisin User")],
            subject:   "件名".to_string(),
            html_body: "<p>本文</p>".to_string(),
            text_body: "本文".to_string(),
        }
    }

    #[test]
    fn トレイトはsendとsyncを実装している() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SmtpVendor>();
    }

    #[test]
    fn test_正しいアドレスならメッセージを構築できる() {
        assert!(build_message(&item("a@example.com")).is_ok());
    }

    #[test]
    fn test_不正なアドレスはメッセージ構築に失敗する() {
        assert!(build_message(&item("not an address")).is_err());
    }

    #[tokio::test]
    async fn test_不正なアドレスは送信せずにrejected() {
        let sut = SmtpVendor::new("127.0.0.1", 9);

        let results = sut.send(&[item("not an address")]).await.unwrap();

        assert!(results[0].is_rejected());
    }

    #[tokio::test]
    async fn test_接続できなければベンダー全体の失敗() {
        // ポート 9（discard）は通常閉じている
        let sut = SmtpVendor::new("127.0.0.1", 9);

        let result = sut.send(&[item("a@example.com")]).await;

        assert!(matches!(result, Err(MailVendorError::Transport(_))));
    }
}
