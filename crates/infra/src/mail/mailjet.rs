//! Mailjet 送信実装
//!
//! Send API v3.1（`POST /v3.1/send`、Basic 認証）を使用する。
//! 1 回の呼び出しで複数メッセージを送り、レスポンスの `Messages[i]` が
//! 入力の `items[i]` に対応する。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use warisin_domain::mail::{MailAddress, MailItem, MailVendorError, SendFailure, SendResult};

use super::MailVendor;

const VENDOR_ID: &str = "MAILJET";
const DEFAULT_BASE_URL: &str = "https://api.mailjet.com";
const CUSTOM_ID: &str = "warisin";

/// Mailjet 送信
pub struct MailjetVendor {
    api_key:      String,
    secret_key:   String,
    sandbox_mode: bool,
    base_url:     String,
    client:       reqwest::Client,
}

impl MailjetVendor {
    /// 新しい Mailjet 送信インスタンスを作成
    ///
    /// API キーとシークレットキーのどちらかが空なら認証情報なしとして扱う。
    pub fn new(api_key: impl Into<String>, secret_key: impl Into<String>, sandbox_mode: bool) -> Self {
        Self {
            api_key: api_key.into(),
            secret_key: secret_key.into(),
            sandbox_mode,
            base_url: DEFAULT_BASE_URL.to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// 接続先を差し替える（テスト用スタブサーバーなど）
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl MailVendor for MailjetVendor {
    fn vendor_id(&self) -> &str {
        VENDOR_ID
    }

    fn has_credentials(&self) -> bool {
        !self.api_key.is_empty() && !self.secret_key.is_empty()
    }

    #[tracing::instrument(skip_all, fields(vendor_id = VENDOR_ID, items = items.len()))]
    async fn send(&self, items: &[MailItem]) -> Result<Vec<SendResult>, MailVendorError> {
        if !self.has_credentials() {
            return Err(MailVendorError::MissingCredentials(VENDOR_ID.to_string()));
        }

        let url = format!("{}/v3.1/send", self.base_url);
        let request = build_request(items, self.sandbox_mode);

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.api_key, Some(&self.secret_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| MailVendorError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| MailVendorError::Transport(e.to_string()))?;

        map_response(items, status.as_u16(), &body)
    }
}

// ===== リクエスト =====

#[derive(Debug, Serialize)]
struct SendRequest {
    #[serde(rename = "Messages")]
    messages:     Vec<OutboundMessage>,
    #[serde(rename = "SandboxMode")]
    sandbox_mode: bool,
}

#[derive(Debug, Serialize)]
struct OutboundMessage {
    #[serde(rename = "From")]
    from:      Recipient,
    #[serde(rename = "To")]
    to:        Vec<Recipient>,
    #[serde(rename = "Subject")]
    subject:   String,
    #[serde(rename = "TextPart")]
    text_part: String,
    #[serde(rename = "HTMLPart")]
    html_part: String,
    #[serde(rename = "CustomID")]
    custom_id: &'static str,
}

#[derive(Debug, Serialize)]
struct Recipient {
    #[serde(rename = "Email")]
    email: String,
    #[serde(rename = "Name")]
    name:  String,
}

impl From<&MailAddress> for Recipient {
    fn from(address: &MailAddress) -> Self {
        Self {
            email: address.email.clone(),
            name:  address.name.clone(),
        }
    }
}

fn build_request(items: &[MailItem], sandbox_mode: bool) -> SendRequest {
    SendRequest {
        messages: items
            .iter()
            .map(|item| OutboundMessage {
                from:      Recipient::from(&item.from),
                to:        item.to.iter().map(Recipient::from).collect(),
                subject:   item.subject.clone(),
                text_part: item.text_body.clone(),
                html_part: item.html_body.clone(),
                custom_id: CUSTOM_ID,
            })
            .collect(),
        sandbox_mode,
    }
}

// ===== レスポンス =====

#[derive(Debug, Deserialize)]
struct SendResponse {
    #[serde(rename = "Messages", default)]
    messages: Vec<MessageResult>,
}

#[derive(Debug, Deserialize)]
struct MessageResult {
    #[serde(rename = "Status", default)]
    status: String,
    #[serde(rename = "Errors", default)]
    errors: Vec<MessageError>,
}

#[derive(Debug, Deserialize)]
struct MessageError {
    #[serde(rename = "ErrorMessage", default)]
    error_message: String,
}

/// HTTP レスポンスを 1 通ごとの結果に変換する
///
/// - 2xx / 400 で `Messages` が入力と同数: 位置ごとに `Status` を見る
/// - それ以外（認証失敗、5xx、件数不一致など）: ベンダー全体の失敗
fn map_response(
    items: &[MailItem],
    status: u16,
    body: &str,
) -> Result<Vec<SendResult>, MailVendorError> {
    let parsed: Option<SendResponse> = serde_json::from_str(body).ok();

    let messages = match parsed {
        Some(response) if response.messages.len() == items.len() => response.messages,
        _ => {
            return Err(MailVendorError::UnexpectedResponse(format!(
                "status {status}: {body}"
            )));
        }
    };

    if !(200..300).contains(&status) && status != 400 {
        return Err(MailVendorError::UnexpectedResponse(format!(
            "status {status}: {body}"
        )));
    }

    Ok(items
        .iter()
        .zip(messages)
        .map(|(item, message)| {
            if message.status == "success" && message.errors.is_empty() {
                SendResult::accepted(item, VENDOR_ID)
            } else {
                let reason = message
                    .errors
                    .first()
                    .map(|e| e.error_message.clone())
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| format!("Mailjet status: {}", message.status));
                SendResult::failed(item, VENDOR_ID, SendFailure::rejected(reason))
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use axum::{Json, Router, routing::post};
    use pretty_assertions::assert_eq;
    use serde_json::{Value, json};

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
    fn test_リクエストはmailjetの形式でシリアライズされる() {
        let request = build_request(&[item("a@example.com")], true);

        let value = serde_json::to_value(&request).unwrap();

        assert_eq!(
            value,
            json!({
                "Messages": [{
                    "From": {"Email": "noreply@warisin.com", "Name": "Warisin Service"},
                    "To": [{"Email": "a@example.com", "Name": "Warisin User"}],
                    "Subject": "件名",
                    "TextPart": "本文",
                    "HTMLPart": "<p>本文</p>",
                    "CustomID": "warisin"
                }],
                "SandboxMode": true
            })
        );
    }

    #[test]
    fn test_成功レスポンスは全件accepted() {
        let items = vec![item("a@example.com"), item("b@example.com")];
        let body = json!({"Messages": [{"Status": "success"}, {"Status": "success"}]}).to_string();

        let results = map_response(&items, 200, &body).unwrap();

        assert!(results.iter().all(SendResult::is_success));
        assert_eq!(results[1].emails, vec!["b@example.com".to_string()]);
    }

    #[test]
    fn test_部分失敗は位置ごとにrejectedになる() {
        let items = vec![item("a@example.com"), item("broken@example.com")];
        let body = json!({"Messages": [
            {"Status": "success"},
            {"Status": "error", "Errors": [{"ErrorMessage": "Invalid email address"}]}
        ]})
        .to_string();

        let results = map_response(&items, 400, &body).unwrap();

        assert!(results[0].is_success());
        assert!(results[1].is_rejected());
        assert_eq!(
            results[1].error.as_ref().map(|e| e.message.as_str()),
            Some("Invalid email address")
        );
    }

    #[rstest::rstest]
    #[case(401, r#"{"ErrorMessage": "API key authentication/authorization failure"}"#)]
    #[case(500, "Internal Server Error")]
    #[case(200, r#"{"Messages": []}"#)]
    fn test_想定外のレスポンスはベンダー全体の失敗(#[case] status: u16, #[case] body: &str) {
        let result = map_response(&[item("a@example.com")], status, body);

        assert!(matches!(result, Err(MailVendorError::UnexpectedResponse(_))));
    }

    #[tokio::test]
    async fn test_認証情報がなければ送信しない() {
        let sut = MailjetVendor::new("", "secret", false);

        let result = sut.send(&[item("a@example.com")]).await;

        assert!(!sut.has_credentials());
        assert!(matches!(result, Err(MailVendorError::MissingCredentials(_))));
    }

    #[tokio::test]
    async fn test_スタブサーバーに送信して結果を受け取る() {
        // Given: 受け取ったメッセージ数だけ success を返すスタブ
        let app = Router::new().route(
            "/v3.1/send",
            post(|Json(body): Json<Value>| async move {
                let count = body["Messages"].as_array().map_or(0, Vec::len);
                let messages: Vec<Value> = (0..count).map(|_| json!({"Status": "success"})).collect();
                Json(json!({"Messages": messages}))
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        let sut = MailjetVendor::new("key", "secret", true).with_base_url(&format!("http://{addr}"));

        // When
        let results = sut
            .send(&[item("a@example.com"), item("b@example.com")])
            .await
            .unwrap();

        // Then
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.is_success() && r.vendor_id == "MAILJET"));
    }
}
