//! Sendgrid 送信実装
//!
//! Mail Send API v3（`POST /v3/mail/send`、Bearer 認証）を使用する。
//! 1 通を 1 personalization とし、本文は `%htmlContent%` / `%textContent%` の
//! 置換で personalization ごとに差し込む。
//!
//! Sendgrid は 1 件でも不正な宛先があるとリクエスト全体を拒否する。
//! そのため宛先はローカルで事前に検証し、不正なものは送信せずに拒否として返す。
//! 拒否レスポンスの `errors[].field` が `personalizations.{p}.to.{t}.email` なら
//! その personalization を拒否、残りはベンダー全体の失敗として扱う。

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use warisin_domain::{
    email::EmailAddress,
    mail::{MailAddress, MailItem, MailVendorError, SendFailure, SendResult},
};

use super::MailVendor;

const VENDOR_ID: &str = "SENDGRID";
const DEFAULT_BASE_URL: &str = "https://api.sendgrid.com";
const HTML_PLACEHOLDER: &str = "%htmlContent%";
const TEXT_PLACEHOLDER: &str = "%textContent%";

/// Sendgrid 送信
pub struct SendgridVendor {
    api_key:      String,
    sandbox_mode: bool,
    base_url:     String,
    client:       reqwest::Client,
}

impl SendgridVendor {
    pub fn new(api_key: impl Into<String>, sandbox_mode: bool) -> Self {
        Self {
            api_key: api_key.into(),
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
impl MailVendor for SendgridVendor {
    fn vendor_id(&self) -> &str {
        VENDOR_ID
    }

    fn has_credentials(&self) -> bool {
        !self.api_key.is_empty()
    }

    #[tracing::instrument(skip_all, fields(vendor_id = VENDOR_ID, items = items.len()))]
    async fn send(&self, items: &[MailItem]) -> Result<Vec<SendResult>, MailVendorError> {
        if !self.has_credentials() {
            return Err(MailVendorError::MissingCredentials(VENDOR_ID.to_string()));
        }

        // 宛先をローカルで検証し、送信対象の位置を控える
        let mut results: Vec<Option<SendResult>> = vec![None; items.len()];
        let mut sendable: Vec<usize> = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            match first_invalid_address(item) {
                Some(reason) => {
                    results[index] = Some(SendResult::failed(
                        item,
                        VENDOR_ID,
                        SendFailure::rejected(reason),
                    ));
                }
                None => sendable.push(index),
            }
        }

        if !sendable.is_empty() {
            let batch: Vec<&MailItem> = sendable.iter().map(|&i| &items[i]).collect();
            let request = build_request(&batch, self.sandbox_mode);
            let url = format!("{}/v3/mail/send", self.base_url);

            let response = self
                .client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&request)
                .send()
                .await
                .map_err(|e| MailVendorError::Transport(e.to_string()))?;

            let status = response.status();
            let body = response
                .text()
                .await
                .map_err(|e| MailVendorError::Transport(e.to_string()))?;

            let batch_results = map_response(&batch, status.as_u16(), &body)?;
            for (index, result) in sendable.into_iter().zip(batch_results) {
                results[index] = Some(result);
            }
        }

        Ok(results
            .into_iter()
            .zip(items)
            .map(|(result, item)| {
                result.unwrap_or_else(|| {
                    SendResult::failed(
                        item,
                        VENDOR_ID,
                        SendFailure::vendor_unavailable("送信結果がありません"),
                    )
                })
            })
            .collect())
    }
}

fn first_invalid_address(item: &MailItem) -> Option<String> {
    if item.to.is_empty() {
        return Some("宛先がありません".to_string());
    }
    item.to
        .iter()
        .find_map(|to| EmailAddress::new(to.email.as_str()).err())
        .map(|e| e.to_string())
}

// ===== リクエスト =====

#[derive(Debug, Serialize)]
struct SendRequest {
    personalizations: Vec<Personalization>,
    from:             Address,
    content:          Vec<Content>,
    mail_settings:    MailSettings,
}

#[derive(Debug, Serialize)]
struct Personalization {
    to:            Vec<Address>,
    from:          Address,
    subject:       String,
    substitutions: HashMap<&'static str, String>,
}

#[derive(Debug, Serialize)]
struct Address {
    email: String,
    name:  String,
}

impl From<&MailAddress> for Address {
    fn from(address: &MailAddress) -> Self {
        Self {
            email: address.email.clone(),
            name:  address.name.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct Content {
    #[serde(rename = "type")]
    content_type: &'static str,
    value:        &'static str,
}

#[derive(Debug, Serialize)]
struct MailSettings {
    sandbox_mode: Enable,
}

#[derive(Debug, Serialize)]
struct Enable {
    enable: bool,
}

/// `batch` は空でないこと（呼び出し側で保証する）
fn build_request(batch: &[&MailItem], sandbox_mode: bool) -> SendRequest {
    let from = batch
        .first()
        .map(|item| Address::from(&item.from))
        .unwrap_or(Address {
            email: String::new(),
            name:  String::new(),
        });

    SendRequest {
        personalizations: batch
            .iter()
            .map(|item| Personalization {
                to:            item.to.iter().map(Address::from).collect(),
                from:          Address::from(&item.from),
                subject:       item.subject.clone(),
                substitutions: HashMap::from([
                    (HTML_PLACEHOLDER, item.html_body.clone()),
                    (TEXT_PLACEHOLDER, item.text_body.clone()),
                ]),
            })
            .collect(),
        from,
        // Sendgrid は text/plain を text/html より前に置くことを要求する
        content: vec![
            Content {
                content_type: "text/plain",
                value:        TEXT_PLACEHOLDER,
            },
            Content {
                content_type: "text/html",
                value:        HTML_PLACEHOLDER,
            },
        ],
        mail_settings: MailSettings {
            sandbox_mode: Enable {
                enable: sandbox_mode,
            },
        },
    }
}

// ===== レスポンス =====

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    errors: Vec<ErrorDescription>,
}

#[derive(Debug, Deserialize)]
struct ErrorDescription {
    #[serde(default)]
    field:   Option<String>,
    #[serde(default)]
    message: String,
}

/// `personalizations.{p}.to.{t}.email` から p を取り出す
fn personalization_index(field: &str) -> Option<usize> {
    let parts: Vec<&str> = field.split('.').collect();
    match parts.as_slice() {
        ["personalizations", p, "to", t, "email"] if t.parse::<usize>().is_ok() => p.parse().ok(),
        _ => None,
    }
}

/// HTTP レスポンスを 1 通ごとの結果に変換する
fn map_response(
    batch: &[&MailItem],
    status: u16,
    body: &str,
) -> Result<Vec<SendResult>, MailVendorError> {
    if (200..300).contains(&status) {
        return Ok(batch
            .iter()
            .map(|item| SendResult::accepted(item, VENDOR_ID))
            .collect());
    }

    let parsed: ErrorResponse = serde_json::from_str(body).map_err(|_| {
        MailVendorError::UnexpectedResponse(format!("status {status}: {body}"))
    })?;

    // personalization ごとに最初のエラーを記録する
    let mut rejected: HashMap<usize, String> = HashMap::new();
    for error in &parsed.errors {
        match error.field.as_deref().and_then(personalization_index) {
            Some(p) if p < batch.len() => {
                rejected.entry(p).or_insert_with(|| error.message.clone());
            }
            _ => {
                tracing::warn!(field = ?error.field, message = %error.message, "Sendgrid の未知のエラー項目");
            }
        }
    }

    if rejected.is_empty() {
        return Err(MailVendorError::UnexpectedResponse(format!(
            "status {status}: {body}"
        )));
    }

    Ok(batch
        .iter()
        .enumerate()
        .map(|(p, item)| match rejected.get(&p) {
            Some(message) => SendResult::failed(item, VENDOR_ID, SendFailure::rejected(message)),
            // 他の宛先の不正でリクエスト全体が拒否された
            None => SendResult::failed(
                item,
                VENDOR_ID,
                SendFailure::vendor_unavailable(format!(
                    "Sendgrid がリクエスト全体を拒否しました（status {status}）"
                )),
            ),
        })
        .collect())
}
