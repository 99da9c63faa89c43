//! # Testament Service 設定
//!
//! 環境変数から Testament Service サーバーの設定を読み込む。
//!
//! 読み取りは [`ServiceConfig::from_lookup`] に集約し、テストでは
//! `HashMap` から値を渡す。

use std::{collections::HashMap, env, time::Duration};

use anyhow::{Context as _, bail};
use warisin_domain::{
    policy::{DeliveryPolicy, ReceiverPolicy},
    secret::SECRET_LENGTH,
};
use warisin_infra::encryption::KEY_SIZE;

/// Testament Service サーバーの設定
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// バインドアドレス
    pub host: String,
    /// ポート番号
    pub port: u16,
    /// データベース接続 URL
    pub database_url: String,
    /// 本文暗号化の鍵（32 バイト）
    pub encryption_key: String,
    /// スケジューラー呼び出し用の共有シークレット（69 文字）
    pub static_secret: String,
    /// メール設定
    pub mail: MailConfig,
    /// 受信者数のポリシー
    pub receiver_policy: ReceiverPolicy,
    /// 遺言配信後のポリシー
    pub delivery_policy: DeliveryPolicy,
}

/// メール送信の設定
///
/// 認証情報が空のベンダーは配分の対象から外れる。
/// `MAIL_NOOP=true` の場合はすべてのベンダーを Noop に置き換える。
#[derive(Debug, Clone)]
pub struct MailConfig {
    /// 送信元メールアドレス
    pub from_address:         String,
    /// 送信元の表示名
    pub from_name:            String,
    /// メール内リンクのベース URL
    pub public_base_url:      String,
    pub mailjet_api_key:      String,
    pub mailjet_secret_key:   String,
    pub mailjet_daily_limit:  u32,
    pub sendgrid_api_key:     String,
    pub sendgrid_daily_limit: u32,
    /// SMTP ホスト（未設定なら SMTP ベンダーを使わない）
    pub smtp_host:            Option<String>,
    pub smtp_port:            u16,
    pub smtp_daily_limit:     u32,
    /// ベンダーのサンドボックスモード
    pub sandbox_mode:         bool,
    /// 送信せずログ出力のみ行う
    pub noop:                 bool,
    /// 1 回のベンダー呼び出しの上限時間
    pub vendor_timeout:       Duration,
}

impl ServiceConfig {
    /// 環境変数から設定を読み込む
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// キーから値を引く関数で設定を読み込む
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let vars = Vars(lookup);

        let port = vars
            .required("SERVICE_PORT")?
            .parse()
            .context("SERVICE_PORT は有効なポート番号である必要があります")?;

        let encryption_key = vars.required("ENCRYPTION_KEY")?;
        if encryption_key.len() != KEY_SIZE {
            bail!("ENCRYPTION_KEY は {KEY_SIZE} バイトである必要があります");
        }

        let static_secret = vars.required("STATIC_SECRET")?;
        if static_secret.chars().count() != SECRET_LENGTH {
            bail!("STATIC_SECRET は {SECRET_LENGTH} 文字である必要があります");
        }

        Ok(Self {
            host: vars.or("SERVICE_HOST", "0.0.0.0"),
            port,
            database_url: vars.required("DATABASE_URL")?,
            encryption_key,
            static_secret,
            mail: MailConfig::from_vars(&vars)?,
            receiver_policy: ReceiverPolicy {
                cap_applies_on_update: vars.flag("RECEIVER_CAP_ON_UPDATE", true)?,
            },
            delivery_policy: DeliveryPolicy {
                deactivate_on_delivery: vars.flag("DEACTIVATE_ON_DELIVERY", false)?,
            },
        })
    }

    /// テスト用に値の一覧から読み込む
    pub fn from_map(values: &HashMap<&str, &str>) -> anyhow::Result<Self> {
        Self::from_lookup(|key| values.get(key).map(ToString::to_string))
    }
}

impl MailConfig {
    fn from_vars<F: Fn(&str) -> Option<String>>(vars: &Vars<F>) -> anyhow::Result<Self> {
        Ok(Self {
            from_address:         vars.or("MAIL_FROM_ADDRESS", "noreply@warisin.com"),
            from_name:            vars.or("MAIL_FROM_NAME", "Warisin Service"),
            public_base_url:      vars
                .or("PUBLIC_BASE_URL", "https://warisin.com")
                .trim_end_matches('/')
                .to_string(),
            mailjet_api_key:      vars.or("MAILJET_API_KEY", ""),
            mailjet_secret_key:   vars.or("MAILJET_SECRET_KEY", ""),
            mailjet_daily_limit:  vars.number("MAILJET_DAILY_LIMIT", 200)?,
            sendgrid_api_key:     vars.or("SENDGRID_API_KEY", ""),
            sendgrid_daily_limit: vars.number("SENDGRID_DAILY_LIMIT", 100)?,
            smtp_host:            vars.optional("SMTP_HOST"),
            smtp_port:            vars.number("SMTP_PORT", 1025)?,
            smtp_daily_limit:     vars.number("SMTP_DAILY_LIMIT", 100)?,
            sandbox_mode:         vars.flag("MAIL_SANDBOX_MODE", false)?,
            noop:                 vars.flag("MAIL_NOOP", false)?,
            vendor_timeout:       Duration::from_secs(
                vars.number("MAIL_VENDOR_TIMEOUT_SECS", 30)?,
            ),
        })
    }
}

/// 値の取得と型変換
struct Vars<F>(F);

impl<F: Fn(&str) -> Option<String>> Vars<F> {
    /// 空文字は未設定として扱う
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    fn required(&self, key: &str) -> anyhow::Result<String> {
        self.optional(key)
            .with_context(|| format!("{key} が設定されていません"))
    }

    fn or(&self, key: &str, default: &str) -> String {
        self.optional(key).unwrap_or_else(|| default.to_string())
    }

    fn number<T: std::str::FromStr>(&self, key: &str, default: T) -> anyhow::Result<T> {
        match self.optional(key) {
            Some(value) => value
                .trim()
                .parse()
                .map_err(|_| anyhow::anyhow!("{key} は数値である必要があります: {value}")),
            None => Ok(default),
        }
    }

    fn flag(&self, key: &str, default: bool) -> anyhow::Result<bool> {
        match self.optional(key).as_deref().map(str::trim) {
            Some("true" | "1") => Ok(true),
            Some("false" | "0") => Ok(false),
            Some(other) => bail!("{key} は true か false である必要があります: {other}"),
            None => Ok(default),
        }
    }
}
