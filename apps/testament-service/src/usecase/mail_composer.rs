//! # メール組み立て
//!
//! tera テンプレートエンジンでリマインダーと遺言のメールを HTML/plaintext 両形式で生成する。
//!
//! ## 設計方針
//!
//! - **`include_str!` によるコンパイル時埋め込み**: テンプレートはバイナリに埋め込まれる
//! - **件名**: リマインダーは固定、遺言は `Message from {作成者} sent by warisin.com`
//! - **リンク**: `{base_url}/?action={extend-message|unsubscribe-message}&id={id}&secret={secret}`

use tera::{Context, Tera};
use warisin_domain::{
    mail::{MailAddress, MailItem},
    message::{Message, MessageContent, MessageId, MessageWithReceivers},
    receiver::Receiver,
    secret::Secret,
};

use crate::error::ServiceError;

/// リマインダーの件名
pub const REMINDER_SUBJECT: &str = "Reminder to extend your warisin.com message";

/// 宛先の表示名
const RECIPIENT_NAME: &str = "Warisin User";

/// メール組み立て
///
/// 送信元アドレスとリンクのベース URL を保持する。
pub struct MailComposer {
    engine:   Tera,
    from:     MailAddress,
    base_url: String,
}

impl MailComposer {
    /// 新しいインスタンスを作成
    ///
    /// `include_str!` で埋め込んだテンプレートを tera に登録する。
    pub fn new(from: MailAddress, base_url: impl Into<String>) -> Result<Self, ServiceError> {
        Self::with_templates(
            from,
            base_url,
            vec![
                (
                    "reminder.html",
                    include_str!("../../templates/mail/reminder.html"),
                ),
                (
                    "reminder.txt",
                    include_str!("../../templates/mail/reminder.txt"),
                ),
                (
                    "testament.html",
                    include_str!("../../templates/mail/testament.html"),
                ),
                (
                    "testament.txt",
                    include_str!("../../templates/mail/testament.txt"),
                ),
            ],
        )
    }

    /// テンプレートを指定して作成
    pub(crate) fn with_templates(
        from: MailAddress,
        base_url: impl Into<String>,
        templates: Vec<(&str, &str)>,
    ) -> Result<Self, ServiceError> {
        let mut engine = Tera::default();
        engine
            .add_raw_templates(templates)
            .map_err(|e| ServiceError::Internal(format!("テンプレートの登録に失敗: {e}")))?;

        Ok(Self {
            engine,
            from,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// 延長リンク
    pub fn extension_url(&self, id: &MessageId, secret: &Secret) -> String {
        self.action_url("extend-message", id, secret)
    }

    /// 配信停止リンク
    pub fn unsubscribe_url(&self, id: &MessageId, secret: &Secret) -> String {
        self.action_url("unsubscribe-message", id, secret)
    }

    fn action_url(&self, action: &str, id: &MessageId, secret: &Secret) -> String {
        format!(
            "{}/?action={action}&id={id}&secret={}",
            self.base_url,
            secret.as_str()
        )
    }

    /// 作成者宛てのリマインダーを組み立てる
    ///
    /// 本文には表示中の受信者、配信予定日（`inactive_at` の日付）、延長リンクを載せる。
    pub fn reminder(&self, entry: &MessageWithReceivers) -> Result<MailItem, ServiceError> {
        let message = &entry.message;
        let receivers: Vec<&str> = entry
            .receivers
            .iter()
            .map(|r| r.email_receiver().as_str())
            .collect();

        let mut context = Context::new();
        context.insert("title", REMINDER_SUBJECT);
        context.insert("full_name", RECIPIENT_NAME);
        context.insert(
            "inactive_at",
            &message.inactive_at().format("%Y-%m-%d").to_string(),
        );
        context.insert("email_receivers", &receivers);
        context.insert(
            "extension_url",
            &self.extension_url(message.id(), message.extension_secret()),
        );

        self.render(
            "reminder",
            REMINDER_SUBJECT.to_string(),
            message.email_creator().as_str(),
            &context,
        )
    }

    /// 受信者宛ての遺言を組み立てる
    ///
    /// `content` は復号済みの本文。クライアント側で暗号化された本文には
    /// 読み方の案内を添える。
    pub fn testament(
        &self,
        message: &Message,
        content: &MessageContent,
        receiver: &Receiver,
    ) -> Result<MailItem, ServiceError> {
        let creator = message.email_creator().as_str();
        let subject = testament_subject(creator);

        let mut context = Context::new();
        context.insert("title", &subject);
        context.insert("full_name", receiver.email_receiver().as_str());
        context.insert("email_creator", creator);
        context.insert("message_content_per_line", &content.lines());
        context.insert("client_encrypted", &content.is_client_encrypted());
        context.insert(
            "unsubscribe_url",
            &self.unsubscribe_url(message.id(), receiver.unsubscribe_secret()),
        );

        self.render(
            "testament",
            subject,
            receiver.email_receiver().as_str(),
            &context,
        )
    }

    fn render(
        &self,
        template_name: &str,
        subject: String,
        to: &str,
        context: &Context,
    ) -> Result<MailItem, ServiceError> {
        let html_body = self
            .engine
            .render(&format!("{template_name}.html"), context)
            .map_err(|e| ServiceError::Internal(format!("メール本文の生成に失敗: {e}")))?;

        let text_body = self
            .engine
            .render(&format!("{template_name}.txt"), context)
            .map_err(|e| ServiceError::Internal(format!("メール本文の生成に失敗: {e}")))?;

        Ok(MailItem {
            from: self.from.clone(),
            to: vec![MailAddress::new(to, RECIPIENT_NAME)],
            subject,
            html_body,
            text_body,
        })
    }
}

/// 遺言の件名
pub fn testament_subject(creator: &str) -> String {
    format!("Message from {creator} sent by warisin.com")
}
