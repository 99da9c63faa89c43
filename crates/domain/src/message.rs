//! # メッセージ（遺言）
//!
//! 作成者が保存する暗号化済みの本文と、配信タイマーを管理する。
//!
//! ## ライフサイクル
//!
//! フェーズは保存せず、時刻だけから導出する（[`MessagePhase`]）。
//!
//! ```text
//! Dormant ──(next_reminder_at 経過)──→ ReminderDue ──(inactive_at 経過)──→ DeliveryDue
//!    ↑                                      │                                  │
//!    └──────────── extended() ──────────────┴──────────────────────────────────┘
//! ```
//!
//! - リマインダー送信成功: `next_reminder_at += reminder_interval_days`
//! - 遺言配信成功: `inactive_at += 15 日`、`sent_counter += 1`
//! - 延長: 期限を当日 0 時（UTC）から再計算し、延長用シークレットを再発行
//!
//! 更新（[`Message::updated`]）はタイマーを変更しない。
//! 配信待ちを取り消せるのは延長だけである。

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    DomainError,
    clock::{days, start_of_day},
    email::EmailAddress,
    receiver::Receiver,
    secret::Secret,
};

define_uuid_id! {
    /// メッセージ ID
    pub struct MessageId;
}

define_bounded_days! {
    /// 非アクティブ期間（日）
    ///
    /// この期間チェックインがなければ遺言が配信される。
    pub struct InactivePeriodDays {
        label: "非アクティブ期間",
        min: 30,
        max: 360,
    }
}

define_bounded_days! {
    /// リマインダー間隔（日）
    pub struct ReminderIntervalDays {
        label: "リマインダー間隔",
        min: 15,
        max: 30,
    }
}

/// 本文の最大文字数（Unicode スカラー値で数える）
pub const MAX_CONTENT_CHARS: usize = 800;

/// クライアント側で暗号化済みであることを示す接頭辞
///
/// この接頭辞で始まる本文はサーバー側で暗号化・復号しない。
pub const CLIENT_ENCRYPTED_MARKER: &str = "aes.utf8:";

/// 遺言配信後に `inactive_at` を先送りする日数
pub const DELIVERY_GRACE_DAYS: i32 = 15;

/// メッセージ本文（平文）
///
/// 空文字列は許容する。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MessageContent(String);

impl MessageContent {
    /// # エラー
    ///
    /// 800 文字を超える場合は `DomainError::Validation` を返す。
    pub fn new(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into();
        let len = value.chars().count();
        if len > MAX_CONTENT_CHARS {
            return Err(DomainError::Validation(format!(
                "本文は{MAX_CONTENT_CHARS}文字以内である必要があります（{len} 文字）"
            )));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// クライアント側で暗号化済みか
    pub fn is_client_encrypted(&self) -> bool {
        self.0.starts_with(CLIENT_ENCRYPTED_MARKER)
    }

    /// 本文を行ごとに分割する（メール本文の生成用）
    pub fn lines(&self) -> Vec<&str> {
        self.0.split('\n').collect()
    }
}

impl TryFrom<String> for MessageContent {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<MessageContent> for String {
    fn from(content: MessageContent) -> Self {
        content.0
    }
}

/// 時刻から導出されるメッセージのフェーズ
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display, strum::IntoStaticStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MessagePhase {
    /// 期限前、または非アクティブ
    Dormant,
    /// リマインダー送信待ち
    ReminderDue,
    /// 遺言配信待ち
    DeliveryDue,
}

/// 配信期限の組
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadlines {
    pub inactive_at:      DateTime<Utc>,
    pub next_reminder_at: DateTime<Utc>,
}

impl Deadlines {
    /// 当日 0 時（UTC）を起点に期限を計算する
    pub fn starting_from(
        now: DateTime<Utc>,
        inactive_period_days: InactivePeriodDays,
        reminder_interval_days: ReminderIntervalDays,
    ) -> Self {
        let today = start_of_day(now);
        Self {
            inactive_at:      today + days(inactive_period_days.value()),
            next_reminder_at: today + days(reminder_interval_days.value()),
        }
    }
}

/// メッセージエンティティ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    id: MessageId,
    email_creator: EmailAddress,
    created_at: DateTime<Utc>,
    content_encrypted: String,
    inactive_period_days: InactivePeriodDays,
    reminder_interval_days: ReminderIntervalDays,
    is_active: bool,
    extension_secret: Secret,
    inactive_at: DateTime<Utc>,
    next_reminder_at: DateTime<Utc>,
    sent_counter: i32,
}

/// メッセージの新規作成パラメータ
pub struct NewMessage {
    pub id: MessageId,
    pub email_creator: EmailAddress,
    pub content_encrypted: String,
    pub inactive_period_days: InactivePeriodDays,
    pub reminder_interval_days: ReminderIntervalDays,
    pub extension_secret: Secret,
    /// 指定がなければ当日 0 時から計算する
    pub deadlines: Option<Deadlines>,
    pub now: DateTime<Utc>,
}

/// メッセージの DB 復元パラメータ
pub struct MessageRecord {
    pub id: MessageId,
    pub email_creator: EmailAddress,
    pub created_at: DateTime<Utc>,
    pub content_encrypted: String,
    pub inactive_period_days: InactivePeriodDays,
    pub reminder_interval_days: ReminderIntervalDays,
    pub is_active: bool,
    pub extension_secret: Secret,
    pub inactive_at: DateTime<Utc>,
    pub next_reminder_at: DateTime<Utc>,
    pub sent_counter: i32,
}

/// 作成者による更新内容
pub struct MessageUpdate {
    pub content_encrypted: String,
    pub inactive_period_days: InactivePeriodDays,
    pub reminder_interval_days: ReminderIntervalDays,
    pub is_active: bool,
    pub extension_secret: Secret,
}

impl Message {
    /// 新しいメッセージを作成する
    pub fn new(params: NewMessage) -> Self {
        let deadlines = params.deadlines.unwrap_or_else(|| {
            Deadlines::starting_from(
                params.now,
                params.inactive_period_days,
                params.reminder_interval_days,
            )
        });
        Self {
            id: params.id,
            email_creator: params.email_creator,
            created_at: params.now,
            content_encrypted: params.content_encrypted,
            inactive_period_days: params.inactive_period_days,
            reminder_interval_days: params.reminder_interval_days,
            is_active: true,
            extension_secret: params.extension_secret,
            inactive_at: deadlines.inactive_at,
            next_reminder_at: deadlines.next_reminder_at,
            sent_counter: 0,
        }
    }

    /// 既存のデータから復元する
    pub fn from_db(record: MessageRecord) -> Self {
        Self {
            id: record.id,
            email_creator: record.email_creator,
            created_at: record.created_at,
            content_encrypted: record.content_encrypted,
            inactive_period_days: record.inactive_period_days,
            reminder_interval_days: record.reminder_interval_days,
            is_active: record.is_active,
            extension_secret: record.extension_secret,
            inactive_at: record.inactive_at,
            next_reminder_at: record.next_reminder_at,
            sent_counter: record.sent_counter,
        }
    }

    // Getter メソッド

    pub fn id(&self) -> &MessageId {
        &self.id
    }

    pub fn email_creator(&self) -> &EmailAddress {
        &self.email_creator
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn content_encrypted(&self) -> &str {
        &self.content_encrypted
    }

    pub fn inactive_period_days(&self) -> InactivePeriodDays {
        self.inactive_period_days
    }

    pub fn reminder_interval_days(&self) -> ReminderIntervalDays {
        self.reminder_interval_days
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn extension_secret(&self) -> &Secret {
        &self.extension_secret
    }

    pub fn inactive_at(&self) -> DateTime<Utc> {
        self.inactive_at
    }

    pub fn next_reminder_at(&self) -> DateTime<Utc> {
        self.next_reminder_at
    }

    pub fn sent_counter(&self) -> i32 {
        self.sent_counter
    }

    pub fn deadlines(&self) -> Deadlines {
        Deadlines {
            inactive_at:      self.inactive_at,
            next_reminder_at: self.next_reminder_at,
        }
    }

    // ビジネスロジック

    /// 指定した作成者の所有か
    pub fn is_owned_by(&self, creator: &EmailAddress) -> bool {
        &self.email_creator == creator
    }

    /// 所有者でなければ Forbidden を返す
    pub fn ensure_owned_by(&self, creator: &EmailAddress) -> Result<(), DomainError> {
        if !self.is_owned_by(creator) {
            return Err(DomainError::Forbidden(
                "このメッセージを操作する権限がありません".to_string(),
            ));
        }
        Ok(())
    }

    /// 時刻からフェーズを導出する
    ///
    /// 非アクティブなメッセージは常に `Dormant`（選択対象外）になる。
    pub fn phase(&self, now: DateTime<Utc>) -> MessagePhase {
        if !self.is_active {
            return MessagePhase::Dormant;
        }
        if self.inactive_at <= now {
            MessagePhase::DeliveryDue
        } else if self.next_reminder_at <= now {
            MessagePhase::ReminderDue
        } else {
            MessagePhase::Dormant
        }
    }

    /// 作成者による更新を適用する
    ///
    /// タイマーは変更しない。
    pub fn updated(self, update: MessageUpdate) -> Self {
        Self {
            content_encrypted: update.content_encrypted,
            inactive_period_days: update.inactive_period_days,
            reminder_interval_days: update.reminder_interval_days,
            is_active: update.is_active,
            extension_secret: update.extension_secret,
            ..self
        }
    }

    /// 延長（チェックイン）する
    ///
    /// シークレットを再発行し、期限を当日 0 時から再計算する。
    pub fn extended(self, extension_secret: Secret, now: DateTime<Utc>) -> Self {
        let deadlines = Deadlines::starting_from(
            now,
            self.inactive_period_days,
            self.reminder_interval_days,
        );
        Self {
            extension_secret,
            inactive_at: deadlines.inactive_at,
            next_reminder_at: deadlines.next_reminder_at,
            ..self
        }
    }

    /// リマインダー送信成功を反映する
    pub fn reminder_sent(self) -> Self {
        Self {
            next_reminder_at: self.next_reminder_at + days(self.reminder_interval_days.value()),
            ..self
        }
    }

    /// 遺言配信成功を反映する
    ///
    /// `deactivate` が真なら以降の選択対象から外す。
    pub fn delivery_sent(self, deactivate: bool) -> Self {
        Self {
            inactive_at: self.inactive_at + days(DELIVERY_GRACE_DAYS),
            sent_counter: self.sent_counter + 1,
            is_active: self.is_active && !deactivate,
            ..self
        }
    }
}

/// 受信者付きのメッセージ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageWithReceivers {
    pub message:   Message,
    pub receivers: Vec<Receiver>,
}

/// 結合済みのフラットな行をメッセージ単位に畳み込む
///
/// - グループ化のキーはメッセージ ID
/// - 出力順は各メッセージの初出順
/// - 隣接していない同一 ID の行も同じグループにまとめる
/// - 受信者が `None` の行（LEFT JOIN で受信者なし）はメッセージだけを登録する
pub fn fold_joined_rows<I>(rows: I) -> Vec<MessageWithReceivers>
where
    I: IntoIterator<Item = (Message, Option<Receiver>)>,
{
    let mut positions: HashMap<MessageId, usize> = HashMap::new();
    let mut grouped: Vec<MessageWithReceivers> = Vec::new();

    for (message, receiver) in rows {
        let index = *positions.entry(message.id().clone()).or_insert_with(|| {
            grouped.push(MessageWithReceivers {
                message,
                receivers: Vec::new(),
            });
            grouped.len() - 1
        });
        if let Some(receiver) = receiver {
            grouped[index].receivers.push(receiver);
        }
    }

    grouped
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use rstest::{fixture, rstest};

    use super::*;
    use crate::secret::SECRET_LENGTH;

    #[fixture]
    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 10, 13, 30, 0).unwrap()
    }

    fn secret(c: char) -> Secret {
        Secret::from_db(c.to_string().repeat(SECRET_LENGTH))
    }

    fn new_message(now: DateTime<Utc>) -> Message {
        Message::new(NewMessage {
            id: MessageId::new(),
            email_creator: EmailAddress::new("creator@example.com").unwrap(),
            content_encrypted: "cipher".to_string(),
            inactive_period_days: InactivePeriodDays::new(90).unwrap(),
            reminder_interval_days: ReminderIntervalDays::new(15).unwrap(),
            extension_secret: secret('a'),
            deadlines: None,
            now,
        })
    }

    fn today(now: DateTime<Utc>) -> DateTime<Utc> {
        start_of_day(now)
    }

    // 値オブジェクトのテスト

    #[rstest]
    #[case(29, false)]
    #[case(30, true)]
    #[case(360, true)]
    #[case(361, false)]
    fn test_非アクティブ期間の範囲チェック(#[case] value: i32, #[case] ok: bool) {
        assert_eq!(InactivePeriodDays::new(value).is_ok(), ok);
    }

    #[rstest]
    #[case(14, false)]
    #[case(15, true)]
    #[case(30, true)]
    #[case(31, false)]
    fn test_リマインダー間隔の範囲チェック(#[case] value: i32, #[case] ok: bool) {
        assert_eq!(ReminderIntervalDays::new(value).is_ok(), ok);
    }

    #[test]
    fn test_範囲外の日数はデシリアライズで拒否される() {
        let result: Result<InactivePeriodDays, _> = serde_json::from_str("10");

        assert!(result.is_err());
    }

    #[rstest]
    #[case("", true)]
    #[case(&"あ".repeat(800), true)]
    #[case(&"あ".repeat(801), false)]
    #[case(&"a".repeat(801), false)]
    fn test_本文は800文字まで(#[case] value: &str, #[case] ok: bool) {
        assert_eq!(MessageContent::new(value).is_ok(), ok);
    }

    #[test]
    fn test_クライアント暗号化済みの本文を判定できる() {
        assert!(MessageContent::new("aes.utf8:xxxx").unwrap().is_client_encrypted());
        assert!(!MessageContent::new("hello").unwrap().is_client_encrypted());
    }

    #[test]
    fn test_本文を行ごとに分割できる() {
        let content = MessageContent::new("one\ntwo\n").unwrap();

        assert_eq!(content.lines(), vec!["one", "two", ""]);
    }

    // ライフサイクルのテスト

    #[rstest]
    fn test_作成時の期限は当日0時から計算される(now: DateTime<Utc>) {
        let message = new_message(now);

        assert_eq!(message.inactive_at(), today(now) + days(90));
        assert_eq!(message.next_reminder_at(), today(now) + days(15));
        assert_eq!(message.created_at(), now);
        assert_eq!(message.sent_counter(), 0);
        assert!(message.is_active());
    }

    #[rstest]
    fn test_期限を指定した場合はその値を使う(now: DateTime<Utc>) {
        let deadlines = Deadlines {
            inactive_at:      now + days(3),
            next_reminder_at: now + days(1),
        };

        let message = Message::new(NewMessage {
            id: MessageId::new(),
            email_creator: EmailAddress::new("creator@example.com").unwrap(),
            content_encrypted: String::new(),
            inactive_period_days: InactivePeriodDays::new(30).unwrap(),
            reminder_interval_days: ReminderIntervalDays::new(15).unwrap(),
            extension_secret: secret('a'),
            deadlines: Some(deadlines),
            now,
        });

        assert_eq!(message.deadlines(), deadlines);
    }

    #[rstest]
    fn test_更新はタイマーを変更しない(now: DateTime<Utc>) {
        let before = new_message(now);
        let deadlines = before.deadlines();

        let after = before.updated(MessageUpdate {
            content_encrypted: "new".to_string(),
            inactive_period_days: InactivePeriodDays::new(30).unwrap(),
            reminder_interval_days: ReminderIntervalDays::new(30).unwrap(),
            is_active: false,
            extension_secret: secret('b'),
        });

        assert_eq!(after.deadlines(), deadlines);
        assert_eq!(after.content_encrypted(), "new");
        assert_eq!(after.extension_secret(), &secret('b'));
        assert!(!after.is_active());
    }

    #[rstest]
    fn test_延長すると期限が再計算されシークレットが変わる(now: DateTime<Utc>) {
        let message = new_message(now);
        let later = now + days(40);

        let extended = message.extended(secret('z'), later);

        assert_eq!(extended.inactive_at(), today(later) + days(90));
        assert_eq!(extended.next_reminder_at(), today(later) + days(15));
        assert_eq!(extended.extension_secret(), &secret('z'));
        assert_eq!(extended.phase(later), MessagePhase::Dormant);
    }

    #[rstest]
    fn test_リマインダー送信で次回リマインダーが間隔分進む(now: DateTime<Utc>) {
        let message = new_message(now);
        let before = message.next_reminder_at();

        let after = message.reminder_sent();

        assert_eq!(after.next_reminder_at(), before + days(15));
    }

    #[rstest]
    #[case(false, true)]
    #[case(true, false)]
    fn test_遺言配信で猶予期間が加算されカウンタが増える(
        now: DateTime<Utc>,
        #[case] deactivate: bool,
        #[case] expected_active: bool,
    ) {
        let message = new_message(now);
        let before = message.inactive_at();

        let after = message.delivery_sent(deactivate);

        assert_eq!(after.inactive_at(), before + days(DELIVERY_GRACE_DAYS));
        assert_eq!(after.sent_counter(), 1);
        assert_eq!(after.is_active(), expected_active);
    }

    #[rstest]
    #[case(0, MessagePhase::Dormant)]
    #[case(14, MessagePhase::Dormant)]
    #[case(15, MessagePhase::ReminderDue)]
    #[case(89, MessagePhase::ReminderDue)]
    #[case(90, MessagePhase::DeliveryDue)]
    #[case(200, MessagePhase::DeliveryDue)]
    fn test_フェーズは時刻から導出される(
        now: DateTime<Utc>,
        #[case] elapsed_days: i32,
        #[case] expected: MessagePhase,
    ) {
        let message = new_message(now);

        assert_eq!(message.phase(today(now) + days(elapsed_days)), expected);
    }

    #[rstest]
    fn test_非アクティブなメッセージは常にdormant(now: DateTime<Utc>) {
        let message = new_message(now).delivery_sent(true);

        assert_eq!(message.phase(now + days(1000)), MessagePhase::Dormant);
    }

    #[rstest]
    fn test_所有者でなければforbidden(now: DateTime<Utc>) {
        let message = new_message(now);
        let other = EmailAddress::new("other@example.com").unwrap();

        assert!(message.ensure_owned_by(message.email_creator()).is_ok());
        assert!(matches!(
            message.ensure_owned_by(&other),
            Err(DomainError::Forbidden(_))
        ));
    }

    // 畳み込みのテスト

    fn receiver_of(message: &Message, address: &str) -> Receiver {
        Receiver::new(
            message.id().clone(),
            EmailAddress::new(address).unwrap(),
            secret('u'),
        )
    }

    #[rstest]
    fn test_畳み込みは初出順を保ち隣接しない行もまとめる(now: DateTime<Utc>) {
        let m1 = new_message(now);
        let m2 = new_message(now);
        let rows = vec![
            (m1.clone(), Some(receiver_of(&m1, "a@example.com"))),
            (m2.clone(), Some(receiver_of(&m2, "b@example.com"))),
            (m1.clone(), Some(receiver_of(&m1, "c@example.com"))),
        ];

        let folded = fold_joined_rows(rows);

        assert_eq!(folded.len(), 2);
        assert_eq!(folded[0].message.id(), m1.id());
        assert_eq!(folded[1].message.id(), m2.id());
        let m1_receivers: Vec<&str> = folded[0]
            .receivers
            .iter()
            .map(|r| r.email_receiver().as_str())
            .collect();
        assert_eq!(m1_receivers, vec!["a@example.com", "c@example.com"]);
        assert_eq!(folded[1].receivers.len(), 1);
    }

    #[rstest]
    fn test_受信者なしの行はメッセージだけ登録される(now: DateTime<Utc>) {
        let m1 = new_message(now);

        let folded = fold_joined_rows(vec![(m1.clone(), None)]);

        assert_eq!(folded.len(), 1);
        assert!(folded[0].receivers.is_empty());
    }

    #[test]
    fn test_空の入力は空の出力になる() {
        assert!(fold_joined_rows(Vec::new()).is_empty());
    }
}
