//! # 構造化ログのフィールド規約
//!
//! 遺言メッセージの操作とスケジューラーの送信結果を、後から `jq` で
//! 集計できる形で出力するための定数とマクロ。
//!
//! - ビジネスイベント: [`log_business_event!`] で出力する。
//!   `event.kind = "business_event"` が付くので
//!   `jq 'select(.["event.kind"] == "business_event")'` で抜き出せる。
//! - エラー: `tracing::error!` / `tracing::warn!` に `error.category` と
//!   `error.kind` を付ける。値は [`error`] の定数を使う。
//!
//! キーはドット区切り（`event.action`、`error.kind`）で、JSON 出力では
//! そのままフラットなキーになる。

/// ビジネスイベントを `info` レベルで出力する
///
/// `event.category` / `event.action` / `event.result` は必ず指定し、
/// 対象があれば `event.entity_type` / `event.entity_id` も付ける。
/// 値は [`event`] の定数から選ぶ。
///
/// 受信者のアドレスは個人情報のため出力しない。件数だけを残す。
///
/// ```ignore
/// log_business_event!(
///     event.category = event::category::MESSAGE,
///     event.action = event::action::MESSAGE_DELETED,
///     event.entity_type = event::entity_type::MESSAGE,
///     event.entity_id = %id,
///     event.result = event::result::SUCCESS,
///     "メッセージ削除"
/// );
/// ```
#[macro_export]
macro_rules! log_business_event {
    ($($args:tt)*) => {
        ::tracing::info!(
            event.kind = "business_event",
            $($args)*
        )
    };
}

/// イベントフィールドの定数
pub mod event {
    /// イベントカテゴリ
    pub mod category {
        pub const MESSAGE: &str = "message";
        pub const SCHEDULER: &str = "scheduler";
        pub const REPUTATION: &str = "reputation";
    }

    /// イベントアクション
    pub mod action {
        // メッセージ
        pub const MESSAGE_CREATED: &str = "message.created";
        pub const MESSAGE_UPDATED: &str = "message.updated";
        pub const MESSAGE_DELETED: &str = "message.deleted";
        pub const MESSAGE_EXTENDED: &str = "message.extended";
        pub const RECEIVER_UNSUBSCRIBED: &str = "receiver.unsubscribed";

        // スケジューラー
        pub const REMINDERS_SENT: &str = "scheduler.reminders_sent";
        pub const TESTAMENTS_SENT: &str = "scheduler.testaments_sent";

        // 評判台帳
        pub const ADDRESS_DOWNGRADED: &str = "reputation.address_downgraded";
    }

    /// エンティティ種別
    pub mod entity_type {
        pub const MESSAGE: &str = "message";
        pub const RECEIVER: &str = "receiver";
        pub const EMAIL: &str = "email";
    }

    /// イベント結果
    pub mod result {
        pub const SUCCESS: &str = "success";
        pub const PARTIAL: &str = "partial";
        pub const FAILURE: &str = "failure";
    }
}

/// エラーコンテキストフィールドの定数
pub mod error {
    /// エラーカテゴリ
    pub mod category {
        /// インフラストラクチャ（DB、暗号化）
        pub const INFRASTRUCTURE: &str = "infrastructure";
        /// 外部サービス呼び出し（メールベンダー）
        pub const EXTERNAL_SERVICE: &str = "external_service";
    }

    /// エラー種別
    pub mod kind {
        pub const DATABASE: &str = "database";
        pub const ENCRYPTION: &str = "encryption";
        pub const MAIL_VENDOR: &str = "mail_vendor";
        pub const WRITE_BACK: &str = "write_back";
        pub const INTERNAL: &str = "internal";
    }
}
