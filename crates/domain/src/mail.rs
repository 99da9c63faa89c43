//! # 送信メールと送信結果
//!
//! メールベンダー（Mailjet / Sendgrid / SMTP）に共通する送信単位と結果を定義する。
//! ベンダーの実装はインフラ層、テンプレートの描画はアプリケーション層が担う。
//!
//! ## ベンダーへの配分
//!
//! [`split_by_capacity`] は日次上限の比率でメールを各ベンダーに割り当てる。
//! 最後のベンダーが端数をすべて引き受けるため、全件がちょうど 1 回ずつ割り当てられる。

use std::ops::Range;

use serde::Serialize;
use thiserror::Error;

/// 送信元・送信先のアドレス
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MailAddress {
    pub email: String,
    pub name:  String,
}

impl MailAddress {
    pub fn new(email: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            name:  name.into(),
        }
    }
}

/// 送信するメール 1 通
///
/// テンプレート描画の出力。ベンダーに渡される。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailItem {
    pub from:      MailAddress,
    pub to:        Vec<MailAddress>,
    pub subject:   String,
    pub html_body: String,
    pub text_body: String,
}

impl MailItem {
    /// 送信先のアドレス一覧
    pub fn recipient_emails(&self) -> Vec<String> {
        self.to.iter().map(|to| to.email.clone()).collect()
    }
}

/// 送信失敗の種別
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SendFailureKind {
    /// ベンダーがこのメールを拒否した（アドレス不正など）
    ///
    /// 送信先アドレスの評判を下げる対象になる。
    Rejected,
    /// ベンダー全体の障害（通信失敗、認証失敗、タイムアウトなど）
    ///
    /// アドレスの評判は下げない。
    VendorUnavailable,
}

/// 1 通ごとの送信失敗
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SendFailure {
    pub kind:    SendFailureKind,
    pub message: String,
}

impl SendFailure {
    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            kind:    SendFailureKind::Rejected,
            message: message.into(),
        }
    }

    pub fn vendor_unavailable(message: impl Into<String>) -> Self {
        Self {
            kind:    SendFailureKind::VendorUnavailable,
            message: message.into(),
        }
    }
}

/// 1 通ごとの送信結果
///
/// 入力の `MailItem` と位置で対応する。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SendResult {
    pub error:     Option<SendFailure>,
    pub emails:    Vec<String>,
    pub vendor_id: String,
}

impl SendResult {
    pub fn accepted(item: &MailItem, vendor_id: &str) -> Self {
        Self {
            error:     None,
            emails:    item.recipient_emails(),
            vendor_id: vendor_id.to_string(),
        }
    }

    pub fn failed(item: &MailItem, vendor_id: &str, failure: SendFailure) -> Self {
        Self {
            error:     Some(failure),
            emails:    item.recipient_emails(),
            vendor_id: vendor_id.to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// ベンダーに拒否されたか（評判を下げる対象か）
    pub fn is_rejected(&self) -> bool {
        matches!(
            self.error,
            Some(SendFailure {
                kind: SendFailureKind::Rejected,
                ..
            })
        )
    }

    /// ベンダー全体の障害で失敗したか
    pub fn is_vendor_unavailable(&self) -> bool {
        matches!(
            self.error,
            Some(SendFailure {
                kind: SendFailureKind::VendorUnavailable,
                ..
            })
        )
    }
}

/// ベンダー呼び出し全体の失敗（クリティカルエラー）
///
/// ディスパッチャーはこれをスライス内の全メールの `VendorUnavailable` に変換する。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MailVendorError {
    /// 認証情報が設定されていない
    #[error("認証情報が設定されていません: {0}")]
    MissingCredentials(String),

    /// 通信に失敗
    #[error("ベンダーとの通信に失敗: {0}")]
    Transport(String),

    /// 想定外のレスポンス
    #[error("ベンダーから想定外のレスポンス: {0}")]
    UnexpectedResponse(String),

    /// タイムアウト
    #[error("ベンダー呼び出しがタイムアウトしました（{0} 秒）")]
    Timeout(u64),

    /// 結果の件数が入力と一致しない
    #[error("送信結果の件数が一致しません: 期待 {expected} 件、実際 {actual} 件")]
    ResultCountMismatch { expected: usize, actual: usize },
}

/// 日次上限の比率で `len` 件をベンダーに割り当てる
///
/// 戻り値は `(ベンダーの位置, 割り当て範囲)` の一覧で、空の範囲は含まない。
///
/// - 最後以外のベンダーは `floor(limit / total * len)` 件
/// - 最後のベンダー、または範囲が件数を超えるベンダーは残りすべて
///
/// `limits` には認証情報を持つベンダーだけを渡すこと。
pub fn split_by_capacity(len: usize, limits: &[u32]) -> Vec<(usize, Range<usize>)> {
    let total: u64 = limits.iter().map(|&limit| u64::from(limit)).sum();
    let mut slices = Vec::new();
    let mut cursor = 0usize;

    for (index, &limit) in limits.iter().enumerate() {
        if cursor >= len {
            break;
        }
        let share = if total == 0 {
            0
        } else {
            // floor(limit / total * len) を整数演算で求める
            usize::try_from(u64::from(limit) * len as u64 / total).unwrap_or(len)
        };
        let is_last = index + 1 == limits.len();
        let mut end = cursor.saturating_add(share);
        if end > len || is_last {
            end = len;
        }
        if end > cursor {
            slices.push((index, cursor..end));
        }
        cursor = end;
    }

    slices
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    fn item(to: &str) -> MailItem {
        MailItem {
            from:      MailAddress::new("noreply@warisin.com", "Warisin Service"),
            to:        vec![MailAddress::new(to, "Warisin User")],
            subject:   "subject".to_string(),
            html_body: "<p>body</p>".to_string(),
            text_body: "body".to_string(),
        }
    }

    #[test]
    fn test_ベンダーが1つなら全件を割り当てる() {
        // 200 と 100 のうち 100 側に認証情報がない場合
        let slices = split_by_capacity(10, &[200]);

        assert_eq!(slices, vec![(0, 0..10)]);
    }

    #[test]
    fn test_日次上限の比率で割り当て端数は最後のベンダー() {
        let slices = split_by_capacity(10, &[200, 100]);

        // floor(200/300*10) = 6、残り 4
        assert_eq!(slices, vec![(0, 0..6), (1, 6..10)]);
    }

    #[test]
    fn test_割り当てが0件のベンダーは含まない() {
        let slices = split_by_capacity(1, &[100, 200]);

        // floor(100/300*1) = 0 → 最後のベンダーに 1 件
        assert_eq!(slices, vec![(1, 0..1)]);
    }

    #[test]
    fn test_上限合計が0なら最後のベンダーが全件() {
        let slices = split_by_capacity(3, &[0, 0]);

        assert_eq!(slices, vec![(1, 0..3)]);
    }

    #[rstest]
    #[case(0, vec![200, 100])]
    #[case(5, vec![])]
    fn test_割り当て対象がない場合は空(#[case] len: usize, #[case] limits: Vec<u32>) {
        assert!(split_by_capacity(len, &limits).is_empty());
    }

    #[rstest]
    #[case(1)]
    #[case(7)]
    #[case(10)]
    #[case(299)]
    #[case(1000)]
    fn test_全件がちょうど1回ずつ順に割り当てられる(#[case] len: usize) {
        let slices = split_by_capacity(len, &[200, 100, 37]);

        let mut cursor = 0;
        for (_, range) in &slices {
            assert_eq!(range.start, cursor);
            assert!(range.end > range.start);
            cursor = range.end;
        }
        assert_eq!(cursor, len);
    }

    #[test]
    fn test_送信結果の種別判定() {
        let mail = item("a@example.com");

        let ok = SendResult::accepted(&mail, "MAILJET");
        let rejected = SendResult::failed(&mail, "MAILJET", SendFailure::rejected("invalid"));
        let down = SendResult::failed(&mail, "MAILJET", SendFailure::vendor_unavailable("503"));

        assert!(ok.is_success());
        assert!(rejected.is_rejected() && !rejected.is_vendor_unavailable());
        assert!(down.is_vendor_unavailable() && !down.is_rejected());
        assert_eq!(ok.emails, vec!["a@example.com".to_string()]);
    }
}
