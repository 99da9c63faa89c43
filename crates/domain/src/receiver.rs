//! # 受信者と差分計算
//!
//! メッセージと受信者アドレスの組を表す [`Receiver`] と、
//! 更新時に旧受信者一覧と新しいアドレス一覧から操作を決める
//! [`reconcile`] を定義する。
//!
//! ## 配信停止の固定
//!
//! 一度 `is_unsubscribed = true` になった組は削除されず、
//! 以降の更新で同じアドレスが指定されても `Hide` のまま残る。

use std::collections::HashMap;

use serde::Serialize;

use crate::{email::EmailAddress, message::MessageId, secret::Secret};

/// 受信者（メッセージとアドレスの組）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receiver {
    message_id: MessageId,
    email_receiver: EmailAddress,
    unsubscribe_secret: Secret,
    is_unsubscribed: bool,
}

impl Receiver {
    /// 新しい受信者を作成する
    pub fn new(
        message_id: MessageId,
        email_receiver: EmailAddress,
        unsubscribe_secret: Secret,
    ) -> Self {
        Self {
            message_id,
            email_receiver,
            unsubscribe_secret,
            is_unsubscribed: false,
        }
    }

    /// 既存のデータから復元する
    pub fn from_db(
        message_id: MessageId,
        email_receiver: EmailAddress,
        unsubscribe_secret: Secret,
        is_unsubscribed: bool,
    ) -> Self {
        Self {
            message_id,
            email_receiver,
            unsubscribe_secret,
            is_unsubscribed,
        }
    }

    pub fn message_id(&self) -> &MessageId {
        &self.message_id
    }

    pub fn email_receiver(&self) -> &EmailAddress {
        &self.email_receiver
    }

    pub fn unsubscribe_secret(&self) -> &Secret {
        &self.unsubscribe_secret
    }

    pub fn is_unsubscribed(&self) -> bool {
        self.is_unsubscribed
    }

    /// 配信停止する（冪等）
    pub fn unsubscribed(self) -> Self {
        Self {
            is_unsubscribed: true,
            ..self
        }
    }
}

/// 受信者ごとの操作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ReceiverAction {
    /// 新規追加（配信停止用シークレットを発行して保存）
    Insert,
    /// 削除
    Delete,
    /// 既存のまま（書き込みなし）
    Ignore,
    /// 配信停止済みのため非表示（書き込みなし）
    Hide,
}

impl ReceiverAction {
    /// 更新後の「現在の受信者」として返すか
    pub fn is_visible(self) -> bool {
        matches!(self, Self::Insert | Self::Ignore)
    }
}

/// 旧受信者の差分計算用の入力
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExistingReceiver {
    pub address:         EmailAddress,
    pub is_unsubscribed: bool,
}

impl From<&Receiver> for ExistingReceiver {
    fn from(receiver: &Receiver) -> Self {
        Self {
            address:         receiver.email_receiver().clone(),
            is_unsubscribed: receiver.is_unsubscribed(),
        }
    }
}

/// 操作ごとの件数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileSummary {
    pub inserted: usize,
    pub deleted:  usize,
    pub ignored:  usize,
    pub hidden:   usize,
}

/// 差分計算の結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcilePlan {
    actions: HashMap<EmailAddress, ReceiverAction>,
    /// 新しい一覧の順、続いて旧一覧にだけあるアドレスの順
    order:   Vec<EmailAddress>,
}

impl ReconcilePlan {
    /// アドレスに対する操作
    pub fn action_for(&self, address: &EmailAddress) -> Option<ReceiverAction> {
        self.actions.get(address).copied()
    }

    /// 決定的な順序で (アドレス, 操作) を列挙する
    pub fn iter(&self) -> impl Iterator<Item = (&EmailAddress, ReceiverAction)> {
        self.order
            .iter()
            .filter_map(|address| self.actions.get(address).map(|action| (address, *action)))
    }

    /// 指定した操作のアドレス一覧
    pub fn addresses_with(&self, action: ReceiverAction) -> Vec<&EmailAddress> {
        self.iter()
            .filter(|(_, a)| *a == action)
            .map(|(address, _)| address)
            .collect()
    }

    /// 更新後に表示する受信者（Insert / Ignore を新しい一覧の順で）
    pub fn visible(&self) -> Vec<&EmailAddress> {
        self.iter()
            .filter(|(_, action)| action.is_visible())
            .map(|(address, _)| address)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// 操作ごとの件数を集計する
    pub fn summary(&self) -> ReconcileSummary {
        self.actions
            .values()
            .fold(ReconcileSummary::default(), |mut summary, action| {
                match action {
                    ReceiverAction::Insert => summary.inserted += 1,
                    ReceiverAction::Delete => summary.deleted += 1,
                    ReceiverAction::Ignore => summary.ignored += 1,
                    ReceiverAction::Hide => summary.hidden += 1,
                }
                summary
            })
    }
}

/// 旧受信者と新しいアドレス一覧から操作を決定する
///
/// 1. 新しいアドレスをすべて `Insert` で初期化する
/// 2. 旧受信者ごとに:
///    - 配信停止済みなら `Hide`（他のどの判定よりも優先）
///    - `Insert` 予定なら `Ignore`（既に存在する）
///    - それ以外は `Delete`
///
/// 同じキーへの書き込みは後勝ちなので、旧一覧の処理は必ず初期化の後に行う。
/// 旧一覧には配信停止済みの行も含めて渡すこと。含めないと `Hide` が固定されない。
pub fn reconcile(old: &[ExistingReceiver], new: &[EmailAddress]) -> ReconcilePlan {
    let mut actions: HashMap<EmailAddress, ReceiverAction> = HashMap::new();
    let mut order: Vec<EmailAddress> = Vec::new();

    for address in new {
        if actions.insert(address.clone(), ReceiverAction::Insert).is_none() {
            order.push(address.clone());
        }
    }

    for receiver in old {
        let next = if receiver.is_unsubscribed {
            ReceiverAction::Hide
        } else {
            match actions.get(&receiver.address) {
                Some(ReceiverAction::Insert) => ReceiverAction::Ignore,
                // 旧一覧に同じアドレスが重複している場合は最初の判定を保つ
                Some(existing @ (ReceiverAction::Ignore | ReceiverAction::Hide)) => *existing,
                _ => ReceiverAction::Delete,
            }
        };
        if actions.insert(receiver.address.clone(), next).is_none() {
            order.push(receiver.address.clone());
        }
    }

    ReconcilePlan { actions, order }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    fn addr(local: &str) -> EmailAddress {
        EmailAddress::new(format!("{local}@example.com")).unwrap()
    }

    fn old(local: &str, is_unsubscribed: bool) -> ExistingReceiver {
        ExistingReceiver {
            address: addr(local),
            is_unsubscribed,
        }
    }

    fn locals(addresses: Vec<&EmailAddress>) -> Vec<String> {
        addresses
            .into_iter()
            .map(|a| a.as_str().trim_end_matches("@example.com").to_string())
            .collect()
    }

    #[test]
    fn test_新規アドレスはinsertになる() {
        let plan = reconcile(&[], &[addr("a"), addr("b")]);

        assert_eq!(plan.action_for(&addr("a")), Some(ReceiverAction::Insert));
        assert_eq!(plan.action_for(&addr("b")), Some(ReceiverAction::Insert));
        assert_eq!(locals(plan.visible()), vec!["a", "b"]);
    }

    #[test]
    fn test_受信者の入れ替えでinsertとdeleteとignoreが決まる() {
        // Given: 旧受信者 [a, b]
        let old_receivers = vec![old("a", false), old("b", false)];

        // When: 新しい一覧 [b, c]
        let plan = reconcile(&old_receivers, &[addr("b"), addr("c")]);

        // Then
        assert_eq!(plan.action_for(&addr("a")), Some(ReceiverAction::Delete));
        assert_eq!(plan.action_for(&addr("b")), Some(ReceiverAction::Ignore));
        assert_eq!(plan.action_for(&addr("c")), Some(ReceiverAction::Insert));
        assert_eq!(locals(plan.visible()), vec!["b", "c"]);
        assert_eq!(
            plan.summary(),
            ReconcileSummary {
                inserted: 1,
                deleted:  1,
                ignored:  1,
                hidden:   0,
            }
        );
    }

    #[rstest]
    #[case(vec!["b"])]
    #[case(vec!["a", "b"])]
    #[case(vec![])]
    fn test_配信停止済みのアドレスは常にhideになる(#[case] new_locals: Vec<&str>) {
        let old_receivers = vec![old("a", false), old("b", true)];
        let new: Vec<EmailAddress> = new_locals.into_iter().map(addr).collect();

        let plan = reconcile(&old_receivers, &new);

        assert_eq!(plan.action_for(&addr("b")), Some(ReceiverAction::Hide));
        assert!(!locals(plan.visible()).contains(&"b".to_string()));
    }

    #[test]
    fn test_すべてのアドレスが出力に含まれる() {
        let old_receivers = vec![old("a", false), old("b", true), old("c", false)];
        let new = vec![addr("c"), addr("d"), addr("b")];

        let plan = reconcile(&old_receivers, &new);

        for address in &new {
            assert!(plan.action_for(address).is_some());
        }
        for receiver in &old_receivers {
            let action = plan.action_for(&receiver.address).unwrap();
            assert!(matches!(
                action,
                ReceiverAction::Delete | ReceiverAction::Ignore | ReceiverAction::Hide
            ));
        }
        assert_eq!(plan.len(), 4);
    }

    #[test]
    fn test_列挙順は新しい一覧の後に旧一覧だけのアドレス() {
        let old_receivers = vec![old("x", false), old("b", false)];

        let plan = reconcile(&old_receivers, &[addr("b"), addr("a")]);

        let order: Vec<(String, ReceiverAction)> = plan
            .iter()
            .map(|(a, action)| (a.as_str().to_string(), action))
            .collect();
        assert_eq!(
            order,
            vec![
                ("b@example.com".to_string(), ReceiverAction::Ignore),
                ("a@example.com".to_string(), ReceiverAction::Insert),
                ("x@example.com".to_string(), ReceiverAction::Delete),
            ]
        );
        assert_eq!(locals(plan.addresses_with(ReceiverAction::Delete)), vec!["x"]);
    }

    #[test]
    fn test_新しい一覧の重複は1件にまとまる() {
        let plan = reconcile(&[], &[addr("a"), addr("a")]);

        assert_eq!(plan.len(), 1);
        assert_eq!(plan.summary().inserted, 1);
    }

    #[test]
    fn test_配信停止は冪等() {
        let receiver = Receiver::new(
            MessageId::new(),
            addr("a"),
            Secret::from_db("s".repeat(crate::secret::SECRET_LENGTH)),
        );

        let once = receiver.unsubscribed();
        let twice = once.clone().unsubscribed();

        assert!(once.is_unsubscribed());
        assert_eq!(once, twice);
    }
}
