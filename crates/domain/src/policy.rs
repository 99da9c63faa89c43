//! # 運用ポリシー
//!
//! 受信者数の上限や遺言配信後の扱いなど、運用で切り替える判断をまとめる。

use crate::DomainError;

/// 1 メッセージあたりの受信者数の下限
pub const MIN_RECEIVERS_PER_MESSAGE: usize = 1;

/// 1 メッセージあたりの受信者数の上限
pub const MAX_RECEIVERS_PER_MESSAGE: usize = 3;

/// 作成者 1 人あたりの（表示中の）受信者数の上限
pub const MAX_RECEIVERS_PER_CREATOR: usize = 10;

/// 受信者に関するポリシー
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiverPolicy {
    /// 更新時にも作成者ごとの上限を適用するか
    pub cap_applies_on_update: bool,
}

impl Default for ReceiverPolicy {
    fn default() -> Self {
        Self {
            cap_applies_on_update: true,
        }
    }
}

impl ReceiverPolicy {
    /// 1 メッセージあたりの受信者数を検証する
    pub fn check_per_message(&self, count: usize) -> Result<(), DomainError> {
        if !(MIN_RECEIVERS_PER_MESSAGE..=MAX_RECEIVERS_PER_MESSAGE).contains(&count) {
            return Err(DomainError::Validation(format!(
                "受信者は {MIN_RECEIVERS_PER_MESSAGE} 件から {MAX_RECEIVERS_PER_MESSAGE} \
                 件で指定してください（指定数: {count}）"
            )));
        }
        Ok(())
    }

    /// 作成者ごとの受信者数の上限を検証する
    ///
    /// # 引数
    ///
    /// - `existing`: 他のメッセージで表示中の受信者数
    /// - `requested`: 今回のメッセージに指定された受信者数
    pub fn check_per_creator(&self, existing: usize, requested: usize) -> Result<(), DomainError> {
        let total = existing + requested;
        if total > MAX_RECEIVERS_PER_CREATOR {
            return Err(DomainError::Validation(format!(
                "受信者の合計は {MAX_RECEIVERS_PER_CREATOR} 件までです（合計: {total}）"
            )));
        }
        Ok(())
    }
}

/// 遺言配信後のポリシー
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryPolicy {
    /// 配信成功後にメッセージを非アクティブにするか
    ///
    /// 偽の場合は `inactive_at` を猶予期間だけ先送りし、次の周期で再配信される。
    pub deactivate_on_delivery: bool,
}
