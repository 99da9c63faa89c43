//! メールディスパッチャー
//!
//! 認証情報を持つベンダーにだけ、日次上限の比率でメールを割り当てる。
//! スライスごとの送信は並行に実行し、結果は入力の位置に並べ直す。

use std::{sync::Arc, time::Duration};

use warisin_domain::mail::{
    MailItem,
    MailVendorError,
    SendFailure,
    SendResult,
    split_by_capacity,
};

use super::MailVendor;

/// 認証情報を持つベンダーがない場合の識別子
const NO_VENDOR_ID: &str = "NONE";

/// ベンダーと日次上限の組
#[derive(Clone)]
pub struct VendorSlot {
    pub vendor:      Arc<dyn MailVendor>,
    pub daily_limit: u32,
}

impl VendorSlot {
    pub fn new(vendor: Arc<dyn MailVendor>, daily_limit: u32) -> Self {
        Self {
            vendor,
            daily_limit,
        }
    }
}

/// 複数ベンダーへの配分と結果の集約
pub struct MailDispatcher {
    vendors: Vec<VendorSlot>,
    timeout: Duration,
}

impl MailDispatcher {
    /// # 引数
    ///
    /// - `vendors`: 配分の優先順。端数は認証情報を持つ最後のベンダーが引き受ける
    /// - `timeout`: 1 回のベンダー呼び出しの上限時間
    pub fn new(vendors: Vec<VendorSlot>, timeout: Duration) -> Self {
        Self { vendors, timeout }
    }

    /// 認証情報を持つベンダーが 1 つ以上あるか
    pub fn has_available_vendor(&self) -> bool {
        self.vendors.iter().any(|slot| slot.vendor.has_credentials())
    }

    /// メールを配分して送信する
    ///
    /// 戻り値は `items` と同じ長さで、`result[i]` は `items[i]` に対応する。
    /// ベンダー全体の失敗（タイムアウト、件数不一致を含む）は、
    /// そのスライスの全件を `VendorUnavailable` として返す。
    #[tracing::instrument(skip_all, fields(items = items.len()))]
    pub async fn dispatch(&self, items: &[MailItem]) -> Vec<SendResult> {
        let available: Vec<&VendorSlot> = self
            .vendors
            .iter()
            .filter(|slot| slot.vendor.has_credentials())
            .collect();

        if available.is_empty() {
            tracing::warn!("認証情報を持つメールベンダーがありません");
            return items
                .iter()
                .map(|item| {
                    SendResult::failed(
                        item,
                        NO_VENDOR_ID,
                        SendFailure::vendor_unavailable(
                            MailVendorError::MissingCredentials("all".to_string()).to_string(),
                        ),
                    )
                })
                .collect();
        }

        let limits: Vec<u32> = available.iter().map(|slot| slot.daily_limit).collect();
        let slices = split_by_capacity(items.len(), &limits);

        // スライスごとに spawn して並行実行し、結果は生成順に回収する
        let mut handles = Vec::with_capacity(slices.len());
        for (vendor_index, range) in slices {
            let vendor = Arc::clone(&available[vendor_index].vendor);
            let slice = items[range.clone()].to_vec();
            let timeout = self.timeout;
            let handle = tokio::spawn(async move {
                match tokio::time::timeout(timeout, vendor.send(&slice)).await {
                    Ok(result) => result,
                    Err(_) => Err(MailVendorError::Timeout(timeout.as_secs())),
                }
            });
            handles.push((available[vendor_index].vendor.vendor_id().to_string(), range, handle));
        }

        let mut results: Vec<Option<SendResult>> = vec![None; items.len()];
        for (vendor_id, range, handle) in handles {
            let slice = &items[range.clone()];
            let outcome = match handle.await {
                Ok(Ok(sent)) if sent.len() == slice.len() => Ok(sent),
                Ok(Ok(sent)) => Err(MailVendorError::ResultCountMismatch {
                    expected: slice.len(),
                    actual:   sent.len(),
                }),
                Ok(Err(e)) => Err(e),
                Err(join_error) => Err(MailVendorError::Transport(format!(
                    "送信タスクが異常終了しました: {join_error}"
                ))),
            };

            match outcome {
                Ok(sent) => {
                    for (offset, result) in sent.into_iter().enumerate() {
                        results[range.start + offset] = Some(result);
                    }
                }
                Err(e) => {
                    tracing::error!(
                        vendor_id = %vendor_id,
                        items = slice.len(),
                        error = %e,
                        "メールベンダーの呼び出しに失敗"
                    );
                    for (offset, item) in slice.iter().enumerate() {
                        results[range.start + offset] = Some(SendResult::failed(
                            item,
                            &vendor_id,
                            SendFailure::vendor_unavailable(e.to_string()),
                        ));
                    }
                }
            }
        }

        // split_by_capacity は全件を割り当てるため、すべて Some になる
        results
            .into_iter()
            .zip(items)
            .map(|(result, item)| {
                result.unwrap_or_else(|| {
                    SendResult::failed(
                        item,
                        NO_VENDOR_ID,
                        SendFailure::vendor_unavailable("割り当てられませんでした"),
                    )
                })
            })
            .collect()
    }
}
