//! # Clock（時刻プロバイダ）
//!
//! ユースケース層での `Utc::now()` 直接呼び出しを置き換え、
//! テストで固定時刻を注入可能にするための抽象化。
//!
//! 期限（`inactive_at` / `next_reminder_at`）は「UTC の当日 0 時」を起点に
//! 日数を加算して求めるため、その丸めもここで提供する。

use chrono::{DateTime, Duration, NaiveTime, Utc};

/// 現在時刻を提供するトレイト
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// UTC の当日 0 時を返す
    fn today(&self) -> DateTime<Utc> {
        start_of_day(self.now())
    }
}

/// 実際のシステム時刻を返す実装
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// 固定時刻を返すテスト用実装
pub struct FixedClock {
    now: DateTime<Utc>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self { now }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.now
    }
}

/// 指定時刻を UTC の 0 時に切り捨てる
pub fn start_of_day(at: DateTime<Utc>) -> DateTime<Utc> {
    at.date_naive().and_time(NaiveTime::MIN).and_utc()
}

/// 日数を `Duration` に変換する
pub fn days(n: i32) -> Duration {
    Duration::days(i64::from(n))
}
