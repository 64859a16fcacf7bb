//! # Clock（時刻プロバイダ）
//!
//! 監査ログのタイムスタンプやログファイル名に使う現在時刻の抽象化。
//! `Utc::now()` を直接呼ばずにこのトレイトを経由することで、
//! テストで固定時刻を注入できる。

use chrono::{DateTime, Utc};

/// 現在時刻を提供するトレイト
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
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

    /// UNIX 秒から固定時刻を作る
    ///
    /// 範囲外の値はエポックに丸める。
    pub fn at_timestamp(secs: i64) -> Self {
        Self::new(DateTime::from_timestamp(secs, 0).unwrap_or_default())
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.now
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_は現在時刻を返す() {
        let clock = SystemClock;
        let before = Utc::now();
        let result = clock.now();
        let after = Utc::now();

        assert!(result >= before);
        assert!(result <= after);
    }

    #[test]
    fn test_fixed_clock_は複数回呼んでも同じ時刻を返す() {
        let clock = FixedClock::at_timestamp(1_700_000_000);

        assert_eq!(clock.now(), clock.now());
        assert_eq!(clock.now().timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_at_timestamp_範囲外の値はエポックになる() {
        let clock = FixedClock::at_timestamp(i64::MAX);

        assert_eq!(clock.now().timestamp(), 0);
    }
}
