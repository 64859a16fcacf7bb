//! # Clinic Purge 共有ユーティリティ
//!
//! - [`observability`]: トレーシング初期化（`observability` feature）
//! - [`event_log`]: ビジネスイベントログのマクロとフィールド定数
//!
//! ビジネスロジックは含まない。

pub mod event_log;
pub mod observability;
