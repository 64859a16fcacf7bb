//! # ビジネスイベントログとエラーコンテキストの構造化ヘルパー
//!
//! 削除実行の経過を `jq` で追えるよう、ログフィールドの命名規約と
//! ヘルパーマクロを提供する。
//!
//! ## ビジネスイベント
//!
//! [`log_business_event!`] マクロで出力する。`event.kind = "business_event"` マーカーが
//! 自動付与され、`jq 'select(.["event.kind"] == "business_event")'` でフィルタできる。
//!
//! ## エラーコンテキスト
//!
//! `tracing::error!` に `error.category` + `error.kind` フィールドを直接追加する。
//! 定数は [`error`] モジュールで提供。
//!
//! ## フィールド命名規約
//!
//! ドット記法（`event.category`、`error.kind`）を使用。JSON 出力でフラットなキーになる。

/// ビジネスイベントを構造化ログとして出力する。
///
/// `event.kind = "business_event"` マーカーを自動付与し、
/// `tracing::info!` レベルで出力する。
///
/// ## 必須フィールド（慣例）
///
/// - `event.category`: イベントカテゴリ（[`event::category`] の定数を使用）
/// - `event.action`: アクション名（[`event::action`] の定数を使用）
/// - `event.clinic_id`: 削除対象のクリニック ID
/// - `event.result`: 結果（[`event::result`] の定数を使用）
///
/// ## 推奨フィールド
///
/// - `event.run_id`: 削除実行 ID
/// - `event.phase` / `event.table`: フェーズ単位のイベント
/// - `event.rows`: 削除件数
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
        pub const PURGE: &str = "purge";
    }

    /// イベントアクション
    pub mod action {
        pub const PURGE_STARTED: &str = "purge.started";
        pub const PHASE_COMMITTED: &str = "purge.phase_committed";
        pub const PHASE_SKIPPED: &str = "purge.phase_skipped";
        pub const PURGE_COMPLETED: &str = "purge.completed";
        pub const PURGE_FAILED: &str = "purge.failed";
        pub const PURGE_DECLINED: &str = "purge.declined";
    }

    /// イベント結果
    pub mod result {
        pub const SUCCESS: &str = "success";
        pub const FAILURE: &str = "failure";
    }
}

/// エラーコンテキストフィールドの定数
pub mod error {
    /// エラーカテゴリ
    pub mod category {
        /// インフラストラクチャ（DB、ファイルシステム）
        pub const INFRASTRUCTURE: &str = "infrastructure";
        /// 運用者の入力（クリニック指定、削除計画）
        pub const OPERATOR_INPUT: &str = "operator_input";
    }

    /// エラー種別
    pub mod kind {
        pub const DATABASE: &str = "database";
        pub const AUDIT_LOG: &str = "audit_log";
        pub const CLINIC_LOOKUP: &str = "clinic_lookup";
        pub const CANCELLED: &str = "cancelled";
        pub const INTERNAL: &str = "internal";
    }
}
