//! # クリニックデータ削除基盤
//!
//! 1 つのクリニック（テナント）に属するすべての行を、外部キーの依存順序に従って
//! 削除するためのモジュール。
//!
//! ## 概要
//!
//! ```text
//! ClinicResolver ──→ ClinicContext
//!                        │
//! PurgeEngine::run ──────┤
//!   1. SchemaSnapshot（テーブル存在確認、1 回）
//!   2. resolve_id_sets（ID 集合の事前解決）
//!   3. PurgePlan のフェーズを順に実行（フェーズごとにコミット）
//!   4. AuditRecorder に結果を記録
//! ```
//!
//! DB アクセスは [`PurgeStore`]、監査ログは [`AuditRecorder`] に抽象化しており、
//! テストではモック実装（`test-utils` feature）に差し替える。

pub mod audit_log;
pub mod catalog;
pub mod clinic_resolver;
pub mod engine;
pub mod id_resolver;
pub mod statement;
pub mod store;

use std::time::Duration;

use async_trait::async_trait;
pub use audit_log::{FileAuditLog, audit_log_path};
pub use catalog::SchemaSnapshot;
use clinic_purge_domain::{
    clinic::ClinicLookup,
    purge::{PhaseRecord, PurgeSummary, RunHeader},
};
pub use clinic_resolver::ClinicResolver;
pub use engine::{EngineSettings, PurgeEngine};
pub use id_resolver::{ResolvedIds, resolve_id_sets};
pub use statement::{Bind, Statement};
pub use store::PostgresPurgeStore;
use thiserror::Error;

use crate::{db::TxContext, error::InfraError};

/// 削除実行のエラー
///
/// テーブルが存在しないことはエラーではない（`PhaseOutcome::Skipped`）。
/// 確認フレーズの不一致もエラーではない（CLI 側の `Confirmation::Declined`）。
#[derive(Debug, Error)]
pub enum PurgeError {
    /// クリニックが見つからない、または名前検索で複数件該当した
    ///
    /// 何も削除していない。
    #[error("クリニックを特定できません（{lookup}）: {reason}")]
    UnresolvedTenant { lookup: ClinicLookup, reason: String },

    /// クリニック検索クエリ自体の失敗
    #[error("クリニックの検索に失敗しました: {0}")]
    ClinicLookup(#[source] InfraError),

    /// テーブル一覧を取得できない（削除開始前）
    #[error("テーブル一覧を取得できません: {0}")]
    Catalog(#[source] InfraError),

    /// ID 集合を解決できない（削除開始前）
    #[error("ID 集合 {id_set}（{table}）を解決できません: {source}")]
    IdResolution {
        id_set: String,
        table:  String,
        #[source]
        source: InfraError,
    },

    /// フェーズ実行中の DB エラー
    ///
    /// 当該フェーズのみロールバック済み。それより前のフェーズはコミット済み。
    #[error("フェーズ {phase}（{table}）で失敗しました: {source}")]
    Store {
        phase:  String,
        table:  String,
        #[source]
        source: InfraError,
    },

    /// シグナルによる中断
    ///
    /// 当該フェーズはロールバック済み（フェーズ間で中断した場合は未開始）。
    #[error("フェーズ {phase}（{table}）で中断しました")]
    Cancelled { phase: String, table: String },

    /// 監査ログを書き込めない
    ///
    /// 削除の証跡を残せないため、削除を続行しない。
    #[error("監査ログを書き込めません: {0}")]
    Audit(#[source] InfraError),
}

impl PurgeError {
    /// ログの `error.kind` フィールドに使う短い名前
    pub fn kind_label(&self) -> &'static str {
        match self {
            Self::UnresolvedTenant { .. } | Self::ClinicLookup(_) => "clinic_lookup",
            Self::Catalog(_) | Self::IdResolution { .. } | Self::Store { .. } => "database",
            Self::Cancelled { .. } => "cancelled",
            Self::Audit(_) => "audit_log",
        }
    }
}

/// 削除処理が使う DB 操作
///
/// SQL は呼び出し側（[`statement`]）で組み立て済み。実装は実行のみを担う。
///
/// 書き込み（`execute`）は [`TxContext`] を必須引数に取り、
/// フェーズ単位のトランザクション外で削除できないようにしている。
#[async_trait]
pub trait PurgeStore: Send + Sync {
    /// 1 列の文字列を返すクエリ（テーブル一覧、ID 集合）
    async fn fetch_strings(&self, statement: &Statement) -> Result<Vec<String>, InfraError>;

    /// `SELECT COUNT(*)` を実行する
    async fn count(&self, statement: &Statement) -> Result<u64, InfraError>;

    /// フェーズのトランザクションを開始する
    async fn begin(&self, statement_timeout: Duration) -> Result<TxContext, InfraError>;

    /// トランザクション内で削除文を実行し、影響行数を返す
    async fn execute(&self, tx: &mut TxContext, statement: &Statement) -> Result<u64, InfraError>;

    async fn commit(&self, tx: TxContext) -> Result<(), InfraError>;

    async fn rollback(&self, tx: TxContext) -> Result<(), InfraError>;
}

/// 削除の監査記録
///
/// 実行開始時に `begin`、フェーズ確定ごとに `record`、
/// 最後に `finish`（成功）または `abort`（失敗・中断）を 1 回呼ぶ。
#[async_trait]
pub trait AuditRecorder: Send {
    async fn begin(&mut self, header: &RunHeader) -> Result<(), InfraError>;

    async fn record(&mut self, record: &PhaseRecord) -> Result<(), InfraError>;

    async fn finish(&mut self, summary: &PurgeSummary) -> Result<(), InfraError>;

    /// 部分的な集計を書き出す（`summary.failure()` に失敗箇所が入っている）
    async fn abort(&mut self, summary: &PurgeSummary) -> Result<(), InfraError>;
}
