//! # クリニック削除のドメインモデル
//!
//! - [`plan`]: 削除計画（フェーズ・ID 集合・依存順序の検証）
//! - [`outcome`]: フェーズ結果と実行全体の集計

pub mod outcome;
pub mod plan;

pub use outcome::{
    PhaseFailure,
    PhaseOutcome,
    PhaseRecord,
    PhaseState,
    PreviewRow,
    PurgePreview,
    PurgeRunId,
    PurgeSummary,
    RunHeader,
};
pub use plan::{Guard, IdSetSpec, PhaseDescriptor, PhaseMode, PurgePlan, Scope, ScopeKey};
