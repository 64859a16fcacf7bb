//! # 削除結果
//!
//! フェーズ単位の結果と、実行全体の集計（[`PurgeSummary`]）。
//!
//! ## フェーズの状態遷移
//!
//! ```text
//! Pending ──→ Running ──┬──→ Committed
//!    │                  └──→ Failed
//!    └──→ Skipped（テーブルが存在しない）
//! ```
//!
//! 集計は実行エンジンが明示的に持ち回すアキュムレータであり、
//! 監査ログへの書き込みとは独立している。

use chrono::{DateTime, Utc};
use serde::Serialize;
use strum::Display;

use crate::clinic::{ClinicContext, ClinicId};

define_uuid_id! {
    /// 削除実行 ID
    ///
    /// ログ・監査ファイル・イベントを 1 回の実行に紐付ける相関 ID。
    pub struct PurgeRunId;
}

/// フェーズの状態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum PhaseState {
    Pending,
    Running,
    Committed,
    Skipped,
    Failed,
}

impl PhaseState {
    /// 遷移が許可されているか
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running)
                | (Self::Pending, Self::Skipped)
                | (Self::Running, Self::Committed)
                | (Self::Running, Self::Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Committed | Self::Skipped | Self::Failed)
    }
}

/// 確定したフェーズの結果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "rows", rename_all = "snake_case")]
pub enum PhaseOutcome {
    /// 削除してコミットした（0 件を含む）
    Deleted(u64),
    /// テーブルが存在しないため実行しなかった
    Skipped,
}

impl PhaseOutcome {
    pub fn deleted_rows(self) -> u64 {
        match self {
            Self::Deleted(rows) => rows,
            Self::Skipped => 0,
        }
    }

    pub fn state(self) -> PhaseState {
        match self {
            Self::Deleted(_) => PhaseState::Committed,
            Self::Skipped => PhaseState::Skipped,
        }
    }
}

/// 監査ログに記録する 1 フェーズ分の結果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhaseRecord {
    pub phase:       String,
    pub table:       String,
    pub outcome:     PhaseOutcome,
    pub recorded_at: DateTime<Utc>,
}

/// 監査ログのヘッダ
#[derive(Debug, Clone)]
pub struct RunHeader {
    pub run_id:     PurgeRunId,
    pub context:    ClinicContext,
    pub started_at: DateTime<Utc>,
}

/// 実行を止めたフェーズ
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhaseFailure {
    pub phase:  String,
    pub table:  String,
    pub reason: String,
}

/// 実行全体の集計
#[derive(Debug, Clone, Serialize)]
pub struct PurgeSummary {
    run_id:      PurgeRunId,
    clinic_id:   ClinicId,
    started_at:  DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    records:     Vec<PhaseRecord>,
    failure:     Option<PhaseFailure>,
}

impl PurgeSummary {
    pub fn new(header: &RunHeader) -> Self {
        Self {
            run_id:      header.run_id.clone(),
            clinic_id:   header.context.clinic_id().clone(),
            started_at:  header.started_at,
            finished_at: None,
            records:     Vec::new(),
            failure:     None,
        }
    }

    pub fn push(&mut self, record: PhaseRecord) {
        self.records.push(record);
    }

    /// 失敗を記録して集計を締める
    pub fn fail(&mut self, failure: PhaseFailure, at: DateTime<Utc>) {
        self.failure = Some(failure);
        self.finished_at = Some(at);
    }

    pub fn finish(&mut self, at: DateTime<Utc>) {
        self.finished_at = Some(at);
    }

    pub fn run_id(&self) -> &PurgeRunId {
        &self.run_id
    }

    pub fn clinic_id(&self) -> &ClinicId {
        &self.clinic_id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    pub fn records(&self) -> &[PhaseRecord] {
        &self.records
    }

    pub fn failure(&self) -> Option<&PhaseFailure> {
        self.failure.as_ref()
    }

    /// 全フェーズを実行し終えたか
    pub fn is_complete(&self) -> bool {
        self.finished_at.is_some() && self.failure.is_none()
    }

    /// 削除件数の合計
    pub fn total_deleted(&self) -> u64 {
        self.records.iter().map(|r| r.outcome.deleted_rows()).sum()
    }

    /// 1 件以上削除したフェーズ
    pub fn nonzero_phases(&self) -> impl Iterator<Item = &PhaseRecord> {
        self.records
            .iter()
            .filter(|r| r.outcome.deleted_rows() > 0)
    }

    pub fn skipped_phases(&self) -> impl Iterator<Item = &PhaseRecord> {
        self.records
            .iter()
            .filter(|r| r.outcome == PhaseOutcome::Skipped)
    }

    /// フェーズ名で結果を取得する
    pub fn outcome_of(&self, phase: &str) -> Option<PhaseOutcome> {
        self.records
            .iter()
            .find(|r| r.phase == phase)
            .map(|r| r.outcome)
    }
}

/// ドライランの 1 行
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreviewRow {
    pub phase: String,
    pub table: String,
    /// 削除対象の件数（テーブルが存在しない場合は `None`）
    pub rows:  Option<u64>,
}

/// ドライランの結果
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PurgePreview {
    pub rows: Vec<PreviewRow>,
}

impl PurgePreview {
    pub fn total(&self) -> u64 {
        self.rows.iter().filter_map(|r| r.rows).sum()
    }
}
