//! # 削除監査ログ
//!
//! 削除したテーブルと件数を、クリニックごとのディレクトリに追記専用ファイルとして残す。
//!
//! ```text
//! <log_root>/<clinic_id>/logs/purge_20240101_120000_<run_id>.log
//! ```
//!
//! ファイル名に実行 ID を含めるため、同じ秒に開始した実行どうしでも衝突しない。
//! 1 行書くごとにフラッシュするため、途中で異常終了してもそこまでの記録は残る。
//!
//! フェーズ行はコミット（またはスキップ）を確定した時刻で始まる。
//!
//! ```text
//! 2024-01-01T12:00:03Z [DELETE] patient (patient): 3
//! 2024-01-01T12:00:03Z [SKIP] consent_instance (consent_instance): table not present
//! ```

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use clinic_purge_domain::purge::{PhaseOutcome, PhaseRecord, PurgeSummary, RunHeader};
use itertools::Itertools;
use tokio::{
    fs::{self, File, OpenOptions},
    io::AsyncWriteExt,
};

use super::AuditRecorder;
use crate::error::InfraError;

const RULE: &str = "==================================================";

/// 監査ログファイルのパス
///
/// クリニック ID はディレクトリ名に使うため、英数字・`-`・`_` 以外を `_` に置き換える。
pub fn audit_log_path(log_root: &Path, header: &RunHeader) -> PathBuf {
    let dir: String = header
        .context
        .clinic_id()
        .as_str()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    log_root
        .join(dir)
        .join("logs")
        .join(format!(
            "purge_{}_{}.log",
            header.started_at.format("%Y%m%d_%H%M%S"),
            header.run_id
        ))
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// 1 フェーズ分の行
pub fn format_record(record: &PhaseRecord) -> String {
    match record.outcome {
        PhaseOutcome::Deleted(rows) => format!(
            "{} [DELETE] {} ({}): {rows}",
            timestamp(record.recorded_at),
            record.phase,
            record.table
        ),
        PhaseOutcome::Skipped => format!(
            "{} [SKIP] {} ({}): table not present",
            timestamp(record.recorded_at),
            record.phase,
            record.table
        ),
    }
}

/// ヘッダブロック
pub fn format_header(header: &RunHeader) -> Vec<String> {
    let context = &header.context;
    let sites = if context.site_ids().is_empty() {
        "-".to_string()
    } else {
        context.site_ids().iter().join(", ")
    };
    vec![
        RULE.to_string(),
        "CLINIC PURGE".to_string(),
        format!("run_id: {}", header.run_id),
        format!("clinic_id: {}", context.clinic_id()),
        format!("sites ({}): {sites}", context.site_ids().len()),
        format!(
            "company_id: {}",
            context.company_id().map_or("-".to_string(), ToString::to_string)
        ),
        format!(
            "organization_id: {}",
            context
                .organization_id()
                .map_or("-".to_string(), ToString::to_string)
        ),
        format!("started_at: {}", timestamp(header.started_at)),
        RULE.to_string(),
    ]
}

/// 集計ブロック
///
/// 失敗した実行は `[FAILED]` 行と `PARTIAL SUMMARY` になる。
pub fn format_summary(summary: &PurgeSummary) -> Vec<String> {
    let mut lines = Vec::new();
    let title = match summary.failure() {
        Some(failure) => {
            lines.push(format!(
                "[FAILED] {} ({}): {}",
                failure.phase, failure.table, failure.reason
            ));
            "PARTIAL SUMMARY"
        }
        None => "SUMMARY",
    };
    lines.push(RULE.to_string());
    lines.push(title.to_string());
    for record in summary.nonzero_phases() {
        lines.push(format!("  {}: {}", record.phase, record.outcome.deleted_rows()));
    }
    let skipped = summary.skipped_phases().count();
    if skipped > 0 {
        lines.push(format!("  (skipped: {skipped})"));
    }
    lines.push(format!("TOTAL: {}", summary.total_deleted()));
    if let Some(at) = summary.finished_at() {
        lines.push(format!("finished_at: {}", timestamp(at)));
    }
    lines.push(RULE.to_string());
    lines
}

/// ファイル監査ログ
///
/// `begin` でファイルを作成する。同名ファイル（同じ実行 ID）が既にあればエラー（上書きしない）。
pub struct FileAuditLog {
    log_root: PathBuf,
    file:     Option<(PathBuf, File)>,
}

impl FileAuditLog {
    pub fn new(log_root: impl Into<PathBuf>) -> Self {
        Self {
            log_root: log_root.into(),
            file:     None,
        }
    }

    /// 作成済みのログファイルのパス（`begin` 前は `None`）
    pub fn path(&self) -> Option<&Path> {
        self.file.as_ref().map(|(path, _)| path.as_path())
    }

    async fn write_lines(&mut self, lines: &[String]) -> Result<(), InfraError> {
        let Some((_, file)) = self.file.as_mut() else {
            return Err(InfraError::unexpected("監査ログが開始されていません"));
        };
        for line in lines {
            file.write_all(line.as_bytes()).await?;
            file.write_all(b"\n").await?;
            file.flush().await?;
        }
        Ok(())
    }
}

#[async_trait]
impl AuditRecorder for FileAuditLog {
    async fn begin(&mut self, header: &RunHeader) -> Result<(), InfraError> {
        let path = audit_log_path(&self.log_root, header);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let file = OpenOptions::new()
            .append(true)
            .create_new(true)
            .open(&path)
            .await?;
        tracing::info!(path = %path.display(), "監査ログを作成");
        self.file = Some((path, file));
        self.write_lines(&format_header(header)).await
    }

    async fn record(&mut self, record: &PhaseRecord) -> Result<(), InfraError> {
        self.write_lines(&[format_record(record)]).await
    }

    async fn finish(&mut self, summary: &PurgeSummary) -> Result<(), InfraError> {
        self.write_lines(&format_summary(summary)).await
    }

    async fn abort(&mut self, summary: &PurgeSummary) -> Result<(), InfraError> {
        self.write_lines(&format_summary(summary)).await
    }
}
