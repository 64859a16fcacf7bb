//! # 削除エンジン
//!
//! 削除計画のフェーズを先頭から順に実行する。
//!
//! ## フェーズの実行
//!
//! 1. テーブルが存在しなければ `Skipped`
//! 2. 絞り込み値を決める（拠点スコープは拠点ごと、ID 集合はバッチごとに 1 文）
//! 3. 絞り込み値がなければ文を発行せず `Deleted(0)`
//! 4. 1 フェーズ = 1 トランザクション。`statement_timeout` を設定し、全文を実行してコミット
//!
//! DB エラーまたは中断時は実行中のフェーズのみロールバックし、それ以前のフェーズは
//! コミット済みのまま残る。部分集計を監査ログに書いてから終了する。
//! 削除は条件付きのため冪等であり、再実行がリトライ手段になる。
//!
//! ## 同時実行
//!
//! 同じクリニックに対する複数の実行は想定していない（ID 集合を実行開始時に
//! 固定するため、競合した実行が互いの削除を見落とす）。呼び出し側でクリニック
//! 単位に直列化すること。

use std::{sync::Arc, time::Duration};

use clinic_purge_domain::{
    clinic::ClinicContext,
    clock::Clock,
    purge::{
        PhaseDescriptor,
        PhaseFailure,
        PhaseOutcome,
        PhaseRecord,
        PhaseState,
        PreviewRow,
        PurgePlan,
        PurgePreview,
        PurgeRunId,
        PurgeSummary,
        RunHeader,
        Scope,
        ScopeKey,
    },
};
use clinic_purge_shared::{
    event_log::{error as log_error, event},
    log_business_event,
};
use tokio_util::sync::CancellationToken;
use tracing::Instrument as _;

use super::{
    AuditRecorder,
    PurgeError,
    PurgeStore,
    catalog::SchemaSnapshot,
    id_resolver::{ResolvedIds, resolve_id_sets},
    statement::{Bind, PhaseStatementBuilder, Statement},
};
use crate::db::TxContext;

/// 削除エンジンの実行設定
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// 対象スキーマ
    pub schema:             String,
    /// 1 文あたりのタイムアウト（フェーズのトランザクション内で設定）
    pub statement_timeout:  Duration,
    /// `ANY($1)` に渡す ID の最大件数
    pub cascade_batch_size: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            schema:             "public".to_string(),
            statement_timeout:  Duration::from_secs(60),
            cascade_batch_size: 1000,
        }
    }
}

/// 削除エンジン
pub struct PurgeEngine<S> {
    store:    S,
    plan:     PurgePlan,
    settings: EngineSettings,
    clock:    Arc<dyn Clock>,
}

/// 実行前のスキーマ情報と ID 集合
struct Prepared {
    snapshot: SchemaSnapshot,
    ids:      ResolvedIds,
}

impl<S: PurgeStore> PurgeEngine<S> {
    pub fn new(store: S, plan: PurgePlan, settings: EngineSettings, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            plan,
            settings,
            clock,
        }
    }

    /// クリニックの全データを削除する
    ///
    /// 成功時は全フェーズの集計を返す。失敗時も監査ログには部分集計が残る。
    #[tracing::instrument(
        name = "purge_run",
        skip_all,
        fields(clinic_id = %context.clinic_id(), run_id = tracing::field::Empty)
    )]
    pub async fn run(
        &self,
        context: &ClinicContext,
        recorder: &mut dyn AuditRecorder,
        cancel: &CancellationToken,
    ) -> Result<PurgeSummary, PurgeError> {
        let header = RunHeader {
            run_id:     PurgeRunId::new(),
            context:    context.clone(),
            started_at: self.clock.now(),
        };
        tracing::Span::current().record("run_id", tracing::field::display(&header.run_id));

        recorder.begin(&header).await.map_err(PurgeError::Audit)?;
        log_business_event!(
            event.category = event::category::PURGE,
            event.action = event::action::PURGE_STARTED,
            event.clinic_id = %context.clinic_id(),
            event.run_id = %header.run_id,
            event.sites = context.site_ids().len(),
            event.phases = self.plan.phases().len(),
            "クリニック削除を開始"
        );

        let mut summary = PurgeSummary::new(&header);
        match self.run_phases(context, recorder, cancel, &mut summary).await {
            Ok(()) => {
                summary.finish(self.clock.now());
                recorder.finish(&summary).await.map_err(PurgeError::Audit)?;
                log_business_event!(
                    event.category = event::category::PURGE,
                    event.action = event::action::PURGE_COMPLETED,
                    event.clinic_id = %context.clinic_id(),
                    event.run_id = %header.run_id,
                    event.rows = summary.total_deleted(),
                    event.result = event::result::SUCCESS,
                    "クリニック削除が完了"
                );
                Ok(summary)
            }
            Err(err) => {
                self.abort(recorder, &mut summary, &err).await;
                Err(err)
            }
        }
    }

    async fn prepare(&self, context: &ClinicContext) -> Result<Prepared, PurgeError> {
        let snapshot = SchemaSnapshot::load(&self.store, &self.settings.schema)
            .await
            .map_err(PurgeError::Catalog)?;
        tracing::debug!(tables = snapshot.table_count(), schema = %self.settings.schema, "テーブル一覧を取得");
        let ids = resolve_id_sets(
            &self.store,
            &self.settings.schema,
            &self.plan,
            context,
            &snapshot,
        )
        .await?;
        Ok(Prepared { snapshot, ids })
    }

    async fn run_phases(
        &self,
        context: &ClinicContext,
        recorder: &mut dyn AuditRecorder,
        cancel: &CancellationToken,
        summary: &mut PurgeSummary,
    ) -> Result<(), PurgeError> {
        let prepared = self.prepare(context).await?;

        for phase in self.plan.phases() {
            if cancel.is_cancelled() {
                return Err(cancelled(phase));
            }

            let span = tracing::info_span!("purge_phase", phase = phase.name(), table = phase.table());
            let outcome = self
                .run_phase(phase, context, &prepared, cancel)
                .instrument(span)
                .await?;

            match outcome {
                PhaseOutcome::Deleted(rows) => log_business_event!(
                    event.category = event::category::PURGE,
                    event.action = event::action::PHASE_COMMITTED,
                    event.clinic_id = %context.clinic_id(),
                    event.phase = phase.name(),
                    event.table = phase.table(),
                    event.rows = rows,
                    "フェーズをコミット"
                ),
                PhaseOutcome::Skipped => log_business_event!(
                    event.category = event::category::PURGE,
                    event.action = event::action::PHASE_SKIPPED,
                    event.clinic_id = %context.clinic_id(),
                    event.phase = phase.name(),
                    event.table = phase.table(),
                    "テーブルが存在しないためスキップ"
                ),
            }

            let record = PhaseRecord {
                phase: phase.name().to_string(),
                table: phase.table().to_string(),
                outcome,
                recorded_at: self.clock.now(),
            };
            summary.push(record.clone());
            recorder.record(&record).await.map_err(PurgeError::Audit)?;
        }
        Ok(())
    }

    /// 1 フェーズを実行する
    ///
    /// どの経路で抜けても状態は終了状態（Committed / Skipped / Failed）にある。
    async fn run_phase(
        &self,
        phase: &PhaseDescriptor,
        context: &ClinicContext,
        prepared: &Prepared,
        cancel: &CancellationToken,
    ) -> Result<PhaseOutcome, PurgeError> {
        let mut state = PhaseState::Pending;
        let result = self
            .execute_phase(phase, context, prepared, cancel, &mut state)
            .await;

        debug_assert!(state.is_terminal(), "フェーズが終了状態にない: {state}");
        if let Ok(outcome) = &result {
            debug_assert_eq!(outcome.state(), state);
        }
        tracing::debug!(state = %state, "フェーズ終了");
        result
    }

    async fn execute_phase(
        &self,
        phase: &PhaseDescriptor,
        context: &ClinicContext,
        prepared: &Prepared,
        cancel: &CancellationToken,
        state: &mut PhaseState,
    ) -> Result<PhaseOutcome, PurgeError> {
        if !prepared.snapshot.exists(phase.table()) {
            transition(state, PhaseState::Skipped);
            return Ok(PhaseOutcome::Skipped);
        }

        let binds = self.phase_binds(phase, context, &prepared.ids);
        transition(state, PhaseState::Running);
        if binds.is_empty() {
            tracing::debug!(scope = %phase.scope(), "絞り込み値がないため文を発行しない");
            transition(state, PhaseState::Committed);
            return Ok(PhaseOutcome::Deleted(0));
        }

        let builder = self.builder(phase, &prepared.snapshot);
        let statements: Vec<Statement> = binds.into_iter().flat_map(|b| builder.delete(b)).collect();

        let mut tx = self
            .store
            .begin(self.settings.statement_timeout)
            .await
            .map_err(|source| {
                transition(state, PhaseState::Failed);
                store_error(phase, source)
            })?;

        let mut deleted: u64 = 0;
        for statement in &statements {
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                result = self.store.execute(&mut tx, statement) => Some(result),
            };
            match result {
                Some(Ok(rows)) => deleted += rows,
                Some(Err(source)) => {
                    transition(state, PhaseState::Failed);
                    self.rollback(tx).await;
                    return Err(store_error(phase, source));
                }
                None => {
                    transition(state, PhaseState::Failed);
                    self.rollback(tx).await;
                    return Err(cancelled(phase));
                }
            }
            if cancel.is_cancelled() {
                transition(state, PhaseState::Failed);
                self.rollback(tx).await;
                return Err(cancelled(phase));
            }
        }

        if let Err(source) = self.store.commit(tx).await {
            transition(state, PhaseState::Failed);
            return Err(store_error(phase, source));
        }
        transition(state, PhaseState::Committed);
        tracing::debug!(statements = statements.len(), rows = deleted, "フェーズをコミット");
        Ok(PhaseOutcome::Deleted(deleted))
    }

    /// ロールバックの失敗はログのみ（元のエラーを優先する）
    async fn rollback(&self, tx: TxContext) {
        if let Err(e) = self.store.rollback(tx).await {
            tracing::error!(
                error.category = log_error::category::INFRASTRUCTURE,
                error.kind = log_error::kind::DATABASE,
                "ロールバックに失敗: {e}"
            );
        }
    }

    /// ガードのうち、テーブルが存在するものだけを使うビルダー
    fn builder<'a>(
        &'a self,
        phase: &'a PhaseDescriptor,
        snapshot: &SchemaSnapshot,
    ) -> PhaseStatementBuilder<'a> {
        let guards = phase
            .guards()
            .iter()
            .filter(|guard| {
                let present = snapshot.exists(&guard.table);
                if !present {
                    tracing::debug!(guard_table = %guard.table, "ガードのテーブルが存在しないため除外");
                }
                present
            })
            .collect();
        PhaseStatementBuilder::new(&self.settings.schema, phase, guards)
    }

    /// フェーズの絞り込み値（1 値につき 1 文）
    fn phase_binds(
        &self,
        phase: &PhaseDescriptor,
        context: &ClinicContext,
        ids: &ResolvedIds,
    ) -> Vec<Bind> {
        match phase.scope() {
            Scope::Key(ScopeKey::Clinic) => vec![Bind::Text(context.clinic_id().to_string())],
            Scope::Key(ScopeKey::Sites) => context
                .site_ids()
                .iter()
                .map(|site| Bind::Text(site.to_string()))
                .collect(),
            Scope::Key(ScopeKey::Company) => context
                .company_id()
                .map(|id| Bind::Text(id.to_string()))
                .into_iter()
                .collect(),
            Scope::Key(ScopeKey::Organization) => context
                .organization_id()
                .map(|id| Bind::Text(id.to_string()))
                .into_iter()
                .collect(),
            Scope::Ids(name) => ids
                .get(name)
                .chunks(self.settings.cascade_batch_size.max(1))
                .map(|chunk| Bind::TextArray(chunk.to_vec()))
                .collect(),
        }
    }

    /// 失敗を監査ログに書き、ログに出力する
    async fn abort(&self, recorder: &mut dyn AuditRecorder, summary: &mut PurgeSummary, err: &PurgeError) {
        let (phase, table) = failure_point(err);
        summary.fail(
            PhaseFailure {
                phase,
                table,
                reason: err.to_string(),
            },
            self.clock.now(),
        );

        tracing::error!(
            error.category = log_error::category::INFRASTRUCTURE,
            error.kind = err.kind_label(),
            "クリニック削除に失敗: {err}"
        );
        log_business_event!(
            event.category = event::category::PURGE,
            event.action = event::action::PURGE_FAILED,
            event.clinic_id = %summary.clinic_id(),
            event.run_id = %summary.run_id(),
            event.rows = summary.total_deleted(),
            event.result = event::result::FAILURE,
            "クリニック削除を中断"
        );

        if let Err(e) = recorder.abort(summary).await {
            tracing::error!(
                error.category = log_error::category::INFRASTRUCTURE,
                error.kind = log_error::kind::AUDIT_LOG,
                "部分集計を監査ログに書き込めません: {e}"
            );
        }
    }

    /// 削除せずにフェーズごとの対象件数を数える
    ///
    /// 削除と同じ条件で `SELECT COUNT(*)` を実行する。トランザクションは使わない。
    /// ガード付きのフェーズは現時点の参照状況で数えるため、実際の削除件数より
    /// 少なく出ることがある（`app_user` は `user_clinic` の削除後に対象になる）。
    #[tracing::instrument(name = "purge_preview", skip_all, fields(clinic_id = %context.clinic_id()))]
    pub async fn preview(&self, context: &ClinicContext) -> Result<PurgePreview, PurgeError> {
        let prepared = self.prepare(context).await?;
        let mut preview = PurgePreview::default();

        for phase in self.plan.phases() {
            let rows = if prepared.snapshot.exists(phase.table()) {
                let builder = self.builder(phase, &prepared.snapshot);
                let mut total = 0;
                for bind in self.phase_binds(phase, context, &prepared.ids) {
                    total += self
                        .store
                        .count(&builder.count(bind))
                        .await
                        .map_err(|source| store_error(phase, source))?;
                }
                Some(total)
            } else {
                None
            };
            preview.rows.push(PreviewRow {
                phase: phase.name().to_string(),
                table: phase.table().to_string(),
                rows,
            });
        }
        Ok(preview)
    }
}

fn transition(state: &mut PhaseState, next: PhaseState) {
    debug_assert!(state.can_transition_to(next), "{state} → {next}");
    tracing::trace!(from = %state, to = %next, "フェーズ状態遷移");
    *state = next;
}

fn store_error(phase: &PhaseDescriptor, source: crate::error::InfraError) -> PurgeError {
    PurgeError::Store {
        phase: phase.name().to_string(),
        table: phase.table().to_string(),
        source,
    }
}

fn cancelled(phase: &PhaseDescriptor) -> PurgeError {
    PurgeError::Cancelled {
        phase: phase.name().to_string(),
        table: phase.table().to_string(),
    }
}

/// 失敗箇所（フェーズ名, テーブル名）
fn failure_point(err: &PurgeError) -> (String, String) {
    match err {
        PurgeError::Store { phase, table, .. } | PurgeError::Cancelled { phase, table } => {
            (phase.clone(), table.clone())
        }
        PurgeError::IdResolution { id_set, table, .. } => (format!("id_set:{id_set}"), table.clone()),
        PurgeError::Catalog(_) => (
            "schema_snapshot".to_string(),
            "information_schema.tables".to_string(),
        ),
        PurgeError::Audit(_) => ("audit_log".to_string(), "-".to_string()),
        PurgeError::UnresolvedTenant { .. } | PurgeError::ClinicLookup(_) => {
            ("clinic_lookup".to_string(), "clinic".to_string())
        }
    }
}
