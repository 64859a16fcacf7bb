//! # クリニック削除 CLI
//!
//! 1 つのクリニック（テナント）に属するすべての行を、外部キーの依存順序に従って
//! 削除する運用ツール。
//!
//! ## 処理の流れ
//!
//! ```text
//! 引数・環境変数 → 削除計画の読み込み → クリニックの特定
//!   ├─ --dry-run: フェーズごとの対象行数を表示して終了
//!   └─ 確認フレーズ（--force で省略）→ 削除 → 集計を表示
//! ```
//!
//! 監査ログは `<log_dir>/<clinic_id>/logs/purge_<YYYYMMDD_HHMMSS>_<run_id>.log` に書き出す。
//! 集計（`TOTAL: n`）は stdout、ログは stderr に出力する。
//!
//! ## 終了コード
//!
//! | コード | 意味 |
//! |--------|------|
//! | 0 | 削除完了、確認で中止、`--dry-run` |
//! | 1 | エラー（失敗フェーズ・テーブルと原因を表示） |
//! | 130 | シグナルによる中断 |
//!
//! ## 起動方法
//!
//! ```bash
//! # 対象行数の確認
//! cargo run -p clinic-purge -- CLN-0001 --dry-run
//!
//! # 本番環境
//! DATABASE_URL_PRD=postgres://... clinic-purge CLN-0001 --production
//! ```

mod cli;
mod config;
mod confirmation;

use std::{io, process::ExitCode, sync::Arc};

use anyhow::Context as _;
use clap::Parser;
use cli::Args;
use clinic_purge_domain::{
    clinic::ClinicContext,
    clock::SystemClock,
    purge::{PurgePlan, PurgePreview, PurgeSummary},
};
use clinic_purge_infra::{
    db,
    purge::{ClinicResolver, EngineSettings, FileAuditLog, PostgresPurgeStore, PurgeEngine, PurgeError},
};
use clinic_purge_shared::{
    event_log::{error as log_error, event},
    log_business_event,
    observability::{TracingConfig, init_tracing},
};
use config::PurgeConfig;
use confirmation::Confirmation;
use tokio_util::sync::CancellationToken;
use tracing::Instrument as _;

const APP_NAME: &str = "clinic-purge";

/// 中断時の終了コード（128 + SIGINT）
const EXIT_CANCELLED: u8 = 130;

#[tokio::main]
async fn main() -> ExitCode {
    // .env ファイルを読み込む（存在する場合）
    dotenvy::dotenv().ok();

    init_tracing(TracingConfig::from_env(APP_NAME));
    let args = Args::parse();

    let span = tracing::info_span!("app", app = APP_NAME);
    match run(args).instrument(span).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("エラー: {err:#}");
            match err.downcast_ref::<PurgeError>() {
                Some(PurgeError::Cancelled { .. }) => ExitCode::from(EXIT_CANCELLED),
                _ => ExitCode::FAILURE,
            }
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let mut config = PurgeConfig::from_env(args.production)?;
    if let Some(log_dir) = &args.log_dir {
        config.log_dir.clone_from(log_dir);
    }
    if let Some(plan) = &args.plan {
        config.plan_file = Some(plan.clone());
    }

    let plan = load_plan(&config)?;
    let lookup = args.lookup()?;

    let pool = db::create_run_pool(&config.database_url, config.acquire_timeout)
        .await
        .context("データベースに接続できません")?;
    tracing::info!(schema = %config.schema, production = args.production, "データベースに接続");

    let context = ClinicResolver::new(pool.clone(), config.schema.as_str())
        .resolve(&lookup)
        .await
        .inspect_err(|e| {
            tracing::error!(
                error.category = log_error::category::OPERATOR_INPUT,
                error.kind = log_error::kind::CLINIC_LOOKUP,
                "{e}"
            );
        })?;

    let engine = PurgeEngine::new(
        PostgresPurgeStore::new(pool),
        plan,
        EngineSettings {
            schema:             config.schema.clone(),
            statement_timeout:  config.statement_timeout,
            cascade_batch_size: config.cascade_batch_size,
        },
        Arc::new(SystemClock),
    );

    if args.dry_run {
        let preview = engine.preview(&context).await?;
        print_preview(&preview);
        return Ok(());
    }

    if !args.force && confirm(&context).await? == Confirmation::Declined {
        log_business_event!(
            event.category = event::category::PURGE,
            event.action = event::action::PURGE_DECLINED,
            event.clinic_id = %context.clinic_id(),
            event.result = event::result::FAILURE,
            "確認フレーズが一致しないため中止"
        );
        println!("中止しました。データは削除されていません。");
        return Ok(());
    }

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_signal(cancel.clone()));

    let mut audit = FileAuditLog::new(&config.log_dir);
    let result = engine.run(&context, &mut audit, &cancel).await;
    if let Some(path) = audit.path() {
        eprintln!("監査ログ: {}", path.display());
    }
    let summary = result?;
    print_summary(&summary);
    Ok(())
}

fn load_plan(config: &PurgeConfig) -> anyhow::Result<PurgePlan> {
    let Some(path) = &config.plan_file else {
        return Ok(PurgePlan::default_plan()?);
    };
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("削除計画を読み込めません: {}", path.display()))?;
    let plan = PurgePlan::from_toml(&source)
        .with_context(|| format!("削除計画が不正です: {}", path.display()))?;
    tracing::info!(path = %path.display(), phases = plan.phases().len(), "削除計画を読み込み");
    Ok(plan)
}

/// 確認フレーズを stdin から読み取る（プロンプトは stderr）
async fn confirm(context: &ClinicContext) -> anyhow::Result<Confirmation> {
    let input = io::BufReader::new(io::stdin());
    let result = confirmation::confirm_blocking(input, io::stderr(), context.clone())
        .await
        .context("確認フレーズを読み取れません")?;
    Ok(result)
}

/// SIGINT / SIGTERM でトークンをキャンセルする
///
/// シグナルハンドラを登録できない場合は警告のみ出し、中断なしで続行する。
async fn cancel_on_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Ctrl+C ハンドラを登録できません: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!("SIGTERM ハンドラを登録できません: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::warn!("SIGINT を受信、実行中のフェーズを中断します"),
        () = terminate => tracing::warn!("SIGTERM を受信、実行中のフェーズを中断します"),
    }
    cancel.cancel();
}

fn print_preview(preview: &PurgePreview) {
    for row in &preview.rows {
        match row.rows {
            Some(0) => {}
            Some(n) => println!("  {}: {n}", row.phase),
            None => println!("  {}: (skipped)", row.phase),
        }
    }
    println!("TOTAL: {} (dry-run)", preview.total());
}

fn print_summary(summary: &PurgeSummary) {
    for record in summary.nonzero_phases() {
        println!("  {}: {}", record.phase, record.outcome.deleted_rows());
    }
    println!("TOTAL: {}", summary.total_deleted());
}
