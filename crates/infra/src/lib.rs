//! # Clinic Purge インフラ層
//!
//! PostgreSQL とファイルシステムに対する削除処理の実装。
//!
//! ## 責務
//!
//! - **データベース接続**: 削除実行用の単一コネクションのプールとフェーズ単位のトランザクション
//! - **削除エンジン**: 削除計画のフェーズ実行、テーブル存在確認、ID 集合の事前解決
//! - **監査ログ**: 削除結果のファイル出力
//!
//! ## 依存関係
//!
//! ```text
//! purge-cli → infra → domain
//!               ↘
//!                shared
//! ```
//!
//! ## モジュール構成
//!
//! - [`db`] - PostgreSQL データベース接続管理
//! - [`error`] - インフラ層エラー定義
//! - [`purge`] - 削除エンジンと周辺コンポーネント
//!
//! ## 使用例
//!
//! ```rust,ignore
//! use clinic_purge_infra::{db, purge::{ClinicResolver, PostgresPurgeStore, PurgeEngine}};
//!
//! let pool = db::create_run_pool(&database_url, Duration::from_secs(5)).await?;
//! let context = ClinicResolver::new(pool.clone(), "public").resolve(&lookup).await?;
//! let engine = PurgeEngine::new(PostgresPurgeStore::new(pool), plan, settings, clock);
//! let summary = engine.run(&context, &mut audit_log, &cancel).await?;
//! ```

pub mod db;
pub mod error;
#[cfg(any(test, feature = "test-utils"))]
pub mod mock;
pub mod purge;

pub use error::{InfraError, InfraErrorKind};
