//! # Clinic Purge ドメイン層
//!
//! クリニック（テナント）全データ削除の純粋なモデルを定義する。
//! DB・ファイル・ネットワークには一切依存しない。
//!
//! ## 依存関係の方向
//!
//! ```text
//! purge-cli → infra → domain
//! ```
//!
//! ## モジュール構成
//!
//! - [`clinic`] - クリニック ID・拠点 ID と削除スコープ（`ClinicContext`）
//! - [`purge`] - 削除計画と削除結果
//! - [`clock`] - 時刻プロバイダ
//! - [`error`] - ドメイン層で発生するエラーの定義
//!
//! ## 使用例
//!
//! ```rust
//! use clinic_purge_domain::purge::PurgePlan;
//!
//! let plan = PurgePlan::default_plan().unwrap();
//! assert_eq!(plan.phases().last().map(|p| p.table()), Some("organization"));
//! ```

#[macro_use]
mod macros;

pub mod clinic;
pub mod clock;
pub mod error;
pub mod purge;

pub use error::DomainError;
