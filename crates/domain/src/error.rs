//! # ドメイン層エラー定義
//!
//! 削除計画の検証失敗や不正な識別子など、ドメイン固有の例外状態を表現するエラー型。
//!
//! ## 設計方針
//!
//! - **型による分類**: エラーの種類を列挙型で明示し、パターンマッチで処理可能に
//! - **thiserror 活用**: `#[error(...)]` マクロでエラーメッセージを自動生成
//! - **I/O を含まない**: DB やファイルのエラーはインフラ層（`InfraError`）で扱う
//!
//! ## 使用例
//!
//! ```rust
//! use clinic_purge_domain::DomainError;
//!
//! fn validate_table(name: &str) -> Result<(), DomainError> {
//!     if name.is_empty() {
//!         return Err(DomainError::Validation("テーブル名は必須です".to_string()));
//!     }
//!     Ok(())
//! }
//!
//! assert!(validate_table("").is_err());
//! ```

use thiserror::Error;

/// ドメイン層で発生するエラー
///
/// # 設計判断
///
/// - `thiserror` を使用し、`std::error::Error` トレイトを自動実装
/// - 各バリアントに `#[error(...)]` で人間可読なメッセージを定義
#[derive(Debug, Error)]
pub enum DomainError {
    /// バリデーションエラー
    ///
    /// 入力値や削除計画がルールに違反している場合に使用する。
    ///
    /// # 例
    ///
    /// - 空の ID
    /// - SQL 識別子として不正なテーブル名
    /// - 依存順序に違反した削除計画
    #[error("バリデーションエラー: {0}")]
    Validation(String),

    /// 削除計画ファイルの読み込み・デシリアライズ失敗
    ///
    /// TOML の構文エラーや必須キーの欠落など。
    #[error("削除計画を読み込めません: {0}")]
    PlanFormat(String),
}
