//! # 削除 CLI 設定
//!
//! 環境変数から削除 CLI の設定を読み込む。コマンドライン引数で指定された値は
//! 呼び出し側で上書きする。
//!
//! | 変数名 | 必須 | 説明 |
//! |--------|------|------|
//! | `DATABASE_URL` | **Yes** | PostgreSQL 接続 URL |
//! | `DATABASE_URL_PRD` | `--production` 時 | 本番環境の接続 URL |
//! | `PURGE_SCHEMA` | No | 対象スキーマ（デフォルト: `public`） |
//! | `PURGE_LOG_DIR` | No | 監査ログのルート（デフォルト: `clinics`） |
//! | `PURGE_STATEMENT_TIMEOUT_SECS` | No | 1 文あたりのタイムアウト秒（デフォルト: 60） |
//! | `PURGE_ACQUIRE_TIMEOUT_SECS` | No | 接続取得のタイムアウト秒（デフォルト: 5） |
//! | `PURGE_CASCADE_BATCH_SIZE` | No | `ANY($1)` に渡す ID の最大件数（デフォルト: 1000） |
//! | `PURGE_PLAN_FILE` | No | 削除計画 TOML（未設定で既定計画） |

use std::{env, path::PathBuf, str::FromStr, time::Duration};

use thiserror::Error;

/// 設定の読み込みエラー
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} が設定されていません（.env を確認してください）")]
    Missing(&'static str),

    #[error("{name} の値が不正です: {value:?}（{expected}）")]
    Invalid {
        name:     &'static str,
        value:    String,
        expected: &'static str,
    },
}

/// 削除 CLI の設定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurgeConfig {
    /// データベース接続 URL
    pub database_url:       String,
    /// 対象スキーマ
    pub schema:             String,
    /// 監査ログのルートディレクトリ
    pub log_dir:            PathBuf,
    /// 1 文あたりのタイムアウト
    pub statement_timeout:  Duration,
    /// 接続取得のタイムアウト
    pub acquire_timeout:    Duration,
    /// `ANY($1)` に渡す ID の最大件数
    pub cascade_batch_size: usize,
    /// 削除計画ファイル（`None` で既定計画）
    pub plan_file:          Option<PathBuf>,
}

impl PurgeConfig {
    /// 環境変数から設定を読み込む
    ///
    /// `production` の場合は `DATABASE_URL_PRD` を接続先にする。
    pub fn from_env(production: bool) -> Result<Self, ConfigError> {
        Self::from_lookup(production, |name| env::var(name).ok())
    }

    fn from_lookup(
        production: bool,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let url_var = if production {
            "DATABASE_URL_PRD"
        } else {
            "DATABASE_URL"
        };
        let database_url = lookup(url_var)
            .filter(|url| !url.trim().is_empty())
            .ok_or(ConfigError::Missing(url_var))?;

        Ok(Self {
            database_url,
            schema: lookup("PURGE_SCHEMA").unwrap_or_else(|| "public".to_string()),
            log_dir: lookup("PURGE_LOG_DIR")
                .map_or_else(|| PathBuf::from("clinics"), PathBuf::from),
            statement_timeout: Duration::from_secs(positive(
                &lookup,
                "PURGE_STATEMENT_TIMEOUT_SECS",
                60,
            )?),
            acquire_timeout: Duration::from_secs(positive(
                &lookup,
                "PURGE_ACQUIRE_TIMEOUT_SECS",
                5,
            )?),
            cascade_batch_size: positive(&lookup, "PURGE_CASCADE_BATCH_SIZE", 1000)?,
            plan_file: lookup("PURGE_PLAN_FILE").map(PathBuf::from),
        })
    }
}

/// 1 以上の整数を読み込む（未設定ならデフォルト値）
fn positive<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr + PartialOrd + From<u8>,
{
    let Some(value) = lookup(name) else {
        return Ok(default);
    };
    match value.trim().parse::<T>() {
        Ok(parsed) if parsed >= T::from(1u8) => Ok(parsed),
        _ => Err(ConfigError::Invalid {
            name,
            value,
            expected: "1 以上の整数",
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    fn load(production: bool, vars: &[(&str, &str)]) -> Result<PurgeConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        PurgeConfig::from_lookup(production, |name| vars.get(name).cloned())
    }

    #[test]
    fn test_from_env_未設定の項目はデフォルト値になる() {
        let config = load(false, &[("DATABASE_URL", "postgres://localhost/clinic")]).unwrap();

        assert_eq!(
            config,
            PurgeConfig {
                database_url:       "postgres://localhost/clinic".to_string(),
                schema:             "public".to_string(),
                log_dir:            PathBuf::from("clinics"),
                statement_timeout:  Duration::from_secs(60),
                acquire_timeout:    Duration::from_secs(5),
                cascade_batch_size: 1000,
                plan_file:          None,
            }
        );
    }

    #[test]
    fn test_from_env_本番指定ではdatabase_url_prdを使う() {
        let vars = [
            ("DATABASE_URL", "postgres://localhost/clinic"),
            ("DATABASE_URL_PRD", "postgres://prd/clinic"),
        ];

        let config = load(true, &vars).unwrap();

        assert_eq!(config.database_url, "postgres://prd/clinic");
    }

    #[test]
    fn test_from_env_本番urlがなければ開発urlにフォールバックしない() {
        let err = load(true, &[("DATABASE_URL", "postgres://localhost/clinic")]).unwrap_err();

        assert_eq!(err, ConfigError::Missing("DATABASE_URL_PRD"));
    }

    #[test]
    fn test_from_env_接続urlが空ならエラー() {
        let err = load(false, &[("DATABASE_URL", "  ")]).unwrap_err();

        assert_eq!(err, ConfigError::Missing("DATABASE_URL"));
    }

    #[test]
    fn test_from_env_環境変数で上書きできる() {
        let vars = [
            ("DATABASE_URL", "postgres://localhost/clinic"),
            ("PURGE_SCHEMA", "tenant"),
            ("PURGE_LOG_DIR", "/var/log/purge"),
            ("PURGE_STATEMENT_TIMEOUT_SECS", "120"),
            ("PURGE_CASCADE_BATCH_SIZE", "200"),
            ("PURGE_PLAN_FILE", "plan.toml"),
        ];

        let config = load(false, &vars).unwrap();

        assert_eq!(config.schema, "tenant");
        assert_eq!(config.log_dir, PathBuf::from("/var/log/purge"));
        assert_eq!(config.statement_timeout, Duration::from_secs(120));
        assert_eq!(config.cascade_batch_size, 200);
        assert_eq!(config.plan_file, Some(PathBuf::from("plan.toml")));
    }

    #[rstest]
    #[case("PURGE_CASCADE_BATCH_SIZE", "0")]
    #[case("PURGE_CASCADE_BATCH_SIZE", "many")]
    #[case("PURGE_STATEMENT_TIMEOUT_SECS", "0")]
    #[case("PURGE_STATEMENT_TIMEOUT_SECS", "-1")]
    #[case("PURGE_ACQUIRE_TIMEOUT_SECS", "1.5")]
    fn test_from_env_不正な数値はエラー(#[case] name: &'static str, #[case] value: &str) {
        let err = load(
            false,
            &[("DATABASE_URL", "postgres://localhost/clinic"), (name, value)],
        )
        .unwrap_err();

        assert!(matches!(err, ConfigError::Invalid { name: n, .. } if n == name));
    }
}
