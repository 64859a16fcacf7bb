//! コマンドライン引数

use std::path::PathBuf;

use clap::Parser;
use clinic_purge_domain::{
    DomainError,
    clinic::{ClinicId, ClinicLookup},
};

/// クリニック（テナント）の全データを削除する
#[derive(Parser, Debug)]
#[command(name = "clinic-purge")]
#[command(version)]
#[command(about = "Erase every row that belongs to one clinic.", long_about = None)]
pub struct Args {
    /// クリニック ID（`--by-name` 指定時はクリニック名）
    pub clinic: String,

    /// CLINIC をクリニック名として検索する（大文字小文字を区別しない完全一致）
    #[arg(long)]
    pub by_name: bool,

    /// 確認フレーズの入力を省略する
    #[arg(long)]
    pub force: bool,

    /// 削除せずにフェーズごとの対象行数を表示する
    #[arg(long)]
    pub dry_run: bool,

    /// 本番 DB（`DATABASE_URL_PRD`）に接続する
    #[arg(long)]
    pub production: bool,

    /// 削除計画 TOML（`PURGE_PLAN_FILE` より優先）
    #[arg(long, value_name = "FILE")]
    pub plan: Option<PathBuf>,

    /// 監査ログのルートディレクトリ（`PURGE_LOG_DIR` より優先）
    #[arg(long, value_name = "DIR")]
    pub log_dir: Option<PathBuf>,
}

impl Args {
    /// クリニックの検索キー
    pub fn lookup(&self) -> Result<ClinicLookup, DomainError> {
        if self.by_name {
            ClinicLookup::by_name(self.clinic.as_str())
        } else {
            Ok(ClinicLookup::Id(ClinicId::new(self.clinic.trim())?))
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_args_クリニックidのみで実行できる() {
        let args = Args::try_parse_from(["clinic-purge", "CLN-1"]).unwrap();

        assert_eq!(args.clinic, "CLN-1");
        assert!(!args.force && !args.dry_run && !args.production && !args.by_name);
        assert_eq!(args.lookup().unwrap(), ClinicLookup::Id(ClinicId::new("CLN-1").unwrap()));
    }

    #[test]
    fn test_args_名前検索とオプションを解析する() {
        let args = Args::try_parse_from([
            "clinic-purge",
            "Clinic A",
            "--by-name",
            "--force",
            "--production",
            "--plan",
            "plan.toml",
            "--log-dir",
            "/var/log/purge",
        ])
        .unwrap();

        assert_eq!(args.lookup().unwrap(), ClinicLookup::Name("Clinic A".to_string()));
        assert!(args.force && args.production);
        assert_eq!(args.plan, Some(PathBuf::from("plan.toml")));
        assert_eq!(args.log_dir, Some(PathBuf::from("/var/log/purge")));
    }

    #[test]
    fn test_args_クリニック指定なしはエラー() {
        assert!(Args::try_parse_from(["clinic-purge", "--force"]).is_err());
    }

    #[test]
    fn test_lookup_空白のみの名前はエラー() {
        let args = Args::try_parse_from(["clinic-purge", "  ", "--by-name"]).unwrap();

        assert!(args.lookup().is_err());
    }
}
