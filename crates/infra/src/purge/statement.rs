//! # 削除文の組み立て
//!
//! フェーズ定義と絞り込み値から、実行可能な SQL とバインド値を組み立てる。
//!
//! テーブル名・カラム名は [`PurgePlan`](clinic_purge_domain::purge::PurgePlan) の読み込み時に
//! 識別子として検証済みだが、埋め込む際はさらにダブルクォートで囲む。
//! 値はすべてバインドパラメータで渡す。
//!
//! ```text
//! DELETE FROM "public"."app_user" AS target
//!  WHERE target."id" = ANY($1)
//!    AND NOT EXISTS (SELECT 1 FROM "public"."user_clinic" AS guard
//!                     WHERE guard."user_id" = target."id")
//! ```

use clinic_purge_domain::purge::{Guard, IdSetSpec, PhaseDescriptor};

/// バインド値
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Bind {
    /// `= $1`
    Text(String),
    /// `= ANY($1)`（`TEXT[]`）
    TextArray(Vec<String>),
}

impl Bind {
    fn predicate(&self, column: &str) -> String {
        match self {
            Self::Text(_) => format!("target.{} = $1", quote(column)),
            Self::TextArray(_) => format!("target.{} = ANY($1)", quote(column)),
        }
    }
}

/// 実行可能な SQL 文
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    /// 対象テーブル（ログ・モック用）
    pub table: String,
    pub sql:   String,
    pub binds: Vec<Bind>,
}

/// 識別子をダブルクォートで囲む
fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

pub(crate) fn qualified(schema: &str, table: &str) -> String {
    format!("{}.{}", quote(schema), quote(table))
}

/// スキーマのテーブル一覧を取得する SQL
pub const LIST_TABLES_SQL: &str = "SELECT table_name::text FROM information_schema.tables \
     WHERE table_schema = $1 AND table_type = 'BASE TABLE'";

/// スキーマのテーブル一覧を取得する文
pub fn list_tables(schema: &str) -> Statement {
    Statement {
        table: "information_schema.tables".to_string(),
        sql:   LIST_TABLES_SQL.to_string(),
        binds: vec![Bind::Text(schema.to_string())],
    }
}

/// ID 集合を取得する文
///
/// `SELECT DISTINCT <id_column> FROM <table> WHERE <column> = $1`
pub fn select_ids(schema: &str, spec: &IdSetSpec, bind: Bind) -> Statement {
    Statement {
        table: spec.table().to_string(),
        sql:   format!(
            "SELECT DISTINCT target.{id}::text FROM {table} AS target WHERE {predicate} AND target.{id} IS NOT NULL",
            id = quote(spec.id_column()),
            table = qualified(schema, spec.table()),
            predicate = bind.predicate(spec.column()),
        ),
        binds: vec![bind],
    }
}

/// 削除文・件数取得文のビルダー
///
/// 存在しないテーブルのガードは呼び出し側で除外してから渡す。
pub struct PhaseStatementBuilder<'a> {
    schema: &'a str,
    phase:  &'a PhaseDescriptor,
    guards: Vec<&'a Guard>,
}

impl<'a> PhaseStatementBuilder<'a> {
    pub fn new(schema: &'a str, phase: &'a PhaseDescriptor, guards: Vec<&'a Guard>) -> Self {
        Self {
            schema,
            phase,
            guards,
        }
    }

    fn conditions(&self, bind: &Bind) -> String {
        let mut conditions = vec![bind.predicate(self.phase.column())];
        for guard in &self.guards {
            conditions.push(format!(
                "NOT EXISTS (SELECT 1 FROM {} AS guard WHERE guard.{} = target.\"id\")",
                qualified(self.schema, &guard.table),
                quote(&guard.column),
            ));
        }
        conditions.join(" AND ")
    }

    /// 1 つの絞り込み値に対する削除文
    ///
    /// 自己参照テーブルは 2 文になる（親を持つ行 → 残り）。
    pub fn delete(&self, bind: Bind) -> Vec<Statement> {
        let table = qualified(self.schema, self.phase.table());
        let conditions = self.conditions(&bind);
        let statement = |sql: String| Statement {
            table: self.phase.table().to_string(),
            sql,
            binds: vec![bind.clone()],
        };

        match self.phase.parent_column() {
            Some(parent) => vec![
                statement(format!(
                    "DELETE FROM {table} AS target WHERE {conditions} AND target.{} IS NOT NULL",
                    quote(parent)
                )),
                statement(format!("DELETE FROM {table} AS target WHERE {conditions}")),
            ],
            None => vec![statement(format!(
                "DELETE FROM {table} AS target WHERE {conditions}"
            ))],
        }
    }

    /// 1 つの絞り込み値に対する件数取得文
    pub fn count(&self, bind: Bind) -> Statement {
        Statement {
            table: self.phase.table().to_string(),
            sql:   format!(
                "SELECT COUNT(*) FROM {} AS target WHERE {}",
                qualified(self.schema, self.phase.table()),
                self.conditions(&bind)
            ),
            binds: vec![bind],
        }
    }
}
