//! # テスト用モック
//!
//! 削除エンジンのテストで使用するインメモリのストアと監査ログ。
//! `test-utils` feature を有効にすることで、他クレートからも利用可能。
//!
//! ```toml
//! [dev-dependencies]
//! clinic-purge-infra = { workspace = true, features = ["test-utils"] }
//! ```

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use clinic_purge_domain::purge::{PhaseRecord, PurgeSummary, RunHeader};
use tokio_util::sync::CancellationToken;

use crate::{
    db::TxContext,
    error::InfraError,
    purge::{AuditRecorder, PurgeStore, Statement},
};

// ===== MockPurgeStore =====

/// モックストアに対する操作の記録
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockEvent {
    Query { table: String, sql: String },
    Count { table: String, sql: String },
    Begin,
    Execute { table: String, sql: String },
    Commit,
    Rollback,
}

#[derive(Default)]
struct MockStoreState {
    tables:     HashSet<String>,
    ids:        HashMap<String, Vec<String>>,
    affected:   HashMap<String, u64>,
    fail:       HashSet<String>,
    fail_query: HashSet<String>,
    fail_commit: HashSet<String>,
    cancel_on:  Option<(String, CancellationToken)>,
    pending:    Vec<String>,
    events:     Vec<MockEvent>,
}

/// インメモリの削除ストア
///
/// - `with_tables`: カタログに存在するテーブル
/// - `with_ids`: テーブルから取得される ID（取得元テーブルの削除がコミットされると空になる）
/// - `with_affected`: テーブルへの削除文 1 文あたりの影響行数（コミット後は 0）
/// - `fail_on`: テーブルへの削除文・件数取得を DB エラーにする
/// - `fail_query_on`: テーブルからの読み取り（テーブル一覧・ID 集合）を DB エラーにする
/// - `fail_commit_on`: テーブルへの削除文を含むトランザクションのコミットを DB エラーにする
/// - `cancel_on`: テーブルへの削除文の実行中にトークンをキャンセルする
#[derive(Clone, Default)]
pub struct MockPurgeStore {
    state: Arc<Mutex<MockStoreState>>,
}

impl MockPurgeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tables<I, T>(self, tables: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.state
            .lock()
            .unwrap()
            .tables
            .extend(tables.into_iter().map(Into::into));
        self
    }

    pub fn with_ids<I, T>(self, table: &str, ids: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.state
            .lock()
            .unwrap()
            .ids
            .insert(table.to_string(), ids.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_affected(self, table: &str, rows: u64) -> Self {
        self.state
            .lock()
            .unwrap()
            .affected
            .insert(table.to_string(), rows);
        self
    }

    pub fn fail_on(self, table: &str) -> Self {
        self.state.lock().unwrap().fail.insert(table.to_string());
        self
    }

    pub fn fail_query_on(self, table: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .fail_query
            .insert(table.to_string());
        self
    }

    pub fn fail_commit_on(self, table: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .fail_commit
            .insert(table.to_string());
        self
    }

    pub fn cancel_on(self, table: &str, token: CancellationToken) -> Self {
        self.state.lock().unwrap().cancel_on = Some((table.to_string(), token));
        self
    }

    pub fn events(&self) -> Vec<MockEvent> {
        self.state.lock().unwrap().events.clone()
    }

    /// 発行した読み取りクエリ（テーブル一覧・ID 集合）
    pub fn queries(&self) -> Vec<Statement> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                MockEvent::Query { table, sql } => Some(Statement {
                    table,
                    sql,
                    binds: vec![],
                }),
                _ => None,
            })
            .collect()
    }

    /// 実行した削除文の対象テーブル（実行順）
    pub fn executed_tables(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                MockEvent::Execute { table, .. } => Some(table),
                _ => None,
            })
            .collect()
    }

    /// 実行した削除文の SQL（実行順）
    pub fn executed_sql(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                MockEvent::Execute { sql, .. } => Some(sql),
                _ => None,
            })
            .collect()
    }

    fn check_failure(failing: &HashSet<String>, table: &str) -> Result<(), InfraError> {
        if failing.contains(table) {
            return Err(sqlx::Error::Protocol(format!("{table} への操作に失敗しました")).into());
        }
        Ok(())
    }
}

#[async_trait]
impl PurgeStore for MockPurgeStore {
    async fn fetch_strings(&self, statement: &Statement) -> Result<Vec<String>, InfraError> {
        let mut state = self.state.lock().unwrap();
        state.events.push(MockEvent::Query {
            table: statement.table.clone(),
            sql:   statement.sql.clone(),
        });
        Self::check_failure(&state.fail_query, &statement.table)?;
        if statement.sql.contains("information_schema.tables") {
            let mut tables: Vec<String> = state.tables.iter().cloned().collect();
            tables.sort();
            return Ok(tables);
        }
        Ok(state.ids.get(&statement.table).cloned().unwrap_or_default())
    }

    async fn count(&self, statement: &Statement) -> Result<u64, InfraError> {
        let mut state = self.state.lock().unwrap();
        state.events.push(MockEvent::Count {
            table: statement.table.clone(),
            sql:   statement.sql.clone(),
        });
        Self::check_failure(&state.fail, &statement.table)?;
        Ok(state.affected.get(&statement.table).copied().unwrap_or(0))
    }

    async fn begin(&self, _statement_timeout: Duration) -> Result<TxContext, InfraError> {
        let mut state = self.state.lock().unwrap();
        state.events.push(MockEvent::Begin);
        state.pending.clear();
        Ok(TxContext::mock())
    }

    async fn execute(&self, _tx: &mut TxContext, statement: &Statement) -> Result<u64, InfraError> {
        let mut state = self.state.lock().unwrap();
        state.events.push(MockEvent::Execute {
            table: statement.table.clone(),
            sql:   statement.sql.clone(),
        });
        Self::check_failure(&state.fail, &statement.table)?;
        if let Some((table, token)) = &state.cancel_on
            && *table == statement.table
        {
            token.cancel();
        }
        state.pending.push(statement.table.clone());
        Ok(state.affected.get(&statement.table).copied().unwrap_or(0))
    }

    async fn commit(&self, tx: TxContext) -> Result<(), InfraError> {
        {
            let mut state = self.state.lock().unwrap();
            state.events.push(MockEvent::Commit);
            let pending = std::mem::take(&mut state.pending);
            if let Some(table) = pending.iter().find(|t| state.fail_commit.contains(*t)) {
                return Err(sqlx::Error::Protocol(format!("{table} のコミットに失敗しました")).into());
            }
            for table in pending {
                state.affected.remove(&table);
                state.ids.remove(&table);
            }
        }
        tx.commit().await
    }

    async fn rollback(&self, tx: TxContext) -> Result<(), InfraError> {
        {
            let mut state = self.state.lock().unwrap();
            state.events.push(MockEvent::Rollback);
            state.pending.clear();
        }
        tx.rollback().await
    }
}

// ===== MemoryAuditRecorder =====

#[derive(Default)]
struct MemoryAuditState {
    header:     Option<RunHeader>,
    records:    Vec<PhaseRecord>,
    finished:   Option<PurgeSummary>,
    aborted:    Option<PurgeSummary>,
    fail_after: Option<usize>,
}

/// インメモリの監査ログ
///
/// クローンは同じ記録を共有する。
#[derive(Clone, Default)]
pub struct MemoryAuditRecorder {
    state: Arc<Mutex<MemoryAuditState>>,
}

impl MemoryAuditRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// `count` 件記録した後の `record` を失敗させる
    pub fn fail_after(self, count: usize) -> Self {
        self.state.lock().unwrap().fail_after = Some(count);
        self
    }

    pub fn header(&self) -> Option<RunHeader> {
        self.state.lock().unwrap().header.clone()
    }

    pub fn records(&self) -> Vec<PhaseRecord> {
        self.state.lock().unwrap().records.clone()
    }

    pub fn finished(&self) -> Option<PurgeSummary> {
        self.state.lock().unwrap().finished.clone()
    }

    pub fn aborted(&self) -> Option<PurgeSummary> {
        self.state.lock().unwrap().aborted.clone()
    }
}

#[async_trait]
impl AuditRecorder for MemoryAuditRecorder {
    async fn begin(&mut self, header: &RunHeader) -> Result<(), InfraError> {
        self.state.lock().unwrap().header = Some(header.clone());
        Ok(())
    }

    async fn record(&mut self, record: &PhaseRecord) -> Result<(), InfraError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_after.is_some_and(|limit| state.records.len() >= limit) {
            return Err(std::io::Error::other("ディスクがいっぱいです").into());
        }
        state.records.push(record.clone());
        Ok(())
    }

    async fn finish(&mut self, summary: &PurgeSummary) -> Result<(), InfraError> {
        self.state.lock().unwrap().finished = Some(summary.clone());
        Ok(())
    }

    async fn abort(&mut self, summary: &PurgeSummary) -> Result<(), InfraError> {
        self.state.lock().unwrap().aborted = Some(summary.clone());
        Ok(())
    }
}
