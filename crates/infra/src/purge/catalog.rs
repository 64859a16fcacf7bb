//! # テーブル存在確認
//!
//! 環境ごとにスキーマが異なる（マイグレーション未適用のテーブルがある）ため、
//! 削除前にテーブルの存在を確認する。確認は実行開始時に 1 回だけカタログを読む。

use std::collections::HashSet;

use super::{PurgeStore, statement};
use crate::error::InfraError;

/// 実行開始時点のテーブル一覧
#[derive(Debug, Clone, Default)]
pub struct SchemaSnapshot {
    tables: HashSet<String>,
}

impl SchemaSnapshot {
    /// `information_schema.tables` からスキーマのテーブル一覧を読む
    pub async fn load<S: PurgeStore + ?Sized>(store: &S, schema: &str) -> Result<Self, InfraError> {
        let tables = store.fetch_strings(&statement::list_tables(schema)).await?;
        Ok(Self::from_tables(tables))
    }

    pub fn from_tables<I, T>(tables: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            tables: tables.into_iter().map(Into::into).collect(),
        }
    }

    pub fn exists(&self, table: &str) -> bool {
        self.tables.contains(table)
    }

    pub fn table_count(&self) -> usize {
        self.tables.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockPurgeStore;

    #[test]
    fn test_存在するテーブルのみtrueを返す() {
        let snapshot = SchemaSnapshot::from_tables(["patient", "clinic"]);

        assert!(snapshot.exists("patient"));
        assert!(!snapshot.exists("consent_instance"));
        assert_eq!(snapshot.table_count(), 2);
    }

    #[tokio::test]
    async fn test_ストアからテーブル一覧を1回で読み込む() {
        let store = MockPurgeStore::new().with_tables(["patient", "site"]);

        let snapshot = SchemaSnapshot::load(&store, "public").await.unwrap();

        assert!(snapshot.exists("site"));
        assert!(!snapshot.exists("clinic"));
        assert_eq!(store.queries().len(), 1);
    }
}
