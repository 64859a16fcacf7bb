//! # PostgreSQL 削除ストア
//!
//! テーブル名が計画データで決まるため、`sqlx::query!` のコンパイル時検証は使わず、
//! 実行時クエリ（`sqlx::query`）にバインド値を渡す。

use std::time::Duration;

use async_trait::async_trait;
use sqlx::{
    PgPool,
    Postgres,
    postgres::PgArguments,
    query::{Query, QueryScalar},
};

use super::{Bind, PurgeStore, Statement};
use crate::{db::TxContext, error::InfraError};

/// PostgreSQL 削除ストア
pub struct PostgresPurgeStore {
    pool: PgPool,
}

impl PostgresPurgeStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn bind_query<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    binds: &'q [Bind],
) -> Query<'q, Postgres, PgArguments> {
    for bind in binds {
        query = match bind {
            Bind::Text(value) => query.bind(value.as_str()),
            Bind::TextArray(values) => query.bind(values.as_slice()),
        };
    }
    query
}

fn bind_scalar<'q, O>(
    mut query: QueryScalar<'q, Postgres, O, PgArguments>,
    binds: &'q [Bind],
) -> QueryScalar<'q, Postgres, O, PgArguments> {
    for bind in binds {
        query = match bind {
            Bind::Text(value) => query.bind(value.as_str()),
            Bind::TextArray(values) => query.bind(values.as_slice()),
        };
    }
    query
}

#[async_trait]
impl PurgeStore for PostgresPurgeStore {
    async fn fetch_strings(&self, statement: &Statement) -> Result<Vec<String>, InfraError> {
        let query = sqlx::query_scalar::<_, String>(&statement.sql);
        let rows = bind_scalar(query, &statement.binds)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn count(&self, statement: &Statement) -> Result<u64, InfraError> {
        let query = sqlx::query_scalar::<_, i64>(&statement.sql);
        let count = bind_scalar(query, &statement.binds)
            .fetch_one(&self.pool)
            .await?;
        u64::try_from(count)
            .map_err(|_| InfraError::unexpected(format!("負の件数が返されました: {count}")))
    }

    async fn begin(&self, statement_timeout: Duration) -> Result<TxContext, InfraError> {
        TxContext::begin_pg(&self.pool, statement_timeout).await
    }

    async fn execute(&self, tx: &mut TxContext, statement: &Statement) -> Result<u64, InfraError> {
        let result = bind_query(sqlx::query(&statement.sql), &statement.binds)
            .execute(tx.conn())
            .await?;
        Ok(result.rows_affected())
    }

    async fn commit(&self, tx: TxContext) -> Result<(), InfraError> {
        tx.commit().await
    }

    async fn rollback(&self, tx: TxContext) -> Result<(), InfraError> {
        tx.rollback().await
    }
}
