//! # クリニックの特定
//!
//! 運用者が指定した ID または名前から、削除スコープ（[`ClinicContext`]）を組み立てる。
//!
//! - 名前検索は大文字小文字を区別しない完全一致。複数件該当した場合は推測せずにエラー
//! - 拠点はステータスに関係なく、クリニックに属するすべてを ID 順で取得する

use clinic_purge_domain::clinic::{
    ClinicContext,
    ClinicId,
    ClinicLookup,
    CompanyId,
    OrganizationId,
    SiteId,
};
use sqlx::PgPool;

use super::{PurgeError, statement::qualified};
use crate::error::InfraError;

/// `clinic` テーブルの行（id, organization_id, default_issuer_company_id）
type ClinicRow = (String, Option<String>, Option<String>);

/// クリニックリゾルバ
#[derive(Debug, Clone)]
pub struct ClinicResolver {
    pool:   PgPool,
    schema: String,
}

impl ClinicResolver {
    pub fn new(pool: PgPool, schema: impl Into<String>) -> Self {
        Self {
            pool,
            schema: schema.into(),
        }
    }

    /// 検索キーからクリニックの削除スコープを組み立てる
    #[tracing::instrument(skip(self), fields(lookup = %lookup))]
    pub async fn resolve(&self, lookup: &ClinicLookup) -> Result<ClinicContext, PurgeError> {
        let rows = self
            .find_clinics(lookup)
            .await
            .map_err(PurgeError::ClinicLookup)?;

        let (id, organization_id, company_id) = match rows.len() {
            1 => rows.into_iter().next().ok_or_else(|| unresolved(lookup, "該当なし"))?,
            0 => return Err(unresolved(lookup, "該当するクリニックがありません")),
            n => {
                return Err(unresolved(
                    lookup,
                    &format!("{n} 件のクリニックが該当します（ID で指定してください）"),
                ));
            }
        };

        let clinic_id = ClinicId::new(id).map_err(|e| unresolved(lookup, &e.to_string()))?;
        let site_ids = self
            .find_sites(&clinic_id)
            .await
            .map_err(PurgeError::ClinicLookup)?;

        // 値があって不正な会社・組織 ID はエラー（削除対象から黙って外さない）
        let company_id = company_id
            .map(CompanyId::new)
            .transpose()
            .map_err(|e| unresolved(lookup, &format!("会社 ID が不正です: {e}")))?;
        let organization_id = organization_id
            .map(OrganizationId::new)
            .transpose()
            .map_err(|e| unresolved(lookup, &format!("組織 ID が不正です: {e}")))?;

        let context = ClinicContext::new(clinic_id, site_ids, company_id, organization_id);
        tracing::info!(
            clinic_id = %context.clinic_id(),
            sites = context.site_ids().len(),
            company_id = context.company_id().map(tracing::field::display),
            organization_id = context.organization_id().map(tracing::field::display),
            "クリニックを特定"
        );
        Ok(context)
    }

    async fn find_clinics(&self, lookup: &ClinicLookup) -> Result<Vec<ClinicRow>, InfraError> {
        let table = qualified(&self.schema, "clinic");
        let rows = match lookup {
            ClinicLookup::Id(id) => {
                sqlx::query_as::<_, ClinicRow>(&format!(
                    "SELECT id::text, organization_id::text, default_issuer_company_id::text \
                     FROM {table} WHERE id = $1"
                ))
                .bind(id.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            ClinicLookup::Name(name) => {
                sqlx::query_as::<_, ClinicRow>(&format!(
                    "SELECT id::text, organization_id::text, default_issuer_company_id::text \
                     FROM {table} WHERE lower(name) = lower($1) ORDER BY id"
                ))
                .bind(name.as_str())
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(rows)
    }

    async fn find_sites(&self, clinic_id: &ClinicId) -> Result<Vec<SiteId>, InfraError> {
        let ids = sqlx::query_scalar::<_, String>(&format!(
            "SELECT id::text FROM {} WHERE clinic_id = $1 ORDER BY id",
            qualified(&self.schema, "site")
        ))
        .bind(clinic_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        ids.into_iter()
            .map(|id| SiteId::new(id).map_err(|e| InfraError::unexpected(e.to_string())))
            .collect()
    }
}

fn unresolved(lookup: &ClinicLookup, reason: &str) -> PurgeError {
    PurgeError::UnresolvedTenant {
        lookup: lookup.clone(),
        reason: reason.to_string(),
    }
}
