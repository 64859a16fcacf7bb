//! # ID 集合の事前解決
//!
//! クリニック ID を持たない子テーブル（`receipt_item` など）は、親テーブルの ID で
//! 絞り込んで削除する。親の行を削除した後では ID を取得できないため、
//! 最初のフェーズを実行する前に計画中のすべての ID 集合をメモリに読み込む。
//!
//! 読み込んだ集合は実行中に変化しない。

use std::collections::HashMap;

use clinic_purge_domain::{
    clinic::ClinicContext,
    purge::{IdSetSpec, PurgePlan, ScopeKey},
};

use super::{
    PurgeError,
    PurgeStore,
    catalog::SchemaSnapshot,
    statement::{self, Bind},
};

/// 解決済みの ID 集合
#[derive(Debug, Clone, Default)]
pub struct ResolvedIds {
    sets: HashMap<String, Vec<String>>,
}

impl ResolvedIds {
    /// ID 集合を取得する（未解決の名前は空集合）
    pub fn get(&self, name: &str) -> &[String] {
        self.sets.get(name).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn insert(&mut self, name: impl Into<String>, ids: Vec<String>) {
        self.sets.insert(name.into(), ids);
    }
}

/// ID 集合の絞り込み値
///
/// 拠点スコープは全拠点を `ANY` でまとめて 1 文にする。値がない場合は `None`。
pub(crate) fn id_set_bind(context: &ClinicContext, scope: ScopeKey) -> Option<Bind> {
    match scope {
        ScopeKey::Clinic => Some(Bind::Text(context.clinic_id().to_string())),
        ScopeKey::Sites if context.site_ids().is_empty() => None,
        ScopeKey::Sites => Some(Bind::TextArray(
            context.site_ids().iter().map(ToString::to_string).collect(),
        )),
        ScopeKey::Company => context.company_id().map(|id| Bind::Text(id.to_string())),
        ScopeKey::Organization => context
            .organization_id()
            .map(|id| Bind::Text(id.to_string())),
    }
}

/// 計画中のすべての ID 集合を解決する
///
/// テーブルが存在しない、またはスコープの値がない集合は空集合になる。
#[tracing::instrument(skip_all, fields(id_sets = plan.id_sets().len()))]
pub async fn resolve_id_sets<S: PurgeStore + ?Sized>(
    store: &S,
    schema: &str,
    plan: &PurgePlan,
    context: &ClinicContext,
    snapshot: &SchemaSnapshot,
) -> Result<ResolvedIds, PurgeError> {
    let mut resolved = ResolvedIds::default();
    for spec in plan.id_sets() {
        let ids = resolve_one(store, schema, spec, context, snapshot).await?;
        tracing::debug!(id_set = spec.name(), table = spec.table(), count = ids.len(), "ID 集合を解決");
        resolved.insert(spec.name(), ids);
    }
    Ok(resolved)
}

async fn resolve_one<S: PurgeStore + ?Sized>(
    store: &S,
    schema: &str,
    spec: &IdSetSpec,
    context: &ClinicContext,
    snapshot: &SchemaSnapshot,
) -> Result<Vec<String>, PurgeError> {
    if !snapshot.exists(spec.table()) {
        return Ok(Vec::new());
    }
    let Some(bind) = id_set_bind(context, spec.scope()) else {
        return Ok(Vec::new());
    };
    store
        .fetch_strings(&statement::select_ids(schema, spec, bind))
        .await
        .map_err(|source| PurgeError::IdResolution {
            id_set: spec.name().to_string(),
            table: spec.table().to_string(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use clinic_purge_domain::clinic::{ClinicId, CompanyId, SiteId};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::mock::MockPurgeStore;

    fn context(sites: &[&str]) -> ClinicContext {
        ClinicContext::new(
            ClinicId::new("CLN-1").unwrap(),
            sites.iter().map(|s| SiteId::new(*s).unwrap()).collect(),
            None,
            None,
        )
    }

    #[tokio::test]
    async fn test_存在するテーブルのid集合を読み込む() {
        let plan = PurgePlan::default_plan().unwrap();
        let store = MockPurgeStore::new()
            .with_tables(["receipt", "user_clinic"])
            .with_ids("receipt", ["R-1", "R-2"])
            .with_ids("user_clinic", ["U-1"]);
        let snapshot = SchemaSnapshot::from_tables(["receipt", "user_clinic"]);

        let resolved = resolve_id_sets(&store, "public", &plan, &context(&[]), &snapshot)
            .await
            .unwrap();

        assert_eq!(resolved.get("receipt"), ["R-1", "R-2"]);
        assert_eq!(resolved.get("app_user"), ["U-1"]);
        // 存在しないテーブルにはクエリを発行しない
        assert!(resolved.get("consent_instance").is_empty());
        assert_eq!(store.queries().len(), 2);
    }

    #[tokio::test]
    async fn test_読み込み失敗はid_resolutionエラーになる() {
        let plan = PurgePlan::default_plan().unwrap();
        let store = MockPurgeStore::new().fail_query_on("receipt");
        let snapshot = SchemaSnapshot::from_tables(["receipt"]);

        let err = resolve_id_sets(&store, "public", &plan, &context(&[]), &snapshot)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PurgeError::IdResolution { id_set, table, .. } if id_set == "receipt" && table == "receipt"
        ));
    }

    #[test]
    fn test_拠点スコープは全拠点をまとめてバインドする() {
        let bind = id_set_bind(&context(&["S-2", "S-1"]), ScopeKey::Sites);

        assert_eq!(
            bind,
            Some(Bind::TextArray(vec!["S-1".to_string(), "S-2".to_string()]))
        );
        assert_eq!(id_set_bind(&context(&[]), ScopeKey::Sites), None);
    }

    #[test]
    fn test_会社がないクリニックの会社スコープは値なし() {
        assert_eq!(id_set_bind(&context(&[]), ScopeKey::Company), None);

        let with_company = ClinicContext::new(
            ClinicId::new("CLN-1").unwrap(),
            vec![],
            Some(CompanyId::new("CMP-1").unwrap()),
            None,
        );
        assert_eq!(
            id_set_bind(&with_company, ScopeKey::Company),
            Some(Bind::Text("CMP-1".to_string()))
        );
    }

    #[test]
    fn test_未解決の名前は空集合を返す() {
        assert!(ResolvedIds::default().get("missing").is_empty());
    }
}
