//! テスト共通フィクスチャ
//!
//! DB を使用する統合テストで共通利用するシードデータ・件数確認ヘルパー。
//! Rust の統合テスト規約に従い `tests/common/mod.rs` に配置。

// 各テストファイルが独立したクレートとしてコンパイルされるため、
// 使用しない関数に dead_code 警告が出る。モジュール全体で抑制する。
#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Utc};
use clinic_purge_domain::{
    clinic::{ClinicContext, ClinicId, ClinicLookup},
    clock::FixedClock,
    purge::PurgePlan,
};
use clinic_purge_infra::purge::{ClinicResolver, EngineSettings, PostgresPurgeStore, PurgeEngine};
use sqlx::PgPool;

// =============================================================================
// シードデータ
// =============================================================================

/// テスト用の固定日時
pub fn test_now() -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000, 0).unwrap()
}

/// シードするクリニックの構成
///
/// 組織・会社は `ON CONFLICT DO NOTHING` で作成するため、
/// 同じ ID を指定すると複数クリニックで共有される。
pub struct ClinicSeed {
    pub clinic_id:       &'static str,
    pub name:            &'static str,
    pub organization_id: &'static str,
    pub company_id:      &'static str,
}

impl ClinicSeed {
    pub fn new(clinic_id: &'static str, name: &'static str) -> Self {
        Self {
            clinic_id,
            name,
            organization_id: "ORG-A",
            company_id: "CMP-A",
        }
    }

    pub fn with_company(mut self, organization_id: &'static str, company_id: &'static str) -> Self {
        self.organization_id = organization_id;
        self.company_id = company_id;
        self
    }

    fn id(&self, suffix: &str) -> String {
        format!("{}-{suffix}", self.clinic_id)
    }
}

/// 1 クリニック分の削除対象行数（組織・会社を含む）
pub const SEEDED_ROWS: u64 = 34;

async fn exec(pool: &PgPool, sql: &str, binds: &[&str]) {
    let mut query = sqlx::query(sql);
    for bind in binds {
        query = query.bind(*bind);
    }
    query
        .execute(pool)
        .await
        .unwrap_or_else(|e| panic!("シードに失敗: {sql}: {e}"));
}

/// クリニック 1 件分のデータを作成する
///
/// - 拠点 2 件（`-S1`, `-S2`）、患者 3 件、支払方法 1 件
/// - 請求書 → 入金 → 領収書 → 明細、レジ → セッション → 入出金
/// - 親子カテゴリ、施術、ユーザー 1 件（このクリニックのみに所属）
/// - 同意書は作成しない
pub async fn seed_clinic(pool: &PgPool, seed: &ClinicSeed) {
    let c = seed.clinic_id;
    let s1 = seed.id("S1");
    let s2 = seed.id("S2");
    let user = seed.id("U1");
    let email = format!("{}@example.com", user.to_lowercase());

    exec(
        pool,
        "INSERT INTO organization (id, name) VALUES ($1, $1) ON CONFLICT DO NOTHING",
        &[seed.organization_id],
    )
    .await;
    exec(
        pool,
        "INSERT INTO company (id, organization_id, name) VALUES ($1, $2, $1) ON CONFLICT DO NOTHING",
        &[seed.company_id, seed.organization_id],
    )
    .await;
    exec(
        pool,
        "INSERT INTO clinic (id, name, organization_id, default_issuer_company_id) VALUES ($1, $2, $3, $4)",
        &[c, seed.name, seed.organization_id, seed.company_id],
    )
    .await;

    // 拠点
    for site in [&s1, &s2] {
        exec(pool, "INSERT INTO site (id, clinic_id, name) VALUES ($1, $2, $1)", &[site, c]).await;
        exec(
            pool,
            "INSERT INTO site_opening_hours (id, site_id, weekday) VALUES ($1, $2, 1)",
            &[&format!("{site}-OH"), site],
        )
        .await;
    }
    exec(
        pool,
        "INSERT INTO site_billing_line (id, site_id, company_id) VALUES ($1, $2, $3)",
        &[&seed.id("SBL1"), &s1, seed.company_id],
    )
    .await;

    // 患者
    exec(
        pool,
        "INSERT INTO acquisition_channel (id, clinic_id, name) VALUES ($1, $2, 'web')",
        &[&seed.id("AC1"), c],
    )
    .await;
    for n in 1..=3 {
        exec(
            pool,
            "INSERT INTO patient (id, clinic_id, acquisition_channel_id, name) VALUES ($1, $2, $3, $1)",
            &[&seed.id(&format!("P{n}")), c, &seed.id("AC1")],
        )
        .await;
    }

    // 請求・入金
    exec(
        pool,
        "INSERT INTO payment_method (id, clinic_id, name) VALUES ($1, $2, 'cash')",
        &[&seed.id("PM1"), c],
    )
    .await;
    exec(
        pool,
        "INSERT INTO billing_client (id, clinic_id, patient_id) VALUES ($1, $2, $3)",
        &[&seed.id("BC1"), c, &seed.id("P1")],
    )
    .await;
    exec(
        pool,
        "INSERT INTO billing_document (id, clinic_id, billing_client_id, issuer_company_id) VALUES ($1, $2, $3, $4)",
        &[&seed.id("BD1"), c, &seed.id("BC1"), seed.company_id],
    )
    .await;
    for n in 1..=2 {
        exec(
            pool,
            "INSERT INTO billing_item (id, billing_document_id) VALUES ($1, $2)",
            &[&seed.id(&format!("BI{n}")), &seed.id("BD1")],
        )
        .await;
    }
    exec(
        pool,
        "INSERT INTO payment (id, clinic_id, billing_document_id, payment_method_id) VALUES ($1, $2, $3, $4)",
        &[&seed.id("PAY1"), c, &seed.id("BD1"), &seed.id("PM1")],
    )
    .await;
    exec(
        pool,
        "INSERT INTO receipt (id, clinic_id, payment_id) VALUES ($1, $2, $3)",
        &[&seed.id("R1"), c, &seed.id("PAY1")],
    )
    .await;
    for n in 1..=3 {
        exec(
            pool,
            "INSERT INTO receipt_item (id, receipt_id) VALUES ($1, $2)",
            &[&seed.id(&format!("RI{n}")), &seed.id("R1")],
        )
        .await;
    }

    // レジ
    exec(
        pool,
        "INSERT INTO cash_register (id, clinic_id, site_id) VALUES ($1, $2, $3)",
        &[&seed.id("CR1"), c, &s1],
    )
    .await;
    for (n, site) in [(1, &s1), (2, &s2)] {
        exec(
            pool,
            "INSERT INTO cash_session (id, site_id, cash_register_id) VALUES ($1, $2, $3)",
            &[&seed.id(&format!("CS{n}")), site, &seed.id("CR1")],
        )
        .await;
        exec(
            pool,
            "INSERT INTO cash_movement (id, site_id, cash_session_id, payment_id) VALUES ($1, $2, $3, $4)",
            &[&seed.id(&format!("CM{n}")), site, &seed.id(&format!("CS{n}")), &seed.id("PAY1")],
        )
        .await;
    }

    // カタログ
    exec(
        pool,
        "INSERT INTO category (id, clinic_id) VALUES ($1, $2)",
        &[&seed.id("CAT1"), c],
    )
    .await;
    exec(
        pool,
        "INSERT INTO category (id, clinic_id, parent_id) VALUES ($1, $2, $3)",
        &[&seed.id("CAT2"), c, &seed.id("CAT1")],
    )
    .await;
    exec(
        pool,
        "INSERT INTO service (id, clinic_id, name) VALUES ($1, $2, $1)",
        &[&seed.id("SV1"), c],
    )
    .await;
    exec(
        pool,
        "INSERT INTO treatment (id, site_id, service_id, category_id) VALUES ($1, $2, $3, $4)",
        &[&seed.id("T1"), &s1, &seed.id("SV1"), &seed.id("CAT2")],
    )
    .await;

    // ユーザー
    exec(pool, "INSERT INTO app_user (id, email) VALUES ($1, $2)", &[&user, &email]).await;
    link_user(pool, &user, c).await;
    exec(
        pool,
        "INSERT INTO professional (id, clinic_id, user_id) VALUES ($1, $2, $3)",
        &[&seed.id("PRO1"), c, &user],
    )
    .await;
}

/// 既存ユーザーをクリニックに所属させる
pub async fn link_user(pool: &PgPool, user_id: &str, clinic_id: &str) {
    exec(
        pool,
        "INSERT INTO user_clinic (id, user_id, clinic_id) VALUES ($1, $2, $3)",
        &[&format!("{clinic_id}-UC-{user_id}"), user_id, clinic_id],
    )
    .await;
}

// =============================================================================
// 確認ヘルパー
// =============================================================================

/// `column = value` に一致する行数
pub async fn count_where(pool: &PgPool, table: &str, column: &str, value: &str) -> i64 {
    sqlx::query_scalar::<_, i64>(&format!(
        "SELECT COUNT(*) FROM \"{table}\" WHERE \"{column}\" = $1"
    ))
    .bind(value)
    .fetch_one(pool)
    .await
    .unwrap()
}

/// ID で行が存在するか
pub async fn exists(pool: &PgPool, table: &str, id: &str) -> bool {
    count_where(pool, table, "id", id).await > 0
}

// =============================================================================
// エンジン生成ヘルパー
// =============================================================================

/// 既定計画・固定時刻のエンジン
pub fn engine(pool: &PgPool) -> PurgeEngine<PostgresPurgeStore> {
    PurgeEngine::new(
        PostgresPurgeStore::new(pool.clone()),
        PurgePlan::default_plan().unwrap(),
        EngineSettings::default(),
        Arc::new(FixedClock::new(test_now())),
    )
}

/// ID でクリニックを特定する
pub async fn resolve(pool: &PgPool, clinic_id: &str) -> ClinicContext {
    ClinicResolver::new(pool.clone(), "public")
        .resolve(&ClinicLookup::Id(ClinicId::new(clinic_id).unwrap()))
        .await
        .unwrap()
}
