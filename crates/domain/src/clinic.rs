//! # クリニック（テナント）
//!
//! 削除対象となるテナント（クリニック）と、その削除スコープを決めるキー群のモデル。
//!
//! ## 削除スコープ
//!
//! クリニックのデータは次のキーのいずれかで絞り込める:
//!
//! | キー | 由来 | 例 |
//! |------|------|----|
//! | `clinic_id` | クリニック自身 | `patient.clinic_id` |
//! | `site_id` | クリニック配下の拠点（N 件） | `cash_session.site_id` |
//! | `company_id` | クリニックの既定請求元会社 | `company.id` |
//! | `organization_id` | クリニックを所有する組織 | `organization.id` |
//!
//! これらを束ねたものが [`ClinicContext`] であり、1 回の削除実行の間は不変として扱う。
//! 実行中に拠点が追加されても取り込まない（実行開始時点のスナップショット）。
//!
//! ## 使用例
//!
//! ```rust
//! use clinic_purge_domain::clinic::{ClinicContext, ClinicId, SiteId};
//!
//! let context = ClinicContext::new(
//!     ClinicId::new("CLN-1").unwrap(),
//!     vec![SiteId::new("SITE-2").unwrap(), SiteId::new("SITE-1").unwrap()],
//!     None,
//!     None,
//! );
//!
//! // 拠点 ID は ID 順に正規化される
//! assert_eq!(context.site_ids()[0].as_str(), "SITE-1");
//! ```

use std::fmt;

use crate::DomainError;

define_text_id! {
    /// クリニック（テナント）の一意識別子
    pub struct ClinicId("クリニック ID");
}

define_text_id! {
    /// 拠点（サイト）の一意識別子
    pub struct SiteId("拠点 ID");
}

define_text_id! {
    /// 請求元会社の一意識別子
    pub struct CompanyId("会社 ID");
}

define_text_id! {
    /// 組織の一意識別子
    pub struct OrganizationId("組織 ID");
}

/// クリニックの検索キー
///
/// 運用者は ID か名前のどちらかでクリニックを指定する。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClinicLookup {
    /// ID で完全一致検索
    Id(ClinicId),
    /// 名前で検索（大文字小文字を区別しない完全一致）
    Name(String),
}

impl ClinicLookup {
    /// 名前検索を作成する
    pub fn by_name(name: impl Into<String>) -> Result<Self, DomainError> {
        let name = name.into().trim().to_string();
        if name.is_empty() {
            return Err(DomainError::Validation("クリニック名は必須です".to_string()));
        }
        Ok(Self::Name(name))
    }
}

impl fmt::Display for ClinicLookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "id={id}"),
            Self::Name(name) => write!(f, "name={name}"),
        }
    }
}

/// 削除スコープを決めるキー群
///
/// # 不変条件
///
/// - `site_ids` は重複なし・ID 昇順
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClinicContext {
    clinic_id:       ClinicId,
    site_ids:        Vec<SiteId>,
    company_id:      Option<CompanyId>,
    organization_id: Option<OrganizationId>,
}

impl ClinicContext {
    /// コンテキストを作成する
    ///
    /// 拠点 ID はソートし重複を除く。
    pub fn new(
        clinic_id: ClinicId,
        mut site_ids: Vec<SiteId>,
        company_id: Option<CompanyId>,
        organization_id: Option<OrganizationId>,
    ) -> Self {
        site_ids.sort();
        site_ids.dedup();
        Self {
            clinic_id,
            site_ids,
            company_id,
            organization_id,
        }
    }

    pub fn clinic_id(&self) -> &ClinicId {
        &self.clinic_id
    }

    pub fn site_ids(&self) -> &[SiteId] {
        &self.site_ids
    }

    pub fn company_id(&self) -> Option<&CompanyId> {
        self.company_id.as_ref()
    }

    pub fn organization_id(&self) -> Option<&OrganizationId> {
        self.organization_id.as_ref()
    }
}
