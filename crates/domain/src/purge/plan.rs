//! # 削除計画（Dependency Plan）
//!
//! どのテーブルを、どのキーで、どの順番で削除するかを宣言的に表すモデル。
//!
//! ## 構成
//!
//! - [`IdSetSpec`]: 削除開始前に解決しておく ID 集合（間接参照テーブル用）
//! - [`PhaseDescriptor`]: 1 テーブルに対する 1 回の削除フェーズ
//! - [`PurgePlan`]: 上記を束ね、読み込み時に整合性を検証したもの
//!
//! 計画は TOML で記述する。既定の計画は `default_plan.toml` としてクレートに埋め込まれ、
//! 運用時はファイルで差し替えられる。テーブルの追加はデータの変更で済む。
//!
//! ## 依存順序のルール
//!
//! `scope = "ids"` のフェーズ P が ID 集合 S を参照するとき、S の所有テーブル
//! （`owner`）を削除するフェーズは P より後になければならない。親の行が消えると
//! 子が参照していた ID を復元できないため。
//!
//! ```text
//! consent_instance_signer (ids: consent_instance)   ← 先
//! consent_instance        (clinic)                  ← 後
//! ```

use std::{
    collections::{HashMap, HashSet},
    fmt,
    sync::LazyLock,
};

use regex::Regex;
use serde::Deserialize;
use strum::{Display, EnumString};

use crate::DomainError;

/// 埋め込みの既定計画
const DEFAULT_PLAN_TOML: &str = include_str!("default_plan.toml");

/// SQL 識別子として許可する形式
///
/// テーブル名・カラム名は SQL に埋め込まれるため、小文字英数字とアンダースコアに限定する。
static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z_][a-z0-9_]*$").expect("識別子パターンは有効な正規表現"));

// =========================================================================
// スコープ
// =========================================================================

/// 削除・ID 解決の絞り込みキー（ID 集合を除く）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum ScopeKey {
    /// `column = clinic_id`
    Clinic,
    /// `column = site_id`（拠点ごとに 1 文を発行する）
    Sites,
    /// `column = company_id`
    Company,
    /// `column = organization_id`
    Organization,
}

/// フェーズの絞り込み対象
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    /// クリニック・拠点・会社・組織のいずれかのキー
    Key(ScopeKey),
    /// 事前に解決した ID 集合（名前で参照）
    Ids(String),
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(key) => write!(f, "{key}"),
            Self::Ids(name) => write!(f, "ids({name})"),
        }
    }
}

/// 削除モード
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum PhaseMode {
    /// テナント/拠点キーで直接絞り込む
    Direct,
    /// 親テーブルの ID 集合で絞り込む
    Cascade,
}

// =========================================================================
// ID 集合
// =========================================================================

/// 削除開始前に解決する ID 集合の定義
///
/// `SELECT <id_column> FROM <table> WHERE <column> = <scope>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdSetSpec {
    name:      String,
    table:     String,
    id_column: String,
    column:    String,
    scope:     ScopeKey,
    owner:     String,
}

impl IdSetSpec {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 取得元テーブル
    pub fn table(&self) -> &str {
        &self.table
    }

    /// 取得するカラム
    pub fn id_column(&self) -> &str {
        &self.id_column
    }

    /// 絞り込みカラム
    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn scope(&self) -> ScopeKey {
        self.scope
    }

    /// ID が指す行を持つテーブル
    ///
    /// 通常は取得元テーブルと同じ。`user_clinic.user_id` のように
    /// 別テーブルの主キーを射影する場合のみ異なる。
    pub fn owner(&self) -> &str {
        &self.owner
    }
}

// =========================================================================
// フェーズ
// =========================================================================

/// 削除ガード
///
/// `NOT EXISTS (SELECT 1 FROM <table> WHERE <column> = target.id)` を付与し、
/// 他から参照されている行を削除対象から外す。
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Guard {
    pub table:  String,
    pub column: String,
}

/// 1 テーブルに対する削除フェーズ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseDescriptor {
    name:          String,
    table:         String,
    column:        String,
    scope:         Scope,
    parent_column: Option<String>,
    guards:        Vec<Guard>,
}

impl PhaseDescriptor {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// 自己参照カラム（設定時は子 → 残りの 2 段階で削除する）
    pub fn parent_column(&self) -> Option<&str> {
        self.parent_column.as_deref()
    }

    pub fn guards(&self) -> &[Guard] {
        &self.guards
    }

    pub fn mode(&self) -> PhaseMode {
        match self.scope {
            Scope::Key(_) => PhaseMode::Direct,
            Scope::Ids(_) => PhaseMode::Cascade,
        }
    }

    /// 参照する ID 集合名（cascade モードのみ）
    pub fn id_set(&self) -> Option<&str> {
        match &self.scope {
            Scope::Ids(name) => Some(name),
            Scope::Key(_) => None,
        }
    }
}

// =========================================================================
// TOML 表現
// =========================================================================

#[derive(Debug, Deserialize)]
struct PlanFile {
    #[serde(default)]
    id_sets: Vec<IdSetEntry>,
    #[serde(default)]
    phases:  Vec<PhaseEntry>,
}

#[derive(Debug, Deserialize)]
struct IdSetEntry {
    name:      String,
    table:     String,
    id_column: Option<String>,
    column:    String,
    scope:     String,
    owner:     Option<String>,
}

#[derive(Debug, Deserialize)]
struct PhaseEntry {
    name:          String,
    table:         String,
    column:        String,
    scope:         String,
    id_set:        Option<String>,
    parent_column: Option<String>,
    #[serde(default)]
    guards:        Vec<Guard>,
}

fn parse_scope_key(value: &str, context: &str) -> Result<ScopeKey, DomainError> {
    value.parse::<ScopeKey>().map_err(|_| {
        DomainError::Validation(format!("{context}: 不明なスコープ {value:?}"))
    })
}

impl TryFrom<IdSetEntry> for IdSetSpec {
    type Error = DomainError;

    fn try_from(entry: IdSetEntry) -> Result<Self, Self::Error> {
        let context = format!("id_set {}", entry.name);
        let scope = parse_scope_key(&entry.scope, &context)?;
        let owner = entry.owner.unwrap_or_else(|| entry.table.clone());
        Ok(Self {
            name: entry.name,
            table: entry.table,
            id_column: entry.id_column.unwrap_or_else(|| "id".to_string()),
            column: entry.column,
            scope,
            owner,
        })
    }
}

impl TryFrom<PhaseEntry> for PhaseDescriptor {
    type Error = DomainError;

    fn try_from(entry: PhaseEntry) -> Result<Self, Self::Error> {
        let context = format!("phase {}", entry.name);
        let scope = match (entry.scope.as_str(), entry.id_set) {
            ("ids", Some(id_set)) => Scope::Ids(id_set),
            ("ids", None) => {
                return Err(DomainError::Validation(format!(
                    "{context}: scope = \"ids\" には id_set の指定が必要です"
                )));
            }
            (other, None) => Scope::Key(parse_scope_key(other, &context)?),
            (other, Some(_)) => {
                return Err(DomainError::Validation(format!(
                    "{context}: id_set は scope = \"ids\" でのみ指定できます（scope = {other:?}）"
                )));
            }
        };
        Ok(Self {
            name: entry.name,
            table: entry.table,
            column: entry.column,
            scope,
            parent_column: entry.parent_column,
            guards: entry.guards,
        })
    }
}

// =========================================================================
// PurgePlan
// =========================================================================

/// 検証済みの削除計画
///
/// # 不変条件
///
/// - テーブル名・カラム名はすべて SQL 識別子として安全
/// - フェーズ名・ID 集合名は一意
/// - `ids` スコープは宣言済みの ID 集合のみを参照する
/// - ID 集合の所有テーブルは、それを参照するフェーズより後に削除される
#[derive(Debug, Clone)]
pub struct PurgePlan {
    id_sets: Vec<IdSetSpec>,
    phases:  Vec<PhaseDescriptor>,
}

impl PurgePlan {
    /// 埋め込みの既定計画を読み込む
    pub fn default_plan() -> Result<Self, DomainError> {
        Self::from_toml(DEFAULT_PLAN_TOML)
    }

    /// TOML 文字列から計画を読み込み、検証する
    pub fn from_toml(source: &str) -> Result<Self, DomainError> {
        let file: PlanFile = config::Config::builder()
            .add_source(config::File::from_str(source, config::FileFormat::Toml))
            .build()
            .and_then(config::Config::try_deserialize)
            .map_err(|e| DomainError::PlanFormat(e.to_string()))?;

        let id_sets = file
            .id_sets
            .into_iter()
            .map(IdSetSpec::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        let phases = file
            .phases
            .into_iter()
            .map(PhaseDescriptor::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Self::new(id_sets, phases)
    }

    /// 計画を組み立て、検証する
    pub fn new(id_sets: Vec<IdSetSpec>, phases: Vec<PhaseDescriptor>) -> Result<Self, DomainError> {
        let plan = Self { id_sets, phases };
        plan.validate()?;
        Ok(plan)
    }

    pub fn id_sets(&self) -> &[IdSetSpec] {
        &self.id_sets
    }

    pub fn phases(&self) -> &[PhaseDescriptor] {
        &self.phases
    }

    /// 名前で ID 集合を取得する
    pub fn id_set(&self, name: &str) -> Option<&IdSetSpec> {
        self.id_sets.iter().find(|s| s.name == name)
    }

    /// 計画中に登場するすべてのテーブル名（フェーズ・ID 集合・ガード）
    pub fn referenced_tables(&self) -> HashSet<&str> {
        let mut tables: HashSet<&str> = HashSet::new();
        for spec in &self.id_sets {
            tables.insert(&spec.table);
        }
        for phase in &self.phases {
            tables.insert(&phase.table);
            tables.extend(phase.guards.iter().map(|g| g.table.as_str()));
        }
        tables
    }

    fn validate(&self) -> Result<(), DomainError> {
        if self.phases.is_empty() {
            return Err(DomainError::Validation(
                "削除計画にフェーズがありません".to_string(),
            ));
        }

        let mut id_set_names = HashSet::new();
        for spec in &self.id_sets {
            if !id_set_names.insert(spec.name.as_str()) {
                return Err(DomainError::Validation(format!(
                    "ID 集合名が重複しています: {}",
                    spec.name
                )));
            }
            let context = format!("id_set {}", spec.name);
            ensure_identifier(&context, &spec.table)?;
            ensure_identifier(&context, &spec.id_column)?;
            ensure_identifier(&context, &spec.column)?;
            ensure_identifier(&context, &spec.owner)?;
        }

        let mut phase_names = HashSet::new();
        for phase in &self.phases {
            if !phase_names.insert(phase.name.as_str()) {
                return Err(DomainError::Validation(format!(
                    "フェーズ名が重複しています: {}",
                    phase.name
                )));
            }
            self.validate_phase(phase)?;
        }

        self.validate_order()
    }

    fn validate_phase(&self, phase: &PhaseDescriptor) -> Result<(), DomainError> {
        let context = format!("phase {}", phase.name);
        ensure_identifier(&context, &phase.table)?;
        ensure_identifier(&context, &phase.column)?;
        if let Some(parent) = &phase.parent_column {
            ensure_identifier(&context, parent)?;
            if !phase.guards.is_empty() {
                return Err(DomainError::Validation(format!(
                    "{context}: parent_column と guards は併用できません"
                )));
            }
        }
        for guard in &phase.guards {
            ensure_identifier(&context, &guard.table)?;
            ensure_identifier(&context, &guard.column)?;
        }
        if let Some(name) = phase.id_set()
            && self.id_set(name).is_none()
        {
            return Err(DomainError::Validation(format!(
                "{context}: 未定義の ID 集合を参照しています: {name}"
            )));
        }
        Ok(())
    }

    /// 依存順序を検証する
    ///
    /// ID 集合の所有テーブルを削除するフェーズが、その集合を参照するフェーズより
    /// 前にあればエラー。
    fn validate_order(&self) -> Result<(), DomainError> {
        // テーブル → 最初にそのテーブルを削除するフェーズの位置
        let mut first_delete: HashMap<&str, usize> = HashMap::new();
        for (index, phase) in self.phases.iter().enumerate() {
            first_delete.entry(phase.table.as_str()).or_insert(index);
        }

        for (index, phase) in self.phases.iter().enumerate() {
            let Some(spec) = phase.id_set().and_then(|name| self.id_set(name)) else {
                continue;
            };
            if phase.table == spec.owner {
                continue;
            }
            if let Some(&owner_index) = first_delete.get(spec.owner.as_str())
                && owner_index < index
            {
                return Err(DomainError::Validation(format!(
                    "依存順序違反: フェーズ {} が {} を削除した後に、その ID 集合 {} を参照するフェーズ {} があります",
                    self.phases[owner_index].name, spec.owner, spec.name, phase.name
                )));
            }
        }
        Ok(())
    }
}

fn ensure_identifier(context: &str, value: &str) -> Result<(), DomainError> {
    if IDENTIFIER.is_match(value) {
        Ok(())
    } else {
        Err(DomainError::Validation(format!(
            "{context}: SQL 識別子として不正です: {value:?}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    fn phase_index(plan: &PurgePlan, name: &str) -> usize {
        plan.phases()
            .iter()
            .position(|p| p.name() == name)
            .unwrap_or_else(|| panic!("フェーズ {name} が見つからない"))
    }

    // ===== 既定計画 =====

    #[test]
    fn test_既定計画を読み込める() {
        let plan = PurgePlan::default_plan().unwrap();

        assert_eq!(plan.phases().len(), 58);
        assert_eq!(plan.id_sets().len(), 14);
    }

    #[test]
    fn test_既定計画のcascadeフェーズは親テーブルの削除より前にある() {
        let plan = PurgePlan::default_plan().unwrap();

        for (index, phase) in plan.phases().iter().enumerate() {
            let Some(name) = phase.id_set() else {
                continue;
            };
            let spec = plan.id_set(name).unwrap();
            if phase.table() == spec.owner() {
                continue;
            }
            let owner_index = phase_index(&plan, spec.owner());
            assert!(
                index < owner_index,
                "{} は {} より前に実行される必要がある",
                phase.name(),
                spec.owner()
            );
        }
    }

    #[test]
    fn test_既定計画はルートエンティティで終わる() {
        let plan = PurgePlan::default_plan().unwrap();
        let tail: Vec<&str> = plan.phases()[plan.phases().len() - 4..]
            .iter()
            .map(PhaseDescriptor::table)
            .collect();

        assert_eq!(tail, vec!["site", "clinic", "company", "organization"]);
    }

    #[rstest]
    #[case("patient", "acquisition_channel")]
    #[case("user_clinic", "app_user")]
    #[case("site_billing_line", "company")]
    #[case("schedule_block", "room")]
    #[case("treatment", "category")]
    #[case("clinic", "organization")]
    fn test_既定計画の参照元は参照先より先に削除される(
        #[case] child: &str,
        #[case] parent: &str,
    ) {
        let plan = PurgePlan::default_plan().unwrap();

        assert!(phase_index(&plan, child) < phase_index(&plan, parent));
    }

    #[test]
    fn test_既定計画のapp_userは他クリニックとの紐付けでガードされる() {
        let plan = PurgePlan::default_plan().unwrap();
        let app_user = &plan.phases()[phase_index(&plan, "app_user")];

        assert_eq!(app_user.mode(), PhaseMode::Cascade);
        assert_eq!(
            app_user.guards(),
            &[Guard {
                table:  "user_clinic".to_string(),
                column: "user_id".to_string(),
            }]
        );
        assert_eq!(plan.id_set("app_user").unwrap().owner(), "app_user");
        assert_eq!(plan.id_set("app_user").unwrap().table(), "user_clinic");
    }

    #[test]
    fn test_既定計画のcategoryは自己参照の2段階削除() {
        let plan = PurgePlan::default_plan().unwrap();
        let category = &plan.phases()[phase_index(&plan, "category")];

        assert_eq!(category.parent_column(), Some("parent_id"));
        assert_eq!(category.mode(), PhaseMode::Direct);
    }

    #[test]
    fn test_referenced_tablesはガードのテーブルも含む() {
        let plan = PurgePlan::default_plan().unwrap();
        let tables = plan.referenced_tables();

        assert!(tables.contains("user_clinic"));
        assert!(tables.contains("organization"));
        assert!(tables.contains("billing_document"));
    }

    // ===== 検証 =====

    const PARENT_AND_CHILD: &str = r#"
        [[id_sets]]
        name = "parent"
        table = "parent"
        column = "clinic_id"
        scope = "clinic"

        [[phases]]
        name = "child"
        table = "child"
        column = "parent_id"
        scope = "ids"
        id_set = "parent"

        [[phases]]
        name = "parent"
        table = "parent"
        column = "clinic_id"
        scope = "clinic"
    "#;

    #[test]
    fn test_子から親の順序は受け入れる() {
        let plan = PurgePlan::from_toml(PARENT_AND_CHILD).unwrap();

        assert_eq!(plan.phases()[0].mode(), PhaseMode::Cascade);
        assert_eq!(plan.phases()[1].mode(), PhaseMode::Direct);
        assert_eq!(plan.id_set("parent").unwrap().id_column(), "id");
    }

    #[test]
    fn test_親を先に削除する計画は拒否する() {
        let source = r#"
            [[id_sets]]
            name = "parent"
            table = "parent"
            column = "clinic_id"
            scope = "clinic"

            [[phases]]
            name = "parent"
            table = "parent"
            column = "clinic_id"
            scope = "clinic"

            [[phases]]
            name = "child"
            table = "child"
            column = "parent_id"
            scope = "ids"
            id_set = "parent"
        "#;

        let err = PurgePlan::from_toml(source).unwrap_err();

        assert!(matches!(err, DomainError::Validation(msg) if msg.contains("依存順序違反")));
    }

    #[test]
    fn test_未定義のid集合を参照すると拒否する() {
        let source = r#"
            [[phases]]
            name = "child"
            table = "child"
            column = "parent_id"
            scope = "ids"
            id_set = "missing"
        "#;

        assert!(matches!(
            PurgePlan::from_toml(source),
            Err(DomainError::Validation(msg)) if msg.contains("missing")
        ));
    }

    #[rstest]
    #[case("patient; DROP TABLE clinic")]
    #[case("Patient")]
    #[case("1patient")]
    #[case("\"patient\"")]
    fn test_sql識別子として不正なテーブル名は拒否する(#[case] table: &str) {
        let phase = PhaseDescriptor {
            name:          "bad".to_string(),
            table:         table.to_string(),
            column:        "clinic_id".to_string(),
            scope:         Scope::Key(ScopeKey::Clinic),
            parent_column: None,
            guards:        vec![],
        };

        assert!(PurgePlan::new(vec![], vec![phase]).is_err());
    }

    #[test]
    fn test_フェーズ名の重複は拒否する() {
        let source = r#"
            [[phases]]
            name = "patient"
            table = "patient"
            column = "clinic_id"
            scope = "clinic"

            [[phases]]
            name = "patient"
            table = "patient"
            column = "site_id"
            scope = "sites"
        "#;

        assert!(PurgePlan::from_toml(source).is_err());
    }

    #[test]
    fn test_空の計画は拒否する() {
        assert!(PurgePlan::from_toml("").is_err());
    }

    #[rstest]
    #[case(r#"scope = "tenant""#)]
    #[case(r#"scope = "ids""#)]
    #[case("scope = \"clinic\"\nid_set = \"x\"")]
    fn test_不正なスコープ指定は拒否する(#[case] scope: &str) {
        let source = format!(
            "[[phases]]\nname = \"p\"\ntable = \"p\"\ncolumn = \"clinic_id\"\n{scope}\n"
        );

        assert!(PurgePlan::from_toml(&source).is_err());
    }

    #[test]
    fn test_parent_columnとguardsの併用は拒否する() {
        let source = r#"
            [[phases]]
            name = "category"
            table = "category"
            column = "clinic_id"
            scope = "clinic"
            parent_column = "parent_id"
            guards = [{ table = "service", column = "category_id" }]
        "#;

        assert!(PurgePlan::from_toml(source).is_err());
    }

    #[test]
    fn test_toml構文エラーはplan_formatエラーになる() {
        assert!(matches!(
            PurgePlan::from_toml("[[phases]\nname = "),
            Err(DomainError::PlanFormat(_))
        ));
    }

    #[test]
    fn test_scopeの表示形式() {
        assert_eq!(Scope::Key(ScopeKey::Sites).to_string(), "sites");
        assert_eq!(Scope::Ids("receipt".to_string()).to_string(), "ids(receipt)");
    }
}
