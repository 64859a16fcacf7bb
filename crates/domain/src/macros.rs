/// UUID v7 ベースの ID 型を定義する宣言型マクロ
///
/// 以下のボイラープレートを一括生成する:
/// - Newtype 構造体（`Uuid` をラップ）
/// - `derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display)`
/// - `new()`: UUID v7 を生成
/// - `from_uuid()`: 既存 UUID から復元
/// - `as_uuid()`: 内部 UUID への参照
/// - `Default` impl（`new()` に委譲）
///
/// 本クレートでは削除実行ごとの相関 ID（[`PurgeRunId`](crate::purge::PurgeRunId)）に使う。
macro_rules! define_uuid_id {
    (
        $(#[$meta:meta])*
        $vis:vis struct $Name:ident;
    ) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, PartialEq, Eq, Hash,
            serde::Serialize, serde::Deserialize,
            derive_more::Display,
        )]
        #[display("{_0}")]
        $vis struct $Name(uuid::Uuid);

        impl $Name {
            /// 新しい ID を生成する（UUID v7）
            pub fn new() -> Self {
                Self(uuid::Uuid::now_v7())
            }

            /// 既存の UUID から ID を作成する
            pub fn from_uuid(uuid: uuid::Uuid) -> Self {
                Self(uuid)
            }

            /// 内部の UUID 参照を取得する
            pub fn as_uuid(&self) -> &uuid::Uuid {
                &self.0
            }
        }

        impl Default for $Name {
            fn default() -> Self {
                Self::new()
            }
        }
    };
}

/// テキスト主キーの ID 型を定義する宣言型マクロ
///
/// クリニック系スキーマの主キーは ULID 文字列（`TEXT` カラム）であり、
/// UUID としてパースできない値も含まれる。そのため ID は不透明な文字列として扱う。
///
/// 生成されるもの:
/// - Newtype 構造体（`String` をラップ）
/// - `derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display)`
/// - `new()`: trim + 空チェック付きの生成（`DomainError::Validation`）
/// - `as_str()` / `into_string()`
///
/// # 使用例
///
/// ```rust
/// use clinic_purge_domain::clinic::ClinicId;
///
/// let id = ClinicId::new("01HZX3NDEKTSV4RRFFQ69G5FAV").unwrap();
/// assert_eq!(id.as_str(), "01HZX3NDEKTSV4RRFFQ69G5FAV");
/// assert!(ClinicId::new("   ").is_err());
/// ```
macro_rules! define_text_id {
    (
        $(#[$meta:meta])*
        $vis:vis struct $Name:ident($label:literal);
    ) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord,
            serde::Serialize, serde::Deserialize,
            derive_more::Display,
        )]
        #[display("{_0}")]
        $vis struct $Name(String);

        impl $Name {
            /// ID を作成する
            ///
            /// 前後の空白はトリミングし、空文字列は拒否する。
            pub fn new(value: impl Into<String>) -> Result<Self, $crate::DomainError> {
                let value = value.into().trim().to_string();
                if value.is_empty() {
                    return Err($crate::DomainError::Validation(format!(
                        "{}は必須です",
                        $label
                    )));
                }
                Ok(Self(value))
            }

            /// 文字列参照を取得する
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// 所有権を持つ文字列に変換する
            pub fn into_string(self) -> String {
                self.0
            }
        }
    };
}
