//! # 削除前の確認
//!
//! 運用者に `DELETE ALL <clinic_id>` の入力を求める（y/n は受け付けない）。
//! `--force` 指定時は呼び出さない。

use std::io::{self, BufRead, Write};

use clinic_purge_domain::clinic::ClinicContext;

/// 確認結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    Confirmed,
    /// フレーズ不一致または入力なし。DB には触れない
    Declined,
}

/// 確定に必要なフレーズ
pub fn confirmation_phrase(context: &ClinicContext) -> String {
    format!("DELETE ALL {}", context.clinic_id())
}

/// 削除対象を表示し、確認フレーズを読み取る
///
/// 前後の空白は無視する。大文字小文字は区別する。
pub fn confirm<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    context: &ClinicContext,
) -> io::Result<Confirmation> {
    let phrase = confirmation_phrase(context);

    writeln!(output, "クリニック {} の全データを削除します。", context.clinic_id())?;
    writeln!(output, "  拠点: {} 件", context.site_ids().len())?;
    if let Some(company_id) = context.company_id() {
        writeln!(output, "  会社: {company_id}（他から参照されていない場合のみ削除）")?;
    }
    if let Some(organization_id) = context.organization_id() {
        writeln!(
            output,
            "  組織: {organization_id}（他から参照されていない場合のみ削除）"
        )?;
    }
    writeln!(output, "この操作は取り消せません。")?;
    write!(output, "続行するには \"{phrase}\" と入力してください: ")?;
    output.flush()?;

    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(Confirmation::Declined);
    }
    if line.trim() == phrase {
        Ok(Confirmation::Confirmed)
    } else {
        Ok(Confirmation::Declined)
    }
}

/// [`confirm`] をブロッキング用スレッドで実行する
///
/// stdin の待ち受けで非同期ランタイムのワーカーを止めない。
pub async fn confirm_blocking<R, W>(
    mut input: R,
    mut output: W,
    context: ClinicContext,
) -> io::Result<Confirmation>
where
    R: BufRead + Send + 'static,
    W: Write + Send + 'static,
{
    tokio::task::spawn_blocking(move || confirm(&mut input, &mut output, &context))
        .await
        .map_err(io::Error::other)?
}
