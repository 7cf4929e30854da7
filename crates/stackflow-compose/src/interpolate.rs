//! 変数置換
//!
//! composeテキスト中の `${NAME}` `${NAME:-default}` `${NAME:?msg}` を
//! YAMLパース前に展開する。`$$` はリテラルの `$` にエスケープされる。

use crate::error::{ComposeError, Result};
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// 変数解決コンテキスト
///
/// 優先順位（高い順）: CLIオーバーライド > envファイル > プロセス環境変数。
/// プロセス環境はスナップショットとして渡す（グローバル状態を直接読まない）。
#[derive(Debug, Clone, Default)]
pub struct VariableContext {
    values: BTreeMap<String, String>,
}

impl VariableContext {
    pub fn new(
        process_env: impl IntoIterator<Item = (String, String)>,
        env_file: impl IntoIterator<Item = (String, String)>,
        overrides: impl IntoIterator<Item = (String, String)>,
    ) -> Self {
        let mut values = BTreeMap::new();
        // 低優先度から順に挿入し、高優先度で上書きする
        for (k, v) in process_env {
            values.insert(k, v);
        }
        for (k, v) in env_file {
            values.insert(k, v);
        }
        for (k, v) in overrides {
            values.insert(k, v);
        }
        Self { values }
    }

    /// 現在のプロセス環境をスナップショットして構築
    pub fn from_process_env(
        env_file: impl IntoIterator<Item = (String, String)>,
        overrides: impl IntoIterator<Item = (String, String)>,
    ) -> Self {
        Self::new(std::env::vars(), env_file, overrides)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }
}

fn variable_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\$\$|\$\{([A-Za-z_][A-Za-z0-9_]*)(?::([-?])([^}]*))?\}")
            .expect("variable pattern")
    })
}

/// テキスト全体の変数参照を展開する
///
/// - `${NAME}` — 未定義なら空文字列
/// - `${NAME:-default}` — 未定義または空ならdefault
/// - `${NAME:?msg}` — 未定義または空ならエラー
///
/// 展開は冪等: 展開済みテキストに再適用しても変化しない
/// （`$$` エスケープを含む場合を除く）。
pub fn substitute(text: &str, ctx: &VariableContext) -> Result<String> {
    let pattern = variable_pattern();
    let mut output = String::with_capacity(text.len());
    let mut last_end = 0;

    for caps in pattern.captures_iter(text) {
        let mat = caps.get(0).expect("capture 0");
        output.push_str(&text[last_end..mat.start()]);
        last_end = mat.end();

        if mat.as_str() == "$$" {
            output.push('$');
            continue;
        }

        let name = caps.get(1).expect("variable name").as_str();
        let value = ctx.get(name).filter(|v| !v.is_empty());

        match (caps.get(2).map(|m| m.as_str()), value) {
            (_, Some(value)) => output.push_str(value),
            (Some("-"), None) => {
                output.push_str(caps.get(3).map(|m| m.as_str()).unwrap_or(""));
            }
            (Some("?"), None) => {
                let message = caps
                    .get(3)
                    .map(|m| m.as_str())
                    .filter(|m| !m.is_empty())
                    .unwrap_or("変数が設定されていません")
                    .to_string();
                return Err(ComposeError::MissingVariable {
                    name: name.to_string(),
                    message,
                });
            }
            (_, None) => {} // 空文字列に展開
        }
    }

    output.push_str(&text[last_end..]);
    Ok(output)
}
