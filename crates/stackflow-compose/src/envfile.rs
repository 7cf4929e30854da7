//! .envファイルのパース
//!
//! `KEY=VALUE` 行の素朴な形式。`#` コメントと空行は無視し、
//! 同一キーは後勝ちとする。

/// .envテキストをパースして宣言順のペアを返す
///
/// 値の前後の単一・二重引用符は1組だけ剥がす。`=` を含まない行は
/// 黙って無視する（compose互換の寛容な挙動）。
pub fn parse(text: &str) -> Vec<(String, String)> {
    let mut entries: Vec<(String, String)> = Vec::new();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let value = strip_quotes(value.trim());

        // 後勝ち: 既存キーは上書き（宣言位置は最初の出現を保つ）
        if let Some(entry) = entries.iter_mut().find(|(k, _)| k == key) {
            entry.1 = value.to_string();
        } else {
            entries.push((key.to_string(), value.to_string()));
        }
    }

    entries
}

fn strip_quotes(value: &str) -> &str {
    let bytes = value.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if (first == b'"' && last == b'"') || (first == b'\'' && last == b'\'') {
            return &value[1..value.len() - 1];
        }
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic() {
        let text = "POSTGRES_USER=admin\nPOSTGRES_PASSWORD=secret\n";
        let entries = parse(text);
        assert_eq!(
            entries,
            vec![
                ("POSTGRES_USER".to_string(), "admin".to_string()),
                ("POSTGRES_PASSWORD".to_string(), "secret".to_string()),
            ]
        );
    }

    #[test]
    fn test_parse_skips_comments_and_blank_lines() {
        let text = "# DB設定\n\nDB_HOST=localhost\n  # インデント付きコメント\nDB_PORT=5432\n";
        let entries = parse(text);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].0, "DB_HOST");
        assert_eq!(entries[1].0, "DB_PORT");
    }

    #[test]
    fn test_parse_duplicate_key_last_wins() {
        let entries = parse("TAG=old\nTAG=new\n");
        assert_eq!(entries, vec![("TAG".to_string(), "new".to_string())]);
    }

    #[test]
    fn test_parse_quoted_values() {
        let entries = parse("A=\"hello world\"\nB='single'\nC=\"unbalanced'\n");
        assert_eq!(entries[0].1, "hello world");
        assert_eq!(entries[1].1, "single");
        assert_eq!(entries[2].1, "\"unbalanced'");
    }

    #[test]
    fn test_parse_value_with_equals() {
        let entries = parse("URL=postgres://u:p@db:5432/app?sslmode=disable\n");
        assert_eq!(entries[0].1, "postgres://u:p@db:5432/app?sslmode=disable");
    }

    #[test]
    fn test_parse_ignores_invalid_lines() {
        let entries = parse("not a pair\n=novalue\nOK=1\n");
        assert_eq!(entries, vec![("OK".to_string(), "1".to_string())]);
    }
}
