//! Codec for the quoted-CSV dialect used throughout the datums snapshots.
//!
//! The dialect predates this crate: fields may be wrapped in double quotes,
//! backslash escapes the next character, and the escaped letters `n` and `z`
//! stand for newline and NUL so that multi-line values survive in one record.
//! Existing stored data depends on these exact rules, so `split` and
//! `quote` must stay byte-compatible with them.

/// Split one line into its fields.
///
/// Quotes toggle quoted mode and are not part of the field. A backslash
/// escapes the following character; `\n` and `\z` decode to newline and NUL.
pub fn split(line: &str) -> Vec<String> {
    let mut cols = Vec::new();
    let mut quoted = false;
    let mut escaped = false;
    let mut field = String::new();

    for c in line.chars() {
        if !escaped && c == '"' {
            quoted = !quoted;
            continue;
        }
        if !escaped && c == '\\' {
            escaped = true;
            continue;
        }
        if !escaped && !quoted && c == ',' {
            cols.push(std::mem::take(&mut field));
            continue;
        }
        let c = match (escaped, c) {
            (true, 'n') => '\n',
            (true, 'z') => '\0',
            (_, c) => c,
        };
        field.push(c);
        escaped = false;
    }
    cols.push(field);
    cols
}

/// Wrap a single field in quotes, escaping anything `split` treats specially.
pub fn quote(unquoted: &str) -> String {
    let mut sb = String::with_capacity(unquoted.len() + 2);
    sb.push('"');
    for c in unquoted.chars() {
        match c {
            '\\' => sb.push_str("\\\\"),
            '\n' => sb.push_str("\\n"),
            '\0' => sb.push_str("\\z"),
            '"' => sb.push_str("\\\""),
            _ => sb.push(c),
        }
    }
    sb.push('"');
    sb
}

/// Join fields into one line, quoting only the fields that need it.
pub fn join(fields: &[&str]) -> String {
    let mut line = String::new();
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            line.push(',');
        }
        if field.contains(|c| matches!(c, ',' | '"' | '\\' | '\n' | '\0')) {
            line.push_str(&quote(field));
        } else {
            line.push_str(field);
        }
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_plain() {
        assert_eq!(split("KBVY,BVY,107"), vec!["KBVY", "BVY", "107"]);
    }

    #[test]
    fn test_split_quoted_comma() {
        let cols = split("KBVY,\"IAP-ILS OR LOC RWY 16\",BOSOX,100,200");
        assert_eq!(cols[1], "IAP-ILS OR LOC RWY 16");
        assert_eq!(cols.len(), 5);
        let cols = split("A,\"x,y\",B");
        assert_eq!(cols, vec!["A", "x,y", "B"]);
    }

    #[test]
    fn test_split_escapes() {
        assert_eq!(split(r"a\nb"), vec!["a\nb"]);
        assert_eq!(split(r"a\zb"), vec!["a\0b"]);
        assert_eq!(split(r"a\,b,c"), vec!["a,b", "c"]);
        assert_eq!(split(r#"a\"b"#), vec!["a\"b"]);
        assert_eq!(split(r"a\\b"), vec![r"a\b"]);
    }

    #[test]
    fn test_split_empty_fields() {
        assert_eq!(split(""), vec![""]);
        assert_eq!(split(",,"), vec!["", "", ""]);
    }

    #[test]
    fn test_quote_roundtrip() {
        for original in ["plain", "with,comma", "with\"quote", "back\\slash", "new\nline", "nul\0char"] {
            let quoted = quote(original);
            let cols = split(&quoted);
            assert_eq!(cols, vec![original], "roundtrip of {:?}", original);
        }
    }

    #[test]
    fn test_join_roundtrip() {
        let fields = ["KBOS", "IAP-ILS RWY 4R, CAT II", "RW04R", "512", "1033"];
        let line = join(&fields);
        assert_eq!(split(&line), fields);
    }
}
