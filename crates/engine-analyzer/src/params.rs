/// Extract quoted substrings (`"…"`, `'…'`, or `` `…` ``) in order of
/// appearance.
pub fn extract_quoted(description: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut chars = description.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if c == '"' || c == '\'' || c == '`' {
            if let Some(end) = description[i + c.len_utf8()..].find(c) {
                let start = i + c.len_utf8();
                out.push(description[start..start + end].to_string());
                // Skip past the closing quote.
                while let Some(&(j, _)) = chars.peek() {
                    if j >= start + end {
                        break;
                    }
                    chars.next();
                }
            }
        }
    }
    out
}

/// Map the first quoted token to the parameter key the chosen tool expects.
pub fn infer_param_key(tool: &str) -> &'static str {
    match tool {
        "search" => "pattern",
        "bash" => "command",
        _ => "path",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_double_quoted_substring() {
        assert_eq!(extract_quoted(r#"create a file "src/main.rs" now"#), vec!["src/main.rs"]);
    }

    #[test]
    fn extracts_single_and_backtick_quoted() {
        assert_eq!(extract_quoted("edit 'a.txt' then `b.txt`"), vec!["a.txt", "b.txt"]);
    }

    #[test]
    fn no_quotes_yields_empty() {
        assert!(extract_quoted("create a file now").is_empty());
    }

    #[test]
    fn param_key_depends_on_tool() {
        assert_eq!(infer_param_key("search"), "pattern");
        assert_eq!(infer_param_key("bash"), "command");
        assert_eq!(infer_param_key("write_file"), "path");
    }
}
