//! Identifier and literal quoting.

/// Double-quote an identifier, doubling embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote and comma-join a list of identifiers.
pub fn quote_idents(names: &[String]) -> String {
    names
        .iter()
        .map(|n| quote_ident(n))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Single-quote a string literal, doubling embedded quotes.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Quote a possibly schema-qualified name; `public` is left implicit.
pub fn qualified(schema: Option<&str>, name: &str) -> String {
    match schema {
        Some(s) if !s.is_empty() && s != "public" => {
            format!("{}.{}", quote_ident(s), quote_ident(name))
        }
        _ => quote_ident(name),
    }
}

/// True for names that need no quoting to be read back unchanged.
pub fn is_plain_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '$')
}

/// Quote an index key entry: bare column names get quoted, expressions and
/// ordering suffixes (`DESC`, `NULLS LAST`) are kept as written.
pub fn quote_index_key(entry: &str) -> String {
    let entry = entry.trim();
    let (head, tail) = match entry.find(char::is_whitespace) {
        Some(idx) => (&entry[..idx], &entry[idx..]),
        None => (entry, ""),
    };
    let tail_is_ordering = tail.split_whitespace().all(|w| {
        matches!(
            w.to_uppercase().as_str(),
            "ASC" | "DESC" | "NULLS" | "FIRST" | "LAST"
        )
    });
    let name_like = head
        .chars()
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_')
        && head.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '$');
    if tail_is_ordering && name_like {
        format!("{}{}", quote_ident(head), tail)
    } else {
        entry.to_string()
    }
}

/// Remove one level of identifier quoting, undoing doubled quotes.
pub fn unquote_ident(text: &str) -> String {
    let text = text.trim();
    if text.len() >= 2 && text.starts_with('"') && text.ends_with('"') {
        text[1..text.len() - 1].replace("\"\"", "\"")
    } else {
        text.to_string()
    }
}

/// Last segment of a possibly qualified name, unquoted (`"public"."users"` → `users`).
pub fn base_name(qualified: &str) -> String {
    split_qualified(qualified).1
}

/// Split `schema.name` (either part may be quoted) into its parts.
pub fn split_qualified(text: &str) -> (Option<String>, String) {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let chars: Vec<char> = text.trim().chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c == '"' {
            if in_quotes && chars.get(i + 1) == Some(&'"') {
                current.push('"');
                i += 2;
                continue;
            }
            in_quotes = !in_quotes;
        } else if c == '.' && !in_quotes {
            parts.push(std::mem::take(&mut current));
        } else {
            current.push(c);
        }
        i += 1;
    }
    parts.push(current);
    let name = parts.pop().unwrap_or_default();
    let schema = parts.pop().filter(|s| !s.is_empty());
    (schema, name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident_doubles_quotes() {
        assert_eq!(quote_ident("users"), "\"users\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_quote_literal_doubles_quotes() {
        assert_eq!(quote_literal("it's"), "'it''s'");
        assert_eq!(quote_literal(""), "''");
    }

    #[test]
    fn test_qualified() {
        assert_eq!(qualified(None, "t"), "\"t\"");
        assert_eq!(qualified(Some("public"), "t"), "\"t\"");
        assert_eq!(qualified(Some("auth"), "t"), "\"auth\".\"t\"");
    }

    #[test]
    fn test_index_keys() {
        assert_eq!(quote_index_key("email"), "\"email\"");
        assert_eq!(quote_index_key("created_at DESC"), "\"created_at\" DESC");
        assert_eq!(quote_index_key("lower(email)"), "lower(email)");
        assert_eq!(quote_index_key("CamelCase"), "\"CamelCase\"");
    }

    #[test]
    fn test_split_qualified() {
        assert_eq!(
            split_qualified("\"public\".\"users\""),
            (Some("public".to_string()), "users".to_string())
        );
        assert_eq!(split_qualified("orders"), (None, "orders".to_string()));
        assert_eq!(base_name("auth.\"Odd.Name\""), "Odd.Name");
    }
}
