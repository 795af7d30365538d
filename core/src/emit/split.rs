//! Statement splitter for SQL text blobs.
//!
//! Splits on `;` while respecting single-quoted strings (with `''`
//! escapes), double-quoted identifiers, `--` and `/* */` comments, and
//! dollar-quoted bodies (`$$ ... $$`, `$fn$ ... $fn$`). The scanner works
//! character by character, so a body may span any number of lines; only
//! the tag itself has to be written without line breaks.

/// A statement as it appeared in the source, comments included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RawStatement {
    /// Text between the previous `;` (exclusive) and this one (exclusive).
    pub text: String,
    /// 1-based line on which `text` starts.
    pub line: usize,
}

impl RawStatement {
    /// The statement with comments removed and whitespace trimmed.
    pub fn code(&self) -> String {
        strip_comments(&self.text).trim().to_string()
    }

    /// 1-based line of the first non-comment character.
    pub fn code_line(&self) -> usize {
        let code_start = first_code_offset(&self.text).unwrap_or(0);
        self.line + self.text[..code_start].matches('\n').count()
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum State {
    Normal,
    Single { escapes: bool },
    Double,
    Line,
    Block,
}

/// Try to read a dollar-quote tag (`$`, `$tag$`) starting at `i`.
fn dollar_tag(chars: &[char], i: usize) -> Option<String> {
    if chars.get(i) != Some(&'$') {
        return None;
    }
    if i > 0 {
        let prev = chars[i - 1];
        if prev.is_alphanumeric() || prev == '_' {
            return None;
        }
    }
    let mut j = i + 1;
    if let Some(first) = chars.get(j) {
        if first.is_ascii_digit() {
            return None;
        }
    }
    while let Some(&c) = chars.get(j) {
        if c == '$' {
            return Some(chars[i..=j].iter().collect());
        }
        if !(c.is_alphanumeric() || c == '_') {
            return None;
        }
        j += 1;
    }
    None
}

fn starts_with_at(chars: &[char], i: usize, pat: &[char]) -> bool {
    chars.len() >= i + pat.len() && chars[i..i + pat.len()] == *pat
}

/// What the scanner saw at a character index.
#[derive(Clone, Copy)]
enum Event {
    /// A character other than a top-level `;`; the flag is false inside comments.
    Char(usize, char, bool),
    /// A top-level `;`.
    Split(usize),
}

/// Walk `sql` and report every character as an [`Event`].
fn scan(sql: &str, mut on_event: impl FnMut(Event)) {
    let chars: Vec<char> = sql.chars().collect();
    let mut state = State::Normal;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match state {
            State::Normal => {
                if c == '-' && chars.get(i + 1) == Some(&'-') {
                    state = State::Line;
                    on_event(Event::Char(i, c, false));
                } else if c == '/' && chars.get(i + 1) == Some(&'*') {
                    state = State::Block;
                    on_event(Event::Char(i, c, false));
                    on_event(Event::Char(i + 1, '*', false));
                    i += 2;
                    continue;
                } else if c == '\'' {
                    let escapes = i > 0
                        && matches!(chars[i - 1], 'e' | 'E')
                        && (i < 2 || !(chars[i - 2].is_alphanumeric() || chars[i - 2] == '_'));
                    state = State::Single { escapes };
                    on_event(Event::Char(i, c, true));
                } else if c == '"' {
                    state = State::Double;
                    on_event(Event::Char(i, c, true));
                } else if let Some(tag) = dollar_tag(&chars, i) {
                    let tag_chars: Vec<char> = tag.chars().collect();
                    let mut j = i + tag_chars.len();
                    while j < chars.len() && !starts_with_at(&chars, j, &tag_chars) {
                        j += 1;
                    }
                    let end = (j + tag_chars.len()).min(chars.len());
                    for (k, &ch) in chars.iter().enumerate().take(end).skip(i) {
                        on_event(Event::Char(k, ch, true));
                    }
                    i = end;
                    continue;
                } else if c == ';' {
                    on_event(Event::Split(i));
                } else {
                    on_event(Event::Char(i, c, true));
                }
            }
            State::Single { escapes } => {
                on_event(Event::Char(i, c, true));
                if escapes && c == '\\' {
                    if let Some(&next) = chars.get(i + 1) {
                        on_event(Event::Char(i + 1, next, true));
                    }
                    i += 2;
                    continue;
                }
                if c == '\'' {
                    if chars.get(i + 1) == Some(&'\'') {
                        on_event(Event::Char(i + 1, '\'', true));
                        i += 2;
                        continue;
                    }
                    state = State::Normal;
                }
            }
            State::Double => {
                on_event(Event::Char(i, c, true));
                if c == '"' {
                    state = State::Normal;
                }
            }
            State::Line => {
                if c == '\n' {
                    state = State::Normal;
                    on_event(Event::Char(i, c, true));
                } else {
                    on_event(Event::Char(i, c, false));
                }
            }
            State::Block => {
                if c == '*' && chars.get(i + 1) == Some(&'/') {
                    on_event(Event::Char(i, c, false));
                    on_event(Event::Char(i + 1, '/', false));
                    state = State::Normal;
                    i += 2;
                    continue;
                }
                // Keep line structure so reported positions stay right.
                on_event(Event::Char(i, c, c == '\n'));
            }
        }
        i += 1;
    }
}

/// Split into statements, keeping comments and recording start lines.
pub(crate) fn split_raw(sql: &str) -> Vec<RawStatement> {
    let chars: Vec<char> = sql.chars().collect();
    let mut cuts = Vec::new();
    scan(sql, |event| {
        if let Event::Split(i) = event {
            cuts.push(i);
        }
    });

    let mut out = Vec::new();
    let mut start = 0;
    let mut line = 1;
    let mut push = |from: usize, to: usize, line: usize| {
        let text: String = chars[from..to].iter().collect();
        let raw = RawStatement { text, line };
        if !raw.code().is_empty() {
            out.push(raw);
        }
    };
    for cut in cuts {
        push(start, cut, line);
        line += chars[start..=cut].iter().filter(|&&c| c == '\n').count();
        start = cut + 1;
    }
    if start < chars.len() {
        push(start, chars.len(), line);
    }
    out
}

/// Remove `--` and `/* */` comments, leaving strings and dollar bodies intact.
pub fn strip_comments(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    scan(sql, |event| match event {
        Event::Char(_, c, true) => out.push(c),
        Event::Char(..) => {}
        Event::Split(_) => out.push(';'),
    });
    out
}

fn first_code_offset(text: &str) -> Option<usize> {
    let mut first = None;
    let byte_offsets: Vec<usize> = text.char_indices().map(|(b, _)| b).collect();
    scan(text, |event| {
        if let Event::Char(i, c, true) = event {
            if first.is_none() && !c.is_whitespace() {
                first = Some(byte_offsets[i]);
            }
        }
    });
    first
}

/// Split a SQL blob into executable statements (comments stripped, no trailing `;`).
///
/// ```
/// use relq_core::emit::split_statements;
///
/// let sql = "CREATE FUNCTION f() RETURNS int AS $$ SELECT 1; $$ LANGUAGE sql;\n-- done\nSELECT 'a;b';";
/// let parts = split_statements(sql);
/// assert_eq!(parts.len(), 2);
/// assert!(parts[0].contains("SELECT 1;"));
/// assert_eq!(parts[1], "SELECT 'a;b'");
/// ```
pub fn split_statements(sql: &str) -> Vec<String> {
    split_raw(sql).iter().map(RawStatement::code).collect()
}

/// Split on `sep` outside parentheses, brackets and quotes. Pieces are trimmed.
pub fn split_top_level(text: &str, sep: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    for c in text.chars() {
        if let Some(q) = quote {
            current.push(c);
            if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => {
                quote = Some(c);
                current.push(c);
            }
            '(' | '[' => {
                depth += 1;
                current.push(c);
            }
            ')' | ']' => {
                depth -= 1;
                current.push(c);
            }
            c if c == sep && depth == 0 => {
                parts.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(c),
        }
    }
    if !current.trim().is_empty() {
        parts.push(current.trim().to_string());
    }
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_split() {
        let parts = split_statements("CREATE TABLE a (id int);\nCREATE TABLE b (id int);");
        assert_eq!(parts, vec!["CREATE TABLE a (id int)", "CREATE TABLE b (id int)"]);
    }

    #[test]
    fn test_named_dollar_tag_with_nested_plain_tag() {
        let sql = "CREATE FUNCTION f() RETURNS trigger AS $body$\nBEGIN\n  EXECUTE $$SELECT 1;$$;\n  RETURN NEW;\nEND;\n$body$ LANGUAGE plpgsql;\nSELECT 1;";
        let parts = split_statements(sql);
        assert_eq!(parts.len(), 2);
        assert!(parts[0].ends_with("$body$ LANGUAGE plpgsql"));
        assert_eq!(parts[1], "SELECT 1");
    }

    #[test]
    fn test_doubled_quotes_and_comments() {
        let sql = "INSERT INTO t VALUES ('it''s; fine'); -- trailing; comment\n/* block; */ SELECT 2;";
        let parts = split_statements(sql);
        assert_eq!(parts, vec!["INSERT INTO t VALUES ('it''s; fine')", "SELECT 2"]);
    }

    #[test]
    fn test_comment_only_pieces_are_dropped() {
        assert!(split_statements("-- nothing here;\n  ;;").is_empty());
    }

    #[test]
    fn test_positional_params_are_not_tags() {
        let parts = split_statements("PREPARE p AS SELECT $1; SELECT 2;");
        assert_eq!(parts.len(), 2);
    }

    #[test]
    fn test_raw_lines() {
        let raw = split_raw("SELECT 1;\n\n-- @id t1\nCREATE TABLE x (id int);");
        assert_eq!(raw.len(), 2);
        assert_eq!(raw[0].line, 1);
        assert_eq!(raw[1].line, 1);
        assert_eq!(raw[1].code_line(), 4);
        assert!(raw[1].text.contains("@id t1"));
    }

    #[test]
    fn test_split_top_level() {
        assert_eq!(
            split_top_level("a numeric(10,2), b text DEFAULT 'x,y'", ','),
            vec!["a numeric(10,2)", "b text DEFAULT 'x,y'"]
        );
        assert!(split_top_level("  ", ',').is_empty());
    }

    #[test]
    fn test_strip_comments_keeps_strings_and_lines() {
        let sql = "SELECT 1; -- gone\n/* also\ngone */SELECT '--';";
        assert_eq!(strip_comments(sql), "SELECT 1; \n\nSELECT '--';");
    }

    #[test]
    fn test_escape_string() {
        let parts = split_statements(r"SELECT E'a\';b'; SELECT 3;");
        assert_eq!(parts.len(), 2);
    }
}
