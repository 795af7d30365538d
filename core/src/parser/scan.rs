//! Word-level scanner for the statements read without the SQL grammar.
//!
//! Works on comment-free statement text. Bare identifiers fold to lower
//! case the way PostgreSQL folds them; quoted ones keep their spelling.

pub(crate) struct Scanner {
    chars: Vec<char>,
    pos: usize,
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

impl Scanner {
    pub fn new(text: &str) -> Self {
        Scanner {
            chars: text.chars().collect(),
            pos: 0,
        }
    }

    pub fn skip_ws(&mut self) {
        while self.chars.get(self.pos).is_some_and(|c| c.is_whitespace()) {
            self.pos += 1;
        }
    }

    pub fn is_done(&mut self) -> bool {
        self.skip_ws();
        self.pos >= self.chars.len()
    }

    pub fn peek(&mut self) -> Option<char> {
        self.skip_ws();
        self.chars.get(self.pos).copied()
    }

    /// Consume `c` if it is the next non-blank character.
    pub fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn word_at(&self, at: usize) -> Option<(String, usize)> {
        let start = at;
        let mut end = at;
        while self.chars.get(end).is_some_and(|&c| is_word_char(c)) {
            end += 1;
        }
        if end == start {
            return None;
        }
        Some((self.chars[start..end].iter().collect(), end))
    }

    /// Consume one keyword (case-insensitive, whole word only).
    pub fn keyword(&mut self, kw: &str) -> bool {
        self.skip_ws();
        match self.word_at(self.pos) {
            Some((word, end)) if word.eq_ignore_ascii_case(kw) => {
                self.pos = end;
                true
            }
            _ => false,
        }
    }

    /// Consume a keyword sequence, or nothing at all.
    pub fn keywords(&mut self, kws: &[&str]) -> bool {
        let saved = self.pos;
        if kws.iter().all(|kw| self.keyword(kw)) {
            true
        } else {
            self.pos = saved;
            false
        }
    }

    pub fn peek_keyword(&mut self, kw: &str) -> bool {
        let saved = self.pos;
        let found = self.keyword(kw);
        self.pos = saved;
        found
    }

    /// Read one identifier part: `"Quoted ""x"""` or a bare word (lowercased).
    pub fn ident(&mut self) -> Option<String> {
        self.skip_ws();
        if self.chars.get(self.pos) == Some(&'"') {
            let mut out = String::new();
            let mut i = self.pos + 1;
            while let Some(&c) = self.chars.get(i) {
                if c == '"' {
                    if self.chars.get(i + 1) == Some(&'"') {
                        out.push('"');
                        i += 2;
                        continue;
                    }
                    self.pos = i + 1;
                    return Some(out);
                }
                out.push(c);
                i += 1;
            }
            return None;
        }
        let (word, end) = self.word_at(self.pos)?;
        if word.starts_with(|c: char| c.is_ascii_digit()) {
            return None;
        }
        self.pos = end;
        Some(word.to_lowercase())
    }

    /// `[schema.]name`.
    pub fn qualified_name(&mut self) -> Option<(Option<String>, String)> {
        let first = self.ident()?;
        if self.chars.get(self.pos) == Some(&'.') {
            self.pos += 1;
            let second = self.ident()?;
            return Some((Some(first), second));
        }
        Some((None, first))
    }

    /// Single-quoted literal, unescaped.
    pub fn literal(&mut self) -> Option<String> {
        self.skip_ws();
        if self.chars.get(self.pos) != Some(&'\'') {
            return None;
        }
        let mut out = String::new();
        let mut i = self.pos + 1;
        while let Some(&c) = self.chars.get(i) {
            if c == '\'' {
                if self.chars.get(i + 1) == Some(&'\'') {
                    out.push('\'');
                    i += 2;
                    continue;
                }
                self.pos = i + 1;
                return Some(out);
            }
            out.push(c);
            i += 1;
        }
        None
    }

    pub fn number(&mut self) -> Option<i64> {
        self.skip_ws();
        let start = self.pos;
        let mut end = start;
        if self.chars.get(end) == Some(&'-') {
            end += 1;
        }
        while self.chars.get(end).is_some_and(|c| c.is_ascii_digit()) {
            end += 1;
        }
        let text: String = self.chars[start..end].iter().collect();
        let value = text.parse().ok()?;
        self.pos = end;
        Some(value)
    }

    /// Balanced `( ... )`; returns the inner text untouched.
    pub fn parens(&mut self) -> Option<String> {
        if self.peek() != Some('(') {
            return None;
        }
        let open = self.pos;
        let close = self.matching_paren(open)?;
        self.pos = close + 1;
        Some(self.chars[open + 1..close].iter().collect())
    }

    fn matching_paren(&self, open: usize) -> Option<usize> {
        let mut depth = 0usize;
        let mut quote: Option<char> = None;
        let mut i = open;
        while let Some(&c) = self.chars.get(i) {
            match quote {
                Some(q) if c == q => quote = None,
                Some(_) => {}
                None => match c {
                    '\'' | '"' => quote = Some(c),
                    '(' => depth += 1,
                    ')' => {
                        depth -= 1;
                        if depth == 0 {
                            return Some(i);
                        }
                    }
                    _ => {}
                },
            }
            i += 1;
        }
        None
    }

    /// `$tag$ ... $tag$` body, without the tags.
    pub fn dollar_body(&mut self) -> Option<String> {
        if self.peek() != Some('$') {
            return None;
        }
        let start = self.pos;
        let mut end = start + 1;
        while self.chars.get(end).is_some_and(|&c| c != '$') {
            end += 1;
        }
        let tag: Vec<char> = self.chars.get(start..=end)?.to_vec();
        let body_start = end + 1;
        let mut i = body_start;
        while i + tag.len() <= self.chars.len() {
            if self.chars[i..i + tag.len()] == tag[..] {
                self.pos = i + tag.len();
                return Some(self.chars[body_start..i].iter().collect());
            }
            i += 1;
        }
        None
    }

    /// Raw text up to (not including) the first top-level keyword of `stops`.
    pub fn until_keywords(&mut self, stops: &[&str]) -> String {
        self.skip_ws();
        let start = self.pos;
        let mut quote: Option<char> = None;
        let mut depth = 0usize;
        let mut i = start;
        while let Some(&c) = self.chars.get(i) {
            if let Some(q) = quote {
                if c == q {
                    quote = None;
                }
                i += 1;
                continue;
            }
            match c {
                '\'' | '"' => quote = Some(c),
                '(' => depth += 1,
                ')' => depth = depth.saturating_sub(1),
                _ => {}
            }
            let boundary = i == 0 || !is_word_char(self.chars[i - 1]);
            if depth == 0 && boundary && is_word_char(c) {
                if let Some((word, _)) = self.word_at(i) {
                    if stops.iter().any(|s| word.eq_ignore_ascii_case(s)) {
                        break;
                    }
                }
            }
            i += 1;
        }
        self.pos = i;
        self.chars[start..i].iter().collect::<String>().trim().to_string()
    }

    pub fn rest(&mut self) -> String {
        self.skip_ws();
        let text: String = self.chars[self.pos..].iter().collect();
        self.pos = self.chars.len();
        text.trim().to_string()
    }

    /// Where the scanner stands, for error messages.
    pub fn remaining_preview(&self) -> String {
        self.chars[self.pos.min(self.chars.len())..]
            .iter()
            .take(30)
            .collect()
    }
}

/// True if `text` starts with the keyword sequence `kws` (case-insensitive).
pub(crate) fn starts_with_keywords(text: &str, kws: &[&str]) -> bool {
    Scanner::new(text).keywords(kws)
}
