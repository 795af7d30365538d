//! Field-by-field comparison of matched elements.

use std::sync::LazyLock;

use regex::Regex;

use super::FieldChange;
use crate::schema::{
    CheckConstraint, Collation, Column, CompositeType, Constraint, ConstraintKind, Domain,
    EnumType, ForeignKeyRef, ForeignTable, Function, Generated, Index, Sequence, Table, Trigger,
    View,
};
use crate::types::{is_serial, storage_type};

/// Canonical text of an expression for equality checks.
///
/// Removes `::type` casts, redundant outer parentheses and whitespace,
/// lowercases everything outside string literals, and unwraps parenthesized
/// literals the catalog adds (`(0)::numeric` becomes `0`).
pub fn normalize_expression(text: &str) -> String {
    static PAREN_LITERAL: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"\((-?[0-9][0-9.]*|'(?:[^']|'')*')\)").expect("literal pattern")
    });

    let stripped = strip_casts(text.trim().trim_end_matches(';'));
    let mut out = String::with_capacity(stripped.len());
    let mut in_string = false;
    let mut in_ident = false;
    for c in stripped.chars() {
        match c {
            '\'' if !in_ident => {
                in_string = !in_string;
                out.push(c);
            }
            '"' if !in_string => in_ident = !in_ident,
            c if in_string || in_ident => out.push(c),
            c if c.is_whitespace() => {}
            c => out.extend(c.to_lowercase()),
        }
    }

    let mut current = out;
    loop {
        let next = PAREN_LITERAL.replace_all(&current, "$1").into_owned();
        let next = strip_outer_parens(&next).to_string();
        if next == current {
            return current;
        }
        current = next;
    }
}

/// Remove `::type` suffixes outside string literals.
fn strip_casts(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c == '\'' {
            in_string = !in_string;
            out.push(c);
            i += 1;
            continue;
        }
        if !in_string && c == ':' && chars.get(i + 1) == Some(&':') {
            i = skip_type(&chars, i + 2);
            continue;
        }
        out.push(c);
        i += 1;
    }
    out
}

/// Skip a type name starting at `i`, including multi-word names,
/// parameters and array brackets.
fn skip_type(chars: &[char], mut i: usize) -> usize {
    const CONTINUATIONS: [&str; 6] = ["varying", "precision", "with", "without", "time", "zone"];

    let word = |i: usize| -> usize {
        let mut j = i;
        if chars.get(j) == Some(&'"') {
            j += 1;
            while j < chars.len() && chars[j] != '"' {
                j += 1;
            }
            return (j + 1).min(chars.len());
        }
        while j < chars.len() && (chars[j].is_alphanumeric() || chars[j] == '_' || chars[j] == '.')
        {
            j += 1;
        }
        j
    };

    while chars.get(i).is_some_and(|c| c.is_whitespace()) {
        i += 1;
    }
    i = word(i);
    loop {
        let mut j = i;
        while chars.get(j).is_some_and(|c| *c == ' ') {
            j += 1;
        }
        let end = word(j);
        let next: String = chars[j..end].iter().collect::<String>().to_lowercase();
        if j > i && CONTINUATIONS.contains(&next.as_str()) {
            i = end;
        } else {
            break;
        }
    }
    if chars.get(i) == Some(&'(') {
        while i < chars.len() && chars[i] != ')' {
            i += 1;
        }
        i += 1;
    }
    while chars.get(i) == Some(&'[') {
        while i < chars.len() && chars[i] != ']' {
            i += 1;
        }
        i += 1;
    }
    i.min(chars.len())
}

/// Drop one pair of parentheses wrapping the whole text.
fn strip_outer_parens(text: &str) -> &str {
    if !(text.starts_with('(') && text.ends_with(')')) {
        return text;
    }
    let mut depth = 0;
    let mut in_string = false;
    for (idx, c) in text.char_indices() {
        match c {
            '\'' => in_string = !in_string,
            '(' if !in_string => depth += 1,
            ')' if !in_string => {
                depth -= 1;
                if depth == 0 && idx != text.len() - 1 {
                    return text;
                }
            }
            _ => {}
        }
    }
    &text[1..text.len() - 1]
}

/// Canonical default, or `None` when the default is absent or `NULL`.
pub fn normalize_default(default: Option<&str>) -> Option<String> {
    let text = normalize_expression(default?);
    match text.as_str() {
        "" | "null" => None,
        "current_timestamp" | "current_timestamp()" | "now()" | "transaction_timestamp()"
        | "localtimestamp" => Some("now()".to_string()),
        _ => Some(text),
    }
}

/// Default as compared: serial columns hide their implicit `nextval`.
fn effective_default(col: &Column, other: &Column) -> Option<String> {
    let serial = is_serial(&col.data_type) || is_serial(&other.data_type);
    if serial && col.default_sequence().is_some() {
        return None;
    }
    if col.identity.is_some() || col.generated.is_some() {
        return None;
    }
    normalize_default(col.default.as_deref())
}

fn opt_string<T: ToString>(value: Option<T>) -> Option<String> {
    value.map(|v| v.to_string())
}

struct Fields(Vec<FieldChange>);

impl Fields {
    fn new() -> Self {
        Fields(Vec::new())
    }

    fn check(&mut self, field: &str, from: Option<String>, to: Option<String>) {
        if from != to {
            self.0.push(FieldChange {
                field: field.to_string(),
                from,
                to,
            });
        }
    }

    fn flag(&mut self, field: &str, from: bool, to: bool) {
        self.check(field, Some(from.to_string()), Some(to.to_string()));
    }

    fn done(self) -> Vec<FieldChange> {
        self.0
    }
}

fn render_reference(fk: &ForeignKeyRef) -> String {
    let mut text = format!("{}({})", fk.target(), fk.columns.join(","));
    text.push_str(&format!(
        " on delete {} on update {}",
        fk.effective_on_delete().sql(),
        fk.effective_on_update().sql()
    ));
    if let Some(m) = fk.match_type {
        text.push_str(&format!(" match {}", m.sql()));
    }
    if fk.deferrable {
        text.push_str(" deferrable");
        if fk.initially_deferred {
            text.push_str(" initially deferred");
        }
    }
    text
}

fn render_generated(generated: &Generated) -> String {
    format!("{:?}:{}", generated.kind, normalize_expression(&generated.expression)).to_lowercase()
}

fn render_check(check: &CheckConstraint) -> String {
    normalize_expression(&check.expression)
}

/// Column changes in a fixed order: type, nullable, primaryKey, unique,
/// default, length, precision, scale, identity, generated, references,
/// check, comment.
pub fn column_changes(old: &Column, new: &Column) -> Vec<FieldChange> {
    let mut f = Fields::new();
    f.check(
        "type",
        Some(storage_type(&old.data_type)),
        Some(storage_type(&new.data_type)),
    );
    f.flag("nullable", old.nullable, new.nullable);
    f.flag("primaryKey", old.primary_key, new.primary_key);
    f.flag("unique", old.unique, new.unique);
    f.check(
        "default",
        effective_default(old, new),
        effective_default(new, old),
    );
    f.check("length", opt_string(old.params.length), opt_string(new.params.length));
    f.check(
        "precision",
        opt_string(old.params.precision),
        opt_string(new.params.precision),
    );
    f.check("scale", opt_string(old.params.scale), opt_string(new.params.scale));
    f.check(
        "identity",
        old.identity.map(|i| i.sql().to_string()),
        new.identity.map(|i| i.sql().to_string()),
    );
    f.check(
        "generated",
        old.generated.as_ref().map(render_generated),
        new.generated.as_ref().map(render_generated),
    );
    f.check(
        "references",
        old.references.as_ref().map(render_reference),
        new.references.as_ref().map(render_reference),
    );
    f.check(
        "check",
        old.check.as_ref().map(render_check),
        new.check.as_ref().map(render_check),
    );
    f.check("comment", old.comment.clone(), new.comment.clone());
    f.done()
}

/// Canonical key entry: quotes removed, whitespace dropped, lowercased.
fn normalize_key(key: &str) -> String {
    normalize_expression(key)
}

pub fn index_changes(old: &Index, new: &Index) -> Vec<FieldChange> {
    let keys = |i: &Index| {
        i.columns
            .iter()
            .map(|c| match i.opclasses.get(c) {
                Some(op) => format!("{} {}", normalize_key(c), op.to_lowercase()),
                None => normalize_key(c),
            })
            .collect::<Vec<_>>()
            .join(",")
    };
    let mut f = Fields::new();
    f.flag("unique", old.unique, new.unique);
    f.check(
        "method",
        Some(old.method_or_default()),
        Some(new.method_or_default()),
    );
    f.check("columns", Some(keys(old)), Some(keys(new)));
    f.check(
        "where",
        old.where_clause.as_deref().map(normalize_expression),
        new.where_clause.as_deref().map(normalize_expression),
    );
    f.check(
        "include",
        Some(old.include.join(",")),
        Some(new.include.join(",")),
    );
    f.check("comment", old.comment.clone(), new.comment.clone());
    f.done()
}

/// Canonical form of a constraint's meaning, name excluded.
pub fn constraint_fingerprint(c: &Constraint) -> String {
    match c.kind {
        ConstraintKind::PrimaryKey | ConstraintKind::Unique => {
            format!("{}({})", c.kind.sql(), c.columns.join(","))
        }
        ConstraintKind::ForeignKey => match &c.references {
            Some(fk) => format!("fk({})->{}", c.columns.join(","), render_reference(fk)),
            None => normalize_expression(&c.definition),
        },
        ConstraintKind::Check => match &c.expression {
            Some(expr) => format!("check:{}", normalize_expression(expr)),
            None => normalize_expression(&c.definition),
        },
        ConstraintKind::Exclude => normalize_expression(&c.definition),
    }
}

pub fn constraint_changes(old: &Constraint, new: &Constraint) -> Vec<FieldChange> {
    let mut f = Fields::new();
    f.check(
        "kind",
        Some(old.kind.sql().to_string()),
        Some(new.kind.sql().to_string()),
    );
    f.check(
        "definition",
        Some(constraint_fingerprint(old)),
        Some(constraint_fingerprint(new)),
    );
    f.done()
}

pub fn table_changes(old: &Table, new: &Table) -> Vec<FieldChange> {
    let partition = |t: &Table| {
        t.partition
            .as_ref()
            .map(|p| format!("{} ({})", p.strategy.sql(), p.columns.join(",")))
    };
    let mut f = Fields::new();
    f.check("partition", partition(old), partition(new));
    f.check("comment", old.comment.clone(), new.comment.clone());
    f.done()
}

/// Value-level delta of an enum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumDelta {
    pub added: Vec<AddedValue>,
    pub removed: Vec<String>,
}

/// A new enum label and its neighbours in the new value list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddedValue {
    pub value: String,
    /// Label right before it, if any.
    pub after: Option<String>,
    /// Label right after it, if any.
    pub before: Option<String>,
}

pub fn enum_delta(old: &EnumType, new: &EnumType) -> EnumDelta {
    let added = new
        .values
        .iter()
        .enumerate()
        .filter(|(_, v)| !old.values.contains(v))
        .map(|(idx, v)| AddedValue {
            value: v.clone(),
            after: idx.checked_sub(1).map(|p| new.values[p].clone()),
            before: new.values.get(idx + 1).cloned(),
        })
        .collect();
    let removed = old
        .values
        .iter()
        .filter(|v| !new.values.contains(v))
        .cloned()
        .collect();
    EnumDelta { added, removed }
}

pub fn enum_changes(old: &EnumType, new: &EnumType) -> Vec<FieldChange> {
    let mut f = Fields::new();
    f.check("values", Some(old.values.join(",")), Some(new.values.join(",")));
    f.done()
}

pub fn domain_changes(old: &Domain, new: &Domain) -> Vec<FieldChange> {
    let mut f = Fields::new();
    f.check(
        "baseType",
        Some(storage_type(&crate::types::normalize_type(&old.base_type))),
        Some(storage_type(&crate::types::normalize_type(&new.base_type))),
    );
    f.flag("notNull", old.not_null, new.not_null);
    f.check(
        "default",
        normalize_default(old.default.as_deref()),
        normalize_default(new.default.as_deref()),
    );
    f.check(
        "check",
        old.check.as_deref().map(normalize_expression),
        new.check.as_deref().map(normalize_expression),
    );
    f.done()
}

pub fn composite_changes(old: &CompositeType, new: &CompositeType) -> Vec<FieldChange> {
    let attrs = |c: &CompositeType| {
        c.attributes
            .iter()
            .map(|a| format!("{} {}", a.name, crate::types::normalize_type(&a.data_type)))
            .collect::<Vec<_>>()
            .join(",")
    };
    let mut f = Fields::new();
    f.check("attributes", Some(attrs(old)), Some(attrs(new)));
    f.done()
}

pub fn sequence_changes(old: &Sequence, new: &Sequence) -> Vec<FieldChange> {
    let owner = |s: &Sequence| s.owned_by.as_ref().map(|o| format!("{}.{}", o.table, o.column));
    let mut f = Fields::new();
    f.check(
        "dataType",
        old.data_type.as_deref().map(crate::types::normalize_type),
        new.data_type.as_deref().map(crate::types::normalize_type),
    );
    f.check("start", opt_string(old.start), opt_string(new.start));
    f.check("increment", opt_string(old.increment), opt_string(new.increment));
    f.check("minValue", opt_string(old.min_value), opt_string(new.min_value));
    f.check("maxValue", opt_string(old.max_value), opt_string(new.max_value));
    f.check("cache", opt_string(old.cache), opt_string(new.cache));
    f.flag("cycle", old.cycle, new.cycle);
    f.check("ownedBy", owner(old), owner(new));
    f.done()
}

pub fn function_changes(old: &Function, new: &Function) -> Vec<FieldChange> {
    let mut f = Fields::new();
    f.check(
        "arguments",
        Some(normalize_expression(&old.arguments)),
        Some(normalize_expression(&new.arguments)),
    );
    f.check(
        "returns",
        Some(normalize_expression(&old.returns)),
        Some(normalize_expression(&new.returns)),
    );
    f.check(
        "language",
        Some(old.language.to_lowercase()),
        Some(new.language.to_lowercase()),
    );
    f.check(
        "body",
        Some(old.body.trim().to_string()),
        Some(new.body.trim().to_string()),
    );
    f.check(
        "volatility",
        old.volatility.map(|v| v.sql().to_string()),
        new.volatility.map(|v| v.sql().to_string()),
    );
    f.flag("securityDefiner", old.security_definer, new.security_definer);
    f.flag("isProcedure", old.is_procedure, new.is_procedure);
    f.done()
}

pub fn trigger_changes(old: &Trigger, new: &Trigger) -> Vec<FieldChange> {
    let events = |t: &Trigger| {
        let mut events: Vec<String> = t.events.iter().map(|e| e.to_uppercase()).collect();
        events.sort();
        events.join(",")
    };
    let mut f = Fields::new();
    f.check("table", Some(old.table_key()), Some(new.table_key()));
    f.check(
        "timing",
        Some(old.timing.sql().to_string()),
        Some(new.timing.sql().to_string()),
    );
    f.check("events", Some(events(old)), Some(events(new)));
    f.flag("forEachRow", old.for_each_row, new.for_each_row);
    f.check(
        "function",
        Some(normalize_expression(&old.function)),
        Some(normalize_expression(&new.function)),
    );
    f.check(
        "when",
        old.when.as_deref().map(normalize_expression),
        new.when.as_deref().map(normalize_expression),
    );
    f.done()
}

pub fn view_changes(old: &View, new: &View) -> Vec<FieldChange> {
    let mut f = Fields::new();
    f.check(
        "definition",
        Some(normalize_expression(&old.definition)),
        Some(normalize_expression(&new.definition)),
    );
    f.done()
}

pub fn foreign_table_changes(old: &ForeignTable, new: &ForeignTable) -> Vec<FieldChange> {
    let columns = |t: &ForeignTable| {
        t.columns
            .iter()
            .map(|c| format!("{} {}", c.name, c.sql_type()))
            .collect::<Vec<_>>()
            .join(",")
    };
    let options = |t: &ForeignTable| {
        t.options
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(",")
    };
    let mut f = Fields::new();
    f.check("columns", Some(columns(old)), Some(columns(new)));
    f.check("server", Some(old.server.clone()), Some(new.server.clone()));
    f.check("options", Some(options(old)), Some(options(new)));
    f.done()
}

pub fn collation_changes(old: &Collation, new: &Collation) -> Vec<FieldChange> {
    let mut f = Fields::new();
    f.check("provider", old.provider.clone(), new.provider.clone());
    f.check("locale", old.locale.clone(), new.locale.clone());
    f.flag("deterministic", old.deterministic, new.deterministic);
    f.done()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FkAction;

    #[test]
    fn test_normalize_expression_strips_casts_and_parens() {
        assert_eq!(normalize_expression("'active'::character varying"), "'active'");
        assert_eq!(normalize_expression("(price > (0)::numeric)"), "price>0");
        assert_eq!(normalize_expression("price > 0"), "price>0");
        assert_eq!(normalize_expression("(deleted_at IS NULL)"), "deleted_atisnull");
        assert_eq!(normalize_expression("'{}'::text[]"), "'{}'");
        assert_eq!(normalize_expression("'It''s'::text"), "'It''s'");
        assert_eq!(normalize_expression("(a) + (b)"), "(a)+(b)");
    }

    #[test]
    fn test_now_variants_collapse() {
        for text in ["now()", "NOW()", "CURRENT_TIMESTAMP", "current_timestamp()"] {
            assert_eq!(normalize_default(Some(text)).as_deref(), Some("now()"));
        }
        assert_eq!(normalize_default(Some("NULL")), None);
        assert_eq!(normalize_default(Some("NULL::text")), None);
    }

    #[test]
    fn test_column_change_order() {
        let old = Column::new("email", "varchar(255)");
        let new = Column::new("email", "varchar(255)").not_null().default("''");
        let changes = column_changes(&old, &new);
        let fields: Vec<&str> = changes.iter().map(|c| c.field.as_str()).collect();
        assert_eq!(fields, vec!["nullable", "default"]);
        assert_eq!(changes[1].from, None);
        assert_eq!(changes[1].to.as_deref(), Some("''"));
    }

    #[test]
    fn test_serial_matches_nextval_default() {
        let desired = Column::new("id", "serial").primary_key();
        let actual = Column::new("id", "integer")
            .primary_key()
            .default("nextval('users_id_seq'::regclass)");
        assert!(column_changes(&actual, &desired).is_empty());
    }

    #[test]
    fn test_type_aliases_are_equal() {
        let a = Column::new("n", "int4");
        let b = Column::new("n", "INTEGER");
        assert!(column_changes(&a, &b).is_empty());
    }

    #[test]
    fn test_reference_actions_default_to_no_action() {
        let a = Column::new("u", "int").references(ForeignKeyRef::new("users", "id"));
        let b = Column::new("u", "int")
            .references(ForeignKeyRef::new("users", "id").on_delete(FkAction::NoAction));
        assert!(column_changes(&a, &b).is_empty());
    }

    #[test]
    fn test_enum_delta_positions() {
        let old = EnumType::new("s", &["a", "c"]);
        let new = EnumType::new("s", &["a", "b", "c", "d"]);
        let delta = enum_delta(&old, &new);
        assert_eq!(delta.added.len(), 2);
        assert_eq!(delta.added[0].value, "b");
        assert_eq!(delta.added[0].after.as_deref(), Some("a"));
        assert_eq!(delta.added[1].before, None);
        assert!(delta.removed.is_empty());
    }

    #[test]
    fn test_index_where_normalized() {
        let a = Index::new("i", vec!["email".into()]).filter("(deleted_at IS NULL)");
        let b = Index::new("i", vec!["\"email\"".into()]).filter("deleted_at is null");
        assert!(index_changes(&a, &b).is_empty());
    }
}
