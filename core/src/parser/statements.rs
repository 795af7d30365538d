//! Readers for every statement kind besides tables and indexes.

use std::collections::BTreeMap;

use sqlparser::ast::Statement;
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use tracing::{debug, warn};

use super::expr::parse_expression;
use super::scan::Scanner;
use super::table::read_elements;
use super::{Pending, Source};
use crate::emit::split::split_top_level;
use crate::error::Result;
use crate::schema::{
    Collation, CompositeAttribute, CompositeType, Domain, EnumType, ForeignTable, Function,
    OwnedBy, Schema, Sequence, Trigger, TriggerTiming, View, Volatility, object_key,
};
use crate::types::{parse_type_spec, render_type};

/// Canonical spelling of a type written in a statement.
pub(crate) fn canonical_type(text: &str) -> String {
    let spec = parse_type_spec(text);
    render_type(&spec.name, &spec.params)
}

fn collapse_ws(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Deparse a view query so formatting differences do not count as changes.
/// Queries the grammar rejects are kept with their whitespace collapsed.
pub fn canonical_query(text: &str) -> String {
    let text = text.trim().trim_end_matches(';').trim();
    let dialect = PostgreSqlDialect {};
    match Parser::parse_sql(&dialect, text) {
        Ok(statements) => match statements.as_slice() {
            [query @ Statement::Query(_)] => query.to_string(),
            _ => collapse_ws(text),
        },
        Err(e) => {
            debug!(error = %e, "view definition kept verbatim");
            collapse_ws(text)
        }
    }
}

fn qualified(s: &mut Scanner, src: &Source<'_>, what: &str) -> Result<(Option<String>, String)> {
    s.qualified_name()
        .map(|(schema, name)| (schema.filter(|n| n != "public"), name))
        .ok_or_else(|| src.error(format!("expected a {what} name")))
}

/// `CREATE EXTENSION [IF NOT EXISTS] name [WITH SCHEMA ...]`.
pub(crate) fn read_extension(src: &Source<'_>) -> Result<String> {
    let mut s = Scanner::new(&src.code);
    s.keywords(&["CREATE", "EXTENSION"]);
    s.keywords(&["IF", "NOT", "EXISTS"]);
    s.ident()
        .ok_or_else(|| src.error("expected an extension name"))
}

/// `CREATE TYPE name AS ENUM (...)` or `CREATE TYPE name AS (attr type, ...)`.
pub(crate) fn read_type(src: &Source<'_>, schema: &mut Schema) -> Result<()> {
    let mut s = Scanner::new(&src.code);
    s.keywords(&["CREATE", "TYPE"]);
    let (namespace, name) = qualified(&mut s, src, "type")?;
    if !s.keyword("AS") {
        return Err(src.error(format!("expected AS after CREATE TYPE {name}")));
    }

    if s.keyword("ENUM") {
        let inner = s
            .parens()
            .ok_or_else(|| src.error(format!("expected a label list for enum {name}")))?;
        let mut values = Vec::new();
        for label in split_top_level(&inner, ',') {
            let value = Scanner::new(&label)
                .literal()
                .ok_or_else(|| src.error(format!("enum labels must be string literals: {label}")))?;
            values.push(value);
        }
        schema.enums.push(EnumType {
            name,
            schema: namespace,
            values,
            tracking_id: src.id.clone(),
        });
        return Ok(());
    }

    if let Some(inner) = s.parens() {
        let mut attributes = Vec::new();
        for attr in split_top_level(&inner, ',') {
            let mut a = Scanner::new(&attr);
            let attr_name = a
                .ident()
                .ok_or_else(|| src.error(format!("bad attribute in type {name}: {attr}")))?;
            attributes.push(CompositeAttribute {
                name: attr_name,
                data_type: canonical_type(&a.rest()),
            });
        }
        schema.composite_types.push(CompositeType {
            name,
            schema: namespace,
            attributes,
            tracking_id: src.id.clone(),
        });
        return Ok(());
    }

    Err(src.error(format!(
        "unsupported CREATE TYPE form for {name}; only ENUM and composite types are managed"
    )))
}

/// `CREATE DOMAIN name [AS] base [DEFAULT d] [NOT NULL] [CHECK (c)]`.
pub(crate) fn read_domain(src: &Source<'_>) -> Result<Domain> {
    const CLAUSES: [&str; 6] = ["DEFAULT", "NOT", "NULL", "CHECK", "CONSTRAINT", "COLLATE"];
    let mut s = Scanner::new(&src.code);
    s.keywords(&["CREATE", "DOMAIN"]);
    let (namespace, name) = qualified(&mut s, src, "domain")?;
    s.keyword("AS");
    let base = s.until_keywords(&CLAUSES);
    if base.is_empty() {
        return Err(src.error(format!("expected a base type for domain {name}")));
    }

    let mut domain = Domain {
        name,
        schema: namespace,
        base_type: canonical_type(&base),
        tracking_id: src.id.clone(),
        ..Domain::default()
    };
    while !s.is_done() {
        if s.keyword("DEFAULT") {
            domain.default = Some(parse_expression(&s.until_keywords(&CLAUSES)).text);
        } else if s.keywords(&["NOT", "NULL"]) {
            domain.not_null = true;
        } else if s.keyword("NULL") {
            domain.not_null = false;
        } else if s.keyword("CHECK") {
            let check = s
                .parens()
                .ok_or_else(|| src.error("expected (expression) after CHECK"))?;
            domain.check = Some(parse_expression(&check).text);
        } else if s.keyword("CONSTRAINT") {
            s.ident();
        } else if s.keyword("COLLATE") {
            s.qualified_name();
        } else {
            return Err(src.error(format!(
                "unexpected text in CREATE DOMAIN near '{}'",
                s.remaining_preview()
            )));
        }
    }
    Ok(domain)
}

fn owned_by(s: &mut Scanner) -> Option<Option<OwnedBy>> {
    if s.keyword("NONE") {
        return Some(None);
    }
    let first = s.ident()?;
    let mut parts = vec![first];
    while s.eat('.') {
        parts.push(s.ident()?);
    }
    let column = parts.pop()?;
    let table = parts.pop()?;
    Some(Some(OwnedBy { table, column }))
}

/// `CREATE SEQUENCE [IF NOT EXISTS] name [options]`.
pub(crate) fn read_sequence(src: &Source<'_>, pending: &mut Pending) -> Result<Sequence> {
    let mut s = Scanner::new(&src.code);
    s.keywords(&["CREATE", "SEQUENCE"]);
    s.keywords(&["IF", "NOT", "EXISTS"]);
    let (namespace, name) = qualified(&mut s, src, "sequence")?;
    let mut seq = Sequence {
        name,
        schema: namespace,
        tracking_id: src.id.clone(),
        ..Sequence::default()
    };

    let number = |s: &mut Scanner, what: &str| {
        s.number()
            .ok_or_else(|| src.error(format!("expected a number after {what}")))
    };
    while !s.is_done() {
        if s.keyword("AS") {
            let t = s
                .ident()
                .ok_or_else(|| src.error("expected a type after AS"))?;
            seq.data_type = Some(canonical_type(&t));
        } else if s.keyword("INCREMENT") {
            s.keyword("BY");
            seq.increment = Some(number(&mut s, "INCREMENT")?);
        } else if s.keyword("MINVALUE") {
            seq.min_value = Some(number(&mut s, "MINVALUE")?);
        } else if s.keyword("MAXVALUE") {
            seq.max_value = Some(number(&mut s, "MAXVALUE")?);
        } else if s.keywords(&["NO", "MINVALUE"]) {
            seq.min_value = None;
        } else if s.keywords(&["NO", "MAXVALUE"]) {
            seq.max_value = None;
        } else if s.keywords(&["NO", "CYCLE"]) {
            seq.cycle = false;
        } else if s.keyword("START") {
            s.keyword("WITH");
            seq.start = Some(number(&mut s, "START")?);
        } else if s.keyword("CACHE") {
            seq.cache = Some(number(&mut s, "CACHE")?);
        } else if s.keyword("CYCLE") {
            seq.cycle = true;
        } else if s.keywords(&["OWNED", "BY"]) {
            let owner = owned_by(&mut s)
                .ok_or_else(|| src.error("expected table.column or NONE after OWNED BY"))?;
            if let Some(owner) = owner {
                pending.owned_by.push((src.line, seq.name.clone(), owner));
            }
        } else {
            return Err(src.error(format!(
                "unexpected text in CREATE SEQUENCE near '{}'",
                s.remaining_preview()
            )));
        }
    }
    Ok(seq)
}

/// `ALTER SEQUENCE name OWNED BY table.column`. Other forms are skipped.
pub(crate) fn read_alter_sequence(src: &Source<'_>, pending: &mut Pending) -> Result<bool> {
    let mut s = Scanner::new(&src.code);
    s.keywords(&["ALTER", "SEQUENCE"]);
    s.keywords(&["IF", "EXISTS"]);
    let (_, name) = qualified(&mut s, src, "sequence")?;
    if !s.keywords(&["OWNED", "BY"]) {
        return Ok(false);
    }
    let owner = owned_by(&mut s)
        .ok_or_else(|| src.error("expected table.column or NONE after OWNED BY"))?;
    if let Some(owner) = owner {
        pending.owned_by.push((src.line, name, owner));
    }
    Ok(true)
}

/// `CREATE [OR REPLACE] FUNCTION|PROCEDURE name(args) [RETURNS t] ...`.
pub(crate) fn read_function(src: &Source<'_>) -> Result<Function> {
    const CLAUSES: [&str; 14] = [
        "LANGUAGE", "AS", "IMMUTABLE", "STABLE", "VOLATILE", "SECURITY", "STRICT", "CALLED",
        "PARALLEL", "LEAKPROOF", "COST", "ROWS", "SET", "WINDOW",
    ];
    let mut s = Scanner::new(&src.code);
    s.keyword("CREATE");
    s.keywords(&["OR", "REPLACE"]);
    let is_procedure = if s.keyword("PROCEDURE") {
        true
    } else {
        s.keyword("FUNCTION");
        false
    };
    let (namespace, name) = qualified(&mut s, src, "function")?;
    let arguments = s
        .parens()
        .ok_or_else(|| src.error(format!("expected an argument list for {name}")))?;

    let mut function = Function {
        name,
        schema: namespace,
        arguments: collapse_ws(&arguments),
        is_procedure,
        tracking_id: src.id.clone(),
        ..Function::default()
    };
    if s.keyword("RETURNS") {
        function.returns = collapse_ws(&s.until_keywords(&CLAUSES));
    }

    let mut body = None;
    while !s.is_done() {
        if s.keyword("LANGUAGE") {
            let language = s.ident().or_else(|| s.literal());
            function.language = language
                .ok_or_else(|| src.error("expected a language name"))?
                .to_lowercase();
        } else if s.keyword("AS") {
            body = s.dollar_body().or_else(|| s.literal());
            if body.is_none() {
                return Err(src.error("expected a $$-quoted or string body after AS"));
            }
            if s.eat(',') {
                s.literal();
            }
        } else if let Some(v) = ["IMMUTABLE", "STABLE", "VOLATILE"]
            .into_iter()
            .find(|w| s.keyword(w))
        {
            function.volatility = Volatility::parse(v);
        } else if s.keywords(&["SECURITY", "DEFINER"]) {
            function.security_definer = true;
        } else if s.keywords(&["SECURITY", "INVOKER"]) {
            function.security_definer = false;
        } else if s.ident().is_some()
            || s.number().is_some()
            || s.literal().is_some()
            || s.parens().is_some()
            || s.eat('=')
            || s.eat(',')
        {
            // STRICT, COST n, SET x = y and friends are not tracked.
        } else {
            return Err(src.error(format!(
                "unexpected text in function definition near '{}'",
                s.remaining_preview()
            )));
        }
    }

    function.body = body.ok_or_else(|| {
        src.error(format!("function {} has no AS body", function.name))
    })?;
    if function.language.is_empty() {
        return Err(src.error(format!("function {} has no LANGUAGE", function.name)));
    }
    Ok(function)
}

fn normalize_event(event: &str) -> String {
    event
        .split_whitespace()
        .map(|w| {
            let upper = w.to_ascii_uppercase();
            match upper.as_str() {
                "INSERT" | "UPDATE" | "DELETE" | "TRUNCATE" | "OF" => upper,
                _ => w.to_string(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// `CREATE [CONSTRAINT] TRIGGER name timing events ON table ... EXECUTE FUNCTION f(...)`.
pub(crate) fn read_trigger(src: &Source<'_>) -> Result<Trigger> {
    let mut s = Scanner::new(&src.code);
    s.keyword("CREATE");
    s.keywords(&["OR", "REPLACE"]);
    s.keyword("CONSTRAINT");
    s.keyword("TRIGGER");
    let name = s
        .ident()
        .ok_or_else(|| src.error("expected a trigger name"))?;
    let timing = if s.keyword("BEFORE") {
        TriggerTiming::Before
    } else if s.keyword("AFTER") {
        TriggerTiming::After
    } else if s.keywords(&["INSTEAD", "OF"]) {
        TriggerTiming::InsteadOf
    } else {
        return Err(src.error(format!("trigger {name} needs BEFORE, AFTER or INSTEAD OF")));
    };

    let events_text = s.until_keywords(&["ON"]);
    let mut events = Vec::new();
    let mut current = Vec::new();
    for word in events_text.split_whitespace() {
        if word.eq_ignore_ascii_case("OR") {
            events.push(normalize_event(&current.join(" ")));
            current.clear();
        } else {
            current.push(word);
        }
    }
    if !current.is_empty() {
        events.push(normalize_event(&current.join(" ")));
    }
    if !s.keyword("ON") || events.is_empty() {
        return Err(src.error(format!("trigger {name} needs events and ON <table>")));
    }
    let (table_schema, table) = qualified(&mut s, src, "table")?;

    let mut trigger = Trigger {
        name,
        table,
        table_schema,
        timing,
        events,
        for_each_row: false,
        function: String::new(),
        when: None,
        tracking_id: src.id.clone(),
    };
    while !s.is_done() {
        if s.keyword("FOR") {
            s.keyword("EACH");
            trigger.for_each_row = if s.keyword("ROW") {
                true
            } else if s.keyword("STATEMENT") {
                false
            } else {
                return Err(src.error("expected ROW or STATEMENT after FOR EACH"));
            };
        } else if s.keyword("WHEN") {
            let when = s
                .parens()
                .ok_or_else(|| src.error("expected (condition) after WHEN"))?;
            trigger.when = Some(parse_expression(&when).text);
        } else if s.keyword("EXECUTE") {
            if !(s.keyword("FUNCTION") || s.keyword("PROCEDURE")) {
                return Err(src.error("expected FUNCTION after EXECUTE"));
            }
            trigger.function = collapse_ws(&s.rest());
        } else if s.ident().is_some() || s.parens().is_some() {
            // FROM, REFERENCING, DEFERRABLE and similar clauses are not tracked.
        } else {
            return Err(src.error(format!(
                "unexpected text in CREATE TRIGGER near '{}'",
                s.remaining_preview()
            )));
        }
    }
    if trigger.function.is_empty() {
        return Err(src.error(format!("trigger {} has no EXECUTE FUNCTION", trigger.name)));
    }
    Ok(trigger)
}

/// `CREATE [OR REPLACE] [MATERIALIZED] VIEW [IF NOT EXISTS] name AS query`.
pub(crate) fn read_view(src: &Source<'_>) -> Result<View> {
    let mut s = Scanner::new(&src.code);
    s.keyword("CREATE");
    s.keywords(&["OR", "REPLACE"]);
    let materialized = s.keyword("MATERIALIZED");
    s.keyword("RECURSIVE");
    s.keyword("VIEW");
    s.keywords(&["IF", "NOT", "EXISTS"]);
    let (namespace, name) = qualified(&mut s, src, "view")?;
    s.parens();
    if s.keyword("WITH") {
        s.parens();
    }
    if !s.keyword("AS") {
        return Err(src.error(format!("expected AS <query> for view {name}")));
    }
    let mut query = s.rest();
    if materialized {
        for tail in ["WITH NO DATA", "WITH DATA"] {
            let upper = query.to_ascii_uppercase();
            if upper.ends_with(tail) {
                query.truncate(query.len() - tail.len());
                break;
            }
        }
    }
    Ok(View {
        name,
        schema: namespace,
        definition: canonical_query(&query),
        materialized,
        tracking_id: src.id.clone(),
    })
}

/// `CREATE FOREIGN TABLE [IF NOT EXISTS] name (...) SERVER s [OPTIONS (...)]`.
pub(crate) fn read_foreign_table(src: &Source<'_>) -> Result<ForeignTable> {
    let mut s = Scanner::new(&src.code);
    s.keywords(&["CREATE", "FOREIGN", "TABLE"]);
    s.keywords(&["IF", "NOT", "EXISTS"]);
    let (namespace, name) = qualified(&mut s, src, "foreign table")?;
    let body = s
        .parens()
        .ok_or_else(|| src.error(format!("expected a column list for foreign table {name}")))?;
    let elements = read_elements(src, &name, &split_top_level(&body, ','))?;
    if !s.keyword("SERVER") {
        return Err(src.error(format!("foreign table {name} needs SERVER <name>")));
    }
    let server = s
        .ident()
        .ok_or_else(|| src.error("expected a server name"))?;

    let mut options = BTreeMap::new();
    if s.keyword("OPTIONS") {
        let inner = s
            .parens()
            .ok_or_else(|| src.error("expected (key 'value', ...) after OPTIONS"))?;
        for option in split_top_level(&inner, ',') {
            let mut o = Scanner::new(&option);
            match (o.ident(), o.literal()) {
                (Some(key), Some(value)) => {
                    options.insert(key, value);
                }
                _ => warn!(table = %name, "unreadable foreign table option: {option}"),
            }
        }
    }
    Ok(ForeignTable {
        name,
        schema: namespace,
        columns: elements.columns,
        server,
        options,
        tracking_id: src.id.clone(),
    })
}

/// `CREATE COLLATION [IF NOT EXISTS] name (provider = p, locale = 'l', ...)`.
pub(crate) fn read_collation(src: &Source<'_>) -> Result<Collation> {
    let mut s = Scanner::new(&src.code);
    s.keywords(&["CREATE", "COLLATION"]);
    s.keywords(&["IF", "NOT", "EXISTS"]);
    let (namespace, name) = qualified(&mut s, src, "collation")?;
    let mut collation = Collation {
        name,
        schema: namespace,
        provider: None,
        locale: None,
        deterministic: true,
        tracking_id: src.id.clone(),
    };
    let inner = s.parens().ok_or_else(|| {
        src.error(format!(
            "expected (provider = ..., locale = ...) for collation {}",
            collation.name
        ))
    })?;
    let mut lc_collate = None;
    for option in split_top_level(&inner, ',') {
        let mut o = Scanner::new(&option);
        let Some(key) = o.ident() else { continue };
        o.eat('=');
        let value = o.literal().or_else(|| o.ident());
        match key.as_str() {
            "provider" => collation.provider = value,
            "locale" => collation.locale = value,
            "lc_collate" => lc_collate = value,
            "deterministic" => {
                collation.deterministic = !matches!(value.as_deref(), Some("false"));
            }
            _ => {}
        }
    }
    if collation.locale.is_none() {
        collation.locale = lc_collate;
    }
    Ok(collation)
}

/// What a COMMENT ON statement is about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum CommentTarget {
    Table(String),
    Column(String, String),
    Index(String),
}

fn name_parts(s: &mut Scanner) -> Option<Vec<String>> {
    let mut parts = vec![s.ident()?];
    while s.eat('.') {
        parts.push(s.ident()?);
    }
    Some(parts)
}

/// `COMMENT ON TABLE|COLUMN|INDEX ... IS 'text' | NULL`. Other targets are skipped.
pub(crate) fn read_comment(src: &Source<'_>, pending: &mut Pending) -> Result<bool> {
    let mut s = Scanner::new(&src.code);
    s.keywords(&["COMMENT", "ON"]);
    let kind = if s.keyword("TABLE") {
        "TABLE"
    } else if s.keyword("COLUMN") {
        "COLUMN"
    } else if s.keyword("INDEX") {
        "INDEX"
    } else {
        return Ok(false);
    };
    let mut parts =
        name_parts(&mut s).ok_or_else(|| src.error(format!("expected a name after COMMENT ON {kind}")))?;
    let target = match kind {
        "COLUMN" => {
            if parts.len() < 2 {
                return Err(src.error("COMMENT ON COLUMN needs table.column"));
            }
            let column = parts.pop().unwrap_or_default();
            let table = parts.pop().unwrap_or_default();
            CommentTarget::Column(object_key(parts.pop().as_deref(), &table), column)
        }
        "INDEX" => CommentTarget::Index(parts.pop().unwrap_or_default()),
        _ => {
            let table = parts.pop().unwrap_or_default();
            CommentTarget::Table(object_key(parts.pop().as_deref(), &table))
        }
    };
    if !s.keyword("IS") {
        return Err(src.error("expected IS after the COMMENT ON target"));
    }
    let text = if s.keyword("NULL") {
        None
    } else {
        Some(
            s.literal()
                .ok_or_else(|| src.error("expected a string literal or NULL after IS"))?,
        )
    };
    pending.comments.push((src.line, target, text));
    Ok(true)
}

/// Attach a comment to its object. The error names the missing target.
pub(crate) fn apply_comment(
    schema: &mut Schema,
    target: &CommentTarget,
    text: Option<String>,
) -> std::result::Result<(), String> {
    match target {
        CommentTarget::Table(name) => {
            let table = schema
                .find_table_mut(name)
                .ok_or_else(|| format!("COMMENT ON TABLE refers to unknown table {name}"))?;
            table.comment = text;
        }
        CommentTarget::Column(table, column) => {
            let col = schema
                .find_table_mut(table)
                .and_then(|t| t.find_column_mut(column))
                .ok_or_else(|| format!("COMMENT ON COLUMN refers to unknown column {table}.{column}"))?;
            col.comment = text;
        }
        CommentTarget::Index(name) => {
            let index = schema
                .tables
                .iter_mut()
                .flat_map(|t| t.indexes.iter_mut())
                .find(|i| &i.name == name)
                .ok_or_else(|| format!("COMMENT ON INDEX refers to unknown index {name}"))?;
            index.comment = text;
        }
    }
    Ok(())
}
