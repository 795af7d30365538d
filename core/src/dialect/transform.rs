//! Rewriting PostgreSQL DDL for the MySQL and SQLite families.
//!
//! Statements the target cannot express produce error findings and no
//! output. Rewrites that lose information (time zones, uuid checks, array
//! semantics) produce warnings next to the rewritten SQL.

use std::sync::LazyLock;

use regex::Regex;

use super::{Category, Dialect, Family, Finding, Severity};
use crate::emit::split_top_level;
use crate::types::normalize_type;

macro_rules! re {
    ($pattern:expr) => {{
        static RE: LazyLock<Regex> =
            LazyLock::new(|| Regex::new($pattern).expect("transform pattern"));
        &*RE
    }};
}

const IDENT: &str = r#"(?:"(?:[^"]|"")+"|[A-Za-z_][A-Za-z0-9_$]*)"#;
const QNAME: &str = r#"(?:(?:"(?:[^"]|"")+"|[A-Za-z_][A-Za-z0-9_$]*)\.)?(?:"(?:[^"]|"")+"|[A-Za-z_][A-Za-z0-9_$]*)"#;

/// Result of rewriting one statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transformed {
    /// Statements replacing the input; empty when it was skipped or failed.
    pub sql: Vec<String>,
    pub findings: Vec<Finding>,
}

impl Transformed {
    pub fn failed(&self) -> bool {
        self.findings.iter().any(|f| f.severity == Severity::Error)
    }
}

/// Target type of a column type mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeMapping {
    pub target: String,
    pub warning: Option<String>,
}

impl TypeMapping {
    fn lossless(target: impl Into<String>) -> Self {
        TypeMapping {
            target: target.into(),
            warning: None,
        }
    }

    fn lossy(target: impl Into<String>, warning: impl Into<String>) -> Self {
        TypeMapping {
            target: target.into(),
            warning: Some(warning.into()),
        }
    }
}

/// Map a canonical PostgreSQL type to `family`. `None` when there is no equivalent.
pub fn map_type(
    family: Family,
    name: &str,
    p1: Option<u32>,
    p2: Option<u32>,
    array: bool,
) -> Option<TypeMapping> {
    match family {
        Family::MySql => mysql_type(name, p1, p2, array),
        Family::Sqlite => sqlite_type(name, p1, array),
        Family::Postgres | Family::Xata => None,
    }
}

fn mysql_type(name: &str, p1: Option<u32>, p2: Option<u32>, array: bool) -> Option<TypeMapping> {
    if array {
        return Some(TypeMapping::lossy(
            "JSON",
            format!("{name}[] stored as JSON; array operators are unavailable"),
        ));
    }
    let mapping = match name {
        "boolean" => TypeMapping::lossless("TINYINT(1)"),
        "smallint" => TypeMapping::lossless("SMALLINT"),
        "integer" => TypeMapping::lossless("INT"),
        "bigint" => TypeMapping::lossless("BIGINT"),
        "smallserial" => TypeMapping::lossless("SMALLINT AUTO_INCREMENT"),
        "serial" => TypeMapping::lossless("INT AUTO_INCREMENT"),
        "bigserial" => TypeMapping::lossless("BIGINT AUTO_INCREMENT"),
        "numeric" => match p1 {
            Some(p) if p <= 65 => TypeMapping::lossless(format!("DECIMAL({p},{})", p2.unwrap_or(0))),
            Some(p) => TypeMapping::lossy(
                format!("DECIMAL(65,{})", p2.unwrap_or(0).min(30)),
                format!("precision {p} exceeds the MySQL maximum of 65"),
            ),
            None => TypeMapping::lossy(
                "DECIMAL(65,30)",
                "unconstrained numeric limited to DECIMAL(65,30)",
            ),
        },
        "money" => TypeMapping::lossless("DECIMAL(19,4)"),
        "real" => TypeMapping::lossless("FLOAT"),
        "double precision" => TypeMapping::lossless("DOUBLE"),
        "character" => match p1 {
            Some(n) if n <= 255 => TypeMapping::lossless(format!("CHAR({n})")),
            Some(_) => TypeMapping::lossless("TEXT"),
            None => TypeMapping::lossless("CHAR(1)"),
        },
        "character varying" => match p1 {
            Some(n) if n <= 65535 => TypeMapping::lossless(format!("VARCHAR({n})")),
            _ => TypeMapping::lossless("LONGTEXT"),
        },
        "text" | "citext" => TypeMapping::lossless("LONGTEXT"),
        "name" => TypeMapping::lossless("VARCHAR(63)"),
        "bytea" => TypeMapping::lossless("LONGBLOB"),
        "date" => TypeMapping::lossless("DATE"),
        "time" | "time without time zone" => TypeMapping::lossless("TIME"),
        "time with time zone" => {
            TypeMapping::lossy("TIME", "time with time zone loses its offset")
        }
        "timestamp" | "timestamp without time zone" => TypeMapping::lossless("DATETIME"),
        "timestamp with time zone" => TypeMapping::lossy(
            "DATETIME",
            "timestamp with time zone loses its offset; store UTC",
        ),
        "interval" => TypeMapping::lossy("VARCHAR(255)", "interval stored as text"),
        "uuid" => TypeMapping::lossy("CHAR(36)", "uuid stored as CHAR(36) without validation"),
        "json" | "jsonb" => TypeMapping::lossless("JSON"),
        "inet" | "cidr" => TypeMapping::lossless("VARCHAR(50)"),
        "macaddr" => TypeMapping::lossless("VARCHAR(17)"),
        "xml" => TypeMapping::lossy("LONGTEXT", "xml stored as text"),
        _ => return None,
    };
    Some(mapping)
}

fn sqlite_type(name: &str, p1: Option<u32>, array: bool) -> Option<TypeMapping> {
    if array {
        return Some(TypeMapping::lossy(
            "TEXT",
            format!("{name}[] stored as JSON text"),
        ));
    }
    let mapping = match name {
        "boolean" | "smallint" | "integer" | "bigint" | "smallserial" | "serial"
        | "bigserial" => TypeMapping::lossless("INTEGER"),
        "numeric" | "money" => TypeMapping::lossless("NUMERIC"),
        "real" | "double precision" => TypeMapping::lossless("REAL"),
        "character" | "character varying" if p1.is_some() => {
            TypeMapping::lossy("TEXT", "SQLite does not enforce the length limit")
        }
        "character" | "character varying" | "text" | "citext" | "name" | "date" | "time"
        | "time without time zone" | "time with time zone" | "timestamp"
        | "timestamp without time zone" | "timestamp with time zone" | "interval" | "inet"
        | "cidr" | "macaddr" | "json" | "jsonb" | "xml" | "uuid" => {
            TypeMapping::lossless("TEXT")
        }
        "bytea" => TypeMapping::lossless("BLOB"),
        _ => return None,
    };
    Some(mapping)
}

/// Rewrite one statement for `dialect`. PostgreSQL-family dialects get it back unchanged.
pub fn transform_statement(dialect: Dialect, statement: &str) -> Transformed {
    let body = statement.trim().trim_end_matches(';').trim_end();
    let family = dialect.family();
    if family.speaks_postgres() {
        return Transformed {
            sql: vec![format!("{body};")],
            findings: Vec::new(),
        };
    }

    let mut rewriter = Rewriter {
        dialect,
        family,
        findings: Vec::new(),
    };
    let body = strip_casts(body);
    let statements = rewriter.statement(&body);
    let failed = rewriter.findings.iter().any(|f| f.severity == Severity::Error);
    let sql = if failed {
        Vec::new()
    } else {
        statements.iter().map(|s| rewriter.finish(s)).collect()
    };
    Transformed {
        sql,
        findings: rewriter.findings,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    PartitionChild,
    CreateTable,
    MaterializedView,
    ForeignTable,
    AlterTable,
    CreateIndex,
    DropIndex,
    AlterIndex,
    CreateView,
    DropRelation,
    Type,
    Domain,
    Sequence,
    Extension,
    Routine,
    Collation,
    Comment,
    Other,
}

static KINDS: LazyLock<Vec<(Regex, Kind)>> = LazyLock::new(|| {
    [
        (r"(?is)^CREATE\s+TABLE\s+\S+\s+PARTITION\s+OF\b", Kind::PartitionChild),
        (r"(?is)^(CREATE|DROP|ALTER|REFRESH)\s+MATERIALIZED\s+VIEW\b", Kind::MaterializedView),
        (r"(?is)^(CREATE|DROP|ALTER)\s+FOREIGN\s+TABLE\b", Kind::ForeignTable),
        (r"(?is)^CREATE\s+(UNLOGGED\s+)?TABLE\b", Kind::CreateTable),
        (r"(?is)^ALTER\s+TABLE\b", Kind::AlterTable),
        (r"(?is)^CREATE\s+(UNIQUE\s+)?INDEX\b", Kind::CreateIndex),
        (r"(?is)^DROP\s+INDEX\b", Kind::DropIndex),
        (r"(?is)^ALTER\s+INDEX\b", Kind::AlterIndex),
        (r"(?is)^CREATE\s+(OR\s+REPLACE\s+)?VIEW\b", Kind::CreateView),
        (r"(?is)^DROP\s+(TABLE|VIEW)\b", Kind::DropRelation),
        (r"(?is)^(CREATE|ALTER|DROP)\s+TYPE\b", Kind::Type),
        (r"(?is)^(CREATE|ALTER|DROP)\s+DOMAIN\b", Kind::Domain),
        (r"(?is)^(CREATE|ALTER|DROP)\s+SEQUENCE\b", Kind::Sequence),
        (r"(?is)^(CREATE|ALTER|DROP)\s+EXTENSION\b", Kind::Extension),
        (
            r"(?is)^(CREATE(\s+OR\s+REPLACE)?|DROP|ALTER)\s+(FUNCTION|PROCEDURE|(CONSTRAINT\s+)?TRIGGER)\b",
            Kind::Routine,
        ),
        (r"(?is)^(CREATE|ALTER|DROP)\s+COLLATION\b", Kind::Collation),
        (r"(?is)^COMMENT\s+ON\b", Kind::Comment),
    ]
    .into_iter()
    .map(|(p, k)| (Regex::new(p).expect("statement kind pattern"), k))
    .collect()
});

fn classify(sql: &str) -> Kind {
    KINDS
        .iter()
        .find(|(re, _)| re.is_match(sql))
        .map_or(Kind::Other, |(_, k)| *k)
}

fn first_line(sql: &str) -> String {
    let line = sql.lines().next().unwrap_or_default().trim();
    if line.chars().count() > 80 {
        format!("{}...", line.chars().take(80).collect::<String>())
    } else {
        line.to_string()
    }
}

struct Rewriter {
    dialect: Dialect,
    family: Family,
    findings: Vec<Finding>,
}

impl Rewriter {
    fn mysql(&self) -> bool {
        self.family == Family::MySql
    }

    fn unsupported(&mut self, category: Category, feature: &str, detected: &str, alternative: &str) {
        let message = format!("{} has no equivalent for {feature}", self.dialect);
        self.findings.push(
            Finding::new(category, feature, detected, Severity::Error, message)
                .alternative(alternative),
        );
    }

    fn lossy(&mut self, category: Category, feature: &str, detected: &str, message: impl Into<String>) {
        self.findings
            .push(Finding::new(category, feature, detected, Severity::Warning, message));
    }

    fn passthrough(&mut self, sql: &str) -> Vec<String> {
        let message = format!("not recognized; passed to {} unchanged", self.dialect);
        self.lossy(Category::Ddl, "statement", &first_line(sql), message);
        vec![sql.to_string()]
    }

    fn statement(&mut self, sql: &str) -> Vec<String> {
        let detected = first_line(sql);
        let mysql = self.mysql();
        match classify(sql) {
            Kind::CreateTable => self.create_table(sql).into_iter().collect(),
            Kind::AlterTable => self.alter_table(sql).into_iter().collect(),
            Kind::CreateIndex => self.create_index(sql).into_iter().collect(),
            Kind::CreateView => self.create_view(sql),
            Kind::DropRelation => vec![strip_cascade(sql)],
            Kind::DropIndex if !mysql => {
                vec![strip_cascade(&re!(r"(?i)\bCONCURRENTLY\s+").replace(sql, ""))]
            }
            Kind::DropIndex => {
                self.unsupported(Category::Index, "DROP INDEX without a table", &detected, "ALTER TABLE <table> DROP INDEX <name>");
                Vec::new()
            }
            Kind::AlterIndex => {
                let alternative = if mysql {
                    "ALTER TABLE <table> RENAME INDEX <old> TO <new>"
                } else {
                    "drop and recreate the index"
                };
                self.unsupported(Category::Index, "ALTER INDEX", &detected, alternative);
                Vec::new()
            }
            Kind::Sequence if self.dialect == Dialect::MariaDb => vec![self.mariadb_sequence(sql)],
            Kind::Extension | Kind::Comment => {
                let message = format!("{} has no equivalent; statement skipped", detected);
                self.lossy(Category::Ddl, "skipped statement", &detected, message);
                Vec::new()
            }
            Kind::Type => {
                let alternative = if mysql {
                    "declare an inline ENUM(...) column type"
                } else {
                    "use a text column with a CHECK constraint"
                };
                self.unsupported(Category::DataType, "enum and composite types", &detected, alternative);
                Vec::new()
            }
            Kind::Domain => {
                self.unsupported(Category::DataType, "domains", &detected, "use the base type with a CHECK constraint");
                Vec::new()
            }
            Kind::Sequence => {
                let alternative = if mysql { "use AUTO_INCREMENT" } else { "use INTEGER PRIMARY KEY" };
                self.unsupported(Category::DataType, "sequences", &detected, alternative);
                Vec::new()
            }
            Kind::Routine => {
                self.unsupported(Category::Routine, "PL/pgSQL routines", &detected, "rewrite the routine for the target database");
                Vec::new()
            }
            Kind::MaterializedView => {
                self.unsupported(Category::Ddl, "materialized views", &detected, "use a summary table");
                Vec::new()
            }
            Kind::ForeignTable => {
                self.unsupported(Category::Ddl, "foreign tables", &detected, "query the remote source from the application");
                Vec::new()
            }
            Kind::PartitionChild => {
                self.unsupported(Category::Partitioning, "declarative partitions", &detected, "use a single table");
                Vec::new()
            }
            Kind::Collation => {
                self.unsupported(Category::Ddl, "collations", &detected, "use a built-in collation");
                Vec::new()
            }
            Kind::Other => self.passthrough(sql),
        }
    }

    fn create_table(&mut self, sql: &str) -> Option<String> {
        let Some(open) = sql.find('(') else {
            return self.passthrough(sql).pop();
        };
        let close = closing_paren(sql, open)?;
        let head = re!(r"(?i)^CREATE\s+UNLOGGED\s+TABLE").replace(sql[..open].trim_end(), "CREATE TABLE");
        let body = &sql[open + 1..close];
        let tail = sql[close + 1..].trim();

        if re!(r"(?i)^PARTITION\s+BY\b").is_match(tail) {
            self.unsupported(Category::Partitioning, "declarative partitioning", tail, "use a single table");
            return None;
        }
        if !tail.is_empty() {
            self.lossy(Category::Ddl, "storage options", tail, "table options dropped");
        }

        let mut elements = Vec::new();
        for element in split_top_level(body, ',') {
            if let Some(rewritten) = self.table_element(&element) {
                elements.push(rewritten);
            }
        }
        if body.contains('\n') {
            Some(format!("{head} (\n    {}\n)", elements.join(",\n    ")))
        } else {
            Some(format!("{head} ({})", elements.join(", ")))
        }
    }

    fn table_element(&mut self, element: &str) -> Option<String> {
        let constraint = re!(r"(?i)^(CONSTRAINT\s|PRIMARY\s+KEY\b|UNIQUE\b|CHECK\b|FOREIGN\s+KEY\b|EXCLUDE\b)");
        if constraint.is_match(element) {
            self.table_constraint(element)
        } else {
            self.column_definition(element)
        }
    }

    fn table_constraint(&mut self, constraint: &str) -> Option<String> {
        if re!(r"(?i)\bEXCLUDE\b").is_match(constraint) {
            self.unsupported(Category::Constraint, "exclusion constraints", constraint, "check overlaps in the application");
            return None;
        }
        Some(if self.mysql() {
            self.fk_clauses(constraint)
        } else {
            constraint.to_string()
        })
    }

    fn column_definition(&mut self, definition: &str) -> Option<String> {
        let name_re = re!(&format!(r"(?s)^(?P<name>{IDENT})\s+(?P<rest>.*)$"));
        let Some(caps) = name_re.captures(definition.trim()) else {
            self.unsupported(Category::Ddl, "column definition", definition, "write the column by hand");
            return None;
        };
        let name = caps["name"].to_string();
        let rest = &caps["rest"];

        let type_re = re!(r#"(?i)^(?P<name>double\s+precision|character\s+varying|bit\s+varying|timestamp\b|time\b|"(?:[^"]|"")+"|[A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*)?)(?:\s*\(\s*(?P<p1>\d+)\s*(?:,\s*(?P<p2>\d+)\s*)?\))?(?P<zone>\s+with(?:out)?\s+time\s+zone)?(?P<array>(?:\[\d*\])*)"#);
        let Some(ty) = type_re.captures(rest) else {
            self.unsupported(Category::DataType, "column type", definition, "use a text column");
            return None;
        };
        let type_end = ty.get(0).map_or(0, |m| m.end());
        let mut raw = ty["name"].to_string();
        if let Some(zone) = ty.name("zone") {
            raw.push_str(zone.as_str());
        }
        let key = normalize_type(&raw);
        let p1 = ty.name("p1").and_then(|m| m.as_str().parse().ok());
        let p2 = ty.name("p2").and_then(|m| m.as_str().parse().ok());
        let array = ty.name("array").is_some_and(|m| !m.as_str().is_empty());

        let Some(mapping) = map_type(self.family, &key, p1, p2, array) else {
            let alternative = if self.mysql() { "use VARCHAR or an inline ENUM" } else { "use a TEXT column" };
            self.unsupported(Category::DataType, &format!("type {key}"), definition, alternative);
            return None;
        };
        if let Some(warning) = &mapping.warning {
            self.lossy(Category::DataType, &key, definition, warning.clone());
        }

        let constraints = self.column_constraints(&rest[type_end..], &mapping.target, definition)?;
        Some(format!("{name} {}{constraints}", mapping.target))
    }

    fn column_constraints(&mut self, rest: &str, target: &str, definition: &str) -> Option<String> {
        let mut rest = rest.to_string();

        let identity = re!(r"(?i)\s*\bGENERATED\s+(ALWAYS|BY\s+DEFAULT)\s+AS\s+IDENTITY(\s*\([^)]*\))?");
        if let Some(m) = identity.find(&rest) {
            let range = m.range();
            if self.mysql() {
                rest.replace_range(range, " AUTO_INCREMENT");
            } else {
                rest.replace_range(range, "");
                let pk = re!(r"(?i)\bPRIMARY\s+KEY\b");
                if target == "INTEGER" && pk.is_match(&rest) {
                    rest = pk.replace(&rest, "PRIMARY KEY AUTOINCREMENT").into_owned();
                } else {
                    self.lossy(
                        Category::DataType,
                        "identity",
                        definition,
                        "identity dropped; SQLite only numbers INTEGER PRIMARY KEY columns",
                    );
                }
            }
        }

        if re!(r"(?i)\bnextval\s*\(").is_match(&rest) && self.dialect != Dialect::MariaDb {
            let alternative = if self.mysql() { "use AUTO_INCREMENT" } else { "use INTEGER PRIMARY KEY" };
            self.unsupported(Category::DataType, "sequence defaults", definition, alternative);
            return None;
        }

        let mut rest = self.rewrite_defaults(&rest, definition);
        if self.mysql() {
            if matches!(target, "TEXT" | "LONGTEXT" | "JSON" | "LONGBLOB") {
                rest = re!(r"(?i)\bDEFAULT\s+('(?:[^']|'')*')")
                    .replace(&rest, "DEFAULT ($1)")
                    .into_owned();
            }
            rest = self.fk_clauses(&rest);
        }
        Some(rest)
    }

    /// Default expressions: timestamps, uuid generators and empty arrays.
    fn rewrite_defaults(&mut self, text: &str, definition: &str) -> String {
        let mut out = text.to_string();
        if let Some(m) = re!(r"(?i)\bDEFAULT\s+'(\{\}|\[\])'").find(&out) {
            let replacement = if self.mysql() {
                "DEFAULT (JSON_ARRAY())"
            } else {
                "DEFAULT '[]'"
            };
            out.replace_range(m.range(), replacement);
        }

        out = outside_literals(&out, |segment| {
            re!(r"(?i)\b(now\(\)|current_timestamp(\(\))?|transaction_timestamp\(\)|localtimestamp)")
                .replace_all(segment, "CURRENT_TIMESTAMP")
                .into_owned()
        });

        let uuid = re!(r"(?i)\b(gen_random_uuid|uuid_generate_v4)\(\)");
        if uuid.is_match(&out) {
            let replacement = if self.mysql() {
                "(UUID())"
            } else {
                self.lossy(
                    Category::DataType,
                    "uuid default",
                    definition,
                    "random hex string instead of an RFC 4122 uuid",
                );
                "(lower(hex(randomblob(16))))"
            };
            out = uuid.replace_all(&out, replacement).into_owned();
        }
        out
    }

    /// MySQL ignores MATCH and cannot defer constraint checks.
    fn fk_clauses(&mut self, text: &str) -> String {
        let deferrable = re!(r"(?i)\s+(NOT\s+)?DEFERRABLE(\s+INITIALLY\s+(DEFERRED|IMMEDIATE))?");
        if let Some(caps) = deferrable.captures(text) {
            if caps.get(1).is_none() {
                self.lossy(Category::Constraint, "deferrable constraints", text, "checked immediately in MySQL");
            }
        }
        let text = deferrable.replace_all(text, "");

        let match_type = re!(r"(?i)\s+MATCH\s+(FULL|PARTIAL|SIMPLE)\b");
        if let Some(caps) = match_type.captures(&text) {
            if !caps[1].eq_ignore_ascii_case("SIMPLE") {
                self.lossy(Category::Constraint, "MATCH FULL", &text, "MySQL parses MATCH but does not enforce it");
            }
        }
        match_type.replace_all(&text, "").into_owned()
    }

    fn alter_table(&mut self, sql: &str) -> Option<String> {
        let re = re!(&format!(
            r"(?is)^ALTER\s+TABLE\s+(?:ONLY\s+)?(?:IF\s+EXISTS\s+)?(?P<table>{QNAME})\s+(?P<action>.+)$"
        ));
        let Some(caps) = re.captures(sql) else {
            return self.passthrough(sql).pop();
        };
        let prefix = format!("ALTER TABLE {}", &caps["table"]);
        let action = caps["action"].trim();
        let detected = first_line(sql);

        if let Some(c) = re!(r"(?is)^ADD\s+COLUMN\s+(?:IF\s+NOT\s+EXISTS\s+)?(?P<def>.+)$").captures(action) {
            let definition = self.column_definition(&c["def"])?;
            return Some(format!("{prefix} ADD COLUMN {definition}"));
        }
        if let Some(c) = re!(r"(?is)^DROP\s+COLUMN\s+(?:IF\s+EXISTS\s+)?(?P<col>.+?)(?:\s+(?:CASCADE|RESTRICT))?$").captures(action) {
            return Some(format!("{prefix} DROP COLUMN {}", &c["col"]));
        }
        if re!(r"(?i)^RENAME\s").is_match(action) {
            return Some(sql.to_string());
        }
        let alter_column = re!(&format!(r"(?is)^ALTER\s+COLUMN\s+(?P<col>{IDENT})\s+(?P<change>.+)$"));
        if let Some(c) = alter_column.captures(action) {
            return self.alter_column(&prefix, &c["col"], &c["change"], &detected);
        }
        if re!(r"(?i)^ADD\s+(CONSTRAINT\s+\S+\s+)?EXCLUDE\b").is_match(action) {
            self.unsupported(Category::Constraint, "exclusion constraints", &detected, "check overlaps in the application");
            return None;
        }
        if re!(r"(?i)^(ATTACH|DETACH)\s+PARTITION\b").is_match(action) {
            self.unsupported(Category::Partitioning, "declarative partitions", &detected, "use a single table");
            return None;
        }
        if re!(r"(?i)^ADD\s").is_match(action) {
            if !self.mysql() {
                self.unsupported(Category::Constraint, "ALTER TABLE ADD CONSTRAINT", &detected, "recreate the table with the constraint");
                return None;
            }
            let action = self.fk_clauses(action);
            return Some(format!("{prefix} {action}"));
        }
        if let Some(c) = re!(r"(?is)^DROP\s+CONSTRAINT\s+(?:IF\s+EXISTS\s+)?(?P<name>\S+)").captures(action) {
            if !self.mysql() {
                self.unsupported(Category::Constraint, "ALTER TABLE DROP CONSTRAINT", &detected, "recreate the table without the constraint");
                return None;
            }
            return Some(format!("{prefix} DROP CONSTRAINT {}", &c["name"]));
        }
        self.passthrough(sql).pop()
    }

    fn alter_column(&mut self, prefix: &str, column: &str, change: &str, detected: &str) -> Option<String> {
        let mysql = self.mysql();
        if let Some(c) = re!(r"(?is)^(?:SET\s+DATA\s+)?TYPE\s+(?P<ty>.+?)(?P<using>\s+USING\s+.+)?$").captures(change) {
            if !mysql {
                self.unsupported(Category::Ddl, "ALTER COLUMN TYPE", detected, "recreate the table");
                return None;
            }
            if c.name("using").is_some() {
                self.lossy(Category::Ddl, "USING", detected, "conversion expression dropped; MySQL converts implicitly");
            }
            let definition = self.column_definition(&format!("{column} {}", &c["ty"]))?;
            self.lossy(
                Category::Ddl,
                "MODIFY COLUMN",
                detected,
                "MODIFY COLUMN redefines the whole column; NOT NULL and DEFAULT must be restated",
            );
            return Some(format!("{prefix} MODIFY COLUMN {definition}"));
        }
        if re!(r"(?i)^(SET|DROP)\s+DEFAULT\b").is_match(change) {
            if !mysql {
                self.unsupported(Category::Ddl, "ALTER COLUMN DEFAULT", detected, "recreate the table");
                return None;
            }
            let change = self.rewrite_defaults(change, detected);
            return Some(format!("{prefix} ALTER COLUMN {column} {change}"));
        }
        let alternative = if mysql {
            "MODIFY COLUMN with the full column definition"
        } else {
            "recreate the table"
        };
        self.unsupported(Category::Ddl, "ALTER COLUMN", detected, alternative);
        None
    }

    fn create_index(&mut self, sql: &str) -> Option<String> {
        let re = re!(&format!(
            r"(?is)^CREATE\s+(?P<unique>UNIQUE\s+)?INDEX\s+(?:CONCURRENTLY\s+)?(?P<ine>IF\s+NOT\s+EXISTS\s+)?(?P<name>{QNAME})\s+ON\s+(?:ONLY\s+)?(?P<table>{QNAME})\s*(?:USING\s+(?P<method>\w+)\s*)?\("
        ));
        let Some(caps) = re.captures(sql) else {
            return self.passthrough(sql).pop();
        };
        let detected = first_line(sql);
        let open = caps.get(0).map_or(0, |m| m.end() - 1);
        let close = closing_paren(sql, open)?;
        let keys = &sql[open + 1..close];
        let tail = sql[close + 1..].trim();

        if let Some(method) = caps.name("method") {
            if !method.as_str().eq_ignore_ascii_case("btree") {
                let feature = format!("{} indexes", method.as_str().to_lowercase());
                self.unsupported(Category::Index, &feature, &detected, "use a btree index");
                return None;
            }
        }
        if re!(r"(?i)^INCLUDE\b").is_match(tail) {
            self.unsupported(Category::Index, "INCLUDE columns", &detected, "add the columns to the index key");
            return None;
        }
        if self.mysql() && !tail.is_empty() {
            self.unsupported(Category::Index, "partial indexes", &detected, "index every row");
            return None;
        }

        let keys = if self.mysql() {
            let plain = re!(&format!(r"(?i)^{IDENT}(\s+(ASC|DESC))?$"));
            split_top_level(keys, ',')
                .into_iter()
                .map(|k| if plain.is_match(&k) { k } else { format!("({k})") })
                .collect::<Vec<_>>()
                .join(", ")
        } else {
            keys.to_string()
        };
        let if_not_exists = if caps.name("ine").is_some() && !self.mysql() {
            "IF NOT EXISTS "
        } else {
            ""
        };
        let unique = if caps.name("unique").is_some() { "UNIQUE " } else { "" };
        let mut out = format!(
            "CREATE {unique}INDEX {if_not_exists}{} ON {} ({keys})",
            &caps["name"], &caps["table"]
        );
        if !tail.is_empty() {
            out.push(' ');
            out.push_str(tail);
        }
        Some(out)
    }

    fn create_view(&mut self, sql: &str) -> Vec<String> {
        if self.mysql() {
            return vec![sql.to_string()];
        }
        let re = re!(&format!(r"(?is)^CREATE\s+OR\s+REPLACE\s+VIEW\s+(?P<name>{QNAME})"));
        match re.captures(sql) {
            Some(caps) => {
                let name = &caps["name"];
                let rest = &sql[caps.get(0).map_or(0, |m| m.end())..];
                vec![
                    format!("DROP VIEW IF EXISTS {name}"),
                    format!("CREATE VIEW {name}{rest}"),
                ]
            }
            None => vec![sql.to_string()],
        }
    }

    fn mariadb_sequence(&mut self, sql: &str) -> String {
        let owned = re!(r"(?i)\s+OWNED\s+BY\s+\S+");
        if owned.is_match(sql) {
            self.lossy(Category::DataType, "OWNED BY", &first_line(sql), "sequence ownership is not tracked");
        }
        owned.replace_all(sql, "").into_owned()
    }

    fn finish(&self, sql: &str) -> String {
        if self.mysql() {
            format!("{};", requote_mysql(sql))
        } else {
            format!("{sql};")
        }
    }
}

fn strip_cascade(sql: &str) -> String {
    re!(r"(?i)\s+(CASCADE|RESTRICT)$").replace(sql, "").into_owned()
}

/// Remove `::type` casts outside string literals.
fn strip_casts(sql: &str) -> String {
    outside_literals(sql, |segment| {
        re!(r#"::\s*(?:"(?:[^"]|"")+"|[A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*)?)(?:\s+(?:varying|precision))?(?:\s*\(\s*\d+(?:\s*,\s*\d+)?\s*\))?(?:\s+with(?:out)?\s+time\s+zone)?(?:\[\d*\])*"#)
            .replace_all(segment, "")
            .into_owned()
    })
}

/// Apply `f` to the text between single-quoted literals; literals are copied as is.
fn outside_literals(sql: &str, f: impl Fn(&str) -> String) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut segment = String::new();
    let mut chars = sql.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\'' {
            segment.push(c);
            continue;
        }
        out.push_str(&f(&segment));
        segment.clear();
        out.push('\'');
        while let Some(l) = chars.next() {
            out.push(l);
            if l == '\'' {
                if chars.peek() == Some(&'\'') {
                    chars.next();
                    out.push('\'');
                } else {
                    break;
                }
            }
        }
    }
    out.push_str(&f(&segment));
    out
}

/// Double-quoted identifiers become backtick-quoted; backslashes in literals are escaped.
fn requote_mysql(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut chars = sql.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\'' => {
                out.push('\'');
                while let Some(l) = chars.next() {
                    match l {
                        '\\' => out.push_str("\\\\"),
                        '\'' if chars.peek() == Some(&'\'') => {
                            chars.next();
                            out.push_str("''");
                        }
                        '\'' => {
                            out.push('\'');
                            break;
                        }
                        other => out.push(other),
                    }
                }
            }
            '"' => {
                out.push('`');
                while let Some(l) = chars.next() {
                    match l {
                        '"' if chars.peek() == Some(&'"') => {
                            chars.next();
                            out.push('"');
                        }
                        '"' => break,
                        '`' => out.push_str("``"),
                        other => out.push(other),
                    }
                }
                out.push('`');
            }
            other => out.push(other),
        }
    }
    out
}

/// Byte index of the parenthesis closing the one at `open`.
fn closing_paren(sql: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    for (i, c) in sql[open..].char_indices() {
        if let Some(q) = quote {
            if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '(' => depth += 1,
            ')' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(open + i);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ok(dialect: Dialect, sql: &str) -> Vec<String> {
        let out = transform_statement(dialect, sql);
        assert!(!out.failed(), "unexpected failure: {:?}", out.findings);
        out.sql
    }

    #[test]
    fn test_mysql_create_table() {
        let sql = "CREATE TABLE \"users\" (
    \"id\" uuid DEFAULT gen_random_uuid() PRIMARY KEY,
    \"email\" character varying(255) NOT NULL UNIQUE,
    \"tags\" text[] NOT NULL DEFAULT '{}'::text[],
    \"active\" boolean NOT NULL DEFAULT true,
    \"created_at\" timestamp with time zone NOT NULL DEFAULT now()
);";
        let out = transform_statement(Dialect::MySql, sql);
        assert_eq!(
            out.sql,
            vec![
                "CREATE TABLE `users` (
    `id` CHAR(36) DEFAULT (UUID()) PRIMARY KEY,
    `email` VARCHAR(255) NOT NULL UNIQUE,
    `tags` JSON NOT NULL DEFAULT (JSON_ARRAY()),
    `active` TINYINT(1) NOT NULL DEFAULT true,
    `created_at` DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
);"
                .to_string()
            ]
        );
        assert!(!out.failed());
        let lossy: Vec<&str> = out.findings.iter().map(|f| f.feature.as_str()).collect();
        assert_eq!(lossy, vec!["uuid", "text", "timestamp with time zone"]);
    }

    #[test]
    fn test_mysql_text_literal_default_is_parenthesized() {
        assert_eq!(
            ok(Dialect::MySql, "ALTER TABLE \"notes\" ADD COLUMN \"body\" text NOT NULL DEFAULT '';"),
            vec!["ALTER TABLE `notes` ADD COLUMN `body` LONGTEXT NOT NULL DEFAULT ('');"]
        );
    }

    #[test]
    fn test_sqlite_identity_becomes_autoincrement() {
        let out = transform_statement(
            Dialect::Sqlite,
            "CREATE TABLE \"t\" (\"id\" bigint GENERATED ALWAYS AS IDENTITY PRIMARY KEY, \"n\" integer GENERATED BY DEFAULT AS IDENTITY);",
        );
        assert_eq!(
            out.sql,
            vec!["CREATE TABLE \"t\" (\"id\" INTEGER PRIMARY KEY AUTOINCREMENT, \"n\" INTEGER);"]
        );
        assert_eq!(out.findings.len(), 1);
        assert_eq!(out.findings[0].feature, "identity");
    }

    #[test]
    fn test_mysql_identity_becomes_auto_increment() {
        assert_eq!(
            ok(Dialect::MySql, "CREATE TABLE \"t\" (\"id\" bigint GENERATED BY DEFAULT AS IDENTITY PRIMARY KEY);"),
            vec!["CREATE TABLE `t` (`id` BIGINT AUTO_INCREMENT PRIMARY KEY);"]
        );
    }

    #[test]
    fn test_unsupported_statements_fail() {
        for sql in [
            "CREATE TYPE \"mood\" AS ENUM ('a', 'b');",
            "CREATE DOMAIN \"pos\" AS integer CHECK (VALUE > 0);",
            "CREATE FUNCTION f() RETURNS trigger LANGUAGE plpgsql AS $$ BEGIN RETURN NEW; END $$;",
            "CREATE MATERIALIZED VIEW \"m\" AS SELECT 1;",
            "CREATE TABLE \"e_2024\" PARTITION OF \"e\" FOR VALUES FROM (1) TO (2);",
        ] {
            for dialect in [Dialect::MySql, Dialect::Sqlite] {
                let out = transform_statement(dialect, sql);
                assert!(out.failed(), "{dialect}: {sql}");
                assert!(out.sql.is_empty());
            }
        }
    }

    #[test]
    fn test_enum_typed_column_fails() {
        let out = transform_statement(Dialect::MySql, "ALTER TABLE \"u\" ADD COLUMN \"m\" mood;");
        assert!(out.failed());
        assert_eq!(out.findings[0].feature, "type mood");
    }

    #[test]
    fn test_extensions_and_comments_are_skipped() {
        for sql in [
            "CREATE EXTENSION IF NOT EXISTS \"pgcrypto\";",
            "COMMENT ON TABLE \"users\" IS 'people';",
        ] {
            let out = transform_statement(Dialect::Sqlite, sql);
            assert!(!out.failed());
            assert!(out.sql.is_empty());
            assert_eq!(out.findings[0].severity, Severity::Warning);
        }
    }

    #[test]
    fn test_mariadb_keeps_sequences() {
        let out = transform_statement(
            Dialect::MariaDb,
            "CREATE SEQUENCE \"order_seq\" START WITH 100 OWNED BY \"orders\".\"id\";",
        );
        assert_eq!(out.sql, vec!["CREATE SEQUENCE `order_seq` START WITH 100;"]);
        assert!(transform_statement(Dialect::MySql, "CREATE SEQUENCE \"s\";").failed());
    }

    #[test]
    fn test_alter_column_type() {
        let out = transform_statement(
            Dialect::MySql,
            "ALTER TABLE \"users\" ALTER COLUMN \"age\" TYPE bigint USING \"age\"::bigint;",
        );
        assert_eq!(out.sql, vec!["ALTER TABLE `users` MODIFY COLUMN `age` BIGINT;"]);
        assert_eq!(out.findings.len(), 2);

        let sqlite = transform_statement(
            Dialect::Sqlite,
            "ALTER TABLE \"users\" ALTER COLUMN \"age\" TYPE bigint USING \"age\"::bigint;",
        );
        assert!(sqlite.failed());
    }

    #[test]
    fn test_alter_column_default_and_nullability() {
        assert_eq!(
            ok(Dialect::MySql, "ALTER TABLE \"t\" ALTER COLUMN \"at\" SET DEFAULT now();"),
            vec!["ALTER TABLE `t` ALTER COLUMN `at` SET DEFAULT CURRENT_TIMESTAMP;"]
        );
        assert!(transform_statement(Dialect::MySql, "ALTER TABLE \"t\" ALTER COLUMN \"at\" SET NOT NULL;").failed());
        assert!(transform_statement(Dialect::Sqlite, "ALTER TABLE \"t\" ALTER COLUMN \"at\" DROP DEFAULT;").failed());
    }

    #[test]
    fn test_drop_and_rename_forms() {
        assert_eq!(
            ok(Dialect::Sqlite, "DROP TABLE IF EXISTS \"t\" CASCADE;"),
            vec!["DROP TABLE IF EXISTS \"t\";"]
        );
        assert_eq!(
            ok(Dialect::MySql, "ALTER TABLE \"t\" DROP COLUMN IF EXISTS \"c\";"),
            vec!["ALTER TABLE `t` DROP COLUMN `c`;"]
        );
        assert_eq!(
            ok(Dialect::Sqlite, "ALTER TABLE \"t\" RENAME COLUMN \"a\" TO \"b\";"),
            vec!["ALTER TABLE \"t\" RENAME COLUMN \"a\" TO \"b\";"]
        );
        assert!(transform_statement(Dialect::MySql, "DROP INDEX IF EXISTS \"i\";").failed());
        assert_eq!(
            ok(Dialect::Sqlite, "DROP INDEX IF EXISTS \"i\";"),
            vec!["DROP INDEX IF EXISTS \"i\";"]
        );
    }

    #[test]
    fn test_constraints() {
        assert_eq!(
            ok(
                Dialect::MySql,
                "ALTER TABLE \"a\" ADD CONSTRAINT \"a_b_fkey\" FOREIGN KEY (\"b\") REFERENCES \"b\" (\"id\") MATCH SIMPLE ON DELETE CASCADE;"
            ),
            vec!["ALTER TABLE `a` ADD CONSTRAINT `a_b_fkey` FOREIGN KEY (`b`) REFERENCES `b` (`id`) ON DELETE CASCADE;"]
        );
        assert!(
            transform_statement(Dialect::Sqlite, "ALTER TABLE \"a\" ADD CONSTRAINT \"c\" CHECK (x > 0);").failed()
        );
        assert!(
            transform_statement(
                Dialect::MySql,
                "CREATE TABLE \"b\" (\"r\" int, CONSTRAINT \"x\" EXCLUDE USING gist (\"r\" WITH =));"
            )
            .failed()
        );
    }

    #[test]
    fn test_indexes() {
        let partial = "CREATE UNIQUE INDEX \"users_email_idx\" ON \"users\" (\"email\") WHERE deleted_at IS NULL;";
        assert!(transform_statement(Dialect::MySql, partial).failed());
        assert_eq!(ok(Dialect::Sqlite, partial), vec![partial.to_string()]);

        assert!(
            transform_statement(Dialect::Sqlite, "CREATE INDEX \"t_idx\" ON \"t\" USING gin (\"tags\");").failed()
        );
        assert_eq!(
            ok(Dialect::MySql, "CREATE INDEX IF NOT EXISTS \"i\" ON \"t\" USING btree (lower(\"email\"), \"id\");"),
            vec!["CREATE INDEX `i` ON `t` ((lower(`email`)), `id`);"]
        );
    }

    #[test]
    fn test_sqlite_replaces_view() {
        assert_eq!(
            ok(Dialect::Sqlite, "CREATE OR REPLACE VIEW \"v\" AS SELECT 1;"),
            vec!["DROP VIEW IF EXISTS \"v\";", "CREATE VIEW \"v\" AS SELECT 1;"]
        );
    }

    #[test]
    fn test_literals_are_left_alone() {
        assert_eq!(
            ok(Dialect::MySql, "ALTER TABLE \"t\" ALTER COLUMN \"p\" SET DEFAULT 'a\\b::text now()';"),
            vec!["ALTER TABLE `t` ALTER COLUMN `p` SET DEFAULT 'a\\\\b::text now()';"]
        );
    }

    #[test]
    fn test_postgres_family_is_unchanged() {
        let sql = "CREATE TYPE \"mood\" AS ENUM ('a');";
        assert_eq!(transform_statement(Dialect::Nile, sql).sql, vec![sql.to_string()]);
    }

    #[test]
    fn test_type_map() {
        let m = map_type(Family::MySql, "numeric", Some(80), Some(40), false).unwrap();
        assert_eq!(m.target, "DECIMAL(65,30)");
        assert!(m.warning.is_some());
        assert_eq!(
            map_type(Family::Sqlite, "bytea", None, None, false).unwrap().target,
            "BLOB"
        );
        assert!(map_type(Family::Sqlite, "tsvector", None, None, false).is_none());
    }
}
