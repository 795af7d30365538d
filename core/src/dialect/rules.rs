//! Incompatibility rules for PostgreSQL-family dialects.

use std::sync::LazyLock;

use regex::Regex;

use super::{Category, Dialect, Features, Finding, Severity};

/// A construct that needs a feature the dialect may lack.
struct FeatureRule {
    feature: &'static str,
    category: Category,
    pattern: &'static str,
    supported: fn(&Features) -> bool,
    alternative: &'static str,
}

/// A dialect-specific construct.
struct DialectRule {
    dialect: Dialect,
    feature: &'static str,
    category: Category,
    pattern: &'static str,
    unless: Option<&'static str>,
    severity: Severity,
    message: &'static str,
    alternative: Option<&'static str>,
}

const FEATURE_RULES: &[FeatureRule] = &[
    FeatureRule {
        feature: "enums",
        category: Category::DataType,
        pattern: r"(?i)^\s*CREATE\s+TYPE\s+\S+\s+AS\s+ENUM\b|^\s*ALTER\s+TYPE\s+\S+\s+ADD\s+VALUE\b",
        supported: |f| f.enums,
        alternative: "use a text column with a CHECK constraint",
    },
    FeatureRule {
        feature: "domains",
        category: Category::DataType,
        pattern: r"(?i)^\s*(CREATE|ALTER)\s+DOMAIN\b",
        supported: |f| f.domains,
        alternative: "use the base type with a CHECK constraint",
    },
    FeatureRule {
        feature: "sequences",
        category: Category::DataType,
        pattern: r"(?i)^\s*(CREATE|ALTER)\s+SEQUENCE\b|\bnextval\s*\(|\b(small|big)?serial\b|\bGENERATED\s+(ALWAYS|BY\s+DEFAULT)\s+AS\s+IDENTITY\b",
        supported: |f| f.sequences,
        alternative: "use uuid keys with gen_random_uuid()",
    },
    FeatureRule {
        feature: "extensions",
        category: Category::Extension,
        pattern: r"(?i)^\s*CREATE\s+EXTENSION\b",
        supported: |f| f.extensions,
        alternative: "remove the extension and use built-in functions",
    },
    FeatureRule {
        feature: "functions",
        category: Category::Routine,
        pattern: r"(?i)^\s*CREATE\s+(OR\s+REPLACE\s+)?(FUNCTION|PROCEDURE)\b",
        supported: |f| f.functions,
        alternative: "move the logic into the application",
    },
    FeatureRule {
        feature: "triggers",
        category: Category::Routine,
        pattern: r"(?i)^\s*CREATE\s+(OR\s+REPLACE\s+)?(CONSTRAINT\s+)?TRIGGER\b",
        supported: |f| f.triggers,
        alternative: "move the logic into the application",
    },
    FeatureRule {
        feature: "materialized views",
        category: Category::Ddl,
        pattern: r"(?i)\bMATERIALIZED\s+VIEW\b",
        supported: |f| f.materialized_views,
        alternative: "use a plain view or a summary table",
    },
    FeatureRule {
        feature: "partitioning",
        category: Category::Partitioning,
        pattern: r"(?i)\bPARTITION\s+(BY|OF)\b",
        supported: |f| f.partitioning,
        alternative: "use a single table",
    },
    FeatureRule {
        feature: "foreign keys",
        category: Category::Constraint,
        pattern: r"(?i)\bFOREIGN\s+KEY\b|\bREFERENCES\s+\S",
        supported: |f| f.foreign_keys,
        alternative: "enforce references in the application",
    },
    FeatureRule {
        feature: "foreign tables",
        category: Category::Ddl,
        pattern: r"(?i)\bFOREIGN\s+TABLE\b",
        supported: |f| f.foreign_tables,
        alternative: "query the remote source from the application",
    },
    FeatureRule {
        feature: "exclusion constraints",
        category: Category::Constraint,
        pattern: r"(?i)\bEXCLUDE\s+USING\b",
        supported: |f| f.exclusion_constraints,
        alternative: "check overlaps in the application",
    },
    FeatureRule {
        feature: "collations",
        category: Category::Ddl,
        pattern: r"(?i)^\s*CREATE\s+COLLATION\b",
        supported: |f| f.collations,
        alternative: "use the default collation",
    },
    FeatureRule {
        feature: "arrays",
        category: Category::DataType,
        pattern: r"\[\]",
        supported: |f| f.arrays,
        alternative: "store lists in a jsonb or text column",
    },
    FeatureRule {
        feature: "alter column type",
        category: Category::Ddl,
        pattern: r"(?i)\bALTER\s+COLUMN\s+\S+\s+(SET\s+DATA\s+)?TYPE\b",
        supported: |f| f.alter_column,
        alternative: "add a new column, copy the data, then drop the old one",
    },
];

const DIALECT_RULES: &[DialectRule] = &[
    DialectRule {
        dialect: Dialect::CockroachDb,
        feature: "plpgsql",
        category: Category::Routine,
        pattern: r"(?i)\bLANGUAGE\s+plpgsql\b",
        unless: None,
        severity: Severity::Warning,
        message: "PL/pgSQL support is partial",
        alternative: Some("prefer LANGUAGE sql functions"),
    },
    DialectRule {
        dialect: Dialect::CockroachDb,
        feature: "serial",
        category: Category::DataType,
        pattern: r"(?i)\b(small|big)?serial\b",
        unless: None,
        severity: Severity::Warning,
        message: "SERIAL uses unique_rowid(); values are unique but not sequential",
        alternative: Some("use uuid keys or an explicit sequence"),
    },
    DialectRule {
        dialect: Dialect::CockroachDb,
        feature: "index method",
        category: Category::Index,
        pattern: r"(?i)\bUSING\s+(gist|brin|hash|spgist)\b",
        unless: None,
        severity: Severity::Error,
        message: "only btree and gin (inverted) indexes are supported",
        alternative: Some("use a btree or gin index"),
    },
    DialectRule {
        dialect: Dialect::CockroachDb,
        feature: "deferrable constraints",
        category: Category::Constraint,
        pattern: r"(?i)\bDEFERRABLE\b",
        unless: Some(r"(?i)\bNOT\s+DEFERRABLE\b"),
        severity: Severity::Error,
        message: "deferrable constraints are not supported",
        alternative: Some("remove DEFERRABLE"),
    },
    DialectRule {
        dialect: Dialect::Nile,
        feature: "extensions",
        category: Category::Extension,
        pattern: r"(?i)^\s*CREATE\s+EXTENSION\b",
        unless: None,
        severity: Severity::Warning,
        message: "only the extensions Nile preinstalls can be created",
        alternative: None,
    },
    DialectRule {
        dialect: Dialect::Dsql,
        feature: "synchronous index",
        category: Category::Index,
        pattern: r"(?i)^\s*CREATE\s+(UNIQUE\s+)?INDEX\b",
        unless: Some(r"(?i)\bINDEX\s+ASYNC\b"),
        severity: Severity::Error,
        message: "indexes must be built asynchronously",
        alternative: Some("CREATE INDEX ASYNC"),
    },
    DialectRule {
        dialect: Dialect::Dsql,
        feature: "plpgsql",
        category: Category::Routine,
        pattern: r"(?i)\bLANGUAGE\s+plpgsql\b",
        unless: None,
        severity: Severity::Error,
        message: "only SQL-language functions are supported",
        alternative: Some("rewrite the function as LANGUAGE sql"),
    },
    DialectRule {
        dialect: Dialect::Dsql,
        feature: "json columns",
        category: Category::DataType,
        pattern: r#"(?i)"\s+jsonb?\b"#,
        unless: None,
        severity: Severity::Error,
        message: "json and jsonb are not supported as column types",
        alternative: Some("store JSON text in a text column"),
    },
    DialectRule {
        dialect: Dialect::Dsql,
        feature: "temporary tables",
        category: Category::Ddl,
        pattern: r"(?i)^\s*CREATE\s+(TEMP|TEMPORARY)\b",
        unless: None,
        severity: Severity::Error,
        message: "temporary tables are not supported",
        alternative: None,
    },
    DialectRule {
        dialect: Dialect::Xata,
        feature: "extensions",
        category: Category::Extension,
        pattern: r"(?i)^\s*CREATE\s+EXTENSION\b",
        unless: None,
        severity: Severity::Warning,
        message: "only extensions enabled for the Xata branch can be created",
        alternative: None,
    },
    DialectRule {
        dialect: Dialect::Xata,
        feature: "security definer",
        category: Category::Routine,
        pattern: r"(?i)\bSECURITY\s+DEFINER\b",
        unless: None,
        severity: Severity::Warning,
        message: "SECURITY DEFINER needs privileges the branch role may not have",
        alternative: Some("use SECURITY INVOKER"),
    },
];

static COMPILED_FEATURES: LazyLock<Vec<(&'static FeatureRule, Regex)>> = LazyLock::new(|| {
    FEATURE_RULES
        .iter()
        .map(|r| (r, Regex::new(r.pattern).expect("feature rule pattern")))
        .collect()
});

static COMPILED_DIALECT: LazyLock<Vec<(&'static DialectRule, Regex, Option<Regex>)>> =
    LazyLock::new(|| {
        DIALECT_RULES
            .iter()
            .map(|r| {
                (
                    r,
                    Regex::new(r.pattern).expect("dialect rule pattern"),
                    r.unless.map(|u| Regex::new(u).expect("dialect rule exception")),
                )
            })
            .collect()
    });

/// Findings for one statement.
pub(crate) fn check(dialect: Dialect, statement: &str, index: usize) -> Vec<Finding> {
    let features = dialect.features();
    let mut findings = Vec::new();

    for (rule, re) in COMPILED_FEATURES.iter() {
        if (rule.supported)(&features) {
            continue;
        }
        if let Some(m) = re.find(statement) {
            findings.push(
                Finding::new(
                    rule.category,
                    rule.feature,
                    m.as_str().trim(),
                    Severity::Error,
                    format!("{dialect} does not support {}", rule.feature),
                )
                .alternative(rule.alternative)
                .at(index),
            );
        }
    }

    for (rule, re, unless) in COMPILED_DIALECT.iter() {
        if rule.dialect != dialect || unless.as_ref().is_some_and(|u| u.is_match(statement)) {
            continue;
        }
        if let Some(m) = re.find(statement) {
            let mut finding = Finding::new(
                rule.category,
                rule.feature,
                m.as_str().trim(),
                rule.severity,
                rule.message,
            )
            .at(index);
            finding.alternative = rule.alternative.map(str::to_string);
            findings.push(finding);
        }
    }
    findings
}
