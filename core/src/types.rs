//! SQL type normalization.
//!
//! Every surface spelling of a type is mapped to one canonical name so the
//! diff engine can compare `int4` against `INTEGER` without reporting a
//! change. Type parameters are kept apart from the name:
//!
//! ```
//! use relq_core::types::{normalize_type, parse_type_spec};
//!
//! assert_eq!(normalize_type("INT4"), "integer");
//! assert_eq!(normalize_type("_int4"), "integer[]");
//!
//! let spec = parse_type_spec("VARCHAR(255)");
//! assert_eq!(spec.name, "character varying");
//! assert_eq!(spec.params.length, Some(255));
//! ```

use serde::{Deserialize, Serialize};

/// Length / precision / scale attached to a type. `None` means unspecified.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precision: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<u32>,
}

impl TypeParams {
    pub fn is_empty(&self) -> bool {
        self.length.is_none() && self.precision.is_none() && self.scale.is_none()
    }

    pub fn length(length: u32) -> Self {
        Self {
            length: Some(length),
            ..Self::default()
        }
    }

    pub fn numeric(precision: u32, scale: Option<u32>) -> Self {
        Self {
            precision: Some(precision),
            scale,
            ..Self::default()
        }
    }
}

/// A parsed type: canonical name (array suffix included) plus parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeSpec {
    pub name: String,
    pub params: TypeParams,
    pub array_dims: usize,
}

impl TypeSpec {
    /// Base name without the array suffix.
    pub fn element(&self) -> &str {
        self.name.trim_end_matches("[]")
    }
}

/// Canonical name for every known alias.
fn canonical_base(name: &str) -> Option<&'static str> {
    let canonical = match name {
        "int" | "int4" | "integer" => "integer",
        "int8" | "bigint" => "bigint",
        "int2" | "smallint" => "smallint",
        "serial" | "serial4" => "serial",
        "bigserial" | "serial8" => "bigserial",
        "smallserial" | "serial2" => "smallserial",
        "bool" | "boolean" => "boolean",
        "varchar" | "character varying" | "char varying" => "character varying",
        "char" | "character" | "bpchar" => "character",
        "text" => "text",
        "float8" | "double precision" | "double" | "float" => "double precision",
        "float4" | "real" => "real",
        "decimal" | "numeric" | "dec" => "numeric",
        "timestamptz" | "timestamp with time zone" => "timestamp with time zone",
        "timestamp" => "timestamp",
        "timetz" | "time with time zone" => "time with time zone",
        "time" => "time",
        "varbit" | "bit varying" => "bit varying",
        "bit" => "bit",
        "date" => "date",
        "interval" => "interval",
        "uuid" => "uuid",
        "json" => "json",
        "jsonb" => "jsonb",
        "bytea" => "bytea",
        "inet" => "inet",
        "cidr" => "cidr",
        "macaddr" => "macaddr",
        "money" => "money",
        "xml" => "xml",
        "tsvector" => "tsvector",
        "tsquery" => "tsquery",
        "oid" => "oid",
        _ => return None,
    };
    Some(canonical)
}

/// Which slot a single parenthesized parameter fills for a canonical base.
fn single_param_is_length(base: &str) -> bool {
    matches!(
        base,
        "character varying" | "character" | "bit" | "bit varying"
    )
}

/// Normalize a type spelling to its canonical name, dropping parameters.
pub fn normalize_type(raw: &str) -> String {
    parse_type_spec(raw).name
}

/// Split a raw type into canonical name, parameters and array dimensions.
pub fn parse_type_spec(raw: &str) -> TypeSpec {
    let mut text = raw.trim().to_string();
    let quoted = text.contains('"');
    if quoted {
        text = text.replace('"', "");
    } else {
        text = text.to_lowercase();
    }

    // Array dimensions: `int[]`, `int[3][]`, `int ARRAY`, `_int4`
    let mut array_dims = 0;
    loop {
        let trimmed = text.trim_end();
        if trimmed.ends_with(']') {
            if let Some(open) = trimmed.rfind('[') {
                text = trimmed[..open].to_string();
                array_dims += 1;
                continue;
            }
        }
        if !quoted && trimmed.ends_with(" array") {
            text = trimmed[..trimmed.len() - " array".len()].to_string();
            array_dims += 1;
            continue;
        }
        text = trimmed.to_string();
        break;
    }
    if !quoted && array_dims == 0 && text.starts_with('_') && text.len() > 1 {
        text = text[1..].to_string();
        array_dims = 1;
    }

    // Parameters may sit mid-name: `timestamp(3) with time zone`
    let mut args = Vec::new();
    if let (Some(open), Some(close)) = (text.find('('), text.find(')')) {
        if close > open {
            args = text[open + 1..close]
                .split(',')
                .map(|a| a.trim().to_string())
                .collect();
            text = format!("{} {}", &text[..open], &text[close + 1..]);
        }
    }

    let mut base = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if !quoted && base.ends_with(" without time zone") {
        base.truncate(base.len() - " without time zone".len());
    }

    let base = if quoted {
        base
    } else {
        canonical_base(&base)
            .map(str::to_string)
            .unwrap_or(base)
    };

    let numbers: Vec<Option<u32>> = args.iter().map(|a| a.parse::<u32>().ok()).collect();
    let params = match numbers.as_slice() {
        [] => TypeParams::default(),
        [Some(n)] if single_param_is_length(&base) => TypeParams::length(*n),
        [Some(n)] => TypeParams {
            precision: Some(*n),
            ..TypeParams::default()
        },
        [Some(p), Some(s)] => TypeParams::numeric(*p, Some(*s)),
        _ => TypeParams::default(),
    };

    let mut name = base;
    for _ in 0..array_dims {
        name.push_str("[]");
    }

    TypeSpec {
        name,
        params,
        array_dims,
    }
}

/// Serial pseudo-types collapse to their storage type for comparison.
pub fn storage_type(canonical: &str) -> String {
    let (element, suffix) = match canonical.find("[]") {
        Some(idx) => (&canonical[..idx], &canonical[idx..]),
        None => (canonical, ""),
    };
    let element = match element {
        "serial" => "integer",
        "bigserial" => "bigint",
        "smallserial" => "smallint",
        other => other,
    };
    format!("{element}{suffix}")
}

/// True if the canonical type is one of the serial pseudo-types.
pub fn is_serial(canonical: &str) -> bool {
    matches!(canonical, "serial" | "bigserial" | "smallserial")
}

/// True if two raw or canonical spellings denote the same stored type.
pub fn types_equivalent(a: &str, b: &str) -> bool {
    storage_type(&normalize_type(a)) == storage_type(&normalize_type(b))
}

/// Render a canonical name with parameters back to SQL.
pub fn render_type(name: &str, params: &TypeParams) -> String {
    let (element, suffix) = match name.find("[]") {
        Some(idx) => (&name[..idx], &name[idx..]),
        None => (name, ""),
    };
    let args = match (params.length, params.precision, params.scale) {
        (Some(len), _, _) => format!("({len})"),
        (None, Some(p), Some(s)) => format!("({p},{s})"),
        (None, Some(p), None) => format!("({p})"),
        _ => String::new(),
    };
    if args.is_empty() {
        return format!("{element}{suffix}");
    }
    // Zone-qualified names carry the precision before the qualifier.
    for head in ["timestamp", "time"] {
        if let Some(rest) = element.strip_prefix(head) {
            if rest.starts_with(" with") {
                return format!("{head}{args}{rest}{suffix}");
            }
        }
    }
    format!("{element}{args}{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_aliases() {
        for raw in ["int", "INT4", "integer", " Integer "] {
            assert_eq!(normalize_type(raw), "integer", "{raw}");
        }
        assert_eq!(normalize_type("int8"), "bigint");
        assert_eq!(normalize_type("INT2"), "smallint");
    }

    #[test]
    fn test_time_zone_forms() {
        assert_eq!(normalize_type("timestamptz"), "timestamp with time zone");
        assert_eq!(
            normalize_type("TIMESTAMP   WITH TIME ZONE"),
            "timestamp with time zone"
        );
        assert_eq!(normalize_type("timestamp without time zone"), "timestamp");
        assert_eq!(normalize_type("time without time zone"), "time");
        assert_eq!(normalize_type("timetz"), "time with time zone");
    }

    #[test]
    fn test_varchar_and_params() {
        let spec = parse_type_spec("varchar(255)");
        assert_eq!(spec.name, "character varying");
        assert_eq!(spec.params, TypeParams::length(255));

        let spec = parse_type_spec("NUMERIC(10, 2)");
        assert_eq!(spec.name, "numeric");
        assert_eq!(spec.params, TypeParams::numeric(10, Some(2)));

        let spec = parse_type_spec("timestamp(3) with time zone");
        assert_eq!(spec.name, "timestamp with time zone");
        assert_eq!(spec.params.precision, Some(3));
    }

    #[test]
    fn test_arrays() {
        assert_eq!(normalize_type("_int4"), "integer[]");
        assert_eq!(normalize_type("TEXT[]"), "text[]");
        let spec = parse_type_spec("varchar(20)[][]");
        assert_eq!(spec.name, "character varying[][]");
        assert_eq!(spec.array_dims, 2);
        assert_eq!(spec.element(), "character varying");
        assert_eq!(spec.params.length, Some(20));
    }

    #[test]
    fn test_unknown_passes_through() {
        assert_eq!(normalize_type("user_status"), "user_status");
        assert_eq!(normalize_type("geometry"), "geometry");
        assert_eq!(normalize_type("\"OrderStatus\""), "OrderStatus");
    }

    #[test]
    fn test_serial_equivalence() {
        assert_eq!(normalize_type("SERIAL"), "serial");
        assert!(types_equivalent("serial", "int4"));
        assert!(types_equivalent("bigserial", "INT8"));
        assert!(!types_equivalent("serial", "bigint"));
        assert!(is_serial("smallserial"));
    }

    #[test]
    fn test_render_type() {
        assert_eq!(
            render_type("character varying", &TypeParams::length(255)),
            "character varying(255)"
        );
        assert_eq!(
            render_type("numeric", &TypeParams::numeric(10, Some(2))),
            "numeric(10,2)"
        );
        assert_eq!(
            render_type(
                "timestamp with time zone",
                &TypeParams {
                    precision: Some(3),
                    ..TypeParams::default()
                }
            ),
            "timestamp(3) with time zone"
        );
        assert_eq!(
            render_type("character varying[]", &TypeParams::length(20)),
            "character varying(20)[]"
        );
        assert_eq!(render_type("text", &TypeParams::default()), "text");
    }
}
