//! Schema-builder code generation from SQL

use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::Result;
use relq_core::RelqError;
use relq_core::builder::to_builder_code;
use relq_core::parser::parse_source;
use relq_core::plan::Context;
use tracing::warn;

pub fn introspect(ctx: &Context, file: Option<PathBuf>, stdin: bool) -> Result<()> {
    let (sql, origin) = if stdin {
        let mut sql = String::new();
        std::io::stdin().read_to_string(&mut sql)?;
        (sql, PathBuf::from("<stdin>"))
    } else {
        let path = file.unwrap_or_else(|| ctx.config.schema_path());
        let sql = std::fs::read_to_string(&path)
            .map_err(|e| RelqError::Config(format!("cannot read {}: {e}", path.display())))?;
        (sql, path)
    };

    let parsed = parse_source(&sql, Path::new(&origin))?;
    for skipped in &parsed.skipped {
        warn!(line = skipped.line, "statement not understood, left out");
    }
    print!("{}", to_builder_code(&parsed.schema));
    Ok(())
}
