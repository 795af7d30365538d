//! `generate`: write the pending changes as a migration file.
//!
//! The baseline is the snapshot: the last schema pushed, pulled or
//! generated. After writing the file the snapshot moves to the desired
//! schema so the next `generate` only picks up newer edits.

use std::path::PathBuf;

use chrono::Utc;
use serde::Serialize;
use tracing::info;

use super::{Planner, confirm_destructive};
use crate::diff::Summary;
use crate::emit;
use crate::error::{RelqError, Result};
use crate::migration::{list_migrations, next_filename, render_file};
use crate::prompt::Prompt;
use crate::schema::Schema;
use crate::schema::tracking::merge_tracking_ids;

#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    pub name: Option<String>,
    /// Write a file with empty sections even when nothing changed.
    pub empty: bool,
    /// Leave out the `-- DOWN` section.
    pub no_down: bool,
    pub dry_run: bool,
    pub yes: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateReport {
    pub summary: Summary,
    pub stripped: bool,
    pub path: Option<PathBuf>,
    pub content: Option<String>,
    pub written: bool,
}

impl<P: Prompt> Planner<'_, P> {
    pub fn generate(&mut self, options: &GenerateOptions) -> Result<GenerateReport> {
        let desired = self.ctx.load_desired()?.schema;
        let snapshot = self.ctx.load_snapshot()?;
        let baseline = snapshot
            .as_ref()
            .map(|s| s.to_schema())
            .unwrap_or_else(Schema::new);

        let mut report = GenerateReport::default();
        let (up, down) = if options.empty {
            (
                vec!["-- Write the forward migration here".to_string()],
                vec!["-- Write the reverse migration here".to_string()],
            )
        } else {
            let mut changes = self.ctx.changes(&baseline, &desired)?;
            if changes.has_destructive() && !options.yes {
                let before = changes.summary();
                changes = confirm_destructive(&mut self.prompt, changes)?.ok_or(RelqError::UserCancel)?;
                report.stripped = changes.summary() != before;
            }
            report.summary = changes.summary();
            if changes.is_empty() {
                info!("no changes since the snapshot");
                return Ok(report);
            }
            let sql = emit::generate(&changes);
            (sql.up(), sql.down())
        };

        let dir = self.config().migrations_dir();
        let existing = list_migrations(&dir)?;
        let name = options.name.as_deref().unwrap_or("schema_update");
        let filename = next_filename(self.config().migrations.naming, &existing, name, Utc::now());
        let path = dir.join(&filename);
        if path.exists() {
            return Err(RelqError::Config(format!("{} already exists", path.display())));
        }
        let content = render_file(
            filename.trim_end_matches(".sql"),
            &up,
            (!options.no_down).then_some(down.as_slice()),
        );
        report.path = Some(path.clone());
        report.content = Some(content.clone());
        if options.dry_run {
            return Ok(report);
        }

        std::fs::create_dir_all(&dir)?;
        std::fs::write(&path, content)?;
        report.written = true;
        info!(file = %path.display(), "migration written");

        if !options.empty {
            let mut next = desired;
            merge_tracking_ids(&mut next, &baseline);
            let (database, applied) = snapshot
                .map(|s| (s.database, s.applied_migrations))
                .unwrap_or_default();
            self.save_snapshot(&next, database, applied)?;
        }
        Ok(report)
    }
}
