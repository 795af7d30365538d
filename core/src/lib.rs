//! relq core: declarative schema management for PostgreSQL.
//!
//! The desired schema lives in a SQL source file. This crate parses it,
//! compares it with the live database and a local snapshot, and plans the
//! SQL that moves one to the other:
//!
//! - [`parser`] reads DDL into the [`schema`] model
//! - [`diff`] compares two schemas and yields a [`diff::ChangeSet`]
//! - [`emit`] orders the changes into UP and DOWN statements
//! - [`dialect`] checks (and transforms) statements for a target database
//! - [`plan`] runs the `push`, `generate`, `migrate` and `rollback` workflows
//!
//! Database access goes through the [`adapter::Adapter`] trait and user
//! confirmation through [`prompt::Prompt`], so the crate itself does no
//! network or terminal I/O.
//!
//! ```
//! use relq_core::diff::diff_schemas;
//! use relq_core::emit;
//! use relq_core::parser::parse_schema;
//!
//! let old = parse_schema("CREATE TABLE users (id uuid PRIMARY KEY);").unwrap();
//! let new = parse_schema("CREATE TABLE users (id uuid PRIMARY KEY, email text NOT NULL);").unwrap();
//! let sql = emit::generate(&diff_schemas(&old, &new));
//! assert_eq!(sql.up().len(), 1);
//! ```

pub mod adapter;
pub mod builder;
pub mod commit;
pub mod config;
pub mod dialect;
pub mod diff;
pub mod emit;
pub mod error;
pub mod ignore;
pub mod migration;
pub mod parser;
pub mod plan;
pub mod prompt;
pub mod schema;
pub mod snapshot;
pub mod types;

pub use error::{RelqError, Result};

/// Common imports for callers driving the planner.
pub mod prelude {
    pub use crate::adapter::Adapter;
    pub use crate::config::Config;
    pub use crate::dialect::Dialect;
    pub use crate::error::{RelqError, Result};
    pub use crate::ignore::IgnoreSet;
    pub use crate::plan::{Context, Planner};
    pub use crate::prompt::Prompt;
    pub use crate::schema::Schema;
}
