//! Image lifecycle and bulk migration for stash
//!
//! - [`EditSession`]: staged add/remove/reorder of a record's images with a
//!   single commit or abort
//! - [`Migrator`]: export of the whole inventory into one zip archive and
//!   collision-free import of such an archive
//! - Orphan reconciliation and box code validation

pub mod box_codes;
pub mod error;
pub mod migration;
pub mod reconcile;
pub mod session;

pub use box_codes::validate_new_box_code;
pub use error::{MigrationError, SessionError};
pub use migration::{
    ExportStatus, ImportStatus, ImportSummary, MigrationPaths, Migrator, RemapTable,
};
pub use reconcile::reconcile_orphans;
pub use session::{EditSession, SessionState};
