// Core infrastructure modules
pub mod database; // Document store interface
pub mod middleware; // ViewerContext middleware and extractor
pub mod sqlite_database; // SQLite document store
pub mod viewer; // Viewer context

pub use database::{DatabaseInterface, Document, DocumentQuery, Filter, FilterOp, SortDirection, Write};
pub use sqlite_database::SqliteDatabase;
pub use viewer::ViewerContext;
