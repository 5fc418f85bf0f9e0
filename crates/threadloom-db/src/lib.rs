pub mod archive;
pub mod archive_store;
pub mod importer;
pub mod normalize;
pub mod schema;

pub use archive::{Archive, ArchiveMessage, ArchiveNode};
pub use archive_store::{ArchiveStore, ConversationRecord, TableCounts};
pub use importer::{ImportOptions, ImportSummary};
pub use normalize::normalize;
