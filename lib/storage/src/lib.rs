pub mod corpus;
pub mod lock;
pub mod manager;
pub mod memory;
pub mod snapshot;
pub mod wal;

pub use corpus::{load_corpus, LabeledApplication};
pub use lock::DataDirLock;
pub use manager::{ReembedReport, StorageManager};
pub use memory::MemoryStore;
pub use snapshot::{ArtifactDescription, ModelArtifact};
pub use wal::{CaseLog, LogFile};
