// JSON-file store adapters
// One atomic-write/corrupt-backup discipline (StateFile), three stores.

pub mod ledger_store;
pub mod queue_store;
pub mod seen_store;
pub mod state_file;

pub use ledger_store::JsonLedgerStore;
pub use queue_store::JsonQueueStore;
pub use seen_store::JsonSeenStore;
pub use state_file::StateFile;
