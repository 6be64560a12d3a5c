// Port Layer - Interfaces for external dependencies

pub mod clock;
pub mod enricher;
pub mod poster;
pub mod store;

// Re-exports
pub use clock::{Clock, SystemClock};
pub use enricher::Enricher;
pub use poster::{ChannelTarget, PostError, PostOutcome, Poster};
pub use store::{LedgerStore, QueueStore, SeenStore};
