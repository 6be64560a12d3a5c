// Channel Counter Service
// Channel-local display sequence numbers. The base count is computed once
// per channel per process from durable storage (active ledger plus all
// archive files), then cached and incremented in memory for the rest of the
// run.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::error::Result;
use crate::port::LedgerStore;

pub struct ChannelCounters {
    ledger_store: Arc<dyn LedgerStore>,
    base: HashMap<String, u64>,
    issued: HashMap<String, u64>,
}

impl ChannelCounters {
    pub fn new(ledger_store: Arc<dyn LedgerStore>) -> Self {
        Self {
            ledger_store,
            base: HashMap::new(),
            issued: HashMap::new(),
        }
    }

    /// Next sequence number for a channel (1-based over its full history)
    pub async fn next(&mut self, channel_id: &str) -> Result<u64> {
        if !self.base.contains_key(channel_id) {
            let base = self.ledger_store.count_channel_posts(channel_id).await?;
            debug!(channel_id, base, "initialized channel counter");
            self.base.insert(channel_id.to_string(), base);
        }
        let issued = self.issued.entry(channel_id.to_string()).or_insert(0);
        *issued += 1;
        Ok(self.base[channel_id] + *issued)
    }
}
