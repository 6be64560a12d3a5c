// HTTP adapters: enrichment service client and Discord poster

pub mod discord;
pub mod enricher;

pub use discord::DiscordPoster;
pub use enricher::HttpEnricher;
