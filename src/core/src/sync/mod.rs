mod feed;
mod synchronizer;

pub use feed::{
    PollingFeed, StatusFeed, SyncConfig, DEFAULT_POLL_CEILING, DEFAULT_POLL_INTERVAL,
};
pub use synchronizer::StateSynchronizer;

#[cfg(test)]
pub(crate) use feed::tests as test_support;
