/// Market Sync - Shared Library
///
/// Keeps a local mirror of multi-exchange market metrics fresh:
/// - Push feed over WebSocket with exponential backoff and jitter
/// - Permanent HTTP poll fallback after repeated push failures
/// - Coalesced publication of snapshots to observers (at most 2/s)
/// - Alert log derived from signal flags seen in raw snapshots
/// - Best-effort auxiliary status / sentiment polling
///
/// Everything hangs off [`MarketSync`], which is mounted once per session
/// and torn down with a single `unmount`.
pub mod shared;

// Re-export commonly used types for convenience
pub use shared::types::{
    AlertEntry, AuxSnapshot, ConnectionState, ControlFrame, ExchangeStaleness, FeedFrame,
    FeedHealth, FeedSource, FeedStatus, MarketView, MetricRecord, RecordKey, SentimentCounts,
    Side, Snapshot, StatusReport,
};

pub use shared::alerts::{AlertDetector, SignalFlag, SIGNAL_FLAGS};
pub use shared::backoff::Backoff;
pub use shared::coalescer::UpdateCoalescer;
pub use shared::config::{BackoffConfig, SyncConfig};
pub use shared::error::SyncError;
pub use shared::rest::{HttpFeedClient, SnapshotSource, StatusSource};
pub use shared::scheduler::{Scheduler, Ticker, Timers};
pub use shared::status::StatusPoller;
pub use shared::store::SnapshotStore;
pub use shared::sync::{Collaborators, MarketSync};
pub use shared::transport::{Ingest, TransportManager};
pub use shared::websocket::{FrameStream, PushTransport, WebSocketTransport};
