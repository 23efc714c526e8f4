//! Frame handoff between pipeline stages on different threads.
//!
//! A [`StageConnector`] sits between a [`FrameProducer`] and a
//! [`FrameConsumer`]. Produced frames are delivered downstream in order,
//! consumed frames are handed back upstream, and a downstream rejection is
//! retried later on the connector's [`FrameTaskExecutor`] instead of
//! blocking either stage.

mod connector;
mod executor;
mod frame;

pub use connector::{
    ConnectorConfig, ConnectorStats, DEFAULT_RETRY_INTERVAL, DeliveryState, StageConnector,
};
pub use executor::{ExecutorConfig, FrameTaskExecutor};
pub use frame::{FrameConsumer, FrameProducer, TextureInfo};
