use crate::error::SinkError;
use bytes::Bytes;
use model::response::CdcResponse;
use tokio::sync::mpsc::{self, error::TrySendError};

/// Outbound byte channel to a connected client.
pub trait SinkChannel: Send + Sync {
    fn write_and_flush(&self, frame: Bytes) -> Result<(), SinkError>;
}

/// Destination of a job's output. Only sinks that talk to a client own a
/// channel; the failure path writes an error frame there when present.
pub trait PipelineSink: Send + Sync {
    fn channel(&self) -> Option<&dyn SinkChannel>;
}

/// Sink without a client connection.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl PipelineSink for NoopSink {
    fn channel(&self) -> Option<&dyn SinkChannel> {
        None
    }
}

/// Channel backed by the outbound queue of a client socket.
#[derive(Debug, Clone)]
pub struct SocketChannel {
    tx: mpsc::Sender<Bytes>,
}

impl SocketChannel {
    pub fn new(tx: mpsc::Sender<Bytes>) -> Self {
        Self { tx }
    }
}

impl SinkChannel for SocketChannel {
    fn write_and_flush(&self, frame: Bytes) -> Result<(), SinkError> {
        self.tx.try_send(frame).map_err(|e| match e {
            TrySendError::Full(_) => SinkError::ChannelFull,
            TrySendError::Closed(_) => SinkError::ChannelClosed,
        })
    }
}

#[derive(Debug, Clone)]
pub struct SocketSink {
    channel: SocketChannel,
}

impl SocketSink {
    pub fn new(tx: mpsc::Sender<Bytes>) -> Self {
        Self {
            channel: SocketChannel::new(tx),
        }
    }
}

impl PipelineSink for SocketSink {
    fn channel(&self) -> Option<&dyn SinkChannel> {
        Some(&self.channel)
    }
}

pub fn encode_response(response: &CdcResponse) -> Result<Bytes, SinkError> {
    Ok(Bytes::from(serde_json::to_vec(response)?))
}
