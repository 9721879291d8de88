use std::fmt;

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;
use tokio::io::AsyncWrite;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PushTag {
    /// Present/following state of the current channel.
    Actual,
    /// The full timer list.
    Timers,
    /// Playback started.
    Replay,
}

impl PushTag {
    pub fn as_str(&self) -> &'static str {
        match *self {
            PushTag::Actual => "actual",
            PushTag::Timers => "timers",
            PushTag::Replay => "replay",
        }
    }
}

impl fmt::Display for PushTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PushMessage {
    pub event: PushTag,
    pub object: serde_json::Value,
}

/// A transport delivering push messages to subscribers.
///
/// Delivery is fire-and-forget.  Implementations handle their own failures.
#[async_trait]
pub trait Push: Send + Sync {
    async fn push(&self, msg: PushMessage);
}

pub struct PushDispatcher<P> {
    transport: P,
}

impl<P> PushDispatcher<P>
where
    P: Push,
{
    pub fn new(transport: P) -> Self {
        PushDispatcher { transport }
    }

    pub async fn dispatch(&self, tag: PushTag, object: serde_json::Value) {
        tracing::debug!(push.tag = %tag, "Dispatch");
        self.transport
            .push(PushMessage { event: tag, object })
            .await;
    }
}

/// Writes each message as a JSON line.
pub struct JsonLinesPush<W> {
    writer: Mutex<W>,
}

impl<W> JsonLinesPush<W> {
    pub fn new(writer: W) -> Self {
        JsonLinesPush {
            writer: Mutex::new(writer),
        }
    }
}

#[async_trait]
impl<W> Push for JsonLinesPush<W>
where
    W: AsyncWrite + Send + Unpin,
{
    async fn push(&self, msg: PushMessage) {
        let mut json = match serde_json::to_vec(&msg) {
            Ok(json) => json,
            Err(err) => {
                tracing::error!(%err, push.tag = %msg.event, "Failed to serialize");
                return;
            }
        };
        json.push(b'\n');
        let mut writer = self.writer.lock().await;
        if let Err(err) = writer.write_all(&json).await {
            tracing::warn!(%err, push.tag = %msg.event, "Failed to write");
            return;
        }
        if let Err(err) = writer.flush().await {
            tracing::warn!(%err, push.tag = %msg.event, "Failed to flush");
        }
    }
}


// </coverage:exclude>
