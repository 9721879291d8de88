use std::sync::Arc;

use serde::Deserialize;
use tokio::io::AsyncBufReadExt;
use tokio::io::AsyncRead;
use tokio::io::BufReader;

use osdpush_core::error::Error;
use osdpush_core::orchestrator::HostEvent;
use osdpush_core::orchestrator::driver::HostEventSender;
use osdpush_core::state_store::Registries;
use osdpush_core::state_store::Snapshot;

/// A line read from the host.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Input {
    /// Replaces the content of the registries.
    Snapshot { snapshot: Snapshot },
    Event(HostEvent),
}

/// Reads JSON lines from the host until EOF.
pub async fn run<R>(
    reader: R,
    sender: HostEventSender,
    registries: Arc<Registries>,
) -> Result<(), Error>
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<Input>(line) {
            Ok(Input::Snapshot { snapshot }) => registries.load_snapshot(snapshot).await,
            Ok(Input::Event(event)) => {
                sender.send(event);
            }
            Err(err) => tracing::warn!(%err, "Ignored malformed input"),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use osdpush_core::models::ChannelNumber;
    use osdpush_core::orchestrator::driver;
    use std::time::Duration;
    use test_log::test;

    #[test(tokio::test)]
    async fn test_run() {
        let input = concat!(
            r#"{"snapshot":{"channels":[{"number":5,"id":"ch5","name":"Five"}]}}"#,
            "\n",
            "\n",
            r#"{"type":"channel-switch","channelNumber":5}"#,
            "\n",
            "not a json\n",
            r#"{"type":"osd-message","text":"Hello"}"#,
            "\n",
            r#"{"type":"replay","name":"News","fileName":"/video/news.ts","on":true}"#,
            "\n",
        );
        let registries = Arc::new(Registries::new());
        let (sender, mut receiver) = driver::channel(4);

        let result = run(input.as_bytes(), sender, registries.clone()).await;
        assert_matches!(result, Ok(()));

        assert_matches!(receiver.recv().await, Some(HostEvent::ChannelSwitch { channel_number, live_view: true }) => {
            assert_eq!(channel_number, ChannelNumber::from(5));
        });
        assert_matches!(receiver.recv().await, Some(HostEvent::Replay { name: Some(name), on: true, .. }) => {
            assert_eq!(name, "News");
        });
        // The sender has been dropped at EOF.
        assert_matches!(receiver.recv().await, None);

        let channels = registries
            .channels
            .acquire_read(Duration::from_millis(10))
            .await
            .unwrap();
        assert_eq!(channels.len(), 1);
    }
}
