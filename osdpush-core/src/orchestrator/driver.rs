use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::MissedTickBehavior;

use super::HostEvent;
use super::Orchestrator;
use crate::push::Push;
use crate::refresh::RefreshState;

/// The sending side used by host callbacks.
///
/// Sending never blocks the caller.
#[derive(Clone)]
pub struct HostEventSender {
    sender: mpsc::Sender<HostEvent>,
}

impl HostEventSender {
    pub fn send(&self, event: HostEvent) -> bool {
        match self.sender.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                // Recovered by the next natural trigger.
                tracing::warn!(msg.name = event.name(), "Event queue is full, dropped");
                false
            }
            Err(TrySendError::Closed(event)) => {
                tracing::warn!(msg.name = event.name(), "Driver has stopped, dropped");
                false
            }
        }
    }
}

pub fn channel(capacity: usize) -> (HostEventSender, mpsc::Receiver<HostEvent>) {
    let (sender, receiver) = mpsc::channel(capacity);
    (HostEventSender { sender }, receiver)
}

/// Processes host events one by one and polls the orchestrator periodically.
///
/// Returns the final refresh state when every sender has been dropped.
pub async fn run<P>(
    mut orchestrator: Orchestrator<P>,
    mut receiver: mpsc::Receiver<HostEvent>,
    poll_interval: Duration,
) -> RefreshState
where
    P: Push,
{
    tracing::debug!(?poll_interval, "Started");
    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            event = receiver.recv() => {
                match event {
                    Some(event) => orchestrator.handle(event).await,
                    None => break,
                }
            }
            _ = ticker.tick() => {
                orchestrator.poll().await;
            }
        }
    }
    tracing::debug!("Stopped");
    orchestrator.state().clone()
}
