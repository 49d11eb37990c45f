// MeshTail - app/node.rs
//
// Mesh-facing loops of a node.
//
// Architecture:
//   - `run_inbound` owns the receive side of the UDP transport. Each
//     datagram is decoded; malformed or foreign frames are dropped at the
//     boundary and never partially applied. Valid frames teach the
//     transport where their sender lives, then go to `InboundHandler`.
//   - `run_announcer` periodically tells the configured aggregator who we
//     are, so it can list us and address control frames to us.
//   - Both loops stop when the shared `watch` shutdown flag flips, the async
//     equivalent of the cancel flag the tail watcher checks between polls.

use crate::app::forwarder::Forwarder;
use crate::app::view::{Acceptance, LiveView};
use crate::core::model::{Label, NodeAddress};
use crate::core::registry::Observation;
use crate::core::wire::{Frame, FrameStamper, MeshMessage};
use crate::platform::transport::UdpTransport;
use crate::util::constants::MAX_FRAME_LEN;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// What the handler did with one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Handled {
    /// Frame claims to come from this node; ignored.
    OwnFrame,
    /// A forwarded line went through the acceptance filter.
    Line(Acceptance),
    /// An announcement reached the registry.
    Announce(Observation),
    /// An aggregator asked us to start forwarding.
    StreamEnabled,
    /// The current aggregator asked us to stop.
    StreamDisabled,
    /// Disable from a node we are not forwarding to.
    StaleDisable,
}

/// Applies decoded frames to the live view and the forwarder.
#[derive(Debug, Clone)]
pub struct InboundHandler {
    view: Arc<LiveView>,
    forwarder: Arc<Forwarder>,
}

impl InboundHandler {
    pub fn new(view: Arc<LiveView>, forwarder: Arc<Forwarder>) -> Self {
        Self { view, forwarder }
    }

    fn local(&self) -> NodeAddress {
        self.view.local().address
    }

    /// Apply one decoded frame and trace the outcome.
    ///
    /// Line frames are not traced: at trace level every forwarded line
    /// would otherwise produce a second event, and with the recorder
    /// installed that event is itself a log line.
    pub fn handle(&self, frame: Frame) -> Handled {
        let sender = frame.header.sender;
        let handled = self.apply(frame);
        if !matches!(handled, Handled::Line(_)) {
            tracing::trace!(node = %sender, ?handled, "Inbound frame handled");
        }
        handled
    }

    fn apply(&self, frame: Frame) -> Handled {
        let sender = frame.header.sender;
        if sender == self.local() {
            return Handled::OwnFrame;
        }
        match frame.message {
            MeshMessage::Line { text } => {
                Handled::Line(self.view.submit_remote_line(sender, &text))
            }
            MeshMessage::Announce { label } => {
                let observed = self.view.observe(sender, Some(label.as_str()));
                if observed == Observation::DroppedFull {
                    tracing::debug!(node = %sender, %label, "Node registry full; announcement ignored");
                }
                Handled::Announce(observed)
            }
            MeshMessage::Control { enable: true } => {
                self.forwarder.enable(sender);
                tracing::info!(aggregator = %sender, "Forwarding local log lines");
                Handled::StreamEnabled
            }
            MeshMessage::Control { enable: false } => {
                if self.forwarder.disable(sender) {
                    tracing::info!(aggregator = %sender, "Stopped forwarding local log lines");
                    Handled::StreamDisabled
                } else {
                    Handled::StaleDisable
                }
            }
        }
    }
}

/// Receive loop. Returns when `shutdown` flips or the socket fails hard.
pub async fn run_inbound(
    transport: Arc<UdpTransport>,
    handler: InboundHandler,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut buf = vec![0u8; MAX_FRAME_LEN];
    loop {
        let received = tokio::select! {
            r = transport.recv(&mut buf) => r,
            _ = shutdown.changed() => return,
        };
        let (n, from) = match received {
            Ok(r) => r,
            Err(e) => {
                // ICMP port-unreachable and friends surface here; keep going.
                tracing::debug!(error = %e, "Mesh receive error");
                continue;
            }
        };

        let frame = match Frame::decode(&buf[..n]) {
            Ok(f) => f,
            Err(e) => {
                tracing::debug!(from = %from, error = %e, "Dropped inbound frame");
                continue;
            }
        };

        let sender = frame.header.sender;
        if sender != handler.local() && transport.learn(sender, from) {
            tracing::debug!(node = %sender, endpoint = %from, "Learned mesh endpoint");
        }

        handler.handle(frame);
    }
}

/// Announce `label` to `aggregator` every `interval` until shutdown.
pub async fn run_announcer(
    transport: Arc<UdpTransport>,
    stamper: Arc<FrameStamper>,
    label: Label,
    aggregator: SocketAddr,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut last_failed = false;
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => return,
        }
        let frame = stamper.encode(MeshMessage::Announce {
            label: label.clone(),
        });
        match transport.send_to_endpoint(aggregator, &frame) {
            Ok(()) => last_failed = false,
            Err(e) => {
                // Warn on the first failure of a streak only.
                if !last_failed {
                    tracing::warn!(aggregator = %aggregator, error = %e, "Announcement not sent");
                }
                last_failed = true;
            }
        }
    }
}
