// MeshTail - app/forwarder.rs
//
// Peer side of the remote stream: while an aggregator has asked for our
// lines (Control enable), every recorded local line is queued and sent to
// it as a Line frame.
//
// The recorder calls `offer` from inside the tracing pipeline, so `offer`
// never blocks and never logs: a full queue drops the line and bumps a
// counter. The send loop does not log per line either, otherwise a failing
// send would generate another line to forward.

use crate::core::model::NodeAddress;
use crate::core::wire::{FrameStamper, MeshMessage};
use crate::platform::transport::MeshTransport;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{mpsc, watch};

pub struct Forwarder {
    target: Mutex<Option<NodeAddress>>,
    queue: mpsc::Sender<String>,
    forwarded: AtomicU64,
    dropped: AtomicU64,
}

/// Receiving half of the forward queue, consumed by `run_forwarder`.
pub struct ForwardQueue(mpsc::Receiver<String>);

impl Forwarder {
    pub fn new(depth: usize) -> (Arc<Self>, ForwardQueue) {
        let (tx, rx) = mpsc::channel(depth.max(1));
        let forwarder = Arc::new(Self {
            target: Mutex::new(None),
            queue: tx,
            forwarded: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        });
        (forwarder, ForwardQueue(rx))
    }

    fn lock(&self) -> MutexGuard<'_, Option<NodeAddress>> {
        self.target.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start forwarding to `aggregator`, replacing any previous target.
    pub fn enable(&self, aggregator: NodeAddress) {
        *self.lock() = Some(aggregator);
    }

    /// Stop forwarding if `aggregator` is the current target. A stale
    /// disable from an aggregator we no longer serve is ignored.
    pub fn disable(&self, aggregator: NodeAddress) -> bool {
        let mut target = self.lock();
        if *target == Some(aggregator) {
            *target = None;
            true
        } else {
            false
        }
    }

    pub fn target(&self) -> Option<NodeAddress> {
        *self.lock()
    }

    pub fn is_active(&self) -> bool {
        self.lock().is_some()
    }

    /// Queue one line if forwarding is active.
    pub fn offer(&self, line: &str) {
        if !self.is_active() {
            return;
        }
        if self.queue.try_send(line.to_string()).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn forwarded(&self) -> u64 {
        self.forwarded.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for Forwarder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Forwarder")
            .field("target", &self.target())
            .field("forwarded", &self.forwarded())
            .field("dropped", &self.dropped())
            .finish()
    }
}

/// Drain the forward queue until `shutdown` flips to true.
///
/// The target is read per line, so lines queued before a disable are
/// discarded rather than sent.
pub async fn run_forwarder(
    forwarder: Arc<Forwarder>,
    mut queue: ForwardQueue,
    transport: Arc<dyn MeshTransport>,
    stamper: Arc<FrameStamper>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let line = tokio::select! {
            line = queue.0.recv() => match line {
                Some(line) => line,
                None => return,
            },
            _ = shutdown.changed() => return,
        };
        let Some(target) = forwarder.target() else {
            continue;
        };
        let frame = stamper.encode(MeshMessage::Line { text: line });
        match transport.send(target, &frame) {
            Ok(()) => forwarder.forwarded.fetch_add(1, Ordering::Relaxed),
            Err(_) => forwarder.dropped.fetch_add(1, Ordering::Relaxed),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::wire::Frame;
    use crate::platform::transport::MemoryTransport;

    const AGG: NodeAddress = NodeAddress([0x0a, 0, 0, 0, 0, 1]);
    const OTHER: NodeAddress = NodeAddress([0x0b, 0, 0, 0, 0, 2]);
    const ME: NodeAddress = NodeAddress([0x0c, 0, 0, 0, 0, 3]);

    #[test]
    fn test_offer_is_noop_until_enabled() {
        let (fwd, mut queue) = Forwarder::new(4);
        fwd.offer("ignored");
        assert!(queue.0.try_recv().is_err());
        fwd.enable(AGG);
        fwd.offer("queued");
        assert_eq!(queue.0.try_recv().unwrap(), "queued");
    }

    #[test]
    fn test_disable_only_from_current_target() {
        let (fwd, _queue) = Forwarder::new(4);
        fwd.enable(AGG);
        assert!(!fwd.disable(OTHER));
        assert!(fwd.is_active());
        assert!(fwd.disable(AGG));
        assert!(!fwd.is_active());
    }

    #[test]
    fn test_full_queue_drops_and_counts() {
        let (fwd, _queue) = Forwarder::new(2);
        fwd.enable(AGG);
        for i in 0..5 {
            fwd.offer(&format!("line {i}"));
        }
        assert_eq!(fwd.dropped(), 3);
    }

    #[tokio::test]
    async fn test_run_forwarder_sends_line_frames() {
        let (fwd, queue) = Forwarder::new(8);
        let transport = Arc::new(MemoryTransport::default());
        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(run_forwarder(
            fwd.clone(),
            queue,
            transport.clone(),
            Arc::new(FrameStamper::new(ME)),
            stop_rx,
        ));

        fwd.enable(AGG);
        fwd.offer("hello aggregator");
        for _ in 0..100 {
            if fwd.forwarded() == 1 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        let _ = stop_tx.send(true);
        task.await.unwrap();

        let sent = transport.take_sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, AGG);
        let frame = Frame::decode(&sent[0].1).unwrap();
        assert_eq!(frame.header.sender, ME);
        assert_eq!(
            frame.message,
            MeshMessage::Line {
                text: "hello aggregator".to_string()
            }
        );
    }
}
