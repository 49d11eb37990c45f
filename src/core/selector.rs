// MeshTail - core/selector.rs
//
// Decides which single source feeds the ring and drives the remote
// stream on/off control messages.
//
// States: streaming(Local) | streaming(Remote X).
//
// Locking:
//   - `state` guards the current selection and is held only to read or swap
//     a few fields. It is never held while the ring lock is taken, and never
//     while sending or logging (the log recorder reads `state` on every
//     event).
//   - `switching` serialises whole transitions (select, clear, shutdown) so
//     control messages from two concurrent switches cannot interleave. The
//     recorder never takes it.
//
// Acceptance: every arriving line asks `accepting(source)` for the epoch it
// may append into. The answer is the ring generation created by the switch
// that adopted the current selection, so a line admitted just before a
// switch is rejected by the ring if the clear lands first.

use crate::core::model::{NodeAddress, SourceIdentity};
use crate::core::ring::{Generation, RingStore};
use crate::util::error::TransportError;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Outbound side of the control channel ("start/stop forwarding to me").
pub trait ControlSink: Send + Sync {
    fn send_control(&self, to: NodeAddress, enable: bool) -> Result<(), TransportError>;
}

/// Result of `select`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectOutcome {
    /// Same source as before; only the label was refreshed.
    Unchanged,
    /// The buffer was cleared and now follows `current`.
    Switched {
        previous: SourceIdentity,
        current: SourceIdentity,
    },
}

#[derive(Debug)]
struct Selection {
    selected: SourceIdentity,
    /// Remote node we have sent `enable` to and not yet disabled.
    streaming: Option<NodeAddress>,
    epoch: Generation,
}

pub struct StreamSelector {
    local: SourceIdentity,
    state: Mutex<Selection>,
    switching: Mutex<()>,
    control: Arc<dyn ControlSink>,
}

impl StreamSelector {
    /// Start in `streaming(Local)`, accepting into the ring's current epoch.
    pub fn new(local: SourceIdentity, ring: &RingStore, control: Arc<dyn ControlSink>) -> Self {
        Self {
            state: Mutex::new(Selection {
                selected: local.clone(),
                streaming: None,
                epoch: ring.generation(),
            }),
            local,
            switching: Mutex::new(()),
            control,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Selection> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_switch(&self) -> MutexGuard<'_, ()> {
        self.switching.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn local(&self) -> &SourceIdentity {
        &self.local
    }

    pub fn selected(&self) -> SourceIdentity {
        self.lock().selected.clone()
    }

    pub fn is_local_selected(&self) -> bool {
        self.lock().selected == self.local
    }

    /// Remote node currently asked to stream, if any.
    pub fn streaming(&self) -> Option<NodeAddress> {
        self.lock().streaming
    }

    /// Epoch a line from `source` may be appended into, or `None` when
    /// `source` is not the current selection.
    pub fn accepting(&self, source: NodeAddress) -> Option<Generation> {
        let state = self.lock();
        (state.selected.address == source).then_some(state.epoch)
    }

    /// Make `identity` the selected stream.
    ///
    /// Reselecting the current source only refreshes its label. Otherwise:
    /// disable the active remote stream, adopt `identity`, clear the ring,
    /// and enable `identity` unless it is the local node.
    pub fn select(&self, identity: SourceIdentity, ring: &RingStore) -> SelectOutcome {
        let _switch = self.lock_switch();

        let (previous, disable, enable) = {
            let mut state = self.lock();
            if state.selected == identity {
                state.selected.label = identity.label;
                return SelectOutcome::Unchanged;
            }
            let previous = std::mem::replace(&mut state.selected, identity.clone());
            let disable = state.streaming.take();
            let enable = (identity != self.local).then_some(identity.address);
            state.streaming = enable;
            (previous, disable, enable)
        };

        if let Some(old) = disable {
            self.send(old, false);
        }

        let epoch = ring.clear();
        self.lock().epoch = epoch;

        if let Some(new) = enable {
            self.send(new, true);
        }

        tracing::info!(from = %previous, to = %identity, "Log stream switched");
        SelectOutcome::Switched {
            previous,
            current: identity,
        }
    }

    /// Clear the ring without changing the selection.
    pub fn clear(&self, ring: &RingStore) {
        let _switch = self.lock_switch();
        let epoch = ring.clear();
        self.lock().epoch = epoch;
    }

    /// Stop any active remote stream. The selection itself is kept.
    pub fn shutdown(&self) {
        let _switch = self.lock_switch();
        let active = self.lock().streaming.take();
        if let Some(addr) = active {
            self.send(addr, false);
        }
    }

    fn send(&self, to: NodeAddress, enable: bool) {
        // Delivery is best effort; the selection has already moved on.
        if let Err(e) = self.control.send_control(to, enable) {
            tracing::warn!(node = %to, enable, error = %e, "Stream control message not sent");
        }
    }
}

impl std::fmt::Debug for StreamSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamSelector")
            .field("local", &self.local)
            .field("state", &*self.lock())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::Label;
    use crate::core::ring::AppendOutcome;

    #[derive(Default)]
    struct RecordingControl {
        sent: Mutex<Vec<(NodeAddress, bool)>>,
    }

    impl ControlSink for RecordingControl {
        fn send_control(&self, to: NodeAddress, enable: bool) -> Result<(), TransportError> {
            self.sent.lock().unwrap().push((to, enable));
            Ok(())
        }
    }

    impl RecordingControl {
        fn take(&self) -> Vec<(NodeAddress, bool)> {
            std::mem::take(&mut *self.sent.lock().unwrap())
        }
    }

    fn ident(n: u8, label: &str) -> SourceIdentity {
        SourceIdentity::new(NodeAddress([2, 0, 0, 0, 0, n]), Label::new(label))
    }

    fn setup() -> (StreamSelector, RingStore, Arc<RecordingControl>) {
        let ring = RingStore::new(8);
        let control = Arc::new(RecordingControl::default());
        let sel = StreamSelector::new(ident(0, "node0"), &ring, control.clone());
        (sel, ring, control)
    }

    #[test]
    fn test_starts_on_local_without_control_traffic() {
        let (sel, _ring, control) = setup();
        assert!(sel.is_local_selected());
        assert_eq!(sel.streaming(), None);
        assert!(control.take().is_empty());
    }

    #[test]
    fn test_switch_to_remote_clears_and_enables() {
        let (sel, ring, control) = setup();
        ring.append("local line");
        let remote = ident(1, "a");
        let outcome = sel.select(remote.clone(), &ring);
        assert!(matches!(outcome, SelectOutcome::Switched { .. }));
        assert!(ring.window().is_empty());
        assert_eq!(control.take(), vec![(remote.address, true)]);
        assert_eq!(sel.streaming(), Some(remote.address));
    }

    #[test]
    fn test_reselecting_same_source_is_idempotent() {
        let (sel, ring, control) = setup();
        let remote = ident(1, "a");
        sel.select(remote.clone(), &ring);
        ring.append("from a");
        let gen = ring.generation();

        let outcome = sel.select(ident(1, "renamed"), &ring);
        assert_eq!(outcome, SelectOutcome::Unchanged);
        assert_eq!(ring.generation(), gen, "no second clear");
        assert_eq!(ring.window().len(), 1);
        assert_eq!(control.take(), vec![(remote.address, true)]);
        assert_eq!(sel.selected().label.as_str(), "renamed");
    }

    #[test]
    fn test_remote_to_remote_disables_then_enables() {
        let (sel, ring, control) = setup();
        let a = ident(1, "a");
        let b = ident(2, "b");
        sel.select(a.clone(), &ring);
        sel.select(b.clone(), &ring);
        assert_eq!(
            control.take(),
            vec![(a.address, true), (a.address, false), (b.address, true)]
        );
    }

    #[test]
    fn test_back_to_local_disables_remote_only() {
        let (sel, ring, control) = setup();
        let a = ident(1, "a");
        sel.select(a.clone(), &ring);
        sel.select(ident(0, "node0"), &ring);
        assert_eq!(control.take(), vec![(a.address, true), (a.address, false)]);
        assert!(sel.is_local_selected());
        assert_eq!(sel.streaming(), None);
    }

    #[test]
    fn test_acceptance_follows_selection() {
        let (sel, ring, _control) = setup();
        let a = ident(1, "a");
        assert!(sel.accepting(a.address).is_none());
        let stale = sel.accepting(ident(0, "").address).unwrap();
        sel.select(a.clone(), &ring);
        // A local line admitted before the switch cannot land after it.
        assert_eq!(ring.append_in(stale, "late"), AppendOutcome::StaleGeneration);
        let epoch = sel.accepting(a.address).unwrap();
        assert_eq!(ring.append_in(epoch, "remote"), AppendOutcome::Stored(0));
    }

    #[test]
    fn test_clear_keeps_selection_and_acceptance() {
        let (sel, ring, control) = setup();
        ring.append("x");
        sel.clear(&ring);
        assert!(ring.window().is_empty());
        assert!(sel.is_local_selected());
        let epoch = sel.accepting(sel.local().address).unwrap();
        assert_eq!(ring.append_in(epoch, "y"), AppendOutcome::Stored(0));
        assert!(control.take().is_empty());
    }

    #[test]
    fn test_shutdown_disables_active_stream_once() {
        let (sel, ring, control) = setup();
        let a = ident(1, "a");
        sel.select(a.clone(), &ring);
        control.take();
        sel.shutdown();
        sel.shutdown();
        assert_eq!(control.take(), vec![(a.address, false)]);
    }
}
