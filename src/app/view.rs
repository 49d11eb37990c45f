// MeshTail - app/view.rs
//
// The live view: one explicitly constructed context object that owns the
// ring, the node registry and the stream selector for this process.
//
// Every endpoint, the log recorder and the inbound mesh loop share one
// `Arc<LiveView>`. Each owned component guards its own state with a short
// lock and no method here holds two of those locks at once.
//
// Lifecycle: `new` starts on the local stream with an empty ring;
// `shutdown` releases any remote stream before the process exits.

use crate::core::model::{Label, NodeAddress, SourceIdentity};
use crate::core::registry::{ListedNode, NodeRegistry, Observation};
use crate::core::ring::{AppendOutcome, RingStore};
use crate::core::selector::{ControlSink, SelectOutcome, StreamSelector};
use crate::core::snapshot::{Snapshot, SnapshotBuilder};
use crate::util::constants;
use crate::util::error::SnapshotError;
use std::sync::Arc;

/// Sizing for the live view, normally taken from the validated config.
#[derive(Debug, Clone, Copy)]
pub struct ViewSettings {
    pub ring_lines: usize,
    pub max_snapshot_bytes: usize,
    pub max_nodes: usize,
}

impl Default for ViewSettings {
    fn default() -> Self {
        Self {
            ring_lines: constants::DEFAULT_RING_LINES,
            max_snapshot_bytes: constants::DEFAULT_MAX_SNAPSHOT_BYTES,
            max_nodes: constants::DEFAULT_MAX_NODES,
        }
    }
}

/// What happened to one submitted line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acceptance {
    /// Appended under this sequence number.
    Stored(u64),
    /// The line's source is not the selected stream; dropped.
    NotSelected,
    /// A stream switch or clear raced the line; dropped.
    Superseded,
}

/// Registry listing plus the current selection.
#[derive(Debug, Clone)]
pub struct NodeListing {
    pub selected: SourceIdentity,
    pub nodes: Vec<ListedNode>,
}

#[derive(Debug)]
pub struct LiveView {
    local: SourceIdentity,
    ring: RingStore,
    registry: NodeRegistry,
    selector: StreamSelector,
    snapshots: SnapshotBuilder,
}

impl LiveView {
    pub fn new(local: SourceIdentity, settings: ViewSettings, control: Arc<dyn ControlSink>) -> Self {
        let ring = RingStore::new(settings.ring_lines);
        let selector = StreamSelector::new(local.clone(), &ring, control);
        Self {
            local,
            ring,
            registry: NodeRegistry::new(settings.max_nodes),
            selector,
            snapshots: SnapshotBuilder::new(settings.max_snapshot_bytes),
        }
    }

    pub fn local(&self) -> &SourceIdentity {
        &self.local
    }

    pub fn ring(&self) -> &RingStore {
        &self.ring
    }

    pub fn selected(&self) -> SourceIdentity {
        self.selector.selected()
    }

    pub fn is_local_selected(&self) -> bool {
        self.selector.is_local_selected()
    }

    /// Store a line produced by this process.
    pub fn record_local(&self, line: &str) -> Acceptance {
        self.accept(self.local.address, line)
    }

    /// Store a line forwarded by `sender`, if it is the selected stream.
    /// Checked per line: the selection may change between two lines.
    pub fn submit_remote_line(&self, sender: NodeAddress, line: &str) -> Acceptance {
        self.accept(sender, line)
    }

    fn accept(&self, source: NodeAddress, line: &str) -> Acceptance {
        let Some(epoch) = self.selector.accepting(source) else {
            return Acceptance::NotSelected;
        };
        match self.ring.append_in(epoch, line) {
            AppendOutcome::Stored(seq) => Acceptance::Stored(seq),
            AppendOutcome::StaleGeneration => Acceptance::Superseded,
        }
    }

    /// Record an identity announcement.
    pub fn observe(&self, sender: NodeAddress, label: Option<&str>) -> Observation {
        self.registry.observe(sender, label)
    }

    /// Select by address, resolving the label from the local identity or
    /// the registry (falling back to the generic label).
    pub fn select_address(&self, address: NodeAddress) -> SelectOutcome {
        let label = if address == self.local.address {
            self.local.label.clone()
        } else {
            self.registry.label_of(address).unwrap_or_default()
        };
        self.select(SourceIdentity::new(address, label))
    }

    pub fn select(&self, identity: SourceIdentity) -> SelectOutcome {
        self.selector.select(identity, &self.ring)
    }

    /// Empty the buffer; the selection is unchanged.
    pub fn clear(&self) {
        self.selector.clear(&self.ring);
    }

    pub fn snapshot(&self, from: u64) -> Result<Snapshot, SnapshotError> {
        self.snapshots.build(&self.ring, from)
    }

    pub fn nodes(&self) -> NodeListing {
        let selected = self.selector.selected();
        let nodes = self.registry.list(&self.local, &selected);
        NodeListing { selected, nodes }
    }

    /// Release any remote stream. Safe to call more than once.
    pub fn shutdown(&self) {
        self.selector.shutdown();
    }
}

/// Convenience for building the local identity from config strings.
pub fn local_identity(address: NodeAddress, label: &str) -> SourceIdentity {
    SourceIdentity::new(address, Label::new(label))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::error::TransportError;
    use std::sync::Mutex;

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

    const LOCAL: NodeAddress = NodeAddress([2, 0, 0, 0, 0, 1]);
    const REMOTE_A: NodeAddress = NodeAddress([0xa0, 0, 0, 0, 0, 0xa]);
    const REMOTE_B: NodeAddress = NodeAddress([0xb0, 0, 0, 0, 0, 0xb]);

    fn view_with(ring_lines: usize, max_nodes: usize) -> (LiveView, Arc<RecordingControl>) {
        let control = Arc::new(RecordingControl::default());
        let settings = ViewSettings {
            ring_lines,
            max_nodes,
            ..ViewSettings::default()
        };
        let view = LiveView::new(local_identity(LOCAL, "node0"), settings, control.clone());
        (view, control)
    }

    fn lines(view: &LiveView) -> Vec<String> {
        view.snapshot(0)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_remote_selection_scenario() {
        let (view, control) = view_with(16, 8);
        view.record_local("boot");

        view.select_address(REMOTE_A);
        assert!(lines(&view).is_empty());
        assert_eq!(*control.sent.lock().unwrap(), vec![(REMOTE_A, true)]);

        assert_eq!(view.submit_remote_line(REMOTE_A, "from a"), Acceptance::Stored(0));
        assert_eq!(
            view.submit_remote_line(REMOTE_B, "from b"),
            Acceptance::NotSelected
        );
        assert_eq!(view.record_local("local while remote"), Acceptance::NotSelected);
        assert_eq!(lines(&view), vec!["from a"]);

        view.select_address(LOCAL);
        assert!(lines(&view).is_empty());
        assert_eq!(
            *control.sent.lock().unwrap(),
            vec![(REMOTE_A, true), (REMOTE_A, false)]
        );
    }

    #[test]
    fn test_switch_back_never_resurrects_old_lines() {
        let (view, _control) = view_with(16, 8);
        view.select_address(REMOTE_A);
        view.submit_remote_line(REMOTE_A, "a1");
        view.select_address(REMOTE_B);
        view.submit_remote_line(REMOTE_A, "a-while-b");
        view.submit_remote_line(REMOTE_B, "b1");
        view.select_address(REMOTE_A);
        assert!(lines(&view).is_empty());
        view.submit_remote_line(REMOTE_A, "a2");
        assert_eq!(lines(&view), vec!["a2"]);
    }

    #[test]
    fn test_select_uses_registry_label() {
        let (view, _control) = view_with(16, 8);
        view.observe(REMOTE_A, Some("garage"));
        view.select_address(REMOTE_A);
        assert_eq!(view.selected().label.as_str(), "garage");
        view.select_address(REMOTE_B);
        assert_eq!(view.selected().label, Label::default());
    }

    #[test]
    fn test_listing_keeps_unregistered_selection() {
        let (view, _control) = view_with(16, 1);
        view.observe(REMOTE_A, Some("x"));
        view.observe(REMOTE_B, Some("y"));
        view.select_address(REMOTE_B);
        let listing = view.nodes();
        let addrs: Vec<_> = listing.nodes.iter().map(|n| n.identity.address).collect();
        assert_eq!(addrs, vec![LOCAL, REMOTE_A, REMOTE_B]);
        assert_eq!(listing.selected.address, REMOTE_B);
    }

    #[test]
    fn test_clear_keeps_stream() {
        let (view, control) = view_with(16, 8);
        view.select_address(REMOTE_A);
        view.submit_remote_line(REMOTE_A, "before");
        view.clear();
        assert!(lines(&view).is_empty());
        view.submit_remote_line(REMOTE_A, "after");
        assert_eq!(lines(&view), vec!["after"]);
        assert_eq!(control.sent.lock().unwrap().len(), 1);
    }
}
