// MeshTail - app/recorder.rs
//
// Log capture at the point of origin.
//
// The recorder is a `tracing_subscriber::Layer` stacked after the stderr
// formatter, so every event the filter admits is first written to the
// original sink unchanged and then handed here. The recorder derives one
// timestamp-prefixed line per event and:
//   - stores it in the live view when the local stream is selected;
//   - offers it to the forwarder when an aggregator asked for our lines.
//
// Re-entrancy: this runs inside every `tracing` call in the process. It
// takes the selection lock and the ring lock one after the other and never
// emits events itself.

use crate::app::forwarder::Forwarder;
use crate::app::view::LiveView;
use crate::util::constants::{MIN_SYNCED_YEAR, NO_TIME_PREFIX, TIMESTAMP_FORMAT};
use chrono::{Datelike, Local, NaiveDateTime};
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

// =============================================================================
// Time source
// =============================================================================

/// Supplies local wall-clock time for line prefixes.
pub trait TimeSource: Send + Sync {
    /// Current local time, or `None` while the clock is not synchronised.
    fn now(&self) -> Option<NaiveDateTime>;
}

/// System local time. Readings before `MIN_SYNCED_YEAR` are treated as an
/// unsynchronised clock (a freshly booted board starts at 1970).
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalClock;

impl TimeSource for LocalClock {
    fn now(&self) -> Option<NaiveDateTime> {
        let now = Local::now().naive_local();
        (now.year() >= MIN_SYNCED_YEAR).then_some(now)
    }
}

/// `[YYYY-MM-DD HH:MM:SS] ` or `[no-time] `.
pub fn time_prefix(now: Option<NaiveDateTime>) -> String {
    match now {
        Some(t) => format!("[{}] ", t.format(TIMESTAMP_FORMAT)),
        None => NO_TIME_PREFIX.to_string(),
    }
}

/// Single-letter severity used by the viewer for colouring.
pub fn level_letter(level: &Level) -> char {
    match *level {
        Level::ERROR => 'E',
        Level::WARN => 'W',
        Level::INFO => 'I',
        Level::DEBUG => 'D',
        Level::TRACE => 'V',
    }
}

// =============================================================================
// Recorder layer
// =============================================================================

pub struct LogRecorder {
    view: Arc<LiveView>,
    forwarder: Option<Arc<Forwarder>>,
    clock: Arc<dyn TimeSource>,
}

impl LogRecorder {
    pub fn new(view: Arc<LiveView>, clock: Arc<dyn TimeSource>) -> Self {
        Self {
            view,
            forwarder: None,
            clock,
        }
    }

    /// Also offer every recorded line to `forwarder`.
    pub fn with_forwarder(mut self, forwarder: Arc<Forwarder>) -> Self {
        self.forwarder = Some(forwarder);
        self
    }

    fn wanted(&self) -> bool {
        self.view.is_local_selected() || self.forwarder.as_ref().is_some_and(|f| f.is_active())
    }

    /// Build the stored form of one event.
    pub fn format_line(&self, level: &Level, target: &str, body: &str) -> String {
        let mut line = time_prefix(self.clock.now());
        let _ = write!(line, "{} {target}: {body}", level_letter(level));
        line
    }

    fn deliver(&self, line: &str) {
        // The acceptance filter is re-evaluated inside; a switch between
        // `wanted` and here simply drops the line.
        self.view.record_local(line);
        if let Some(forwarder) = &self.forwarder {
            forwarder.offer(line);
        }
    }
}

impl<S: Subscriber> Layer<S> for LogRecorder {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if !self.wanted() {
            return;
        }
        let meta = event.metadata();
        let mut visitor = LineVisitor::default();
        event.record(&mut visitor);
        let line = self.format_line(meta.level(), meta.target(), &visitor.finish());
        self.deliver(&line);
    }
}

/// Collects the message and fields of one event into `message k=v ...`.
#[derive(Default)]
struct LineVisitor {
    message: String,
    fields: String,
}

impl LineVisitor {
    fn finish(self) -> String {
        if self.message.is_empty() {
            self.fields.trim_start().to_string()
        } else {
            self.message + &self.fields
        }
    }
}

impl Visit for LineVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            let _ = write!(self.fields, " {}={value}", field.name());
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{value:?}");
        } else {
            let _ = write!(self.fields, " {}={value:?}", field.name());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::view::{local_identity, ViewSettings};
    use crate::core::model::NodeAddress;
    use crate::core::selector::ControlSink;
    use crate::util::error::TransportError;
    use chrono::NaiveDate;
    use tracing_subscriber::layer::SubscriberExt;

    struct FixedClock(Option<NaiveDateTime>);

    impl TimeSource for FixedClock {
        fn now(&self) -> Option<NaiveDateTime> {
            self.0
        }
    }

    struct NoControl;

    impl ControlSink for NoControl {
        fn send_control(&self, _to: NodeAddress, _enable: bool) -> Result<(), TransportError> {
            Ok(())
        }
    }

    fn noon() -> Option<NaiveDateTime> {
        NaiveDate::from_ymd_opt(2024, 5, 1).and_then(|d| d.and_hms_opt(12, 0, 5))
    }

    fn view() -> Arc<LiveView> {
        Arc::new(LiveView::new(
            local_identity(NodeAddress([2, 0, 0, 0, 0, 1]), "node0"),
            ViewSettings::default(),
            Arc::new(NoControl),
        ))
    }

    fn captured(view: &LiveView) -> Vec<String> {
        view.snapshot(0)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_prefix_formats() {
        assert_eq!(time_prefix(noon()), "[2024-05-01 12:00:05] ");
        assert_eq!(time_prefix(None), NO_TIME_PREFIX);
    }

    #[test]
    fn test_events_land_in_ring_with_prefix_and_fields() {
        let view = view();
        let recorder = LogRecorder::new(view.clone(), Arc::new(FixedClock(noon())));
        let subscriber = tracing_subscriber::registry().with(recorder);
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(target: "wifi", rssi = -61, "connected");
            tracing::warn!(target: "mesh", "parent lost");
        });
        assert_eq!(
            captured(&view),
            vec![
                "[2024-05-01 12:00:05] I wifi: connected rssi=-61",
                "[2024-05-01 12:00:05] W mesh: parent lost",
            ]
        );
    }

    #[test]
    fn test_unsynced_clock_uses_no_time_marker() {
        let view = view();
        let recorder = LogRecorder::new(view.clone(), Arc::new(FixedClock(None)));
        let subscriber = tracing_subscriber::registry().with(recorder);
        tracing::subscriber::with_default(subscriber, || {
            tracing::debug!(target: "boot", "early");
        });
        assert_eq!(captured(&view), vec!["[no-time] D boot: early"]);
    }

    #[test]
    fn test_nothing_recorded_while_remote_selected() {
        let view = view();
        view.select_address(NodeAddress([0xa0, 0, 0, 0, 0, 1]));
        let recorder = LogRecorder::new(view.clone(), Arc::new(FixedClock(noon())));
        let subscriber = tracing_subscriber::registry().with(recorder);
        tracing::subscriber::with_default(subscriber, || {
            tracing::error!(target: "app", "not buffered here");
        });
        assert!(captured(&view).is_empty());
    }

    #[test]
    fn test_level_letters() {
        assert_eq!(level_letter(&Level::TRACE), 'V');
        assert_eq!(level_letter(&Level::ERROR), 'E');
    }
}
