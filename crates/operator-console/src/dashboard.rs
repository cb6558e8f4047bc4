//! Dashboard: run-state mirror, live feed, alerts and the activity log.
//!
//! Run state is only ever changed by server pushes. Operator actions
//! become intents and wait for the echo.

use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, Instant};

use common::events::{ClientIntent, DetectionStats, LogLevel, ServerEvent, StatusUpdate};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::frame::FrameSurface;
use crate::notify::LogBook;
use crate::socket::IntentSink;

/// Alerts shown at once, newest first.
pub const MAX_ALERTS: usize = 10;

/// How long the alert indicator stays lit after the latest alert.
pub const ALERT_INDICATOR_HOLD: Duration = Duration::from_millis(3500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Stopped,
    Running,
    Paused,
}

impl RunState {
    pub fn from_flags(running: bool, paused: bool) -> Self {
        match (running, paused) {
            (false, _) => RunState::Stopped,
            (true, false) => RunState::Running,
            (true, true) => RunState::Paused,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartLabel {
    Start,
    Resume,
}

impl fmt::Display for StartLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartLabel::Start => write!(f, "Start"),
            StartLabel::Resume => write!(f, "Resume"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlPanel {
    pub start_enabled: bool,
    pub start_label: StartLabel,
    pub pause_enabled: bool,
    pub stop_enabled: bool,
}

impl ControlPanel {
    pub fn for_state(state: RunState) -> Self {
        match state {
            RunState::Stopped => Self {
                start_enabled: true,
                start_label: StartLabel::Start,
                pause_enabled: false,
                stop_enabled: false,
            },
            RunState::Running => Self {
                start_enabled: false,
                start_label: StartLabel::Start,
                pause_enabled: true,
                stop_enabled: true,
            },
            RunState::Paused => Self {
                start_enabled: true,
                start_label: StartLabel::Resume,
                pause_enabled: false,
                stop_enabled: true,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusBadge {
    Stopped,
    Active,
    Paused,
}

impl StatusBadge {
    pub fn for_state(state: RunState) -> Self {
        match state {
            RunState::Stopped => StatusBadge::Stopped,
            RunState::Running => StatusBadge::Active,
            RunState::Paused => StatusBadge::Paused,
        }
    }
}

impl fmt::Display for StatusBadge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusBadge::Stopped => write!(f, "Stopped"),
            StatusBadge::Active => write!(f, "Active"),
            StatusBadge::Paused => write!(f, "Paused"),
        }
    }
}

/// Counters formatted for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsView {
    pub fps: String,
    pub frames: String,
    pub detections: String,
    pub tracks: String,
    pub in_zone: String,
    pub filtered: String,
    pub alerts: String,
}

impl From<&DetectionStats> for StatsView {
    fn from(stats: &DetectionStats) -> Self {
        Self {
            fps: format!("{:.1}", stats.fps),
            frames: group_thousands(stats.frame_count),
            detections: stats.detections.to_string(),
            tracks: stats.tracks_active.to_string(),
            in_zone: stats.in_zone.to_string(),
            filtered: stats.filtered.to_string(),
            alerts: stats.alerts.to_string(),
        }
    }
}

fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlertEntry {
    pub track_id: i64,
    pub message: String,
    pub timestamp: String,
}

#[derive(Debug, Default)]
pub struct AlertFeed {
    entries: VecDeque<AlertEntry>,
    indicator_until: Option<Instant>,
}

impl AlertFeed {
    pub fn push(&mut self, track_id: i64, message: impl Into<String>, now: Instant) {
        self.entries.push_front(AlertEntry {
            track_id,
            message: message.into(),
            timestamp: chrono::Local::now().format("%H:%M:%S").to_string(),
        });
        self.entries.truncate(MAX_ALERTS);
        self.indicator_until = Some(now + ALERT_INDICATOR_HOLD);
    }

    /// Newest first.
    pub fn entries(&self) -> impl Iterator<Item = &AlertEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn indicator_visible(&self, now: Instant) -> bool {
        self.indicator_until.map_or(false, |until| now < until)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationDecision {
    Proceed(String),
    /// Detection is running; the operator must confirm before leaving.
    Confirm { target: String, destination: String },
}

/// Human name of a console page, for the leave prompt.
pub fn destination_name(target: &str) -> &'static str {
    if target.contains("/settings") {
        "Settings"
    } else if target.contains("/zones") {
        "Zone Editor"
    } else {
        "another page"
    }
}

pub struct Dashboard {
    running: bool,
    paused: bool,
    connected: bool,
    controls: ControlPanel,
    badge: StatusBadge,
    surface: FrameSurface,
    stats: Option<StatsView>,
    alerts: AlertFeed,
    log: LogBook,
    pending_leave: Option<String>,
}

impl Default for Dashboard {
    fn default() -> Self {
        Self::new()
    }
}

impl Dashboard {
    pub fn new() -> Self {
        let mut dashboard = Self {
            running: false,
            paused: false,
            connected: false,
            controls: ControlPanel::for_state(RunState::Stopped),
            badge: StatusBadge::Stopped,
            surface: FrameSurface::new(),
            stats: None,
            alerts: AlertFeed::default(),
            log: LogBook::new(),
            pending_leave: None,
        };
        dashboard.log.push(LogLevel::Info, "Dashboard loaded. Waiting for connection...");
        dashboard
    }

    pub fn run_state(&self) -> RunState {
        RunState::from_flags(self.running, self.paused)
    }

    pub fn controls(&self) -> ControlPanel {
        self.controls
    }

    pub fn badge(&self) -> StatusBadge {
        self.badge
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn surface(&self) -> &FrameSurface {
        &self.surface
    }

    pub fn stats(&self) -> Option<&StatsView> {
        self.stats.as_ref()
    }

    pub fn alerts(&self) -> &AlertFeed {
        &self.alerts
    }

    pub fn log(&self) -> &LogBook {
        &self.log
    }

    /// Applies a run state and everything derived from it in one step.
    fn apply_state(&mut self, running: bool, paused: bool) {
        self.running = running;
        self.paused = paused;
        let state = self.run_state();
        self.controls = ControlPanel::for_state(state);
        self.badge = StatusBadge::for_state(state);
        if state == RunState::Stopped {
            self.surface.hide();
        }
        debug!(state = ?state, "run state applied");
    }

    pub fn on_connected(&mut self) {
        self.connected = true;
        self.log.push(LogLevel::Success, "Connected to server");
        self.controls.start_enabled = true;
    }

    pub fn on_disconnected(&mut self) {
        self.connected = false;
        self.log.push(LogLevel::Warning, "Disconnected from server");
        self.apply_state(false, false);
    }

    pub fn handle(&mut self, event: &ServerEvent) {
        self.handle_at(event, Instant::now());
    }

    pub fn handle_at(&mut self, event: &ServerEvent, now: Instant) {
        match event {
            ServerEvent::Status(update) => self.on_status(update),
            ServerEvent::VideoFrame(frame) => {
                if let Err(e) = self.surface.paint(&frame.frame) {
                    warn!(error = %e, "dropping undecodable frame");
                }
                if let Some(stats) = &frame.stats {
                    self.stats = Some(StatsView::from(stats));
                }
            }
            ServerEvent::Alert(alert) => {
                self.alerts.push(alert.track_id, alert.message.clone(), now);
                self.log
                    .push(LogLevel::Danger, format!("ALERT: {}", alert.message));
            }
            ServerEvent::Log(line) => self.log.push(line.level, line.message.clone()),
            ServerEvent::StreamError(err) => {
                self.log
                    .push(LogLevel::Error, format!("Stream error: {}", err.message));
            }
            other => debug!(event = other.name(), "ignored by dashboard"),
        }
    }

    fn on_status(&mut self, update: &StatusUpdate) {
        let running = update.running.unwrap_or(self.running);
        let paused = update.paused.unwrap_or(false);
        self.apply_state(running, paused);
        if let Some(stats) = &update.stats {
            self.stats = Some(StatsView::from(stats));
        }
    }

    /// Start when stopped, resume when paused. Returns whether an intent
    /// was sent.
    pub async fn start(&mut self, sink: &dyn IntentSink) -> Result<bool> {
        if !self.running {
            sink.send(ClientIntent::StartDetection).await?;
            self.log.push(LogLevel::Info, "Starting system...");
            Ok(true)
        } else if self.paused {
            sink.send(ClientIntent::PauseDetection).await?;
            self.log.push(LogLevel::Info, "Resuming...");
            Ok(true)
        } else {
            Ok(false)
        }
    }

    pub async fn pause(&mut self, sink: &dyn IntentSink) -> Result<bool> {
        if self.running && !self.paused {
            sink.send(ClientIntent::PauseDetection).await?;
            self.log.push(LogLevel::Info, "Pausing system...");
            Ok(true)
        } else {
            Ok(false)
        }
    }

    pub async fn stop(&mut self, sink: &dyn IntentSink) -> Result<()> {
        sink.send(ClientIntent::StopDetection).await?;
        self.log.push(LogLevel::Info, "Stopping system...");
        Ok(())
    }

    pub fn request_leave(&mut self, target: impl Into<String>) -> NavigationDecision {
        let target = target.into();
        if !self.running {
            return NavigationDecision::Proceed(target);
        }
        let destination = destination_name(&target).to_string();
        info!(target = %target, "leave requested while running");
        self.pending_leave = Some(target.clone());
        NavigationDecision::Confirm {
            target,
            destination,
        }
    }

    pub fn cancel_leave(&mut self) {
        self.pending_leave = None;
    }

    /// Sends a stop and waits `grace` before handing back the target.
    /// The wait is best effort: the stop is not confirmed.
    pub async fn confirm_leave(
        &mut self,
        sink: &dyn IntentSink,
        grace: Duration,
    ) -> Result<Option<String>> {
        let Some(target) = self.pending_leave.take() else {
            return Ok(None);
        };
        if self.running {
            sink.send(ClientIntent::StopDetection).await?;
            self.log
                .push(LogLevel::Warning, "Stopping system before leaving...");
            tokio::time::sleep(grace).await;
        }
        Ok(Some(target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::tests::encoded_frame;
    use crate::socket::tests::RecordingSink;
    use common::events::{AlertEvent, FramePayload, LogEvent};

    fn status(running: Option<bool>, paused: Option<bool>) -> ServerEvent {
        ServerEvent::Status(StatusUpdate {
            running,
            paused,
            stats: None,
        })
    }

    #[test]
    fn controls_follow_run_state() {
        let mut dash = Dashboard::new();

        dash.handle(&status(Some(true), Some(false)));
        let c = dash.controls();
        assert!(c.pause_enabled && !c.start_enabled && c.stop_enabled);
        assert_eq!(dash.badge(), StatusBadge::Active);

        dash.handle(&status(Some(true), Some(true)));
        let c = dash.controls();
        assert!(!c.pause_enabled && c.start_enabled);
        assert_eq!(c.start_label, StartLabel::Resume);
        assert_eq!(dash.badge(), StatusBadge::Paused);

        dash.handle(&status(Some(false), None));
        let c = dash.controls();
        assert!(c.start_enabled && !c.pause_enabled && !c.stop_enabled);
        assert_eq!(c.start_label, StartLabel::Start);
        assert_eq!(dash.badge(), StatusBadge::Stopped);
    }

    #[test]
    fn pause_echo_without_running_keeps_running() {
        let mut dash = Dashboard::new();
        dash.handle(&status(Some(true), None));
        dash.handle(&status(None, Some(true)));
        assert_eq!(dash.run_state(), RunState::Paused);
    }

    #[test]
    fn frames_update_stats_but_not_state() {
        let mut dash = Dashboard::new();
        dash.handle(&ServerEvent::VideoFrame(FramePayload {
            frame: encoded_frame(4, 4),
            width: None,
            height: None,
            stats: Some(DetectionStats {
                fps: 14.96,
                frame_count: 1_234_567,
                detections: 3,
                ..Default::default()
            }),
        }));
        assert_eq!(dash.run_state(), RunState::Stopped);
        assert!(dash.surface().is_visible());
        let stats = dash.stats().unwrap();
        assert_eq!(stats.fps, "15.0");
        assert_eq!(stats.frames, "1,234,567");
        assert_eq!(stats.detections, "3");

        dash.handle(&status(Some(false), None));
        assert!(!dash.surface().is_visible());
    }

    #[test]
    fn thousands_grouping() {
        assert_eq!(group_thousands(0), "0");
        assert_eq!(group_thousands(999), "999");
        assert_eq!(group_thousands(1000), "1,000");
        assert_eq!(group_thousands(12_345_678), "12,345,678");
    }

    #[test]
    fn alerts_are_newest_first_and_capped() {
        let mut dash = Dashboard::new();
        let now = Instant::now();
        for id in 0..15 {
            dash.handle_at(
                &ServerEvent::Alert(AlertEvent {
                    track_id: id,
                    message: format!("person {} in zone", id),
                }),
                now,
            );
        }
        assert_eq!(dash.alerts().len(), MAX_ALERTS);
        assert_eq!(dash.alerts().entries().next().unwrap().track_id, 14);
        assert!(dash.alerts().indicator_visible(now + Duration::from_secs(3)));
        assert!(!dash.alerts().indicator_visible(now + ALERT_INDICATOR_HOLD));
        assert_eq!(dash.log().last().unwrap().level, LogLevel::Danger);
    }

    #[test]
    fn log_events_keep_level() {
        let mut dash = Dashboard::new();
        dash.handle(&ServerEvent::Log(LogEvent {
            message: "model loaded".into(),
            level: LogLevel::Success,
        }));
        let last = dash.log().last().unwrap();
        assert_eq!(last.message, "model loaded");
        assert_eq!(last.level, LogLevel::Success);
    }

    #[test]
    fn disconnect_forces_stopped_look() {
        let mut dash = Dashboard::new();
        dash.on_connected();
        dash.handle(&status(Some(true), Some(false)));
        dash.on_disconnected();
        assert_eq!(dash.run_state(), RunState::Stopped);
        assert_eq!(dash.badge(), StatusBadge::Stopped);
        assert_eq!(dash.log().last().unwrap().level, LogLevel::Warning);
    }

    #[tokio::test]
    async fn intents_respect_guards() {
        let sink = RecordingSink::default();
        let mut dash = Dashboard::new();

        assert!(!dash.pause(&sink).await.unwrap());
        assert!(dash.start(&sink).await.unwrap());

        dash.handle(&status(Some(true), Some(false)));
        assert!(!dash.start(&sink).await.unwrap());
        assert!(dash.pause(&sink).await.unwrap());

        dash.handle(&status(Some(true), Some(true)));
        assert!(dash.start(&sink).await.unwrap());
        dash.stop(&sink).await.unwrap();

        assert_eq!(
            sink.sent(),
            vec![
                ClientIntent::StartDetection,
                ClientIntent::PauseDetection,
                ClientIntent::PauseDetection,
                ClientIntent::StopDetection,
            ]
        );
        // Nothing changes until the server echoes.
        assert_eq!(dash.run_state(), RunState::Paused);
    }

    #[tokio::test(start_paused = true)]
    async fn leaving_while_running_stops_first() {
        let sink = RecordingSink::default();
        let mut dash = Dashboard::new();
        assert_eq!(
            dash.request_leave("/settings"),
            NavigationDecision::Proceed("/settings".into())
        );

        dash.handle(&status(Some(true), Some(false)));
        assert_eq!(
            dash.request_leave("/zones"),
            NavigationDecision::Confirm {
                target: "/zones".into(),
                destination: "Zone Editor".into()
            }
        );
        dash.cancel_leave();
        assert_eq!(dash.confirm_leave(&sink, Duration::from_millis(500)).await.unwrap(), None);
        assert!(sink.sent().is_empty());

        dash.request_leave("/settings");
        let started = tokio::time::Instant::now();
        let target = dash.confirm_leave(&sink, Duration::from_millis(500)).await.unwrap();
        assert_eq!(target.as_deref(), Some("/settings"));
        assert!(started.elapsed() >= Duration::from_millis(500));
        assert_eq!(sink.sent(), vec![ClientIntent::StopDetection]);
    }
}
