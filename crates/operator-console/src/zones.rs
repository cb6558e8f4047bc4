//! Zone editor.
//!
//! Holds the saved zone list, the polygon being drawn, and the canvas
//! state. Every change that affects appearance rebuilds the overlay
//! scene. Persistence is always a full replace of the zone set.

use common::events::{ClientIntent, FramePayload, ServerEvent};
use common::validation::validate_name;
use common::zones::{default_zone_name, Point, Zone, ZonesPayload, MIN_ZONE_POINTS};
use image::RgbaImage;
use tracing::{debug, info, warn};

use crate::api::ConsoleApi;
use crate::canvas::CanvasGeometry;
use crate::error::Result;
use crate::frame::{decode_frame, DecodedFrame};
use crate::notify::Notifier;
use crate::overlay::{build_scene, Rasterizer, Scene};
use crate::socket::IntentSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditorState {
    Idle,
    Drafting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved(usize),
    /// Nothing to save; no request was made.
    Empty,
    Failed,
}

/// One row of the zone list panel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneListEntry {
    pub index: usize,
    pub label: String,
    pub point_count: usize,
    pub name: String,
    pub selected: bool,
}

pub struct ZoneEditor {
    zones: Vec<Zone>,
    draft: Vec<Point>,
    selected: Option<usize>,
    pending_delete: Option<usize>,
    renaming: Option<usize>,
    streaming: bool,
    paused: bool,
    geometry: CanvasGeometry,
    container_width: u32,
    background: Option<DecodedFrame>,
    scene: Scene,
    redraws: u64,
    notifier: Notifier,
}

impl ZoneEditor {
    pub fn new(notifier: Notifier, container_width: u32) -> Self {
        let geometry = CanvasGeometry::default();
        let mut editor = Self {
            zones: Vec::new(),
            draft: Vec::new(),
            selected: None,
            pending_delete: None,
            renaming: None,
            streaming: false,
            paused: false,
            geometry,
            container_width,
            background: None,
            scene: build_scene(geometry.backing_size(), false, &[], None, &[]),
            redraws: 0,
            notifier,
        };
        editor.geometry.fit_to_container(container_width);
        editor.redraw();
        editor
    }

    /// Replaces the working list with the server's copy.
    pub fn load(&mut self, payload: ZonesPayload) {
        self.zones = payload.into_zones();
        self.forget_indices();
        info!(zones = self.zones.len(), "zones loaded");
        self.redraw();
    }

    pub async fn load_from(&mut self, api: &dyn ConsoleApi) -> Result<()> {
        let payload = api.zones().await?;
        self.load(payload);
        Ok(())
    }

    pub fn zones(&self) -> &[Zone] {
        &self.zones
    }

    pub fn draft(&self) -> &[Point] {
        &self.draft
    }

    pub fn state(&self) -> EditorState {
        if self.draft.is_empty() {
            EditorState::Idle
        } else {
            EditorState::Drafting
        }
    }

    pub fn selected(&self) -> Option<usize> {
        self.selected
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn geometry(&self) -> &CanvasGeometry {
        &self.geometry
    }

    pub fn geometry_mut(&mut self) -> &mut CanvasGeometry {
        &mut self.geometry
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn redraws(&self) -> u64 {
        self.redraws
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn entries(&self) -> Vec<ZoneListEntry> {
        self.zones
            .iter()
            .enumerate()
            .map(|(index, zone)| ZoneListEntry {
                index,
                label: format!("Zone {}", index + 1),
                point_count: zone.points.len(),
                name: zone.name.clone(),
                selected: self.selected == Some(index),
            })
            .collect()
    }

    fn redraw(&mut self) {
        self.scene = build_scene(
            self.geometry.backing_size(),
            self.background.is_some(),
            &self.zones,
            self.selected,
            &self.draft,
        );
        self.redraws += 1;
    }

    pub fn render(&self, rasterizer: &Rasterizer) -> RgbaImage {
        rasterizer.render(&self.scene, self.background.as_ref().map(|f| &f.image))
    }

    // Feed

    pub async fn on_connected(&mut self, sink: &dyn IntentSink) -> Result<()> {
        sink.send(ClientIntent::StartZonesStream).await?;
        self.streaming = true;
        info!("zone stream requested");
        Ok(())
    }

    pub fn on_disconnected(&mut self) {
        self.streaming = false;
        warn!("zone stream lost");
    }

    /// Stops the feed when the editor is closed.
    pub async fn leave(&mut self, sink: &dyn IntentSink) -> Result<()> {
        self.streaming = false;
        sink.send(ClientIntent::StopZonesStream).await
    }

    pub async fn capture_background(&mut self, sink: &dyn IntentSink) -> Result<()> {
        sink.send(ClientIntent::CaptureBackground).await
    }

    pub fn handle(&mut self, event: &ServerEvent) {
        match event {
            ServerEvent::VideoFrame(frame) => {
                if self.streaming {
                    self.on_frame(frame);
                }
            }
            ServerEvent::BackgroundFrame(frame) => self.on_frame(frame),
            ServerEvent::StreamError(err) | ServerEvent::BackgroundError(err) => {
                self.notifier.error(format!("Stream error: {}", err.message));
            }
            other => debug!(event = other.name(), "ignored by zone editor"),
        }
    }

    fn on_frame(&mut self, payload: &FramePayload) {
        if self.paused {
            return;
        }
        let frame = match decode_frame(&payload.frame) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "dropping undecodable frame");
                return;
            }
        };
        let width = payload.width.unwrap_or_else(|| frame.width());
        let height = payload.height.unwrap_or_else(|| frame.height());
        if self.geometry.adopt_frame_size(width, height) {
            self.geometry.fit_to_container(self.container_width);
        }
        self.background = Some(frame);
        self.redraw();
    }

    pub fn toggle_pause(&mut self) -> bool {
        self.paused = !self.paused;
        if self.paused {
            self.notifier.info("Video paused");
        } else {
            self.notifier.info("Video resumed");
        }
        self.paused
    }

    pub fn set_container_width(&mut self, width: u32) {
        self.container_width = width;
        self.geometry.fit_to_container(width);
    }

    // Drawing

    /// Canvas click in display pixels.
    pub fn click(&mut self, x: f64, y: f64) -> Point {
        let point = self.geometry.map_click(x, y);
        self.add_point(point);
        point
    }

    pub fn add_point(&mut self, point: Point) {
        self.draft.push(point);
        self.redraw();
    }

    fn push_draft_as_zone(&mut self) {
        let name = default_zone_name(self.zones.len());
        let points = std::mem::take(&mut self.draft);
        self.zones.push(Zone::new(points, name));
    }

    /// Closes the draft into a new zone. Below three points nothing changes.
    pub fn commit_draft(&mut self) -> bool {
        if self.draft.len() < MIN_ZONE_POINTS {
            self.notifier
                .warning(format!("At least {} points are needed to create a zone", MIN_ZONE_POINTS));
            return false;
        }
        self.push_draft_as_zone();
        let total = self.zones.len();
        self.notifier
            .success(format!("Zone {} created. Total: {} zone(s)", total, total));
        self.redraw();
        true
    }

    pub fn clear_draft(&mut self) -> usize {
        if self.draft.is_empty() {
            self.notifier.info("No zone in progress to clear");
            return 0;
        }
        let discarded = self.draft.len();
        self.draft.clear();
        self.notifier.info(format!("{} point(s) discarded", discarded));
        self.redraw();
        discarded
    }

    /// Toggles the highlight; selecting the selected zone clears it.
    pub fn select(&mut self, index: usize) {
        if index >= self.zones.len() {
            return;
        }
        self.selected = if self.selected == Some(index) {
            None
        } else {
            Some(index)
        };
        self.redraw();
    }

    // Persistence

    /// Folds a closable draft into the list, then writes the whole list.
    pub async fn save(&mut self, api: &dyn ConsoleApi) -> SaveOutcome {
        if self.draft.len() >= MIN_ZONE_POINTS {
            self.push_draft_as_zone();
            self.redraw();
        }
        self.persist(api).await
    }

    async fn persist(&mut self, api: &dyn ConsoleApi) -> SaveOutcome {
        if self.zones.is_empty() {
            self.notifier.warning("No zones to save");
            return SaveOutcome::Empty;
        }
        let payload = ZonesPayload::from_zones(&self.zones);
        match api.save_zones(&payload).await {
            Ok(()) => {
                let count = self.zones.len();
                self.notifier.success(format!("{} zone(s) saved", count));
                self.redraw();
                SaveOutcome::Saved(count)
            }
            Err(e) => {
                warn!(error = %e, "zone save failed");
                self.notifier.error("Failed to save zones");
                SaveOutcome::Failed
            }
        }
    }

    /// Asks to delete a zone; returns its name for the confirmation prompt.
    pub fn request_delete(&mut self, index: usize) -> Option<&str> {
        let zone = self.zones.get(index)?;
        self.pending_delete = Some(index);
        Some(zone.name.as_str())
    }

    pub fn cancel_delete(&mut self) {
        self.pending_delete = None;
    }

    /// Removes the pending zone and saves immediately. Later zones shift
    /// down one position and their labels follow.
    pub async fn confirm_delete(&mut self, api: &dyn ConsoleApi) -> Option<SaveOutcome> {
        let index = self.pending_delete.take()?;
        if index >= self.zones.len() {
            return None;
        }
        let removed = self.zones.remove(index);
        info!(index, name = %removed.name, "zone deleted");
        self.forget_indices();
        self.redraw();
        Some(self.persist(api).await)
    }

    /// Drops everything that points into the list by position.
    fn forget_indices(&mut self) {
        self.selected = None;
        self.pending_delete = None;
        self.renaming = None;
    }

    /// Opens the rename prompt prefilled with the current name.
    pub fn begin_rename(&mut self, index: usize) -> Option<&str> {
        let zone = self.zones.get(index)?;
        self.renaming = Some(index);
        Some(zone.name.as_str())
    }

    pub fn cancel_rename(&mut self) {
        self.renaming = None;
    }

    /// Applies a new name and saves. A blank name is ignored and the
    /// prompt stays open.
    pub async fn confirm_rename(&mut self, api: &dyn ConsoleApi, name: &str) -> Option<SaveOutcome> {
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        if let Err(e) = validate_name(name, "zone name") {
            self.notifier.warning(e.to_string());
            return None;
        }
        let index = self.renaming?;
        let zone = self.zones.get_mut(index)?;
        zone.name = name.to_string();
        self.renaming = None;
        Some(self.persist(api).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::mock::MockApi;
    use crate::frame::tests::encoded_frame;
    use crate::socket::tests::RecordingSink;
    use common::events::MessageEvent;

    fn editor() -> ZoneEditor {
        ZoneEditor::new(Notifier::default(), 1280)
    }

    fn pts(n: usize) -> Vec<Point> {
        (0..n).map(|i| Point::new(i as i32 * 10, (i * i) as i32)).collect()
    }

    fn with_zones(n: usize) -> ZoneEditor {
        let mut ed = editor();
        for _ in 0..n {
            for p in pts(3) {
                ed.add_point(p);
            }
            assert!(ed.commit_draft());
        }
        ed
    }

    #[test]
    fn short_draft_never_commits() {
        for n in 0..MIN_ZONE_POINTS {
            let mut ed = with_zones(1);
            for p in pts(n) {
                ed.add_point(p);
            }
            let before = ed.zones().to_vec();
            assert!(!ed.commit_draft());
            assert_eq!(ed.zones(), before.as_slice());
            assert_eq!(ed.draft(), pts(n).as_slice());
        }
    }

    #[test]
    fn commit_appends_copy_and_clears_draft() {
        for n in MIN_ZONE_POINTS..8 {
            let mut ed = with_zones(2);
            for p in pts(n) {
                ed.add_point(p);
            }
            assert_eq!(ed.state(), EditorState::Drafting);
            assert!(ed.commit_draft());
            assert_eq!(ed.zones().len(), 3);
            assert_eq!(ed.zones()[2].points, pts(n));
            assert_eq!(ed.zones()[2].name, "Zone 3: Restricted Area");
            assert!(ed.draft().is_empty());
            assert_eq!(ed.state(), EditorState::Idle);
        }
    }

    #[test]
    fn clear_draft_reports_discarded_points() {
        let mut ed = editor();
        assert_eq!(ed.clear_draft(), 0);
        ed.add_point(Point::new(1, 1));
        ed.add_point(Point::new(2, 2));
        assert_eq!(ed.clear_draft(), 2);
        assert_eq!(ed.state(), EditorState::Idle);
    }

    #[test]
    fn select_toggles() {
        let mut ed = with_zones(2);
        ed.select(1);
        assert_eq!(ed.selected(), Some(1));
        assert!(ed.entries()[1].selected);
        ed.select(1);
        assert_eq!(ed.selected(), None);
        ed.select(5);
        assert_eq!(ed.selected(), None);
    }

    #[test]
    fn every_change_redraws() {
        let mut ed = editor();
        let start = ed.redraws();
        ed.add_point(Point::new(1, 1));
        ed.clear_draft();
        assert_eq!(ed.redraws(), start + 2);
    }

    #[tokio::test]
    async fn delete_renumbers_and_saves() {
        let api = MockApi::default();
        let mut ed = with_zones(3);
        ed.load(ZonesPayload {
            zones: vec![pts(3), pts(4), pts(5)],
            zone_names: vec!["a".into(), "b".into(), "c".into()],
        });

        assert_eq!(ed.request_delete(1), Some("b"));
        let outcome = ed.confirm_delete(&api).await;
        assert_eq!(outcome, Some(SaveOutcome::Saved(2)));

        let labels: Vec<_> = ed.scene().labels().map(|(t, _)| t.to_string()).collect();
        assert_eq!(labels, vec!["Z1", "Z2"]);
        assert_eq!(ed.entries()[1].label, "Zone 2");
        assert_eq!(ed.entries()[1].name, "c");
        assert_eq!(ed.entries()[1].point_count, 5);

        let saved = api.saved_zones();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].zone_names, vec!["a", "c"]);
    }

    #[tokio::test]
    async fn delete_closes_open_rename() {
        let api = MockApi::default();
        let mut ed = with_zones(3);
        let before: Vec<_> = ed.zones().iter().map(|z| z.name.clone()).collect();

        ed.begin_rename(1);
        ed.request_delete(0);
        ed.confirm_delete(&api).await;

        assert_eq!(ed.confirm_rename(&api, "Gate").await, None);
        let names: Vec<_> = ed.zones().iter().map(|z| z.name.clone()).collect();
        assert_eq!(names, before[1..].to_vec());
        assert_eq!(api.saved_zones().len(), 1);
    }

    #[tokio::test]
    async fn reload_drops_pending_prompts() {
        let api = MockApi::default();
        let mut ed = with_zones(2);
        ed.request_delete(1);
        ed.load(ZonesPayload {
            zones: vec![pts(3)],
            zone_names: vec!["only".into()],
        });
        assert_eq!(ed.confirm_delete(&api).await, None);
        assert_eq!(ed.zones().len(), 1);
    }

    #[tokio::test]
    async fn cancelled_delete_keeps_zone() {
        let api = MockApi::default();
        let mut ed = with_zones(2);
        ed.request_delete(0);
        ed.cancel_delete();
        assert_eq!(ed.confirm_delete(&api).await, None);
        assert_eq!(ed.zones().len(), 2);
        assert!(api.saved_zones().is_empty());
    }

    #[tokio::test]
    async fn save_pairs_names_and_folds_draft() {
        let api = MockApi::default();
        let mut ed = with_zones(1);
        for p in pts(4) {
            ed.add_point(p);
        }
        assert_eq!(ed.save(&api).await, SaveOutcome::Saved(2));
        assert!(ed.draft().is_empty());

        let saved = api.saved_zones();
        assert_eq!(saved[0].zones.len(), saved[0].zone_names.len());
        assert_eq!(saved[0].zones[1], pts(4));
        assert_eq!(saved[0].zone_names[1], "Zone 2: Restricted Area");
    }

    #[tokio::test]
    async fn empty_list_is_never_sent() {
        let api = MockApi::default();
        let mut ed = editor();
        ed.add_point(Point::new(0, 0));
        ed.add_point(Point::new(5, 5));
        assert_eq!(ed.save(&api).await, SaveOutcome::Empty);
        assert_eq!(ed.draft().len(), 2);

        let mut ed = with_zones(1);
        ed.request_delete(0);
        assert_eq!(ed.confirm_delete(&api).await, Some(SaveOutcome::Empty));
        assert!(api.saved_zones().is_empty());
    }

    #[tokio::test]
    async fn failed_save_keeps_local_edits() {
        let api = MockApi {
            fail_saves: true,
            ..Default::default()
        };
        let mut ed = with_zones(2);
        assert_eq!(ed.save(&api).await, SaveOutcome::Failed);
        assert_eq!(ed.zones().len(), 2);
        assert_eq!(ed.notifier().latest().unwrap().message, "Failed to save zones");
    }

    #[tokio::test]
    async fn rename_ignores_blank_and_saves() {
        let api = MockApi::default();
        let mut ed = with_zones(2);
        assert_eq!(ed.begin_rename(0), Some("Zone 1: Restricted Area"));
        assert_eq!(ed.confirm_rename(&api, "   ").await, None);
        assert_eq!(ed.confirm_rename(&api, " Loading dock ").await, Some(SaveOutcome::Saved(2)));
        assert_eq!(ed.zones()[0].name, "Loading dock");
        assert_eq!(api.saved_zones()[0].zone_names[0], "Loading dock");
    }

    #[tokio::test]
    async fn frames_size_canvas_and_respect_pause() {
        let sink = RecordingSink::default();
        let mut ed = ZoneEditor::new(Notifier::default(), 340);
        ed.on_connected(&sink).await.unwrap();
        assert_eq!(sink.sent(), vec![ClientIntent::StartZonesStream]);

        let frame = ServerEvent::VideoFrame(FramePayload {
            frame: encoded_frame(600, 300),
            width: Some(600),
            height: Some(300),
            stats: None,
        });
        ed.handle(&frame);
        assert_eq!(ed.geometry().backing_size(), (600, 300));
        assert_eq!(ed.geometry().display_size(), (300.0, 150.0));
        assert_eq!(ed.click(50.0, 50.0), Point::new(100, 100));

        ed.toggle_pause();
        let redraws = ed.redraws();
        ed.handle(&frame);
        assert_eq!(ed.redraws(), redraws);

        ed.leave(&sink).await.unwrap();
        assert!(!ed.is_streaming());
        assert_eq!(sink.sent().last(), Some(&ClientIntent::StopZonesStream));
    }

    #[test]
    fn stream_errors_become_notices() {
        let mut ed = editor();
        ed.handle(&ServerEvent::BackgroundError(MessageEvent {
            message: "camera busy".into(),
        }));
        assert_eq!(ed.notifier().latest().unwrap().message, "Stream error: camera busy");
    }
}
