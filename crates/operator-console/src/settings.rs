//! Settings page: a typed form over [`DetectionConfig`] and the
//! controller that loads, gates and saves it.
//!
//! Loading runs the config fetch and both device enumerations at once.
//! The form stays locked until a two-party [`ReadinessGate`] has seen
//! both enumerations finish, whichever finishes first and whether or not
//! they fail. Saved device selections wait on the device lists through
//! [`resolve_deferred`] instead of polling the select boxes.

use std::time::Duration;

use common::detection_config::{DetectionConfig, RtspTransport, SourceType};
use common::devices::{CamerasResponse, MonitorsResponse};
use common::rtsp::RtspParts;
use common::validation::{validate_length, validate_name, validate_non_empty, MAX_URI_LENGTH};
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use serde_json::{Map, Value};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::ConsoleApi;
use crate::error::{ConsoleError, Result};
use crate::notify::Notifier;
use crate::readiness::{resolve_deferred, Deferred, ReadinessGate};

pub const FALLBACK_CAMERA: (&str, &str) = ("0", "Camera 0 (default)");
pub const FALLBACK_MONITOR: (&str, &str) = ("1", "Monitor 1 (primary)");

/// Where the console goes after a successful save.
pub const DASHBOARD_PATH: &str = "/";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectOption {
    pub value: String,
    pub label: String,
}

impl SelectOption {
    pub fn new(value: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            label: label.into(),
        }
    }
}

/// A device drop-down whose options arrive asynchronously.
///
/// The option list is published on a watch channel so that a saved value
/// can be applied once the list exists.
#[derive(Debug)]
pub struct DeviceSelect {
    options: Vec<SelectOption>,
    selected: Option<String>,
    tx: watch::Sender<Option<Vec<SelectOption>>>,
}

impl Default for DeviceSelect {
    fn default() -> Self {
        let (tx, _) = watch::channel(None);
        Self {
            options: Vec::new(),
            selected: None,
            tx,
        }
    }
}

impl DeviceSelect {
    pub fn is_loading(&self) -> bool {
        self.tx.borrow().is_none()
    }

    pub fn options(&self) -> &[SelectOption] {
        &self.options
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Vec<SelectOption>>> {
        self.tx.subscribe()
    }

    /// Drops the current options and goes back to the detecting state.
    pub fn begin_loading(&mut self) {
        self.options.clear();
        self.tx.send_replace(None);
    }

    /// Replaces the options. The current selection survives if it is
    /// still listed, otherwise the first option is selected.
    pub fn populate(&mut self, options: Vec<SelectOption>) {
        let keep = self
            .selected
            .as_ref()
            .is_some_and(|s| options.iter().any(|o| &o.value == s));
        if !keep {
            self.selected = options.first().map(|o| o.value.clone());
        }
        self.options = options.clone();
        self.tx.send_replace(Some(options));
    }

    /// Selects a listed value. Returns false if it is not listed.
    pub fn select(&mut self, value: &str) -> bool {
        if self.options.iter().any(|o| o.value == value) {
            self.selected = Some(value.to_string());
            true
        } else {
            false
        }
    }

    /// Selects `value`, appending `"{prefix} {value}"` first if unlisted.
    pub fn select_or_insert(&mut self, value: &str, prefix: &str) {
        if !self.select(value) {
            self.options
                .push(SelectOption::new(value, format!("{} {}", prefix, value)));
            self.selected = Some(value.to_string());
        }
    }

    pub fn value(&self) -> String {
        self.selected.clone().unwrap_or_default()
    }
}

/// Formats a number the way a form control echoes it: integers without
/// a fraction, everything else in shortest form.
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeDisplay {
    Plain,
    /// Stored as a fraction, shown as a whole percentage.
    Percent,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangeInput {
    value: f64,
    display: RangeDisplay,
}

impl RangeInput {
    pub fn plain(value: f64) -> Self {
        Self {
            value,
            display: RangeDisplay::Plain,
        }
    }

    pub fn percent(value: f64) -> Self {
        Self {
            value,
            display: RangeDisplay::Percent,
        }
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn set(&mut self, value: f64) {
        self.value = value;
    }

    /// Text of the live label next to the slider.
    pub fn label(&self) -> String {
        match self.display {
            RangeDisplay::Plain => format_number(self.value),
            RangeDisplay::Percent => format!("{}", (self.value * 100.0).round()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeField {
    Confidence,
    SkipFrames,
    MinTimeInZone,
    MinBboxArea,
    Cooldown,
    MinMovement,
    OverlapRatio,
    TrajectoryLength,
    MinDetectionConfidence,
}

impl RangeField {
    pub const ALL: [RangeField; 9] = [
        RangeField::Confidence,
        RangeField::SkipFrames,
        RangeField::MinTimeInZone,
        RangeField::MinBboxArea,
        RangeField::Cooldown,
        RangeField::MinMovement,
        RangeField::OverlapRatio,
        RangeField::TrajectoryLength,
        RangeField::MinDetectionConfidence,
    ];

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.key() == key)
    }

    /// Config key the field is saved under.
    pub fn key(&self) -> &'static str {
        match self {
            RangeField::Confidence => "conf",
            RangeField::SkipFrames => "skip_frames",
            RangeField::MinTimeInZone => "min_time_zone",
            RangeField::MinBboxArea => "min_bbox_area",
            RangeField::Cooldown => "cooldown",
            RangeField::MinMovement => "umbral_movimiento_minimo",
            RangeField::OverlapRatio => "zone_overlap_ratio",
            RangeField::TrajectoryLength => "longitud_trayectoria",
            RangeField::MinDetectionConfidence => "min_detection_confidence",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ranges {
    pub conf: RangeInput,
    pub skip_frames: RangeInput,
    pub min_time_zone: RangeInput,
    pub min_bbox_area: RangeInput,
    pub cooldown: RangeInput,
    pub umbral_movimiento_minimo: RangeInput,
    pub zone_overlap_ratio: RangeInput,
    pub longitud_trayectoria: RangeInput,
    pub min_detection_confidence: RangeInput,
}

impl Ranges {
    fn from_config(config: &DetectionConfig) -> Self {
        Self {
            conf: RangeInput::plain(config.conf),
            skip_frames: RangeInput::plain(config.skip_frames as f64),
            min_time_zone: RangeInput::plain(config.min_time_zone),
            min_bbox_area: RangeInput::plain(config.min_bbox_area as f64),
            cooldown: RangeInput::plain(config.cooldown as f64),
            umbral_movimiento_minimo: RangeInput::plain(config.umbral_movimiento_minimo),
            zone_overlap_ratio: RangeInput::percent(config.zone_overlap_ratio),
            longitud_trayectoria: RangeInput::plain(config.longitud_trayectoria as f64),
            min_detection_confidence: RangeInput::plain(config.min_detection_confidence),
        }
    }

    pub fn get(&self, field: RangeField) -> &RangeInput {
        match field {
            RangeField::Confidence => &self.conf,
            RangeField::SkipFrames => &self.skip_frames,
            RangeField::MinTimeInZone => &self.min_time_zone,
            RangeField::MinBboxArea => &self.min_bbox_area,
            RangeField::Cooldown => &self.cooldown,
            RangeField::MinMovement => &self.umbral_movimiento_minimo,
            RangeField::OverlapRatio => &self.zone_overlap_ratio,
            RangeField::TrajectoryLength => &self.longitud_trayectoria,
            RangeField::MinDetectionConfidence => &self.min_detection_confidence,
        }
    }

    pub fn get_mut(&mut self, field: RangeField) -> &mut RangeInput {
        match field {
            RangeField::Confidence => &mut self.conf,
            RangeField::SkipFrames => &mut self.skip_frames,
            RangeField::MinTimeInZone => &mut self.min_time_zone,
            RangeField::MinBboxArea => &mut self.min_bbox_area,
            RangeField::Cooldown => &mut self.cooldown,
            RangeField::MinMovement => &mut self.umbral_movimiento_minimo,
            RangeField::OverlapRatio => &mut self.zone_overlap_ratio,
            RangeField::TrajectoryLength => &mut self.longitud_trayectoria,
            RangeField::MinDetectionConfidence => &mut self.min_detection_confidence,
        }
    }
}

fn whole(value: f64, field: &str) -> Result<u32> {
    if !value.is_finite() || value < 0.0 || value > u32::MAX as f64 {
        return Err(ConsoleError::validation(format!(
            "{} must be a non-negative number, got {}",
            field, value
        )));
    }
    Ok(value.trunc() as u32)
}

fn finite(value: f64, field: &str) -> Result<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ConsoleError::validation(format!("{} must be a number", field)))
    }
}

#[derive(Debug)]
pub struct SettingsForm {
    pub source_type: SourceType,
    pub webcam: DeviceSelect,
    pub monitor: DeviceSelect,
    pub rtsp: RtspParts,
    pub rtsp_transport: RtspTransport,
    /// RTSP open timeout in milliseconds.
    pub rtsp_timeout: u32,
    pub weights: String,
    pub imgsz: u32,
    pub tracker: String,
    pub use_geometric_filter: bool,
    pub ranges: Ranges,
    max_retries: u32,
    extra: Map<String, Value>,
}

impl Default for SettingsForm {
    fn default() -> Self {
        let defaults = DetectionConfig::default();
        Self {
            source_type: defaults.source_type,
            webcam: DeviceSelect::default(),
            monitor: DeviceSelect::default(),
            rtsp: RtspParts::default(),
            rtsp_transport: defaults.rtsp_transport,
            rtsp_timeout: defaults.timeout,
            weights: defaults.weights.clone(),
            imgsz: defaults.imgsz,
            tracker: defaults.tracker.clone(),
            use_geometric_filter: defaults.use_geometric_filter,
            ranges: Ranges::from_config(&defaults),
            max_retries: defaults.max_retries,
            extra: Map::new(),
        }
    }
}

impl SettingsForm {
    /// Copies a config into the fields. Device selections are left to the
    /// caller because the device lists may not exist yet. An RTSP URL that
    /// does not parse leaves the RTSP fields as they were.
    pub fn apply_config(&mut self, config: &DetectionConfig) {
        self.source_type = config.source_type;
        if !config.rtsp_url.is_empty() {
            match RtspParts::parse(&config.rtsp_url) {
                Some(parts) => self.rtsp = parts,
                None => debug!("saved rtsp url not in builder form"),
            }
        }
        self.rtsp_transport = config.rtsp_transport;
        self.rtsp_timeout = config.timeout;
        self.weights = config.weights.clone();
        self.imgsz = config.imgsz;
        self.tracker = config.tracker.clone();
        self.use_geometric_filter = config.use_geometric_filter;
        self.ranges = Ranges::from_config(config);
        self.max_retries = config.max_retries;
        self.extra = config.extra.clone();
    }

    /// The sub-form currently shown. All of them are still read on submit.
    pub fn active_subform(&self) -> SourceType {
        self.source_type
    }

    pub fn geometric_panel_visible(&self) -> bool {
        self.use_geometric_filter
    }

    pub fn rtsp_preview(&self) -> String {
        self.rtsp.masked_preview()
    }

    pub fn set_range(&mut self, field: RangeField, value: f64) {
        self.ranges.get_mut(field).set(value);
    }

    /// Sets a range from raw input text; the value must parse as a number.
    pub fn set_range_text(&mut self, field: RangeField, raw: &str) -> Result<()> {
        let value: f64 = raw.trim().parse().map_err(|_| {
            ConsoleError::validation(format!("{} must be a number, got {:?}", field.key(), raw))
        })?;
        self.set_range(field, finite(value, field.key())?);
        Ok(())
    }

    pub fn range_label(&self, field: RangeField) -> String {
        self.ranges.get(field).label()
    }

    /// Serialises every field into a full config.
    pub fn to_config(&self) -> Result<DetectionConfig> {
        let rtsp_url = self.rtsp.build_url();
        // Passed through as typed: query strings and `$` in passwords are
        // ordinary in camera URLs.
        if self.source_type == SourceType::Rtsp {
            validate_non_empty(&rtsp_url, "rtsp_url")
                .and_then(|_| validate_length(&rtsp_url, MAX_URI_LENGTH, "rtsp_url"))
                .map_err(|e| ConsoleError::validation(e.to_string()))?;
        }
        validate_name(&self.weights, "weights").map_err(|e| ConsoleError::validation(e.to_string()))?;
        validate_name(&self.tracker, "tracker").map_err(|e| ConsoleError::validation(e.to_string()))?;

        let r = &self.ranges;
        Ok(DetectionConfig {
            source_type: self.source_type,
            source_value: if self.source_type == SourceType::Webcam {
                self.webcam.value()
            } else {
                "0".to_string()
            },
            rtsp_url,
            rtsp_transport: self.rtsp_transport,
            timeout: self.rtsp_timeout,
            screen_monitor: self.monitor.value(),
            weights: self.weights.trim().to_string(),
            conf: finite(r.conf.value(), "conf")?,
            imgsz: self.imgsz,
            skip_frames: whole(r.skip_frames.value(), "skip_frames")?,
            tracker: self.tracker.trim().to_string(),
            use_geometric_filter: self.use_geometric_filter,
            min_time_zone: finite(r.min_time_zone.value(), "min_time_zone")?,
            min_bbox_area: whole(r.min_bbox_area.value(), "min_bbox_area")?,
            min_detection_confidence: finite(
                r.min_detection_confidence.value(),
                "min_detection_confidence",
            )?,
            longitud_trayectoria: whole(r.longitud_trayectoria.value(), "longitud_trayectoria")?,
            umbral_movimiento_minimo: finite(
                r.umbral_movimiento_minimo.value(),
                "umbral_movimiento_minimo",
            )?,
            zone_overlap_ratio: finite(r.zone_overlap_ratio.value(), "zone_overlap_ratio")?,
            cooldown: whole(r.cooldown.value(), "cooldown")?,
            max_retries: self.max_retries,
            extra: self.extra.clone(),
        })
    }
}

/// A page change the caller should perform once `delay` has passed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Navigation {
    pub target: String,
    pub delay: Duration,
}

impl Navigation {
    pub async fn follow(self) -> String {
        tokio::time::sleep(self.delay).await;
        self.target
    }
}

enum LoadEvent {
    Config(Result<DetectionConfig>),
    Cameras(Result<CamerasResponse>),
    Monitors(Result<MonitorsResponse>),
    CameraSelection(String, Deferred<Vec<SelectOption>>),
    MonitorSelection(String, Deferred<Vec<SelectOption>>),
}

pub struct SettingsController {
    form: SettingsForm,
    gate: ReadinessGate,
    cameras_loaded: bool,
    monitors_loaded: bool,
    /// The form holds either the server's config or defaults the operator
    /// chose explicitly. Saving is refused otherwise.
    config_known: bool,
    reset_pending: bool,
    notifier: Notifier,
    enumeration_timeout: Duration,
    redirect_delay: Duration,
    cancel: CancellationToken,
}

impl SettingsController {
    pub fn new(notifier: Notifier, enumeration_timeout: Duration, redirect_delay: Duration) -> Self {
        Self {
            form: SettingsForm::default(),
            gate: ReadinessGate::new(2),
            cameras_loaded: false,
            monitors_loaded: false,
            config_known: false,
            reset_pending: false,
            notifier,
            enumeration_timeout,
            redirect_delay,
            cancel: CancellationToken::new(),
        }
    }

    pub fn form(&self) -> &SettingsForm {
        &self.form
    }

    /// Editable form, refused while loading.
    pub fn form_mut(&mut self) -> Result<&mut SettingsForm> {
        self.ensure_ready()?;
        Ok(&mut self.form)
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// Shared handle on the load barrier, for observers.
    pub fn readiness(&self) -> ReadinessGate {
        self.gate.clone()
    }

    pub fn is_ready(&self) -> bool {
        self.cameras_loaded && self.monitors_loaded && self.gate.is_ready()
    }

    fn ensure_ready(&self) -> Result<()> {
        if self.is_ready() {
            Ok(())
        } else {
            Err(ConsoleError::validation("settings are still loading"))
        }
    }

    /// Fetches the config and both device lists concurrently and applies
    /// each result as it lands.
    pub async fn load(&mut self, api: &dyn ConsoleApi) {
        let mut pending: FuturesUnordered<BoxFuture<'_, LoadEvent>> = FuturesUnordered::new();
        pending.push(Box::pin(async move { LoadEvent::Config(api.config().await) }));
        pending.push(Box::pin(async move { LoadEvent::Cameras(api.cameras().await) }));
        pending.push(Box::pin(async move { LoadEvent::Monitors(api.monitors().await) }));

        while let Some(event) = pending.next().await {
            match event {
                LoadEvent::Config(result) => {
                    let Some(config) = self.on_config(result) else {
                        continue;
                    };
                    let timeout = self.enumeration_timeout;

                    let rx = self.form.webcam.subscribe();
                    let token = self.cancel.child_token();
                    let saved = config.source_value;
                    pending.push(Box::pin(async move {
                        LoadEvent::CameraSelection(saved, resolve_deferred(rx, timeout, token).await)
                    }));

                    let rx = self.form.monitor.subscribe();
                    let token = self.cancel.child_token();
                    let saved = config.screen_monitor;
                    pending.push(Box::pin(async move {
                        LoadEvent::MonitorSelection(saved, resolve_deferred(rx, timeout, token).await)
                    }));
                }
                LoadEvent::Cameras(result) => self.on_cameras(result),
                LoadEvent::Monitors(result) => self.on_monitors(result),
                LoadEvent::CameraSelection(saved, outcome) => {
                    self.on_selection(outcome, "camera", |form| {
                        form.webcam.select_or_insert(&saved, "Camera")
                    })
                }
                LoadEvent::MonitorSelection(saved, outcome) => {
                    self.on_selection(outcome, "monitor", |form| {
                        form.monitor.select_or_insert(&saved, "Monitor")
                    })
                }
            }
        }
        info!(ready = self.is_ready(), "settings loaded");
    }

    fn on_config(&mut self, result: Result<DetectionConfig>) -> Option<DetectionConfig> {
        match result {
            Ok(config) => {
                self.form.apply_config(&config);
                self.config_known = true;
                debug!(source = %config.source_type, "config applied");
                Some(config)
            }
            Err(e) => {
                warn!(error = %e, "config load failed");
                self.notifier.error("Error loading configuration");
                None
            }
        }
    }

    fn on_selection(
        &mut self,
        outcome: Deferred<Vec<SelectOption>>,
        device: &str,
        apply: impl FnOnce(&mut SettingsForm),
    ) {
        match outcome {
            Deferred::Ready(_) => apply(&mut self.form),
            Deferred::TimedOut => warn!(device, "saved selection abandoned, device list never arrived"),
            Deferred::Cancelled => debug!(device, "saved selection cancelled"),
        }
    }

    fn on_cameras(&mut self, result: Result<CamerasResponse>) {
        let result = result.and_then(|resp| match resp.error {
            Some(err) => Err(ConsoleError::Server(err)),
            None => Ok(resp.cameras),
        });
        let options = match result {
            Ok(cameras) if !cameras.is_empty() => {
                self.notifier
                    .success(format!("{} camera(s) detected", cameras.len()));
                cameras
                    .iter()
                    .map(|c| {
                        SelectOption::new(c.index.to_string(), format!("{} ({})", c.name, c.resolution))
                    })
                    .collect()
            }
            Ok(_) => {
                self.notifier.warning("No cameras detected. Using default.");
                vec![SelectOption::new(FALLBACK_CAMERA.0, FALLBACK_CAMERA.1)]
            }
            Err(e) => {
                warn!(error = %e, "camera enumeration failed");
                self.notifier.error("Error detecting cameras. Using default.");
                vec![SelectOption::new(FALLBACK_CAMERA.0, FALLBACK_CAMERA.1)]
            }
        };
        self.form.webcam.populate(options);
        self.cameras_loaded = true;
        if self.gate.arrive() {
            info!("settings form enabled");
        }
    }

    fn on_monitors(&mut self, result: Result<MonitorsResponse>) {
        let result = result.and_then(|resp| match resp.error {
            Some(err) => Err(ConsoleError::Server(err)),
            None => Ok(resp.monitors),
        });
        let options = match result {
            Ok(monitors) if !monitors.is_empty() => {
                self.notifier
                    .success(format!("{} monitor(s) detected", monitors.len()));
                monitors
                    .iter()
                    .map(|m| SelectOption::new(m.index.to_string(), m.name.clone()))
                    .collect()
            }
            Ok(_) => {
                self.notifier.warning("No monitors detected. Using default.");
                vec![SelectOption::new(FALLBACK_MONITOR.0, FALLBACK_MONITOR.1)]
            }
            Err(e) => {
                warn!(error = %e, "monitor enumeration failed");
                self.notifier.error("Error detecting monitors. Using default.");
                vec![SelectOption::new(FALLBACK_MONITOR.0, FALLBACK_MONITOR.1)]
            }
        };
        self.form.monitor.populate(options);
        self.monitors_loaded = true;
        if self.gate.arrive() {
            info!("settings form enabled");
        }
    }

    /// Re-enumerates cameras on demand.
    pub async fn refresh_cameras(&mut self, api: &dyn ConsoleApi) -> Result<()> {
        self.ensure_ready()?;
        self.cameras_loaded = false;
        self.form.webcam.begin_loading();
        let result = api.cameras().await;
        self.on_cameras(result);
        Ok(())
    }

    pub async fn refresh_monitors(&mut self, api: &dyn ConsoleApi) -> Result<()> {
        self.ensure_ready()?;
        self.monitors_loaded = false;
        self.form.monitor.begin_loading();
        let result = api.monitors().await;
        self.on_monitors(result);
        Ok(())
    }

    /// Saves the whole form. On success the caller should follow the
    /// returned navigation; on failure the form is left as it is.
    pub async fn submit(&mut self, api: &dyn ConsoleApi) -> Result<Option<Navigation>> {
        self.ensure_ready()?;
        if !self.config_known {
            self.notifier
                .error("Configuration was not loaded. Restore defaults before saving.");
            return Err(ConsoleError::validation(
                "refusing to overwrite a configuration that was never loaded",
            ));
        }
        let config = match self.form.to_config() {
            Ok(config) => config,
            Err(e) => {
                self.notifier.error(e.to_string());
                return Err(e);
            }
        };
        match api.save_config(&config).await {
            Ok(()) => {
                self.notifier.success("Configuration saved");
                Ok(Some(Navigation {
                    target: DASHBOARD_PATH.to_string(),
                    delay: self.redirect_delay,
                }))
            }
            Err(e) => {
                warn!(error = %e, "config save failed");
                self.notifier.error("Failed to save configuration");
                Ok(None)
            }
        }
    }

    pub fn request_reset(&mut self) -> Result<()> {
        self.ensure_ready()?;
        self.reset_pending = true;
        Ok(())
    }

    pub fn cancel_reset(&mut self) {
        self.reset_pending = false;
    }

    /// Restores the built-in defaults into the form. Nothing is sent.
    pub fn confirm_reset(&mut self) -> bool {
        if !std::mem::take(&mut self.reset_pending) {
            return false;
        }
        let defaults = DetectionConfig::default();
        self.form.apply_config(&defaults);
        self.form
            .webcam
            .select_or_insert(&defaults.source_value, "Camera");
        self.form
            .monitor
            .select_or_insert(&defaults.screen_monitor, "Monitor");
        self.config_known = true;
        self.notifier.info("Defaults restored");
        true
    }
}

impl Drop for SettingsController {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
