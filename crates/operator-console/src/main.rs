use std::time::Instant;

use anyhow::Context;
use common::detection_config::{RtspTransport, SourceType};
use common::events::{ServerEvent, StatusUpdate};
use operator_console::api::{ApiClient, ConsoleApi};
use operator_console::config::{Config, ConsoleMode};
use operator_console::dashboard::{Dashboard, NavigationDecision};
use operator_console::notify::Notifier;
use operator_console::overlay::Rasterizer;
use operator_console::settings::{Navigation, RangeField, SettingsController};
use operator_console::socket::{ChannelEvent, IntentSender, ReconnectingChannel};
use operator_console::zones::ZoneEditor;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize telemetry
    let _log_guard = telemetry::init_with_service("operator-console");

    // Load configuration
    let config = Config::from_env()?;
    info!("Starting operator console in {:?} mode", config.mode);
    info!("Detection server: {}", config.server_url);
    info!("Push channel: {}", config.ws_url);

    let api = ApiClient::new(&config.server_url, config.http_timeout)?;

    match config.mode {
        ConsoleMode::Dashboard => run_dashboard(&config, &api).await,
        ConsoleMode::Zones => run_zones(&config, &api).await,
        ConsoleMode::Settings => run_settings(&config, &api).await,
    }
}

// ---------------------------------------------------------------------------
// Dashboard
// ---------------------------------------------------------------------------

async fn run_dashboard(config: &Config, api: &ApiClient) -> anyhow::Result<()> {
    let mut dashboard = Dashboard::new();
    match api.status().await {
        Ok(snapshot) => dashboard.handle(&ServerEvent::Status(StatusUpdate {
            running: Some(snapshot.running),
            paused: Some(snapshot.paused),
            stats: Some(snapshot.stats),
        })),
        Err(e) => warn!(error = %e, "status snapshot unavailable"),
    }

    let mut channel = ReconnectingChannel::new(&config.ws_url, config.reconnect_delay);
    let mut commands = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut last_state = dashboard.run_state();

    loop {
        tokio::select! {
            event = channel.next_event() => match event {
                ChannelEvent::Connected => dashboard.on_connected(),
                ChannelEvent::Event(event) => dashboard.handle(&event),
                ChannelEvent::Disconnected { reason } => {
                    warn!(reason = ?reason, "push channel dropped");
                    dashboard.on_disconnected();
                }
            },
            line = commands.next_line(), if stdin_open => match line? {
                Some(line) => {
                    let sink = channel.sender();
                    match dashboard_command(&mut dashboard, sink.as_ref(), config, line.trim()).await {
                        Ok(true) => {}
                        Ok(false) => break,
                        Err(e) => println!("{}", e),
                    }
                }
                None => stdin_open = false,
            },
            _ = tokio::signal::ctrl_c() => {
                leave_dashboard(&mut dashboard, channel.sender().as_ref(), config).await?;
                break;
            }
        }

        let state = dashboard.run_state();
        if state != last_state {
            let controls = dashboard.controls();
            info!(
                state = ?state,
                badge = %dashboard.badge(),
                start = %controls.start_label,
                start_enabled = controls.start_enabled,
                pause_enabled = controls.pause_enabled,
                stop_enabled = controls.stop_enabled,
                "run state changed"
            );
            last_state = state;
        }
    }

    Ok(())
}

fn connected(sink: Option<&IntentSender>) -> anyhow::Result<&IntentSender> {
    sink.context("push channel is not connected")
}

/// Returns false when the console should exit.
async fn dashboard_command(
    dashboard: &mut Dashboard,
    sink: Option<&IntentSender>,
    config: &Config,
    line: &str,
) -> anyhow::Result<bool> {
    match line {
        "start" => {
            dashboard.start(connected(sink)?).await?;
        }
        "pause" => {
            dashboard.pause(connected(sink)?).await?;
        }
        "stop" => dashboard.stop(connected(sink)?).await?,
        "stats" => match dashboard.stats() {
            Some(stats) => println!(
                "fps {} | frames {} | detections {} | tracks {} | in zone {} | filtered {} | alerts {}",
                stats.fps,
                stats.frames,
                stats.detections,
                stats.tracks,
                stats.in_zone,
                stats.filtered,
                stats.alerts
            ),
            None => println!("no stats yet"),
        },
        "alerts" => {
            for alert in dashboard.alerts().entries() {
                println!("[{}] track {}: {}", alert.timestamp, alert.track_id, alert.message);
            }
        }
        "log" => {
            for line in dashboard.log().lines() {
                println!("[{}] {:>7} {}", line.timestamp, line.level, line.message);
            }
        }
        "quit" | "exit" => {
            leave_dashboard(dashboard, sink, config).await?;
            return Ok(false);
        }
        "" => {}
        other => println!("unknown command: {}", other),
    }
    Ok(true)
}

/// Applies the navigation guard before the console exits. Without a
/// connection the stop cannot be sent and the exit goes ahead.
async fn leave_dashboard(
    dashboard: &mut Dashboard,
    sink: Option<&IntentSender>,
    config: &Config,
) -> anyhow::Result<()> {
    if let NavigationDecision::Confirm { .. } = dashboard.request_leave("exit") {
        match sink {
            Some(sink) => {
                warn!("Detection is running and will be stopped before exit");
                dashboard.confirm_leave(sink, config.stop_grace).await?;
            }
            None => warn!("Detection may still be running; the server is unreachable"),
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Zone editor
// ---------------------------------------------------------------------------

async fn run_zones(config: &Config, api: &ApiClient) -> anyhow::Result<()> {
    let mut editor = ZoneEditor::new(Notifier::new(config.notice_ttl), config.container_width);
    if let Err(e) = editor.load_from(api).await {
        warn!(error = %e, "could not load zones, starting empty");
    }

    let rasterizer = match &config.overlay_font {
        Some(path) => Rasterizer::with_font_file(path)?,
        None => Rasterizer::new(),
    };

    // The editor stays usable offline; only the live feed and capture need
    // the push channel.
    let mut channel = ReconnectingChannel::new(&config.ws_url, config.reconnect_delay);
    let mut commands = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut pending_delete = false;
    let mut shown = None;
    print_notices(editor.notifier(), &mut shown);

    loop {
        tokio::select! {
            event = channel.next_event() => match event {
                ChannelEvent::Connected => {
                    if let Some(sink) = channel.sender() {
                        if let Err(e) = editor.on_connected(&sink).await {
                            warn!(error = %e, "could not request the zone stream");
                        }
                    }
                }
                ChannelEvent::Event(event) => editor.handle(&event),
                ChannelEvent::Disconnected { reason } => {
                    warn!(reason = ?reason, "push channel dropped");
                    editor.on_disconnected();
                }
            },
            line = commands.next_line(), if stdin_open => match line? {
                Some(line) => {
                    let line = line.trim();
                    if std::mem::take(&mut pending_delete) {
                        if line == "yes" {
                            editor.confirm_delete(api).await;
                        } else {
                            editor.cancel_delete();
                        }
                    } else {
                        let sink = channel.sender();
                        match zone_command(&mut editor, api, sink.as_ref(), &rasterizer, config, line).await {
                            Ok(ZoneCommand::Continue) => {}
                            Ok(ZoneCommand::ConfirmDelete) => pending_delete = true,
                            Ok(ZoneCommand::Quit) => break,
                            Err(e) => println!("{}", e),
                        }
                    }
                    print_notices(editor.notifier(), &mut shown);
                }
                None => stdin_open = false,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    if let Some(sink) = channel.sender() {
        if let Err(e) = editor.leave(&sink).await {
            warn!(error = %e, "could not stop the zone stream");
        }
    }
    write_overlay(&editor, &rasterizer, config)?;
    Ok(())
}

enum ZoneCommand {
    Continue,
    ConfirmDelete,
    Quit,
}

async fn zone_command(
    editor: &mut ZoneEditor,
    api: &ApiClient,
    sink: Option<&IntentSender>,
    rasterizer: &Rasterizer,
    config: &Config,
    line: &str,
) -> anyhow::Result<ZoneCommand> {
    let mut parts = line.splitn(3, ' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("click"), Some(x), Some(y)) => {
            let point = editor.click(x.parse()?, y.parse()?);
            println!(
                "point {} {} ({} in draft)",
                point.x,
                point.y,
                editor.draft().len()
            );
        }
        (Some("commit"), ..) => {
            editor.commit_draft();
        }
        (Some("clear"), ..) => {
            editor.clear_draft();
        }
        (Some("save"), ..) => {
            editor.save(api).await;
        }
        (Some("select"), Some(n), _) => editor.select(n.parse()?),
        (Some("delete"), Some(n), _) => {
            if let Some(name) = editor.request_delete(n.parse()?) {
                println!("Delete \"{}\"? type yes to confirm", name);
                return Ok(ZoneCommand::ConfirmDelete);
            }
        }
        (Some("rename"), Some(n), Some(name)) => {
            if editor.begin_rename(n.parse()?).is_some() {
                editor.confirm_rename(api, name).await;
            }
        }
        (Some("pause"), ..) => {
            let paused = editor.toggle_pause();
            println!("{}", if paused { "paused" } else { "live" });
        }
        (Some("capture"), ..) => editor.capture_background(connected(sink)?).await?,
        (Some("list"), ..) => {
            for entry in editor.entries() {
                let marker = if entry.selected { "*" } else { " " };
                println!(
                    "{}{} ({} points) {}",
                    marker, entry.label, entry.point_count, entry.name
                );
            }
        }
        (Some("render"), ..) => write_overlay(editor, rasterizer, config)?,
        (Some("quit" | "exit"), ..) => return Ok(ZoneCommand::Quit),
        (Some(""), ..) | (None, ..) => {}
        _ => anyhow::bail!("unknown command: {}", line),
    }
    Ok(ZoneCommand::Continue)
}

/// Prints notices raised since the last call.
fn print_notices(notifier: &Notifier, shown: &mut Option<Instant>) {
    let since = *shown;
    for notice in notifier
        .history()
        .filter(|n| since.map_or(true, |t| n.raised_at > t))
    {
        println!("{:?}: {}", notice.level, notice.message);
        *shown = Some(notice.raised_at);
    }
}

fn write_overlay(editor: &ZoneEditor, rasterizer: &Rasterizer, config: &Config) -> anyhow::Result<()> {
    let Some(path) = &config.overlay_out else {
        return Ok(());
    };
    editor
        .render(rasterizer)
        .save(path)
        .with_context(|| format!("writing overlay to {}", path.display()))?;
    info!(path = %path.display(), "overlay written");
    Ok(())
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

async fn run_settings(config: &Config, api: &ApiClient) -> anyhow::Result<()> {
    let mut settings = SettingsController::new(
        Notifier::new(config.notice_ttl),
        config.enumeration_timeout,
        config.redirect_delay,
    );
    settings.load(api).await;
    let mut shown = None;
    print_notices(settings.notifier(), &mut shown);
    print_form(&settings);

    let mut commands = BufReader::new(tokio::io::stdin()).lines();
    let mut pending_reset = false;

    while let Some(line) = commands.next_line().await? {
        let line = line.trim();
        if std::mem::take(&mut pending_reset) {
            if line == "yes" {
                settings.confirm_reset();
                print_form(&settings);
            } else {
                settings.cancel_reset();
            }
            continue;
        }

        match settings_command(&mut settings, api, line).await {
            Ok(SettingsCommand::Continue) => {}
            Ok(SettingsCommand::ConfirmReset) => pending_reset = true,
            Ok(SettingsCommand::Navigate(navigation)) => {
                print_notices(settings.notifier(), &mut shown);
                let target = navigation.follow().await;
                info!("Returning to {}", target);
                break;
            }
            Ok(SettingsCommand::Quit) => break,
            Err(e) => println!("{}", e),
        }
        print_notices(settings.notifier(), &mut shown);
    }
    Ok(())
}

enum SettingsCommand {
    Continue,
    ConfirmReset,
    Navigate(Navigation),
    Quit,
}

async fn settings_command(
    settings: &mut SettingsController,
    api: &ApiClient,
    line: &str,
) -> anyhow::Result<SettingsCommand> {
    let mut parts = line.splitn(3, ' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("source"), Some(kind), _) => {
            let kind: SourceType = kind.parse().map_err(anyhow::Error::msg)?;
            settings.form_mut()?.source_type = kind;
        }
        (Some("transport"), Some(kind), _) => {
            let kind: RtspTransport = kind.parse().map_err(anyhow::Error::msg)?;
            settings.form_mut()?.rtsp_transport = kind;
        }
        (Some("camera"), Some(value), _) => {
            if !settings.form_mut()?.webcam.select(value) {
                anyhow::bail!("camera {} is not listed", value);
            }
        }
        (Some("monitor"), Some(value), _) => {
            if !settings.form_mut()?.monitor.select(value) {
                anyhow::bail!("monitor {} is not listed", value);
            }
        }
        (Some("set"), Some(key), Some(value)) => {
            let field = RangeField::from_key(key)
                .ok_or_else(|| anyhow::anyhow!("unknown range {}", key))?;
            let form = settings.form_mut()?;
            form.set_range_text(field, value)?;
            println!("{} = {}", key, form.range_label(field));
        }
        (Some("rtsp"), Some(part), value) => {
            let value = value.unwrap_or_default().to_string();
            let rtsp = &mut settings.form_mut()?.rtsp;
            match part {
                "user" => rtsp.user = value,
                "password" => rtsp.password = value,
                "host" => rtsp.host = value,
                "port" => rtsp.port = value,
                "path" => rtsp.path = value,
                other => anyhow::bail!("unknown rtsp field: {}", other),
            }
            println!("{}", settings.form().rtsp_preview());
        }
        (Some("geometric"), Some(flag), _) => {
            settings.form_mut()?.use_geometric_filter = flag == "on";
        }
        (Some("refresh"), Some("cameras"), _) => settings.refresh_cameras(api).await?,
        (Some("refresh"), Some("monitors"), _) => settings.refresh_monitors(api).await?,
        (Some("show"), ..) => print_form(settings),
        (Some("reset"), ..) => {
            settings.request_reset()?;
            println!("Restore defaults? type yes to confirm");
            return Ok(SettingsCommand::ConfirmReset);
        }
        (Some("save"), ..) => {
            if let Some(navigation) = settings.submit(api).await? {
                return Ok(SettingsCommand::Navigate(navigation));
            }
        }
        (Some("quit" | "exit"), ..) => return Ok(SettingsCommand::Quit),
        (Some(""), ..) | (None, ..) => {}
        _ => anyhow::bail!("unknown command: {}", line),
    }
    Ok(SettingsCommand::Continue)
}

fn print_form(settings: &SettingsController) {
    let form = settings.form();
    println!("ready: {}", settings.is_ready());
    println!("source: {}", form.active_subform());
    for (name, select) in [("camera", &form.webcam), ("monitor", &form.monitor)] {
        let labels: Vec<&str> = select.options().iter().map(|o| o.label.as_str()).collect();
        println!("{}: {} of [{}]", name, select.value(), labels.join(", "));
    }
    println!("rtsp: {} ({})", form.rtsp_preview(), form.rtsp_transport);
    println!(
        "weights: {} imgsz {} tracker {}",
        form.weights, form.imgsz, form.tracker
    );
    println!("geometric filter: {}", form.geometric_panel_visible());
    for field in RangeField::ALL {
        println!("  {} = {}", field.key(), form.range_label(field));
    }
}
