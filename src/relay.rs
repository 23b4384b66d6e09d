//! Relay loop - per-connection orchestration
//!
//! One session per WebSocket connection: receive → decode → update state →
//! map → forward → update telemetry. Packet-level problems (bad frames,
//! device write failures) are logged and counted but never terminate the
//! connection; only transport-level failures drive the loop to its closed
//! state. On close every channel the session ever touched is reset to its
//! neutral value so a dropped connection cannot leave a pedal pressed.

use crate::device::SinkMode;
use crate::layouts::LayoutStore;
use crate::mapping::{map_axis, neutral_value, AxisChannel};
use crate::packet::{self, AxisMode, ControlPacket, Decoded};
use crate::state::{ControlState, StateStore};
use crate::telemetry::{TelemetrySnapshot, TelemetryTracker};
use axum::extract::ws::{Message, WebSocket};
use parking_lot::RwLock;
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Snapshots published for the dashboard and REST consumers.
///
/// Written only by the relay session, read concurrently by API handlers;
/// every write swaps in a complete owned value.
pub struct SharedView {
    pub telemetry: RwLock<TelemetrySnapshot>,
    pub control: RwLock<ControlState>,
    pub connected: AtomicBool,
    pub sink_label: RwLock<String>,
    /// Frames dropped or skipped since startup (diagnosability counter)
    pub frames_dropped: AtomicU64,
}

impl SharedView {
    pub fn new(sink_label: &str) -> Self {
        Self {
            telemetry: RwLock::new(TelemetrySnapshot {
                packets_received: 0,
                packets_per_second: 0,
                avg_cadence_ms: None,
                avg_latency_ms: None,
                uptime_seconds: 0.0,
            }),
            control: RwLock::new(ControlState::default()),
            connected: AtomicBool::new(false),
            sink_label: RwLock::new(sink_label.to_string()),
            frames_dropped: AtomicU64::new(0),
        }
    }
}

/// State and collaborators for one relay connection.
pub struct RelaySession {
    state: StateStore,
    telemetry: TelemetryTracker,
    sink: SinkMode,
    layouts: Arc<LayoutStore>,
    view: Arc<SharedView>,
    /// Axis channels forwarded at least once, with their last seen mode
    forwarded_axes: HashMap<AxisChannel, AxisMode>,
    /// Button indices forwarded at least once
    forwarded_buttons: Vec<u32>,
}

impl RelaySession {
    pub fn new(
        sink: SinkMode,
        layouts: Arc<LayoutStore>,
        view: Arc<SharedView>,
        telemetry_window: usize,
    ) -> Self {
        if sink.is_dry() {
            warn!("relay session starting in DRY mode: no device forwarding");
        }
        view.connected.store(true, Ordering::SeqCst);
        *view.sink_label.write() = sink.label().to_string();

        Self {
            state: StateStore::new(),
            telemetry: TelemetryTracker::with_window(telemetry_window),
            sink,
            layouts,
            view,
            forwarded_axes: HashMap::new(),
            forwarded_buttons: Vec::new(),
        }
    }

    /// Process one text frame. Returns an optional reply to send back.
    pub async fn process_text(&mut self, text: &str) -> Option<String> {
        self.process_decoded(packet::decode_text(text)).await
    }

    /// Process one binary frame. Returns an optional reply to send back.
    pub async fn process_bytes(&mut self, raw: &[u8]) -> Option<String> {
        self.process_decoded(packet::decode_bytes(raw)).await
    }

    async fn process_decoded(
        &mut self,
        decoded: Result<Decoded, packet::DecodeError>,
    ) -> Option<String> {
        match decoded {
            Ok(Decoded::Controls(packet)) => {
                self.apply_controls(packet).await;
                None
            }
            Ok(Decoded::Ping { ts }) => {
                if let Some(ts) = ts {
                    // Client->server leg; clamped so clock skew can't go negative
                    let now_ms = chrono::Utc::now().timestamp_millis() as f64;
                    self.telemetry.record_latency((now_ms - ts).max(0.0));
                    self.publish_telemetry();
                }
                Some(json!({ "type": "pong", "ts": ts }).to_string())
            }
            Ok(Decoded::LayoutSync(client_layouts)) => {
                let merged = match self.layouts.merge_from_client(client_layouts) {
                    Ok(merged) => merged,
                    Err(e) => {
                        warn!("layout sync failed to persist: {e:#}");
                        self.layouts.list()
                    }
                };
                Some(json!({ "type": "layouts/synced", "data": merged }).to_string())
            }
            Ok(Decoded::Skip) => {
                debug!("skipping frame with unhandled type");
                self.view.frames_dropped.fetch_add(1, Ordering::Relaxed);
                None
            }
            Err(e) => {
                debug!("dropping undecodable frame: {e}");
                self.view.frames_dropped.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Apply a control packet: telemetry, state replacement, then
    /// best-effort forwarding of every mapped channel.
    async fn apply_controls(&mut self, packet: ControlPacket) {
        self.telemetry.record_packet();
        self.state.apply(&packet);

        if let SinkMode::Live(sink) = &self.sink {
            // Calls are awaited one by one: strictly ordered writes, and a
            // failure on one channel never aborts the rest of the packet.
            for (name, axis) in &packet.axes {
                let Some(channel) = AxisChannel::from_name(name) else {
                    // Valid in the packet, no device target
                    continue;
                };
                let native = map_axis(axis.value, axis.mode);
                match sink.set_axis(channel, native).await {
                    Ok(()) => {
                        self.forwarded_axes.insert(channel, axis.mode);
                    }
                    Err(e) => warn!(%channel, "axis write failed: {e}"),
                }
            }

            for (key, pressed) in &packet.buttons {
                let Ok(index) = key.parse::<u32>() else {
                    continue;
                };
                match sink.set_button(index, *pressed).await {
                    Ok(()) => {
                        if !self.forwarded_buttons.contains(&index) {
                            self.forwarded_buttons.push(index);
                        }
                    }
                    Err(e) => warn!(index, "button write failed: {e}"),
                }
            }
        }

        self.publish_telemetry();
        *self.view.control.write() = self.state.snapshot();
    }

    fn publish_telemetry(&self) {
        *self.view.telemetry.write() = self.telemetry.snapshot();
    }

    /// Reset every channel this session forwarded: buttons released,
    /// normal axes to zero, centered axes to midpoint. Best effort.
    pub async fn neutralize(&mut self) {
        let SinkMode::Live(sink) = &self.sink else {
            return;
        };
        if self.forwarded_axes.is_empty() && self.forwarded_buttons.is_empty() {
            return;
        }

        info!(
            axes = self.forwarded_axes.len(),
            buttons = self.forwarded_buttons.len(),
            "neutralizing device channels on close"
        );
        for (channel, mode) in self.forwarded_axes.drain() {
            if let Err(e) = sink.set_axis(channel, neutral_value(mode)).await {
                warn!(%channel, "failed to neutralize axis: {e}");
            }
        }
        for index in self.forwarded_buttons.drain(..) {
            if let Err(e) = sink.set_button(index, false).await {
                warn!(index, "failed to release button: {e}");
            }
        }
    }

    /// Drive the session over a WebSocket until the peer disconnects or
    /// the transport fails. Never returns an error to the caller.
    pub async fn run(mut self, mut socket: WebSocket) {
        info!(sink = self.sink.label(), "client connected");

        loop {
            let msg = match socket.recv().await {
                Some(Ok(msg)) => msg,
                Some(Err(e)) => {
                    // Transport-level failure: fatal to this loop only
                    warn!("websocket transport error: {e}");
                    break;
                }
                None => break,
            };

            let reply = match msg {
                Message::Text(text) => self.process_text(&text).await,
                Message::Binary(raw) => self.process_bytes(&raw).await,
                Message::Ping(data) => {
                    if socket.send(Message::Pong(data)).await.is_err() {
                        break;
                    }
                    None
                }
                Message::Pong(_) => None,
                Message::Close(_) => break,
            };

            if let Some(reply) = reply {
                if socket.send(Message::Text(reply)).await.is_err() {
                    warn!("failed to send reply, closing");
                    break;
                }
            }
        }

        self.neutralize().await;
        self.view.connected.store(false, Ordering::SeqCst);
        info!("client disconnected");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DeviceError, DeviceSink};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use tempfile::TempDir;

    /// Records every write; optionally fails a named axis channel.
    struct MockSink {
        axis_calls: Mutex<Vec<(AxisChannel, u16)>>,
        button_calls: Mutex<Vec<(u32, bool)>>,
        fail_axis: Option<AxisChannel>,
    }

    impl MockSink {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                axis_calls: Mutex::new(Vec::new()),
                button_calls: Mutex::new(Vec::new()),
                fail_axis: None,
            })
        }

        fn failing_on(channel: AxisChannel) -> Arc<Self> {
            Arc::new(Self {
                axis_calls: Mutex::new(Vec::new()),
                button_calls: Mutex::new(Vec::new()),
                fail_axis: Some(channel),
            })
        }
    }

    #[async_trait]
    impl DeviceSink for MockSink {
        fn name(&self) -> &str {
            "mock"
        }

        async fn set_axis(&self, channel: AxisChannel, value: u16) -> Result<(), DeviceError> {
            if self.fail_axis == Some(channel) {
                return Err(DeviceError::Rejected(format!("{channel} is jammed")));
            }
            self.axis_calls.lock().push((channel, value));
            Ok(())
        }

        async fn set_button(&self, index: u32, pressed: bool) -> Result<(), DeviceError> {
            self.button_calls.lock().push((index, pressed));
            Ok(())
        }
    }

    fn session_with(sink: SinkMode) -> (RelaySession, Arc<SharedView>, TempDir) {
        let dir = TempDir::new().unwrap();
        let layouts = Arc::new(LayoutStore::open(dir.path().join("layouts.json")));
        let view = Arc::new(SharedView::new(sink.label()));
        let session = RelaySession::new(sink, layouts, view.clone(), 30);
        (session, view, dir)
    }

    #[tokio::test]
    async fn test_control_packet_maps_and_forwards() {
        let sink = MockSink::new();
        let (mut session, view, _dir) = session_with(SinkMode::Live(sink.clone()));

        let reply = session
            .process_text(
                r#"{"type":"controls","data":{
                    "axes":{"X":{"value":0.5,"mode":"normal"}},
                    "buttons":{"1":true}
                }}"#,
            )
            .await;
        assert!(reply.is_none());

        assert_eq!(
            sink.axis_calls.lock().as_slice(),
            &[(AxisChannel::X, 16384)]
        );
        assert_eq!(sink.button_calls.lock().as_slice(), &[(1, true)]);

        let snap = view.telemetry.read().clone();
        assert_eq!(snap.packets_received, 1);
        let control = view.control.read().clone();
        assert_eq!(control.axes["X"].value, 0.5);
        assert_eq!(control.buttons[&1], true);
    }

    #[tokio::test]
    async fn test_unknown_channel_kept_in_state_not_forwarded() {
        let sink = MockSink::new();
        let (mut session, view, _dir) = session_with(SinkMode::Live(sink.clone()));

        session
            .process_text(
                r#"{"type":"controls","data":{
                    "axes":{"WARP":{"value":1.0,"mode":"normal"}}
                }}"#,
            )
            .await;

        assert!(sink.axis_calls.lock().is_empty());
        assert!(view.control.read().axes.contains_key("WARP"));
    }

    #[tokio::test]
    async fn test_device_failure_isolated_per_channel() {
        let sink = MockSink::failing_on(AxisChannel::X);
        let (mut session, view, _dir) = session_with(SinkMode::Live(sink.clone()));

        session
            .process_text(
                r#"{"type":"controls","data":{
                    "axes":{
                        "X":{"value":1.0,"mode":"normal"},
                        "Y":{"value":0.0,"mode":"centered"}
                    },
                    "buttons":{"2":true}
                }}"#,
            )
            .await;

        // X failed but Y and the button still went through
        assert_eq!(
            sink.axis_calls.lock().as_slice(),
            &[(AxisChannel::Y, 16384)]
        );
        assert_eq!(sink.button_calls.lock().as_slice(), &[(2, true)]);
        // State still reflects the whole packet
        assert_eq!(view.control.read().axes.len(), 2);
    }

    #[tokio::test]
    async fn test_dry_mode_updates_state_without_forwarding() {
        let (mut session, view, _dir) = session_with(SinkMode::Dry);

        session
            .process_text(
                r#"{"type":"controls","data":{
                    "axes":{"X":{"value":0.5,"mode":"normal"}},
                    "buttons":{"1":true}
                }}"#,
            )
            .await;

        assert_eq!(view.telemetry.read().packets_received, 1);
        assert_eq!(view.control.read().axes["X"].value, 0.5);
        assert_eq!(&*view.sink_label.read(), "dry");
    }

    #[tokio::test]
    async fn test_non_control_and_malformed_leave_telemetry_untouched() {
        let sink = MockSink::new();
        let (mut session, view, _dir) = session_with(SinkMode::Live(sink.clone()));

        session.process_text(r#"{"type":"chat","data":"hi"}"#).await;
        session.process_text("{broken json").await;
        session.process_bytes(&[0xff, 0xfe]).await;

        let snap = view.telemetry.read().clone();
        assert_eq!(snap.packets_received, 0);
        assert_eq!(snap.avg_cadence_ms, None);
        assert!(sink.axis_calls.lock().is_empty());
        assert_eq!(view.frames_dropped.load(Ordering::Relaxed), 3);
        assert_eq!(view.control.read().axes.len(), 0);
    }

    #[tokio::test]
    async fn test_ping_answered_with_pong_and_latency_recorded() {
        let (mut session, view, _dir) = session_with(SinkMode::Dry);

        let past = chrono::Utc::now().timestamp_millis() as f64 - 25.0;
        let reply = session
            .process_text(&format!(r#"{{"type":"ping","ts":{past}}}"#))
            .await
            .expect("ping must be answered");

        let parsed: serde_json::Value = serde_json::from_str(&reply).unwrap();
        assert_eq!(parsed["type"], "pong");
        assert_eq!(parsed["ts"].as_f64(), Some(past));

        let latency = view.telemetry.read().avg_latency_ms.unwrap();
        assert!(latency >= 25.0, "latency was {latency}");
        // A ping is not a control packet
        assert_eq!(view.telemetry.read().packets_received, 0);
    }

    #[tokio::test]
    async fn test_layout_sync_merges_and_replies() {
        let (mut session, _view, _dir) = session_with(SinkMode::Dry);

        let reply = session
            .process_text(r#"{"type":"layouts/sync","data":{"gt":{"name":"GT"}}}"#)
            .await
            .expect("sync must be answered");

        let parsed: serde_json::Value = serde_json::from_str(&reply).unwrap();
        assert_eq!(parsed["type"], "layouts/synced");
        assert_eq!(parsed["data"]["gt"]["name"], "GT");
        assert_eq!(session.layouts.get("gt").unwrap()["name"], "GT");
    }

    #[tokio::test]
    async fn test_neutralize_releases_everything_forwarded() {
        let sink = MockSink::new();
        let (mut session, _view, _dir) = session_with(SinkMode::Live(sink.clone()));

        session
            .process_text(
                r#"{"type":"controls","data":{
                    "axes":{
                        "X":{"value":1.0,"mode":"normal"},
                        "Y":{"value":-0.8,"mode":"centered"}
                    },
                    "buttons":{"3":true}
                }}"#,
            )
            .await;

        sink.axis_calls.lock().clear();
        sink.button_calls.lock().clear();

        session.neutralize().await;

        let axes = sink.axis_calls.lock().clone();
        assert_eq!(axes.len(), 2);
        assert!(axes.contains(&(AxisChannel::X, 0)));
        assert!(axes.contains(&(AxisChannel::Y, 16384)));
        assert_eq!(sink.button_calls.lock().as_slice(), &[(3, false)]);

        // Second call is a no-op (channels were drained)
        sink.axis_calls.lock().clear();
        session.neutralize().await;
        assert!(sink.axis_calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_replacement_visible_through_view() {
        let (mut session, view, _dir) = session_with(SinkMode::Dry);

        session
            .process_text(
                r#"{"type":"controls","data":{
                    "axes":{"X":{"value":0.2,"mode":"normal"},"Y":{"value":0.4,"mode":"normal"}},
                    "buttons":{"1":true}
                }}"#,
            )
            .await;
        session
            .process_text(
                r#"{"type":"controls","data":{
                    "axes":{"Z":{"value":0.6,"mode":"normal"}}
                }}"#,
            )
            .await;

        let control = view.control.read().clone();
        assert_eq!(control.axes.len(), 1);
        assert!(control.axes.contains_key("Z"));
        assert!(control.buttons.is_empty());
    }
}
