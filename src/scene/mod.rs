//! Scene state engine.
//!
//! A single actor task owns the device map, the dispatch table and the
//! visible visuals; everything else talks to it through [`SceneHandle`]
//! commands. The poll loop feeds controller events in from its own task.

pub mod dispatch;


use crate::controller::{ControllerClient, ControllerEvent};
use crate::device::{Device, DeviceKey};
use crate::path;
use crate::render::{self, DeviceVisual};
use crate::widget::{WidgetDefinition, WidgetResolver};
use anyhow::{anyhow, Result};
use dispatch::{build_dispatch, parse_update_path, DispatchTable};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

const COMMAND_BUFFER: usize = 64;
const FAILURE_BACKOFF: Duration = Duration::from_secs(5);
const BATCH_PAUSE: Duration = Duration::from_secs(1);

enum SceneCommand {
    InsertDevice(Device),
    RemoveDevice(DeviceKey),
    ApplyEvents(Vec<ControllerEvent>),
    ShowDevice(DeviceKey, Box<dyn DeviceVisual>),
    HideDevice(DeviceKey),
    SetActiveFloor(Option<String>),
    RebuildDispatch,
    DeviceState(DeviceKey, oneshot::Sender<Option<Map<String, Value>>>),
    Snapshot(oneshot::Sender<SceneSnapshot>),
}

/// Point-in-time view of the scene for queries and tests.
#[derive(Debug, Clone)]
pub struct SceneSnapshot {
    pub device_count: usize,
    pub visible_count: usize,
    pub active_floor: Option<String>,
    pub route_count: usize,
}

#[derive(Clone)]
pub struct SceneHandle {
    tx: mpsc::Sender<SceneCommand>,
}

impl SceneHandle {
    pub async fn insert_device(&self, device: Device) -> Result<()> {
        self.send(SceneCommand::InsertDevice(device)).await
    }

    pub async fn remove_device(&self, key: DeviceKey) -> Result<()> {
        self.send(SceneCommand::RemoveDevice(key)).await
    }

    pub async fn apply_events(&self, events: Vec<ControllerEvent>) -> Result<()> {
        self.send(SceneCommand::ApplyEvents(events)).await
    }

    pub async fn show_device(&self, key: DeviceKey, visual: Box<dyn DeviceVisual>) -> Result<()> {
        self.send(SceneCommand::ShowDevice(key, visual)).await
    }

    pub async fn hide_device(&self, key: DeviceKey) -> Result<()> {
        self.send(SceneCommand::HideDevice(key)).await
    }

    pub async fn set_active_floor(&self, floor: Option<String>) -> Result<()> {
        self.send(SceneCommand::SetActiveFloor(floor)).await
    }

    pub async fn rebuild_dispatch(&self) -> Result<()> {
        self.send(SceneCommand::RebuildDispatch).await
    }

    pub async fn device_state(&self, key: DeviceKey) -> Result<Option<Map<String, Value>>> {
        let (tx, rx) = oneshot::channel();
        self.send(SceneCommand::DeviceState(key, tx)).await?;
        rx.await.map_err(|_| anyhow!("Scene task stopped"))
    }

    pub async fn snapshot(&self) -> Result<SceneSnapshot> {
        let (tx, rx) = oneshot::channel();
        self.send(SceneCommand::Snapshot(tx)).await?;
        rx.await.map_err(|_| anyhow!("Scene task stopped"))
    }

    async fn send(&self, command: SceneCommand) -> Result<()> {
        self.tx
            .send(command)
            .await
            .map_err(|_| anyhow!("Scene task stopped"))
    }
}

struct Scene {
    resolver: Arc<WidgetResolver>,
    devices: HashMap<DeviceKey, Device>,
    widgets: HashMap<DeviceKey, Arc<WidgetDefinition>>,
    visuals: HashMap<DeviceKey, Box<dyn DeviceVisual>>,
    active_floor: Option<String>,
    dispatch: DispatchTable,
    /// Shared fallback definition for unresolvable device types
    generic: Arc<WidgetDefinition>,
}

/// Spawn the scene actor and return its handle.
pub fn spawn(resolver: Arc<WidgetResolver>) -> SceneHandle {
    let (tx, mut rx) = mpsc::channel(COMMAND_BUFFER);
    let mut scene = Scene {
        resolver,
        devices: HashMap::new(),
        widgets: HashMap::new(),
        visuals: HashMap::new(),
        active_floor: None,
        dispatch: DispatchTable::default(),
        generic: Arc::new(WidgetDefinition::generic()),
    };

    tokio::spawn(async move {
        while let Some(command) = rx.recv().await {
            scene.handle(command);
        }
        debug!("Scene task finished");
    });

    SceneHandle { tx }
}

impl Scene {
    fn handle(&mut self, command: SceneCommand) {
        match command {
            SceneCommand::InsertDevice(device) => {
                let key = device.id.clone();
                match self
                    .resolver
                    .resolve(&device.device_type, device.widget.as_deref())
                {
                    Some(widget) => {
                        self.widgets.insert(key.clone(), widget);
                    }
                    None => {
                        warn!(device = %key, device_type = %device.device_type, "No widget resolved, falling back to the generic widget");
                        self.widgets.insert(key.clone(), Arc::clone(&self.generic));
                    }
                }
                self.devices.insert(key, device);
                self.dispatch = build_dispatch(&self.devices, &self.widgets);
            }
            SceneCommand::RemoveDevice(key) => {
                self.devices.remove(&key);
                self.widgets.remove(&key);
                self.visuals.remove(&key);
                self.dispatch = build_dispatch(&self.devices, &self.widgets);
            }
            SceneCommand::ApplyEvents(events) => {
                for event in &events {
                    let changed = apply_event(&mut self.devices, &self.dispatch, event);
                    for key in changed {
                        self.rerender(&key);
                    }
                }
            }
            SceneCommand::ShowDevice(key, visual) => {
                self.visuals.insert(key.clone(), visual);
                self.rerender(&key);
            }
            SceneCommand::HideDevice(key) => {
                self.visuals.remove(&key);
            }
            SceneCommand::SetActiveFloor(floor) => {
                self.active_floor = floor;
            }
            SceneCommand::RebuildDispatch => {
                self.dispatch = build_dispatch(&self.devices, &self.widgets);
            }
            SceneCommand::DeviceState(key, reply) => {
                let state = self.devices.get(&key).and_then(|d| d.state.clone());
                let _ = reply.send(state);
            }
            SceneCommand::Snapshot(reply) => {
                let _ = reply.send(SceneSnapshot {
                    device_count: self.devices.len(),
                    visible_count: self.visuals.len(),
                    active_floor: self.active_floor.clone(),
                    route_count: self.dispatch.route_count(),
                });
            }
        }
    }

    /// Push current state to the device's visual, if it has one and is on the
    /// active floor. State is always current regardless; this only covers the
    /// on-screen side.
    fn rerender(&mut self, key: &DeviceKey) {
        let Some(visual) = self.visuals.get_mut(key) else {
            return;
        };
        let Some(device) = self.devices.get(key) else {
            return;
        };
        if let Some(floor) = self.active_floor.as_deref() {
            if !device.is_on_floor(floor) {
                return;
            }
        }
        if let Some(widget) = self.widgets.get(key) {
            render::render_device(device, widget, visual.as_mut(), &self.resolver);
        }
    }
}

/// Apply one controller event to the device map, returning the keys whose
/// state changed.
///
/// Unknown event types and untargeted devices are ignored; a payload without
/// its id path is logged and dropped.
pub fn apply_event(
    devices: &mut HashMap<DeviceKey, Device>,
    dispatch: &DispatchTable,
    event: &ControllerEvent,
) -> Vec<DeviceKey> {
    let Some(route) = dispatch.route(&event.event_type) else {
        return Vec::new();
    };
    let Some(key) = route.extract_key(&event.data) else {
        warn!(event_type = %event.event_type, "Event payload missing its id path");
        return Vec::new();
    };
    let Some(target) = route.target_for(&key) else {
        return Vec::new();
    };
    let Some(device) = devices.get_mut(&key) else {
        return Vec::new();
    };

    let event_property = event.data.get("property").and_then(Value::as_str);
    if event.event_type == "DevicePropertyUpdatedEvent" {
        if let Some(property) = event_property {
            if !is_tracked_property(device, target, property) {
                debug!(device = %key, property = %property, "Untracked property, ignoring");
                return Vec::new();
            }
        }
    }

    let mut touched = false;
    for (state_key, spec) in &target.updates {
        let update = parse_update_path(spec);
        if !update.gates.is_empty() {
            let gated_in = event_property
                .map(|p| update.gates.iter().any(|g| g == p))
                .unwrap_or(false);
            if !gated_in {
                continue;
            }
        }
        let Some(value) = path::resolve(&event.data, &update.path) else {
            continue;
        };
        if !target.widget.state.contains_key(state_key) {
            warn!(device = %key, key = %state_key, "Update targets an undeclared state key, skipping");
            continue;
        }
        let value = render::normalize_state_value(state_key, value.clone());
        device
            .state
            .get_or_insert_with(Map::new)
            .insert(state_key.clone(), value);
        touched = true;
    }

    if touched {
        vec![key]
    } else {
        Vec::new()
    }
}

/// A property counts as tracked when the device already carries it, the
/// widget declares it, or an update path gates on it.
fn is_tracked_property(device: &Device, target: &dispatch::Target, property: &str) -> bool {
    if let Some(state) = device.state.as_ref() {
        if state.contains_key(property) {
            return true;
        }
    }
    if target.widget.state.contains_key(property) {
        return true;
    }
    target
        .updates
        .values()
        .any(|spec| parse_update_path(spec).gates.iter().any(|g| g == property))
}

/// Next poll cursor given what the feed reported. Never moves backwards.
pub fn advance_cursor(current: i64, reported: i64) -> i64 {
    current.max(reported)
}

/// Long-poll the controller's change feed and forward batches to the scene.
///
/// Runs until the stop flag is raised. A failed poll backs off for a fixed
/// interval; a non-empty batch pauses briefly before the next poll so event
/// bursts coalesce.
pub async fn run_poll_loop(client: ControllerClient, scene: SceneHandle, stop: Arc<AtomicBool>) {
    let mut cursor: i64 = 0;
    info!("Change feed poll loop starting");

    while !stop.load(Ordering::Relaxed) {
        match client.poll_changes(cursor).await {
            Ok(batch) => {
                cursor = advance_cursor(cursor, batch.last);
                if batch.events.is_empty() {
                    continue;
                }
                debug!(count = batch.events.len(), cursor = cursor, "Applying event batch");
                if scene.apply_events(batch.events).await.is_err() {
                    break;
                }
                tokio::time::sleep(BATCH_PAUSE).await;
            }
            Err(err) => {
                warn!(error = %err, "Change feed poll failed, backing off");
                tokio::time::sleep(FAILURE_BACKOFF).await;
            }
        }
    }
    info!("Change feed poll loop stopped");
}
