//! Remote widget engine.
//!
//! One actor task owns every connected peripheral and every placed widget
//! instance. Connection tasks, the UI and tests all drive it through
//! [`EngineHandle`] commands; state changes fan out as [`Notice`] broadcasts.

use super::persistence::{PlacementRecord, PlacementStore};
use super::protocol::{EngineMessage, RemoteWidgetSpec, WidgetChanges, WidgetEventData};
use anyhow::{anyhow, Result};
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, warn};

const COMMAND_BUFFER: usize = 64;
pub(super) const OUTBOUND_BUFFER: usize = 32;
const NOTICE_BUFFER: usize = 128;

/// Connection identity, issued per WebSocket accept.
pub type ConnectionId = String;

/// Engine state change notifications for the UI layer.
#[derive(Debug, Clone)]
pub enum Notice {
    PeripheralConnected {
        peripheral_id: String,
        peripheral_name: Option<String>,
    },
    PeripheralDisconnected {
        peripheral_id: String,
    },
    InstancePlaced {
        instance_id: String,
    },
    InstanceRemoved {
        instance_id: String,
    },
    InstanceUpdated {
        instance_id: String,
    },
    DeliveryFailed {
        instance_id: String,
    },
}

/// A placed remote widget as the engine sees it.
///
/// The id is ephemeral; identity across restarts is the placement key
/// (peripheral, widget, floor, position).
#[derive(Debug, Clone)]
pub struct WidgetInstance {
    pub id: String,
    pub peripheral_id: String,
    /// `None` while the owning peripheral is offline
    pub connection_id: Option<ConnectionId>,
    pub widget_id: String,
    pub name: String,
    pub icon_set: Option<String>,
    pub label: Option<String>,
    pub color: Option<String>,
    pub background_color: Option<String>,
    pub style: BTreeMap<String, String>,
    pub floor: String,
    pub x: f64,
    pub y: f64,
    pub parameters: Option<Value>,
    pub custom_label: Option<String>,
    pub custom_icon_set: Option<String>,
    pub custom_icon_package: Option<String>,
    pub connected: bool,
}

impl WidgetInstance {
    fn matches_record(&self, record: &PlacementRecord) -> bool {
        record.matches(&self.peripheral_id, &self.widget_id, &self.floor, self.x, self.y)
    }

    /// Label shown on screen, customization first.
    pub fn effective_label(&self) -> Option<&str> {
        self.custom_label.as_deref().or(self.label.as_deref())
    }

    /// Icon set used for rendering, customization first.
    pub fn effective_icon_set(&self) -> Option<&str> {
        self.custom_icon_set.as_deref().or(self.icon_set.as_deref())
    }
}

/// Per-placement customization applied through the configuration dialog.
#[derive(Debug, Clone, Default)]
pub struct InstanceConfig {
    pub label: Option<String>,
    pub icon_set: Option<String>,
    pub icon_package: Option<String>,
    /// Single key/value pair handed back with interaction events
    pub parameter: Option<(String, Value)>,
}

/// Connected peripheral summary for the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ClientInfo {
    #[serde(rename = "connectionId")]
    pub connection_id: ConnectionId,
    #[serde(rename = "peripheralId")]
    pub peripheral_id: Option<String>,
    #[serde(rename = "peripheralName")]
    pub peripheral_name: Option<String>,
    #[serde(rename = "widgetCount")]
    pub widget_count: usize,
}

struct RemoteClient {
    outbound: mpsc::Sender<EngineMessage>,
    peripheral_id: Option<String>,
    peripheral_name: Option<String>,
    widgets: Vec<RemoteWidgetSpec>,
}

enum EngineCommand {
    Connect {
        connection_id: ConnectionId,
        outbound: mpsc::Sender<EngineMessage>,
    },
    Register {
        connection_id: ConnectionId,
        peripheral_id: String,
        peripheral_name: Option<String>,
        widgets: Vec<RemoteWidgetSpec>,
    },
    WidgetUpdate {
        connection_id: ConnectionId,
        widget_id: String,
        changes: WidgetChanges,
    },
    Unregister {
        connection_id: ConnectionId,
        peripheral_id: String,
    },
    Disconnect {
        connection_id: ConnectionId,
    },
    PlaceWidget {
        connection_id: ConnectionId,
        widget_id: String,
        floor: String,
        x: f64,
        y: f64,
        reply: oneshot::Sender<Result<String>>,
    },
    RemoveInstance {
        instance_id: String,
    },
    Click {
        instance_id: String,
        reply: oneshot::Sender<bool>,
    },
    Configure {
        instance_id: String,
        config: InstanceConfig,
    },
    ClearConfig {
        instance_id: String,
    },
    Instances {
        reply: oneshot::Sender<Vec<WidgetInstance>>,
    },
    Clients {
        reply: oneshot::Sender<Vec<ClientInfo>>,
    },
}

#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineCommand>,
    notices: broadcast::Sender<Notice>,
}

impl EngineHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.notices.subscribe()
    }

    /// Register a fresh connection; the engine answers with `request-widgets`
    /// on the outbound channel.
    pub async fn connect(
        &self,
        connection_id: ConnectionId,
        outbound: mpsc::Sender<EngineMessage>,
    ) -> Result<()> {
        self.send(EngineCommand::Connect {
            connection_id,
            outbound,
        })
        .await
    }

    pub async fn register(
        &self,
        connection_id: ConnectionId,
        peripheral_id: String,
        peripheral_name: Option<String>,
        widgets: Vec<RemoteWidgetSpec>,
    ) -> Result<()> {
        self.send(EngineCommand::Register {
            connection_id,
            peripheral_id,
            peripheral_name,
            widgets,
        })
        .await
    }

    pub async fn widget_update(
        &self,
        connection_id: ConnectionId,
        widget_id: String,
        changes: WidgetChanges,
    ) -> Result<()> {
        self.send(EngineCommand::WidgetUpdate {
            connection_id,
            widget_id,
            changes,
        })
        .await
    }

    pub async fn unregister(
        &self,
        connection_id: ConnectionId,
        peripheral_id: String,
    ) -> Result<()> {
        self.send(EngineCommand::Unregister {
            connection_id,
            peripheral_id,
        })
        .await
    }

    pub async fn disconnect(&self, connection_id: ConnectionId) -> Result<()> {
        self.send(EngineCommand::Disconnect { connection_id }).await
    }

    pub async fn place_widget(
        &self,
        connection_id: ConnectionId,
        widget_id: String,
        floor: String,
        x: f64,
        y: f64,
    ) -> Result<String> {
        let (tx, rx) = oneshot::channel();
        self.send(EngineCommand::PlaceWidget {
            connection_id,
            widget_id,
            floor,
            x,
            y,
            reply: tx,
        })
        .await?;
        rx.await.map_err(|_| anyhow!("Engine task stopped"))?
    }

    pub async fn remove_instance(&self, instance_id: String) -> Result<()> {
        self.send(EngineCommand::RemoveInstance { instance_id }).await
    }

    /// Deliver a click to the owning peripheral. `false` means the peripheral
    /// was unreachable; the instance stays placed either way.
    pub async fn click(&self, instance_id: String) -> Result<bool> {
        let (tx, rx) = oneshot::channel();
        self.send(EngineCommand::Click {
            instance_id,
            reply: tx,
        })
        .await?;
        rx.await.map_err(|_| anyhow!("Engine task stopped"))
    }

    pub async fn configure(&self, instance_id: String, config: InstanceConfig) -> Result<()> {
        self.send(EngineCommand::Configure {
            instance_id,
            config,
        })
        .await
    }

    pub async fn clear_config(&self, instance_id: String) -> Result<()> {
        self.send(EngineCommand::ClearConfig { instance_id }).await
    }

    pub async fn instances(&self) -> Result<Vec<WidgetInstance>> {
        let (tx, rx) = oneshot::channel();
        self.send(EngineCommand::Instances { reply: tx }).await?;
        rx.await.map_err(|_| anyhow!("Engine task stopped"))
    }

    pub async fn clients(&self) -> Result<Vec<ClientInfo>> {
        let (tx, rx) = oneshot::channel();
        self.send(EngineCommand::Clients { reply: tx }).await?;
        rx.await.map_err(|_| anyhow!("Engine task stopped"))
    }

    async fn send(&self, command: EngineCommand) -> Result<()> {
        self.tx
            .send(command)
            .await
            .map_err(|_| anyhow!("Engine task stopped"))
    }
}

struct Engine {
    clients: HashMap<ConnectionId, RemoteClient>,
    instances: HashMap<String, WidgetInstance>,
    placements: Arc<dyn PlacementStore>,
    notices: broadcast::Sender<Notice>,
}

/// Spawn the engine actor. Persisted placements come back immediately as
/// offline placeholder instances; peripherals reclaim them on registration.
pub fn spawn(placements: Arc<dyn PlacementStore>) -> EngineHandle {
    let (tx, mut rx) = mpsc::channel(COMMAND_BUFFER);
    let (notices, _) = broadcast::channel(NOTICE_BUFFER);

    let mut engine = Engine {
        clients: HashMap::new(),
        instances: HashMap::new(),
        placements,
        notices: notices.clone(),
    };
    engine.restore_offline();

    tokio::spawn(async move {
        while let Some(command) = rx.recv().await {
            engine.handle(command);
        }
        debug!("Remote widget engine finished");
    });

    EngineHandle { tx, notices }
}

impl Engine {
    fn handle(&mut self, command: EngineCommand) {
        match command {
            EngineCommand::Connect {
                connection_id,
                outbound,
            } => self.on_connect(connection_id, outbound),
            EngineCommand::Register {
                connection_id,
                peripheral_id,
                peripheral_name,
                widgets,
            } => self.on_register(connection_id, peripheral_id, peripheral_name, widgets),
            EngineCommand::WidgetUpdate {
                connection_id,
                widget_id,
                changes,
            } => self.on_widget_update(&connection_id, &widget_id, changes),
            EngineCommand::Unregister {
                connection_id,
                peripheral_id,
            } => self.on_unregister(&connection_id, &peripheral_id),
            EngineCommand::Disconnect { connection_id } => self.on_disconnect(&connection_id),
            EngineCommand::PlaceWidget {
                connection_id,
                widget_id,
                floor,
                x,
                y,
                reply,
            } => {
                let _ = reply.send(self.on_place(&connection_id, &widget_id, floor, x, y));
            }
            EngineCommand::RemoveInstance { instance_id } => self.on_remove(&instance_id),
            EngineCommand::Click { instance_id, reply } => {
                let _ = reply.send(self.on_click(&instance_id));
            }
            EngineCommand::Configure {
                instance_id,
                config,
            } => self.on_configure(&instance_id, config),
            EngineCommand::ClearConfig { instance_id } => self.on_clear_config(&instance_id),
            EngineCommand::Instances { reply } => {
                let _ = reply.send(self.instances.values().cloned().collect());
            }
            EngineCommand::Clients { reply } => {
                let infos = self
                    .clients
                    .iter()
                    .map(|(id, client)| ClientInfo {
                        connection_id: id.clone(),
                        peripheral_id: client.peripheral_id.clone(),
                        peripheral_name: client.peripheral_name.clone(),
                        widget_count: client.widgets.len(),
                    })
                    .collect();
                let _ = reply.send(infos);
            }
        }
    }

    /// Recreate placeholder instances from persisted placements. Idempotent:
    /// already-materialized placements are skipped.
    fn restore_offline(&mut self) {
        let records = match self.placements.load() {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, "Failed to load placements");
                return;
            }
        };
        for record in records {
            if self.instances.values().any(|i| i.matches_record(&record)) {
                continue;
            }
            let instance = instance_from_record(&record, None);
            info!(instance = %instance.id, peripheral = %record.peripheral_id, "Restored offline placement");
            self.instances.insert(instance.id.clone(), instance);
        }
    }

    fn on_connect(&mut self, connection_id: ConnectionId, outbound: mpsc::Sender<EngineMessage>) {
        info!(connection = %connection_id, "Peripheral connection opened");
        if outbound.try_send(EngineMessage::RequestWidgets).is_err() {
            warn!(connection = %connection_id, "Could not request widget registration");
        }
        self.clients.insert(
            connection_id,
            RemoteClient {
                outbound,
                peripheral_id: None,
                peripheral_name: None,
                widgets: Vec::new(),
            },
        );
    }

    fn on_register(
        &mut self,
        connection_id: ConnectionId,
        peripheral_id: String,
        peripheral_name: Option<String>,
        widgets: Vec<RemoteWidgetSpec>,
    ) {
        // Duplicate peripheral id on another connection: the newest
        // registration wins, the old connection is forgotten
        let stale_connection: Option<ConnectionId> = self
            .clients
            .iter()
            .find(|(id, c)| {
                **id != connection_id && c.peripheral_id.as_deref() == Some(peripheral_id.as_str())
            })
            .map(|(id, _)| id.clone());
        if let Some(stale) = stale_connection {
            warn!(peripheral = %peripheral_id, old_connection = %stale, "Peripheral re-registered on a new connection");
            self.clients.remove(&stale);
        }

        let Some(client) = self.clients.get_mut(&connection_id) else {
            warn!(connection = %connection_id, "Registration from unknown connection");
            return;
        };
        client.peripheral_id = Some(peripheral_id.clone());
        client.peripheral_name = peripheral_name.clone();
        client.widgets = widgets.clone();

        info!(
            peripheral = %peripheral_id,
            widgets = widgets.len(),
            "Peripheral registered"
        );

        self.reconcile(&connection_id, &peripheral_id, &widgets);
        self.restore_for_peripheral(&connection_id, &peripheral_id, &widgets);
        self.persist();

        let _ = self.notices.send(Notice::PeripheralConnected {
            peripheral_id,
            peripheral_name,
        });
    }

    /// Rebind this peripheral's instances to the new connection and drop the
    /// ones whose widget no longer exists on the peripheral.
    fn reconcile(
        &mut self,
        connection_id: &ConnectionId,
        peripheral_id: &str,
        widgets: &[RemoteWidgetSpec],
    ) {
        let mut stale = Vec::new();
        for instance in self.instances.values_mut() {
            if instance.peripheral_id != peripheral_id {
                continue;
            }
            match widgets.iter().find(|w| w.id == instance.widget_id) {
                Some(spec) => {
                    instance.connection_id = Some(connection_id.clone());
                    instance.connected = true;
                    instance.name = spec.name.clone();
                    instance.icon_set = spec.icon_set.clone();
                    instance.label = spec.label.clone();
                }
                None => stale.push(instance.id.clone()),
            }
        }
        for id in stale {
            info!(instance = %id, "Dropping stale instance after re-registration");
            self.instances.remove(&id);
            let _ = self.notices.send(Notice::InstanceRemoved { instance_id: id });
        }
    }

    /// Materialize persisted placements this registration can serve.
    fn restore_for_peripheral(
        &mut self,
        connection_id: &ConnectionId,
        peripheral_id: &str,
        widgets: &[RemoteWidgetSpec],
    ) {
        let records = match self.placements.load() {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, "Failed to load placements");
                return;
            }
        };
        for record in records {
            if record.peripheral_id != peripheral_id {
                continue;
            }
            let Some(spec) = widgets.iter().find(|w| w.id == record.widget_id) else {
                continue;
            };
            if self.instances.values().any(|i| i.matches_record(&record)) {
                continue;
            }
            let mut instance = instance_from_record(&record, Some(connection_id.clone()));
            instance.name = spec.name.clone();
            instance.icon_set = spec.icon_set.clone();
            instance.label = spec.label.clone();
            let _ = self.notices.send(Notice::InstancePlaced {
                instance_id: instance.id.clone(),
            });
            self.instances.insert(instance.id.clone(), instance);
        }
    }

    fn on_widget_update(
        &mut self,
        connection_id: &ConnectionId,
        widget_id: &str,
        changes: WidgetChanges,
    ) {
        if let Some(client) = self.clients.get_mut(connection_id) {
            if let Some(spec) = client.widgets.iter_mut().find(|w| w.id == widget_id) {
                if let Some(icon_set) = &changes.icon_set {
                    spec.icon_set = Some(icon_set.clone());
                }
                if let Some(label) = &changes.label {
                    spec.label = Some(label.clone());
                }
            }
        }

        for instance in self.instances.values_mut() {
            if instance.connection_id.as_ref() != Some(connection_id)
                || instance.widget_id != widget_id
            {
                continue;
            }
            if let Some(icon_set) = &changes.icon_set {
                instance.icon_set = Some(icon_set.clone());
            }
            if let Some(label) = &changes.label {
                instance.label = Some(label.clone());
            }
            if let Some(color) = &changes.color {
                instance.color = Some(color.clone());
            }
            if let Some(background) = &changes.background_color {
                instance.background_color = Some(background.clone());
            }
            for (key, value) in &changes.style {
                instance.style.insert(key.clone(), value.clone());
            }
            let _ = self.notices.send(Notice::InstanceUpdated {
                instance_id: instance.id.clone(),
            });
        }
    }

    /// Explicit unregistration removes the peripheral's instances and their
    /// placements. This and reconciliation are the only deletion paths.
    fn on_unregister(&mut self, connection_id: &ConnectionId, peripheral_id: &str) {
        let owned: Vec<String> = self
            .instances
            .values()
            .filter(|i| i.peripheral_id == peripheral_id)
            .map(|i| i.id.clone())
            .collect();
        for id in owned {
            self.instances.remove(&id);
            let _ = self.notices.send(Notice::InstanceRemoved { instance_id: id });
        }
        if let Some(client) = self.clients.get_mut(connection_id) {
            if client.peripheral_id.as_deref() == Some(peripheral_id) {
                client.peripheral_id = None;
                client.peripheral_name = None;
                client.widgets.clear();
            }
        }
        self.persist();
        info!(peripheral = %peripheral_id, "Peripheral unregistered");
    }

    /// A dropped connection marks its instances offline. Placements stay;
    /// the peripheral reclaims them when it comes back.
    fn on_disconnect(&mut self, connection_id: &ConnectionId) {
        let Some(client) = self.clients.remove(connection_id) else {
            return;
        };
        for instance in self.instances.values_mut() {
            if instance.connection_id.as_ref() == Some(connection_id) {
                instance.connection_id = None;
                instance.connected = false;
            }
        }
        if let Some(peripheral_id) = client.peripheral_id {
            info!(peripheral = %peripheral_id, "Peripheral disconnected");
            let _ = self
                .notices
                .send(Notice::PeripheralDisconnected { peripheral_id });
        }
    }

    fn on_place(
        &mut self,
        connection_id: &ConnectionId,
        widget_id: &str,
        floor: String,
        x: f64,
        y: f64,
    ) -> Result<String> {
        let client = self
            .clients
            .get(connection_id)
            .ok_or_else(|| anyhow!("Unknown connection {}", connection_id))?;
        let peripheral_id = client
            .peripheral_id
            .clone()
            .ok_or_else(|| anyhow!("Connection has not registered widgets"))?;
        let spec = client
            .widgets
            .iter()
            .find(|w| w.id == widget_id)
            .ok_or_else(|| anyhow!("Peripheral does not offer widget {}", widget_id))?
            .clone();

        let record = PlacementRecord {
            peripheral_id: peripheral_id.clone(),
            widget_id: widget_id.to_string(),
            floor: floor.clone(),
            x,
            y,
            parameters: None,
            custom_label: None,
            custom_icon_set: None,
            custom_icon_package: None,
        };
        if let Some(existing) = self
            .instances
            .values()
            .find(|i| i.matches_record(&record))
        {
            // Same spot, same widget: reuse instead of stacking duplicates
            debug!(instance = %existing.id, "Placement already exists");
            return Ok(existing.id.clone());
        }

        let mut instance = instance_from_record(&record, Some(connection_id.clone()));
        instance.name = spec.name;
        instance.icon_set = spec.icon_set;
        instance.label = spec.label;
        let id = instance.id.clone();
        self.instances.insert(id.clone(), instance);
        self.persist();
        let _ = self.notices.send(Notice::InstancePlaced {
            instance_id: id.clone(),
        });
        Ok(id)
    }

    fn on_remove(&mut self, instance_id: &str) {
        if self.instances.remove(instance_id).is_some() {
            self.persist();
            let _ = self.notices.send(Notice::InstanceRemoved {
                instance_id: instance_id.to_string(),
            });
        }
    }

    fn on_click(&mut self, instance_id: &str) -> bool {
        let Some(instance) = self.instances.get(instance_id) else {
            warn!(instance = %instance_id, "Click on unknown instance");
            return false;
        };
        let connected_to = instance
            .connection_id
            .clone()
            .filter(|_| instance.connected);
        let Some(connection_id) = connected_to else {
            let _ = self.notices.send(Notice::DeliveryFailed {
                instance_id: instance_id.to_string(),
            });
            return false;
        };
        let Some(client) = self.clients.get(&connection_id) else {
            let _ = self.notices.send(Notice::DeliveryFailed {
                instance_id: instance_id.to_string(),
            });
            return false;
        };

        let message = EngineMessage::WidgetEvent {
            widget_id: instance.widget_id.clone(),
            event: "click".to_string(),
            data: WidgetEventData {
                floor: instance.floor.clone(),
                x: instance.x,
                y: instance.y,
                timestamp: Utc::now(),
                parameters: instance.parameters.clone(),
            },
        };

        if client.outbound.try_send(message).is_err() {
            warn!(instance = %instance_id, "Failed to deliver widget event");
            for instance in self.instances.values_mut() {
                if instance.connection_id.as_ref() == Some(&connection_id) {
                    instance.connected = false;
                }
            }
            let _ = self.notices.send(Notice::DeliveryFailed {
                instance_id: instance_id.to_string(),
            });
            return false;
        }
        true
    }

    fn on_configure(&mut self, instance_id: &str, config: InstanceConfig) {
        let Some(instance) = self.instances.get_mut(instance_id) else {
            return;
        };
        instance.custom_label = config.label;
        instance.custom_icon_set = config.icon_set;
        instance.custom_icon_package = config.icon_package;
        instance.parameters = config
            .parameter
            .map(|(key, value)| Value::Object([(key, value)].into_iter().collect()));
        let _ = self.notices.send(Notice::InstanceUpdated {
            instance_id: instance_id.to_string(),
        });
        self.persist();
    }

    fn on_clear_config(&mut self, instance_id: &str) {
        let Some(instance) = self.instances.get_mut(instance_id) else {
            return;
        };
        instance.custom_label = None;
        instance.custom_icon_set = None;
        instance.custom_icon_package = None;
        instance.parameters = None;
        let _ = self.notices.send(Notice::InstanceUpdated {
            instance_id: instance_id.to_string(),
        });
        self.persist();
    }

    /// Write the placement file from the live instance set.
    fn persist(&self) {
        let records: Vec<PlacementRecord> = self
            .instances
            .values()
            .map(|i| PlacementRecord {
                peripheral_id: i.peripheral_id.clone(),
                widget_id: i.widget_id.clone(),
                floor: i.floor.clone(),
                x: i.x,
                y: i.y,
                parameters: i.parameters.clone(),
                custom_label: i.custom_label.clone(),
                custom_icon_set: i.custom_icon_set.clone(),
                custom_icon_package: i.custom_icon_package.clone(),
            })
            .collect();
        if let Err(e) = self.placements.save(&records) {
            warn!(error = %e, "Failed to persist placements");
        }
    }
}

static INSTANCE_SEQ: AtomicU64 = AtomicU64::new(0);

fn instance_id(connection_id: &str, widget_id: &str) -> String {
    // The timestamp alone collides when restore materializes several
    // placements of one widget in the same millisecond
    let seq = INSTANCE_SEQ.fetch_add(1, Ordering::Relaxed);
    format!(
        "remote-{}-{}-{}-{}",
        connection_id,
        widget_id,
        Utc::now().timestamp_millis(),
        seq
    )
}

fn instance_from_record(
    record: &PlacementRecord,
    connection_id: Option<ConnectionId>,
) -> WidgetInstance {
    let connected = connection_id.is_some();
    let id = instance_id(
        connection_id.as_deref().unwrap_or("offline"),
        &record.widget_id,
    );
    WidgetInstance {
        id,
        peripheral_id: record.peripheral_id.clone(),
        connection_id,
        widget_id: record.widget_id.clone(),
        name: record.widget_id.clone(),
        icon_set: record.custom_icon_set.clone(),
        label: record.custom_label.clone(),
        color: None,
        background_color: None,
        style: BTreeMap::new(),
        floor: record.floor.clone(),
        x: record.x,
        y: record.y,
        parameters: record.parameters.clone(),
        custom_label: record.custom_label.clone(),
        custom_icon_set: record.custom_icon_set.clone(),
        custom_icon_package: record.custom_icon_package.clone(),
        connected,
    }
}
