//! End-to-end remote widget flows against the engine actor.

use homemap::remote::engine::{self, EngineHandle, InstanceConfig};
use homemap::remote::persistence::{MemoryPlacementStore, PlacementRecord, PlacementStore};
use homemap::remote::protocol::{EngineMessage, RemoteWidgetSpec, WidgetChanges};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc;

fn lamp_widget() -> RemoteWidgetSpec {
    RemoteWidgetSpec {
        id: "lamp".to_string(),
        name: "Lamp".to_string(),
        icon_set: Some("dimLight".to_string()),
        label: Some("Lamp".to_string()),
        ui: None,
    }
}

fn widget(id: &str) -> RemoteWidgetSpec {
    RemoteWidgetSpec {
        id: id.to_string(),
        name: id.to_string(),
        icon_set: None,
        label: None,
        ui: None,
    }
}

/// Open a connection and register a peripheral on it. Returns the outbound
/// receiver the engine writes peripheral-bound messages to.
async fn connect_and_register(
    engine: &EngineHandle,
    connection_id: &str,
    peripheral_id: &str,
    widgets: Vec<RemoteWidgetSpec>,
) -> mpsc::Receiver<EngineMessage> {
    let (tx, mut rx) = mpsc::channel(8);
    engine
        .connect(connection_id.to_string(), tx)
        .await
        .unwrap();
    engine
        .register(
            connection_id.to_string(),
            peripheral_id.to_string(),
            Some(format!("{} name", peripheral_id)),
            widgets,
        )
        .await
        .unwrap();
    // Sync point so the commands above are fully processed
    engine.instances().await.unwrap();
    // The engine greets every connection with request-widgets
    match rx.try_recv().unwrap() {
        EngineMessage::RequestWidgets => {}
        other => panic!("expected request-widgets, got {:?}", other),
    }
    rx
}

#[tokio::test]
async fn place_update_disconnect_reconnect() {
    let store = Arc::new(MemoryPlacementStore::new());
    let engine = engine::spawn(Arc::clone(&store) as Arc<dyn PlacementStore>);

    let _rx = connect_and_register(&engine, "conn-1", "tablet", vec![lamp_widget()]).await;

    let instance_id = engine
        .place_widget("conn-1".to_string(), "lamp".to_string(), "F1".to_string(), 40.0, 60.0)
        .await
        .unwrap();
    assert!(instance_id.starts_with("remote-conn-1-lamp-"));

    let records = store.load().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].peripheral_id, "tablet");
    assert_eq!(records[0].floor, "F1");

    // Partial appearance update touches only what it names
    engine
        .widget_update(
            "conn-1".to_string(),
            "lamp".to_string(),
            WidgetChanges {
                icon_set: Some("nightLight".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let instances = engine.instances().await.unwrap();
    assert_eq!(instances[0].icon_set.as_deref(), Some("nightLight"));
    assert_eq!(instances[0].label.as_deref(), Some("Lamp"));

    // Disconnect marks the instance offline but keeps the placement
    engine.disconnect("conn-1".to_string()).await.unwrap();
    let instances = engine.instances().await.unwrap();
    assert_eq!(instances.len(), 1);
    assert!(!instances[0].connected);
    assert_eq!(store.load().unwrap().len(), 1);

    // Reconnect on a new connection reclaims the instance, no duplicate
    let _rx2 = connect_and_register(&engine, "conn-2", "tablet", vec![lamp_widget()]).await;
    let instances = engine.instances().await.unwrap();
    assert_eq!(instances.len(), 1);
    assert!(instances[0].connected);
    assert_eq!(instances[0].connection_id.as_deref(), Some("conn-2"));
    // The registration's own icon set supersedes the earlier live update
    assert_eq!(instances[0].icon_set.as_deref(), Some("dimLight"));
}

#[tokio::test]
async fn reregistration_drops_only_missing_widgets() {
    let store = Arc::new(MemoryPlacementStore::new());
    let engine = engine::spawn(Arc::clone(&store) as Arc<dyn PlacementStore>);

    let _rx = connect_and_register(
        &engine,
        "conn-1",
        "tablet",
        vec![widget("a"), widget("b"), widget("c")],
    )
    .await;
    for (name, x) in [("a", 10.0), ("b", 20.0), ("c", 30.0)] {
        engine
            .place_widget("conn-1".to_string(), name.to_string(), "F1".to_string(), x, 5.0)
            .await
            .unwrap();
    }
    assert_eq!(engine.instances().await.unwrap().len(), 3);

    // Peripheral comes back without "b"
    engine.disconnect("conn-1".to_string()).await.unwrap();
    let _rx2 = connect_and_register(
        &engine,
        "conn-2",
        "tablet",
        vec![widget("a"), widget("c")],
    )
    .await;

    let mut remaining: Vec<String> = engine
        .instances()
        .await
        .unwrap()
        .into_iter()
        .map(|i| i.widget_id)
        .collect();
    remaining.sort();
    assert_eq!(remaining, vec!["a", "c"]);

    let mut persisted: Vec<String> = store
        .load()
        .unwrap()
        .into_iter()
        .map(|r| r.widget_id)
        .collect();
    persisted.sort();
    assert_eq!(persisted, vec!["a", "c"]);
}

#[tokio::test]
async fn startup_restore_and_reclaim_are_idempotent() {
    let store = Arc::new(MemoryPlacementStore::new());
    store
        .save(&[PlacementRecord {
            peripheral_id: "tablet".to_string(),
            widget_id: "lamp".to_string(),
            floor: "F1".to_string(),
            x: 40.0,
            y: 60.0,
            parameters: None,
            custom_label: Some("Hall".to_string()),
            custom_icon_set: None,
            custom_icon_package: None,
        }])
        .unwrap();

    let engine = engine::spawn(Arc::clone(&store) as Arc<dyn PlacementStore>);

    // Placements come up as offline placeholders
    let instances = engine.instances().await.unwrap();
    assert_eq!(instances.len(), 1);
    assert!(!instances[0].connected);
    assert_eq!(instances[0].custom_label.as_deref(), Some("Hall"));

    // Registration reclaims the placeholder; registering twice adds nothing
    let _rx = connect_and_register(&engine, "conn-1", "tablet", vec![lamp_widget()]).await;
    engine
        .register(
            "conn-1".to_string(),
            "tablet".to_string(),
            None,
            vec![lamp_widget()],
        )
        .await
        .unwrap();

    let instances = engine.instances().await.unwrap();
    assert_eq!(instances.len(), 1);
    assert!(instances[0].connected);
    // Customization survives the reclaim
    assert_eq!(instances[0].custom_label.as_deref(), Some("Hall"));
}

#[tokio::test]
async fn restore_keeps_every_persisted_placement() {
    let store = Arc::new(MemoryPlacementStore::new());
    // Two placements of the same widget on different floors
    let record = |floor: &str| PlacementRecord {
        peripheral_id: "tablet".to_string(),
        widget_id: "lamp".to_string(),
        floor: floor.to_string(),
        x: 40.0,
        y: 60.0,
        parameters: None,
        custom_label: None,
        custom_icon_set: None,
        custom_icon_package: None,
    };
    store.save(&[record("F1"), record("F2")]).unwrap();

    let engine = engine::spawn(Arc::clone(&store) as Arc<dyn PlacementStore>);

    let instances = engine.instances().await.unwrap();
    assert_eq!(instances.len(), 2);
    assert_ne!(instances[0].id, instances[1].id);
    let mut floors: Vec<&str> = instances.iter().map(|i| i.floor.as_str()).collect();
    floors.sort();
    assert_eq!(floors, vec!["F1", "F2"]);

    // Reclaiming them on registration keeps both as well
    let _rx = connect_and_register(&engine, "conn-1", "tablet", vec![lamp_widget()]).await;
    let instances = engine.instances().await.unwrap();
    assert_eq!(instances.len(), 2);
    assert!(instances.iter().all(|i| i.connected));
}

#[tokio::test]
async fn click_round_trip_and_offline_click() {
    let store = Arc::new(MemoryPlacementStore::new());
    let engine = engine::spawn(Arc::clone(&store) as Arc<dyn PlacementStore>);

    let mut rx = connect_and_register(&engine, "conn-1", "tablet", vec![lamp_widget()]).await;
    let instance_id = engine
        .place_widget("conn-1".to_string(), "lamp".to_string(), "F1".to_string(), 40.0, 60.0)
        .await
        .unwrap();
    engine
        .configure(
            instance_id.clone(),
            InstanceConfig {
                parameter: Some(("scene".to_string(), json!(3))),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert!(engine.click(instance_id.clone()).await.unwrap());
    match rx.try_recv().unwrap() {
        EngineMessage::WidgetEvent {
            widget_id,
            event,
            data,
        } => {
            assert_eq!(widget_id, "lamp");
            assert_eq!(event, "click");
            assert_eq!(data.floor, "F1");
            assert_eq!(data.x, 40.0);
            assert_eq!(data.y, 60.0);
            assert_eq!(data.parameters, Some(json!({"scene": 3})));
        }
        other => panic!("expected widget-event, got {:?}", other),
    }

    // Clicking after disconnect fails softly and deletes nothing
    engine.disconnect("conn-1".to_string()).await.unwrap();
    assert!(!engine.click(instance_id).await.unwrap());
    assert_eq!(engine.instances().await.unwrap().len(), 1);
}

#[tokio::test]
async fn duplicate_peripheral_id_last_writer_wins() {
    let store = Arc::new(MemoryPlacementStore::new());
    let engine = engine::spawn(Arc::clone(&store) as Arc<dyn PlacementStore>);

    let _rx1 = connect_and_register(&engine, "conn-1", "tablet", vec![lamp_widget()]).await;
    let instance_id = engine
        .place_widget("conn-1".to_string(), "lamp".to_string(), "F1".to_string(), 40.0, 60.0)
        .await
        .unwrap();

    let mut rx2 = connect_and_register(&engine, "conn-2", "tablet", vec![lamp_widget()]).await;

    let clients = engine.clients().await.unwrap();
    assert_eq!(clients.len(), 1);
    assert_eq!(clients[0].connection_id, "conn-2");

    // The placed instance now answers through the second connection
    assert!(engine.click(instance_id).await.unwrap());
    assert!(matches!(
        rx2.try_recv().unwrap(),
        EngineMessage::WidgetEvent { .. }
    ));
}

#[tokio::test]
async fn placement_dedup_within_tolerance() {
    let store = Arc::new(MemoryPlacementStore::new());
    let engine = engine::spawn(Arc::clone(&store) as Arc<dyn PlacementStore>);

    let _rx = connect_and_register(&engine, "conn-1", "tablet", vec![lamp_widget()]).await;
    let first = engine
        .place_widget("conn-1".to_string(), "lamp".to_string(), "F1".to_string(), 40.0, 60.0)
        .await
        .unwrap();
    let second = engine
        .place_widget("conn-1".to_string(), "lamp".to_string(), "F1".to_string(), 40.05, 59.95)
        .await
        .unwrap();
    assert_eq!(first, second);
    assert_eq!(store.load().unwrap().len(), 1);

    // A clearly different spot is a new placement
    let third = engine
        .place_widget("conn-1".to_string(), "lamp".to_string(), "F1".to_string(), 80.0, 60.0)
        .await
        .unwrap();
    assert_ne!(first, third);
    assert_eq!(store.load().unwrap().len(), 2);
}

#[tokio::test]
async fn configure_and_clear_round_trip() {
    let store = Arc::new(MemoryPlacementStore::new());
    let engine = engine::spawn(Arc::clone(&store) as Arc<dyn PlacementStore>);

    let _rx = connect_and_register(&engine, "conn-1", "tablet", vec![lamp_widget()]).await;
    let instance_id = engine
        .place_widget("conn-1".to_string(), "lamp".to_string(), "F1".to_string(), 40.0, 60.0)
        .await
        .unwrap();

    engine
        .configure(
            instance_id.clone(),
            InstanceConfig {
                label: Some("Hall lamp".to_string()),
                icon_set: Some("fancy".to_string()),
                icon_package: Some("com.acme.light".to_string()),
                parameter: Some(("scene".to_string(), json!(3))),
            },
        )
        .await
        .unwrap();
    // Sync point: the reply forces the actor to have processed the
    // configure command before the store is read directly.
    engine.instances().await.unwrap();

    let records = store.load().unwrap();
    assert_eq!(records[0].custom_label.as_deref(), Some("Hall lamp"));
    assert_eq!(records[0].custom_icon_set.as_deref(), Some("fancy"));
    assert_eq!(records[0].parameters, Some(json!({"scene": 3})));

    let instances = engine.instances().await.unwrap();
    assert_eq!(instances[0].effective_label(), Some("Hall lamp"));
    assert_eq!(instances[0].effective_icon_set(), Some("fancy"));

    engine.clear_config(instance_id).await.unwrap();
    engine.instances().await.unwrap();
    let records = store.load().unwrap();
    assert!(records[0].custom_label.is_none());
    assert!(records[0].parameters.is_none());
    let instances = engine.instances().await.unwrap();
    // Back to the widget's own label and icon set
    assert_eq!(instances[0].effective_label(), Some("Lamp"));
    assert_eq!(instances[0].effective_icon_set(), Some("dimLight"));
}

#[tokio::test]
async fn explicit_unregister_deletes_placements() {
    let store = Arc::new(MemoryPlacementStore::new());
    let engine = engine::spawn(Arc::clone(&store) as Arc<dyn PlacementStore>);

    let _rx = connect_and_register(&engine, "conn-1", "tablet", vec![lamp_widget()]).await;
    engine
        .place_widget("conn-1".to_string(), "lamp".to_string(), "F1".to_string(), 40.0, 60.0)
        .await
        .unwrap();

    engine
        .unregister("conn-1".to_string(), "tablet".to_string())
        .await
        .unwrap();

    assert!(engine.instances().await.unwrap().is_empty());
    assert!(store.load().unwrap().is_empty());
}
