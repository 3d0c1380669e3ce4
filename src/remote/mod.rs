//! Remote widget subsystem: peripherals connect over WebSocket, register the
//! widgets they offer, and receive interaction events for the instances the
//! user places on floors.

pub mod engine;
pub mod persistence;
pub mod protocol;
pub mod server;

pub use engine::{ConnectionId, EngineHandle, InstanceConfig, Notice, WidgetInstance};
pub use persistence::{JsonPlacementStore, MemoryPlacementStore, PlacementRecord, PlacementStore};
pub use protocol::{EngineMessage, PeripheralMessage, RemoteWidgetSpec, WidgetChanges};
pub use server::{create_router, run_server};
