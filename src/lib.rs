// Configuration
pub mod config;

// Property path resolution
pub mod path;

// Condition and template evaluation
pub mod expr;

// Widget definitions, store and resolution
pub mod widget;

// Device model
pub mod device;

// Device render pipeline
pub mod render;

// Controller HTTP client and event types
pub mod controller;

// Scene actor and event dispatch
pub mod scene;

// Remote widget protocol engine
pub mod remote;
