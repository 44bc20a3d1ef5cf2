//! Reliefline - An offline-first emergency request queue.
//!
//! # Overview
//!
//! Reliefline captures emergency help requests (rescue, food, medical) from a
//! one-tap UI. When the device is online a request goes straight to the
//! remote intake service; when it is offline the request is saved to a
//! durable local queue and delivered in one batch once connectivity returns.
//!
//! # Modules
//!
//! - [`model`]: Emergency requests, locations, device ids and API types
//! - [`storage`]: Key-value storage port with SQLite and in-memory adapters
//! - [`queue`]: The durable offline queue
//! - [`device`]: Lazily generated per-device identifier
//! - [`geolocation`]: Position acquisition with a bounded wait
//! - [`intake`]: Client for the remote intake service
//! - [`connectivity`]: Online/offline status and change notifications
//! - [`notify`]: User-facing notification feed
//! - [`capture`]: Request capture and routing
//! - [`sync`]: Queue synchronization and its trigger loop
//! - [`service`]: Everything above wired into one service
//! - [`config`]: Environment configuration
//! - [`api`]: HTTP API handlers

pub mod api;
pub mod capture;
pub mod config;
pub mod connectivity;
pub mod device;
pub mod error;
pub mod geolocation;
pub mod intake;
pub mod model;
pub mod notify;
pub mod queue;
pub mod service;
pub mod storage;
pub mod sync;
