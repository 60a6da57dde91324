//! Watch-list Camserver Library
//!
//! Tracking & alarm reconciliation for a live camera feed: operators pick
//! detected objects to watch, the server re-checks them on a fixed interval
//! and raises an alarm when one goes missing.
//!
//! ## Architecture (8 Components)
//!
//! 1. CameraGateway - camera app boundary, latest frame
//! 2. DetectionSource - ML detector adapter
//! 3. AutoDetectionService - live detection preview
//! 4. TrackingEngine - watch-list, matcher, alarm state machine
//! 5. TrackingScheduler - periodic reconciliation loop
//! 6. RealtimeHub - WebSocket distribution
//! 7. WebAPI - REST API endpoints
//! 8. AppState - shared handles and configuration
//!
//! ## Design Principles
//!
//! - One session lock: every watch-list or alarm mutation is serialized
//! - Detector I/O never happens under that lock

pub mod auto_detection;
pub mod camera_gateway;
pub mod detection_source;
pub mod error;
pub mod models;
pub mod realtime_hub;
pub mod state;
pub mod tracking;
pub mod tracking_scheduler;
pub mod web_api;

pub use error::{Error, Result};
pub use state::AppState;
