//! webrtc-vision - Real-time WebRTC object detection streaming server
//!
//! This crate negotiates WebRTC video sessions with browser clients, runs
//! each incoming video track through a detection stage, and streams per-frame
//! detection results and rolling performance metrics back over a per-session
//! event channel.

pub mod config;
pub mod detection;
pub mod error;
pub mod events;
pub mod inference;
pub mod metrics;
pub mod session;
pub mod state;
pub mod web;

pub use error::{AppError, Result};
