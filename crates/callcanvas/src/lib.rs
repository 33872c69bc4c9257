//! Callcanvas Library
//!
//! Bridges live voice conversations to connected display clients: conversation
//! events arriving by webhook are turned into image generation requests whose
//! progress and results are streamed to the display watching that conversation.

pub mod agent_config;
pub mod api;
pub mod auth;
pub mod bridge;
pub mod config;
pub mod generation;
pub mod trigger;
pub mod ws;
