//! Mockup Studio
//!
//! Batch orchestration for AI product mockups: one batch expands into a job per
//! color, angle and size, every job is rendered with the same locked model and
//! scene, and progress streams back as typed events. Images are generated with
//! Cloudflare Workers AI.

pub mod app_state;
pub mod config;
pub mod models;
pub mod routes;
pub mod services;
