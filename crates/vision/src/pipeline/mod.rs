//! Per-frame processing pipeline and its lifecycle controller.
//!
//! - `config`: defaults, CLI flags and validation.
//! - `filter`: confidence gate, NMS and the tracking eligibility mask.
//! - `identity`: merges tracker output back into the detection set.
//! - `annotation`: boxes, corner brackets and labels.
//! - `overlay`: source, FPS and per-class counts.
//! - `encoding`: JPEG compression and multipart framing.
//! - `controller`: source state machine and the generation loop.
//! - `telemetry`: tracing subscriber, metrics recorder and thread helpers.

pub mod annotation;
pub mod config;
pub mod controller;
pub mod encoding;
pub mod error;
pub mod filter;
pub mod identity;
pub mod overlay;
pub mod telemetry;
