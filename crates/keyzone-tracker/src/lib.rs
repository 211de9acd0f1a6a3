//! # keyzone-tracker
//!
//! Runs a keyzone session: loads the [`config::AppConfig`], builds the
//! fingertip resolver, and drives the [`session::Session`] loop that turns
//! camera frames into per-fingertip key resolutions.
//!
//! - **`config`** – TOML configuration and its platform location.
//! - **`session`** – the [`session::HandDetector`] and [`session::ResolutionSink`]
//!   seams and the resolution loop.
//! - **`replay`** – JSON-lines recordings of detector output.

pub mod config;
pub mod replay;
pub mod session;
