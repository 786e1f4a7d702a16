//! Preference and account orchestration for a web clipper.
//!
//! The [`store`] owns all preference state behind a single-writer
//! [`effects`] loop. Providers come from the [`registry`], accounts are
//! checked by [`verify`], and user tool scripts run inside the
//! [`sandbox`]. Everything outside the process is reached through
//! [`storage`] and [`platform`] traits.

pub mod config;
pub mod effects;
pub mod locale;
pub mod model;
pub mod platform;
pub mod registry;
pub mod sandbox;
pub mod storage;
pub mod store;
pub mod verify;

#[cfg(test)]
mod testing;
