//! munayd: REST backend for the Munay school wellbeing platform.
//!
//! Students answer mood surveys, log activities, keep growth-space journals
//! and send anonymous messages to their class teacher. Teachers manage
//! classes, read alerts and award rewards. An admin dashboard groups
//! schools by teacher email domain.

pub mod api;
pub mod auth;
pub mod client;
pub mod config;
pub mod db;
pub mod ids;
pub mod import;
pub mod models;
pub mod notify;
pub mod stats;
