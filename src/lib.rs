//! Breach match server - authoritative cops vs. criminals rounds
//!
//! The server side is an axum application: one actor task per match owns a
//! [`game::MatchCoordinator`], sockets exchange JSON frames with it, and a
//! small HTTP surface lists and creates matches. [`client`] holds the
//! consumer-side snapshot interpolation and prediction helpers.

pub mod app;
pub mod client;
pub mod config;
pub mod game;
pub mod http;
pub mod util;
pub mod ws;
