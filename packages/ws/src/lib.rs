//! Relay core for the CampusConnect realtime layer.
//!
//! This crate contains the transport-agnostic half of the relay: the typed
//! inbound/outbound event model, room naming, and the routing that decides
//! which room an inbound event fans out to. The server binary plugs a real
//! WebSocket transport in through the [`RelaySender`] trait; tests plug in a
//! recording mock.
//!
//! # Main Components
//!
//! * [`RelaySender`] - Trait for room membership mutation and room fan-out
//! * [`RelayContext`] - Per-connection identity and policy, fixed at handshake
//! * [`process_message`] - Routes one inbound event to its target room
//! * [`connect`] - Joins a new connection to its default rooms
//! * [`models`] - Event payload types for inbound and outbound communication
//! * [`rooms`] - Namespaced room identifier helpers

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

mod ws;

pub use ws::*;

pub mod models;
pub mod rooms;
