// src/control/mod.rs

//! Control surface: restart / stop / status / compiled files / execute, plus
//! the HTTP server exposing them and the `/events` stream.

pub mod routes;
pub mod server;
pub mod sse;
pub mod surface;

pub use server::{ControlServer, ServerHandle};
pub use surface::{ControlSurface, StatusReport};
