// src/broadcast/mod.rs

//! Event broadcaster: fan-out of log lines to every live viewer.
//!
//! - [`message`] defines `BroadcastMessage`, its `Category` and line splitting.
//! - [`hub`] owns the subscriber registry (`Broadcaster`, `Subscriber`).
//! - [`frame`] renders lines in server-sent-event framing.

pub mod frame;
pub mod hub;
pub mod message;

pub use hub::{Broadcaster, Subscriber, SubscriberId};
pub use message::{BroadcastMessage, Category, Line};
