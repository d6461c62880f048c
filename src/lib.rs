//! # ESP-AT driver
//!
//! Blocking driver for ESP8266 WIFI modules controlled by AT commands.
//!
//! * [wifi::Adapter] performs single command/response transactions, e.g. joining a network or
//!   sending data on a link.
//! * [stack::Socket] builds a stream socket on top, including reset sequencing and bounded retries.
//!
//! Only one transaction is in flight at any time: the transmit and receive buffers are owned by the
//! adapter and every operation takes `&mut self`.
#![cfg_attr(not(test), no_std)]
#![cfg_attr(feature = "strict", deny(warnings))]

extern crate alloc;

pub mod buffer;
pub mod commands;
pub mod config;
pub mod responses;
pub mod retry;
pub(crate) mod session;
pub mod stack;
pub mod status;
pub mod transport;
pub mod wifi;

#[cfg(feature = "examples")]
pub mod example;

#[cfg(test)]
mod tests;
