//! Bridge between Marlin-dialect print hosts and FlashForge-family printers.
//!
//! The host side queues ordinary Marlin G-code; the printer side speaks a
//! proprietary command set over serial-over-USB. The bridge rewrites each
//! queued command in real time (see [`gcode::translator`]), streams print
//! files to the printer's internal storage in 1024-byte chunks
//! ([`upload`]), and keeps the connection alive with periodic status
//! probes ([`keepalive`]). All traffic shares one serial link guarded by a
//! single mutex ([`link::SharedLink`]).

pub mod config;
pub mod connection;
pub mod device;
pub mod gcode;
pub mod keepalive;
pub mod link;
pub mod state;
pub mod upload;

pub use config::Config;
pub use connection::{BridgeError, Connection};
pub use gcode::Command;
pub use state::ConnectionState;
