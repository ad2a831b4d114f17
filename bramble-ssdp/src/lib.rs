//! Announcing a device with SSDP, the Simple Service Discovery Protocol
//!
//! This crate implements the device half of SSDP: multicasting periodic
//! "alive" announcements for one root device, and answering `M-SEARCH`
//! discovery queries with a delayed unicast response. The delay is
//! randomised (within the searcher's stated `MX` bound) so that many
//! devices hearing the same search do not all answer in the same
//! instant.
//!
//! The core is the sans-IO [`Engine`]: it neither owns sockets nor
//! sleeps. The owner feeds received datagrams to [`Engine::on_data`],
//! asks [`Engine::next_wakeup`] how long until the engine next needs a
//! timer callback, and calls [`Engine::wakeup`] when that time comes
//! (ticking roughly once a second is fine). Sending happens through the
//! [`udp::TargetedSend`] trait; [`udp::std::MulticastSocket`] is a
//! ready-made implementation for hosted targets, but anything that can
//! emit a UDP datagram will do.
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod engine;
pub mod message;
pub mod udp;

pub use engine::{Advertisement, Engine};
