//! The device side of UPnP control and eventing
//!
//! One hosted device exposes any number of [`Service`]s. Each service
//! publishes named actions (invoked by remote control points via SOAP
//! over HTTP) and named state variables (whose changes are pushed to
//! subscribers as NOTIFY requests).
//!
//! This crate is the protocol model only. The HTTP server that accepts
//! connections and routes `/{service}/control`, `/{service}/event`
//! and the description URLs to it, and the HTTP client that delivers
//! NOTIFY messages, are supplied by the caller through the
//! [`Responder`] and [`WebClient`] traits. Discovery lives in the
//! companion `bramble-ssdp` crate.
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod device;
pub mod eventing;
pub mod service;
pub mod soap;

pub use device::{device_uuid, Device};
pub use eventing::{SubscribeError, SubscribeResponse, WebClient};
pub use service::{
    Action, DataType, Handler, Responder, Service, StateVariable,
    MIME_XML,
};
