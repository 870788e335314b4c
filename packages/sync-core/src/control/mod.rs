//! The control plane (component C3): wire framing plus server and client
//! session implementations.

pub mod client;
pub mod server;
pub mod wire;

pub use client::ControlClient;
pub use server::ControlServer;
pub use wire::ClientHello;
