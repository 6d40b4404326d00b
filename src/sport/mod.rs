//! # S.Port Protocol Module
//!
//! FrSky Smart Port wire handling.
//!
//! This module handles:
//! - Deframing the raw byte stream into 9-byte packets
//! - Checksum validation
//! - Extended identifier decoding through the descriptor table
//! - The legacy hub protocol and its byte stream
//! - Link-relayed analog values and link status

pub mod analog;
pub mod checksum;
pub mod decoder;
pub mod framer;
pub mod hub;
pub mod link;
pub mod protocol;
pub mod sensors;

pub use decoder::process_sport_packet;
pub use framer::SportFramer;
pub use hub::{HubData, HubParser, HubSettings};
pub use link::{LinkMonitor, LinkStatus};
pub use protocol::SportPacket;
