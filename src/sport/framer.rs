//! # S.Port Deframer
//!
//! Incremental decoder for the raw S.Port byte stream. A `0x7E` byte starts
//! a frame (and always restarts one), `0x7D x` stands for `x ^ 0x20`, and a
//! frame is complete after 9 unstuffed bytes.

use tracing::trace;

use super::protocol::{SportPacket, SPORT_PACKET_SIZE, SPORT_START_BYTE, SPORT_STUFF_BYTE, SPORT_STUFF_MASK};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum FramerState {
    #[default]
    Idle,
    InFrame,
    Escaped,
}

/// Byte-stream to [`SportPacket`] state machine
#[derive(Debug, Clone, Default)]
pub struct SportFramer {
    state: FramerState,
    buf: [u8; SPORT_PACKET_SIZE],
    len: usize,
}

impl SportFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one byte
    ///
    /// # Returns
    ///
    /// * `Option<SportPacket>` - The packet completed by this byte, if any.
    ///   Checksums are not verified here.
    pub fn feed(&mut self, byte: u8) -> Option<SportPacket> {
        if byte == SPORT_START_BYTE {
            if self.len > 0 {
                trace!("S.Port frame restarted after {} bytes", self.len);
            }
            self.state = FramerState::InFrame;
            self.len = 0;
            return None;
        }

        let byte = match self.state {
            FramerState::Idle => return None,
            FramerState::Escaped => {
                self.state = FramerState::InFrame;
                byte ^ SPORT_STUFF_MASK
            }
            FramerState::InFrame if byte == SPORT_STUFF_BYTE => {
                self.state = FramerState::Escaped;
                return None;
            }
            FramerState::InFrame => byte,
        };

        self.buf[self.len] = byte;
        self.len += 1;

        if self.len == SPORT_PACKET_SIZE {
            self.state = FramerState::Idle;
            self.len = 0;
            return Some(SportPacket::new(self.buf));
        }

        None
    }

    /// Feed a chunk of bytes, returning every completed packet
    pub fn push(&mut self, data: &[u8]) -> Vec<SportPacket> {
        data.iter().filter_map(|&byte| self.feed(byte)).collect()
    }
}

/// Stuff and frame a packet for transmission
pub fn encode_frame(packet: &SportPacket) -> Vec<u8> {
    let mut out = Vec::with_capacity(SPORT_PACKET_SIZE * 2 + 1);
    out.push(SPORT_START_BYTE);
    for &byte in packet.as_bytes() {
        if byte == SPORT_START_BYTE || byte == SPORT_STUFF_BYTE {
            out.push(SPORT_STUFF_BYTE);
            out.push(byte ^ SPORT_STUFF_MASK);
        } else {
            out.push(byte);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sport::checksum::check_sport_packet;

    #[test]
    fn test_plain_frame() {
        let mut framer = SportFramer::new();
        let bytes = [0x7E, 0x98, 0x10, 0x10, 0x00, 0x7D, 0x5E, 0x02, 0x00, 0x00, 0x5F];
        let packets = framer.push(&bytes);

        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].as_bytes(), &[0x98, 0x10, 0x10, 0x00, 0x7E, 0x02, 0x00, 0x00, 0x5F]);
        assert!(check_sport_packet(packets[0].as_bytes()));
    }

    #[test]
    fn test_start_byte_restarts() {
        let mut framer = SportFramer::new();
        let mut bytes = vec![0x7E, 0x98, 0x10, 0x10];
        bytes.extend_from_slice(&[0x7E, 0x98, 0x10, 0x10, 0x00, 0x7D, 0x5E, 0x02, 0x00, 0x00, 0x5F]);

        let packets = framer.push(&bytes);
        assert_eq!(packets.len(), 1);
        assert!(check_sport_packet(packets[0].as_bytes()));
    }

    #[test]
    fn test_bytes_outside_frame_ignored() {
        let mut framer = SportFramer::new();
        assert!(framer.push(&[0x01, 0x02, 0x03]).is_empty());

        // Poll request (start + physical id) followed by nothing
        assert!(framer.push(&[0x7E, 0x1B]).is_empty());
    }

    #[test]
    fn test_split_across_reads() {
        let mut framer = SportFramer::new();
        let frame = encode_frame(&SportPacket::data(0x98, 0x0210, 1180));

        let (head, tail) = frame.split_at(4);
        assert!(framer.push(head).is_empty());
        let packets = framer.push(tail);
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].app_id(), 0x0210);
        assert_eq!(packets[0].data_u32(), 1180);
    }

    #[test]
    fn test_encode_stuffs_reserved_bytes() {
        let packet = SportPacket::data(0x98, 0x7E7D, 0);
        let frame = encode_frame(&packet);

        assert_eq!(&frame[..1], &[0x7E]);
        assert!(frame[1..].windows(2).any(|w| w == [0x7D, 0x5E]));
        assert!(frame[1..].windows(2).any(|w| w == [0x7D, 0x5D]));

        let mut framer = SportFramer::new();
        let packets = framer.push(&frame);
        assert_eq!(packets[0].app_id(), 0x7E7D);
    }
}
