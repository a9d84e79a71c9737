use crate::am::AmPacket;
use anyhow::{anyhow, ensure};

/// AM type motes send their console output on.
pub const AM_PRINTF_MSG: u8 = 100;

/// Fixed size of the buffer field; motes NUL-pad the final chunk of a flush.
pub const BUFFER_LEN: usize = 28;

/// One printf message: a fixed-size chunk of mote console text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrintfMsg {
    buffer: [u8; BUFFER_LEN],
}

impl PrintfMsg {
    pub fn buffer(&self) -> &[u8; BUFFER_LEN] {
        &self.buffer
    }

    /// Split `text` into NUL-padded message buffers.
    pub fn chunked(text: &str) -> Vec<Self> {
        text.as_bytes()
            .chunks(BUFFER_LEN)
            .map(|chunk| {
                let mut buffer = [0u8; BUFFER_LEN];
                buffer[..chunk.len()].copy_from_slice(chunk);
                Self { buffer }
            })
            .collect()
    }
}

impl From<[u8; BUFFER_LEN]> for PrintfMsg {
    fn from(buffer: [u8; BUFFER_LEN]) -> Self {
        Self { buffer }
    }
}

impl TryFrom<&AmPacket> for PrintfMsg {
    type Error = anyhow::Error;

    fn try_from(packet: &AmPacket) -> Result<Self, Self::Error> {
        ensure!(
            packet.am_type == AM_PRINTF_MSG,
            "not a printf message (AM type {})",
            packet.am_type
        );
        let buffer = packet.payload.as_ref().try_into().map_err(|_| {
            anyhow!(
                "printf buffer is {} bytes, expected {BUFFER_LEN}",
                packet.payload.len()
            )
        })?;
        Ok(Self { buffer })
    }
}
