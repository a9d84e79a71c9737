use anyhow::ensure;
use bytes::{BufMut, Bytes, BytesMut};

/// Dispatch byte marking a packet as an active message.
pub const SERIAL_AM_DISPATCH: u8 = 0x00;

/// Dispatch byte plus destination, source, payload length, group, AM type.
pub const HEADER_LEN: usize = 8;

/// Destination address that every node accepts.
pub const AM_BROADCAST_ADDR: u16 = 0xffff;

/// Group id of a freshly flashed mote.
pub const DEFAULT_GROUP: u8 = 0x22;

/// One active message, decoded from the packet format shared by all sources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmPacket {
    pub dest: u16,
    pub src: u16,
    pub group: u8,
    pub am_type: u8,
    pub payload: Bytes,
}

impl AmPacket {
    /// Decode a raw packet. Header fields are big-endian; bytes beyond the
    /// length the header claims are ignored.
    pub fn decode(raw: &[u8]) -> anyhow::Result<Self> {
        ensure!(
            raw.len() >= HEADER_LEN,
            "packet too short: {} bytes",
            raw.len()
        );
        ensure!(
            raw[0] == SERIAL_AM_DISPATCH,
            "unsupported packet dispatch 0x{:02x}",
            raw[0]
        );
        let dest = u16::from_be_bytes([raw[1], raw[2]]);
        let src = u16::from_be_bytes([raw[3], raw[4]]);
        let length = usize::from(raw[5]);
        let group = raw[6];
        let am_type = raw[7];
        ensure!(
            raw.len() - HEADER_LEN >= length,
            "header claims {length} payload bytes, got {}",
            raw.len() - HEADER_LEN
        );
        Ok(Self {
            dest,
            src,
            group,
            am_type,
            payload: Bytes::copy_from_slice(&raw[HEADER_LEN..HEADER_LEN + length]),
        })
    }

    pub fn encode(&self) -> anyhow::Result<Bytes> {
        ensure!(
            self.payload.len() <= usize::from(u8::MAX),
            "payload too long: {} bytes",
            self.payload.len()
        );
        let mut out = BytesMut::with_capacity(HEADER_LEN + self.payload.len());
        out.put_u8(SERIAL_AM_DISPATCH);
        out.put_u16(self.dest);
        out.put_u16(self.src);
        out.put_u8(self.payload.len() as u8);
        out.put_u8(self.group);
        out.put_u8(self.am_type);
        out.put_slice(&self.payload);
        Ok(out.freeze())
    }
}
