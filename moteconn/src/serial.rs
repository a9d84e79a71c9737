use crate::crc::crc16;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Frame delimiter. Senders may share one delimiter between frames.
pub const SYNC: u8 = 0x7e;
/// Escape byte; the following byte is XORed with 0x20.
pub const ESCAPE: u8 = 0x7d;
const ESCAPE_XOR: u8 = 0x20;

pub const PROTO_ACK: u8 = 67;
pub const PROTO_PACKET_ACK: u8 = 68;
pub const PROTO_PACKET_NO_ACK: u8 = 69;

/// One frame of the serial protocol, unescaped and CRC-checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SerialFrame {
    /// Acknowledgement of a previously sent sequence number.
    Ack { seq: u8 },
    /// A packet; `seq` is present when the sender expects an ack back.
    Packet { seq: Option<u8>, payload: Bytes },
}

/// Framing shared by `serial@` and `network@` sources: 0x7e-delimited,
/// 0x7d-escaped, with a little-endian CRC trailer. Noise between frames is
/// normal on a wire, so undecodable input is logged and skipped instead of
/// tearing the connection down.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct SerialCodec;

impl Decoder for SerialCodec {
    type Item = SerialFrame;
    type Error = anyhow::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            match src.iter().position(|&b| b == SYNC) {
                Some(0) => {}
                Some(junk) => {
                    log::debug!("skipping {junk} bytes of noise before frame delimiter");
                    src.advance(junk);
                }
                None => {
                    if !src.is_empty() {
                        log::debug!("skipping {} bytes of noise", src.len());
                        src.clear();
                    }
                    return Ok(None);
                }
            }
            // The closing delimiter stays in the buffer; it may double as the
            // next frame's opening one.
            let Some(end) = src[1..].iter().position(|&b| b == SYNC).map(|i| i + 1) else {
                return Ok(None);
            };
            let raw = src.split_to(end);
            let body = &raw[1..];
            if body.is_empty() {
                continue;
            }
            if let Some(frame) = decode_body(body) {
                return Ok(Some(frame));
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let frame = self.decode(src)?;
        // A retained delimiter or half a frame is worthless once the stream
        // is over.
        if frame.is_none() && !src.is_empty() {
            log::debug!("discarding {} bytes of partial frame at end of stream", src.len());
            src.clear();
        }
        Ok(frame)
    }
}

fn decode_body(body: &[u8]) -> Option<SerialFrame> {
    let unescaped = unescape(body)?;
    if unescaped.len() < 3 {
        log::debug!("dropping runt frame ({} bytes)", unescaped.len());
        return None;
    }
    let (content, trailer) = unescaped.split_at(unescaped.len() - 2);
    let expected = u16::from_le_bytes([trailer[0], trailer[1]]);
    let computed = crc16(content);
    if expected != computed {
        log::warn!("dropping frame with bad crc (expected {expected:#06x}, computed {computed:#06x})");
        return None;
    }
    match (content[0], content.len()) {
        (PROTO_ACK, 2..) => Some(SerialFrame::Ack { seq: content[1] }),
        (PROTO_PACKET_ACK, 2..) => Some(SerialFrame::Packet {
            seq: Some(content[1]),
            payload: Bytes::copy_from_slice(&content[2..]),
        }),
        (PROTO_PACKET_NO_ACK, _) => Some(SerialFrame::Packet {
            seq: None,
            payload: Bytes::copy_from_slice(&content[1..]),
        }),
        (kind, len) => {
            log::debug!("dropping malformed frame (protocol byte {kind}, {len} content bytes)");
            None
        }
    }
}

fn unescape(body: &[u8]) -> Option<Vec<u8>> {
    let mut out = Vec::with_capacity(body.len());
    let mut bytes = body.iter();
    while let Some(&byte) = bytes.next() {
        if byte == ESCAPE {
            let Some(&escaped) = bytes.next() else {
                log::debug!("dropping frame with dangling escape byte");
                return None;
            };
            out.push(escaped ^ ESCAPE_XOR);
        } else {
            out.push(byte);
        }
    }
    Some(out)
}

impl Encoder<SerialFrame> for SerialCodec {
    type Error = anyhow::Error;

    fn encode(&mut self, item: SerialFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let mut content = BytesMut::new();
        match item {
            SerialFrame::Ack { seq } => {
                content.put_u8(PROTO_ACK);
                content.put_u8(seq);
            }
            SerialFrame::Packet { seq, payload } => {
                match seq {
                    Some(seq) => {
                        content.put_u8(PROTO_PACKET_ACK);
                        content.put_u8(seq);
                    }
                    None => content.put_u8(PROTO_PACKET_NO_ACK),
                }
                content.put_slice(&payload);
            }
        }
        let crc = crc16(&content);
        content.put_u16_le(crc);
        dst.put_u8(SYNC);
        for &byte in content.iter() {
            if byte == SYNC || byte == ESCAPE {
                dst.put_u8(ESCAPE);
                dst.put_u8(byte ^ ESCAPE_XOR);
            } else {
                dst.put_u8(byte);
            }
        }
        dst.put_u8(SYNC);
        Ok(())
    }
}
