use anyhow::ensure;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::{Decoder, Encoder};

/// Banner each side sends on connect: 'U' followed by its protocol version.
pub const VERSION: [u8; 2] = [b'U', b' '];

/// Exchange version banners with the peer. Both ends send the same two
/// bytes, so this works for clients and servers alike. Returns the agreed
/// protocol version, the smaller of the two.
pub async fn handshake<S>(stream: &mut S) -> anyhow::Result<u8>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream.write_all(&VERSION).await?;
    let mut peer = [0u8; 2];
    stream.read_exact(&mut peer).await?;
    ensure!(
        peer[0] == VERSION[0],
        "peer is not a serial forwarder (sent 0x{:02x})",
        peer[0]
    );
    Ok(peer[1].min(VERSION[1]))
}

/// Serial forwarder framing: one length byte, then that many payload bytes.
/// A length of zero is a keepalive and never surfaces as a frame.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct SfCodec;

impl Decoder for SfCodec {
    type Item = Bytes;
    type Error = anyhow::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let Some(&len) = src.first() else {
                return Ok(None);
            };
            if len == 0 {
                src.advance(1);
                continue;
            }
            if src.len() < 1 + usize::from(len) {
                return Ok(None);
            }
            src.advance(1);
            return Ok(Some(src.split_to(usize::from(len)).freeze()));
        }
    }
}

impl Encoder<Bytes> for SfCodec {
    type Error = anyhow::Error;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        ensure!(!item.is_empty(), "refusing to send an empty frame");
        ensure!(
            item.len() <= usize::from(u8::MAX),
            "frame too long: {} bytes",
            item.len()
        );
        dst.put_u8(item.len() as u8);
        dst.put_slice(&item);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tokio_test::io::Builder;

    #[test]
    fn decodes_consecutive_frames() {
        let mut codec = SfCodec::default();
        let mut buf = BytesMut::from(&[3u8, 1, 2, 3, 2, 9, 9][..]);
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap().as_ref(), &[1, 2, 3]);
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap().as_ref(), &[9, 9]);
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
    }

    #[test]
    fn waits_for_complete_frame() {
        let mut codec = SfCodec::default();
        let mut buf = BytesMut::from(&[3u8, 1][..]);
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        buf.extend_from_slice(&[2, 3]);
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap().as_ref(), &[1, 2, 3]);
    }

    #[test]
    fn keepalives_are_skipped() {
        let mut codec = SfCodec::default();
        let mut buf = BytesMut::from(&[0u8, 0, 1, 7, 0][..]);
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap().as_ref(), &[7]);
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        assert!(buf.is_empty());
    }

    #[test]
    fn encodes_length_prefix() {
        let mut codec = SfCodec::default();
        let mut buf = BytesMut::new();
        codec
            .encode(Bytes::from_static(&[0xaa, 0xbb, 0xcc]), &mut buf)
            .unwrap();
        assert_eq!(buf.as_ref(), &[3, 0xaa, 0xbb, 0xcc]);
    }

    #[test]
    fn refuses_empty_frame() {
        let mut codec = SfCodec::default();
        let mut buf = BytesMut::new();
        assert!(codec.encode(Bytes::new(), &mut buf).is_err());
    }

    #[tokio::test]
    async fn handshake_agrees_on_version() {
        let mut stream = Builder::new().write(&VERSION).read(&[b'U', b' ']).build();
        assert_eq!(handshake(&mut stream).await.unwrap(), b' ');
    }

    #[tokio::test]
    async fn handshake_takes_the_lower_version() {
        let mut stream = Builder::new().write(&VERSION).read(&[b'U', 0x1f]).build();
        assert_eq!(handshake(&mut stream).await.unwrap(), 0x1f);
    }

    #[tokio::test]
    async fn handshake_rejects_other_protocols() {
        let mut stream = Builder::new().write(&VERSION).read(&[b'X', b' ']).build();
        assert!(handshake(&mut stream).await.is_err());
    }
}
