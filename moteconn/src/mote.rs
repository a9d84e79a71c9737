use crate::am::AmPacket;
use crate::serial::{SerialCodec, SerialFrame};
use crate::sf::{self, SfCodec};
use crate::source::SourceDescriptor;
use anyhow::Context;
use bytes::{Bytes, BytesMut};
use futures::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::io::{Read, Write};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_util::codec::{Decoder, Encoder, FramedRead, FramedWrite};

/// How long a blocking serial read waits before checking for shutdown.
const SERIAL_POLL: Duration = Duration::from_millis(100);

const PACKET_QUEUE: usize = 256;
const LISTENER_QUEUE: usize = 64;

type Subscription = (u8, oneshot::Sender<mpsc::Receiver<AmPacket>>);

/// Handle to an open packet source with per-AM-type listener dispatch.
///
/// Packets arriving from the source are decoded and handed, in arrival
/// order, to every listener subscribed to their AM type.
#[derive(Debug, Clone)]
pub struct MoteIf {
    subscriptions: mpsc::Sender<Subscription>,
}

impl MoteIf {
    /// Connect to `source`, spawning its read pump and the dispatcher.
    pub async fn open(source: &SourceDescriptor) -> anyhow::Result<Self> {
        let (packet_tx, packet_rx) = mpsc::channel(PACKET_QUEUE);
        match source {
            SourceDescriptor::SerialForwarder { host, port } => {
                let mut stream = TcpStream::connect((host.as_str(), *port))
                    .await
                    .with_context(|| format!("failed to connect to {source}"))?;
                let version = sf::handshake(&mut stream)
                    .await
                    .with_context(|| format!("handshake with {source} failed"))?;
                log::debug!("connected to {source} (protocol version {version:#04x})");
                tokio::spawn(sf_pump(stream, packet_tx));
            }
            SourceDescriptor::Network { host, port } => {
                let stream = TcpStream::connect((host.as_str(), *port))
                    .await
                    .with_context(|| format!("failed to connect to {source}"))?;
                tokio::spawn(serial_pump(stream, packet_tx));
            }
            SourceDescriptor::Serial { port, baud_rate } => {
                let port = serialport::new(port.as_str(), *baud_rate)
                    .timeout(SERIAL_POLL)
                    .open()
                    .with_context(|| format!("failed to open {source}"))?;
                tokio::task::spawn_blocking(move || {
                    if let Err(e) = serial_port_pump(port, packet_tx) {
                        log::error!("serial source failed: {e:#}");
                    }
                });
            }
        }
        let (subscriptions, subscription_rx) = mpsc::channel(16);
        tokio::spawn(Dispatcher::default().run(packet_rx, subscription_rx));
        Ok(Self { subscriptions })
    }

    /// Subscribe to all packets of one AM type. The returned channel closes
    /// when the source does.
    pub async fn subscribe(&self, am_type: u8) -> anyhow::Result<mpsc::Receiver<AmPacket>> {
        let (reply, receiver) = oneshot::channel();
        self.subscriptions
            .send((am_type, reply))
            .await
            .ok()
            .context("packet dispatcher is gone")?;
        receiver.await.context("packet dispatcher is gone")
    }
}

#[derive(Debug, Default)]
struct Dispatcher {
    listeners: HashMap<u8, Vec<mpsc::Sender<AmPacket>>>,
}

impl Dispatcher {
    async fn run(
        mut self,
        mut packets: mpsc::Receiver<Bytes>,
        mut subscriptions: mpsc::Receiver<Subscription>,
    ) {
        loop {
            tokio::select! {
                packet = packets.recv() => {
                    let Some(raw) = packet else {
                        break;
                    };
                    self.deliver(&raw).await;
                }
                Some((am_type, reply)) = subscriptions.recv() => {
                    let (sender, receiver) = mpsc::channel(LISTENER_QUEUE);
                    self.listeners.entry(am_type).or_default().push(sender);
                    let _ = reply.send(receiver);
                }
            }
        }
        log::debug!("packet source closed, dispatcher finished");
    }

    async fn deliver(&mut self, raw: &[u8]) {
        let packet = match AmPacket::decode(raw) {
            Ok(packet) => packet,
            Err(e) => {
                log::debug!("discarding undecodable packet: {e:#}");
                return;
            }
        };
        let Some(listeners) = self.listeners.get_mut(&packet.am_type) else {
            log::trace!("no listener for AM type {}", packet.am_type);
            return;
        };
        let mut open = Vec::with_capacity(listeners.len());
        for listener in listeners.drain(..) {
            if listener.send(packet.clone()).await.is_ok() {
                open.push(listener);
            }
        }
        *listeners = open;
    }
}

/// Feed serial forwarder frames into the dispatcher.
async fn sf_pump<S>(stream: S, packets: mpsc::Sender<Bytes>)
where
    S: AsyncRead + Unpin,
{
    let mut frames = FramedRead::new(stream, SfCodec::default());
    while let Some(frame) = frames.next().await {
        match frame {
            Ok(frame) => {
                if packets.send(frame).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                log::error!("serial forwarder read failed: {e:#}");
                break;
            }
        }
    }
}

/// Feed serial protocol packets into the dispatcher, acking as requested.
async fn serial_pump<S>(stream: S, packets: mpsc::Sender<Bytes>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (reader, writer) = tokio::io::split(stream);
    let mut frames = FramedRead::new(reader, SerialCodec::default());
    let mut acks = FramedWrite::new(writer, SerialCodec::default());
    while let Some(frame) = frames.next().await {
        match frame {
            Ok(SerialFrame::Packet { seq, payload }) => {
                if let Some(seq) = seq {
                    if let Err(e) = acks.send(SerialFrame::Ack { seq }).await {
                        log::error!("failed to ack frame {seq}: {e:#}");
                        break;
                    }
                }
                if packets.send(payload).await.is_err() {
                    break;
                }
            }
            Ok(SerialFrame::Ack { seq }) => {
                log::trace!("ignoring stray ack for {seq}");
            }
            Err(e) => {
                log::error!("serial read failed: {e:#}");
                break;
            }
        }
    }
}

/// Blocking variant of [`serial_pump`] for a local port.
fn serial_port_pump(
    mut port: Box<dyn serialport::SerialPort>,
    packets: mpsc::Sender<Bytes>,
) -> anyhow::Result<()> {
    let mut codec = SerialCodec::default();
    let mut buffered = BytesMut::with_capacity(512);
    let mut chunk = [0u8; 256];
    loop {
        let n = match port.read(&mut chunk) {
            Ok(n) => n,
            // The poll timeout just means no traffic right now.
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => continue,
            Err(e) => return Err(e).context("serial read failed"),
        };
        if n == 0 {
            continue;
        }
        buffered.extend_from_slice(&chunk[..n]);
        while let Some(frame) = codec.decode(&mut buffered)? {
            match frame {
                SerialFrame::Packet { seq, payload } => {
                    if let Some(seq) = seq {
                        let mut ack = BytesMut::new();
                        codec.encode(SerialFrame::Ack { seq }, &mut ack)?;
                        port.write_all(&ack).context("failed to write ack")?;
                    }
                    if packets.blocking_send(payload).is_err() {
                        return Ok(());
                    }
                }
                SerialFrame::Ack { seq } => {
                    log::trace!("ignoring stray ack for {seq}");
                }
            }
        }
    }
}
