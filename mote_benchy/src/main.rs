use crate::arguments::Arguments;
use anyhow::Context;
use bytes::Bytes;
use clap::Parser;
use futures::SinkExt;
use moteconn::am::{AmPacket, AM_BROADCAST_ADDR, DEFAULT_GROUP};
use moteconn::printf::{PrintfMsg, AM_PRINTF_MSG};
use moteconn::sf::{self, SfCodec};
use std::path::Path;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::FramedWrite;

mod arguments;

const DEMO_SCRIPT: &[&str] = &[
    "Hi I am a mote and I am alive",
    "sensor sample 1023",
    "radio duty cycle at 2%",
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("mote_benchy=info".parse().unwrap()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Arguments::parse();
    let interval: Duration = args.interval.into();
    anyhow::ensure!(!interval.is_zero(), "interval must be nonzero");
    let node_id = args.node_id;

    let lines = match &args.script {
        Some(path) => read_script(path)?,
        None => DEMO_SCRIPT.iter().map(ToString::to_string).collect(),
    };
    anyhow::ensure!(!lines.is_empty(), "script has no lines to replay");

    let listener = TcpListener::bind(args.listen).await?;
    tracing::info!("replaying {} lines on sf@{}", lines.len(), args.listen);

    loop {
        let (stream, addr) = listener.accept().await?;
        tracing::info!("client connected from {addr}");
        let lines = lines.clone();
        tokio::spawn(async move {
            if let Err(e) = serve_client(stream, &lines, interval, node_id).await {
                tracing::warn!("client {addr} dropped: {e:#}");
            }
        });
    }
}

fn read_script(path: &Path) -> anyhow::Result<Vec<String>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read script {}", path.display()))?;
    Ok(text.lines().map(ToString::to_string).collect())
}

async fn serve_client(
    mut stream: TcpStream,
    lines: &[String],
    interval: Duration,
    node_id: u16,
) -> anyhow::Result<()> {
    sf::handshake(&mut stream).await?;
    let mut frames = FramedWrite::new(stream, SfCodec::default());
    let mut ticker = tokio::time::interval(interval);
    loop {
        for line in lines {
            for packet in printf_packets(line, node_id)? {
                ticker.tick().await;
                frames.send(packet).await?;
            }
        }
    }
}

/// One line of script as a sequence of ready-to-send packets.
fn printf_packets(line: &str, node_id: u16) -> anyhow::Result<Vec<Bytes>> {
    let text = format!("{line}\n");
    PrintfMsg::chunked(&text)
        .iter()
        .map(|msg| {
            AmPacket {
                dest: AM_BROADCAST_ADDR,
                src: node_id,
                group: DEFAULT_GROUP,
                am_type: AM_PRINTF_MSG,
                payload: Bytes::copy_from_slice(msg.buffer()),
            }
            .encode()
        })
        .collect()
}
