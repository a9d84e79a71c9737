use crate::printer::Printer;
use anyhow::Context;
use chrono::Utc;
use moteconn::printf::{PrintfMsg, AM_PRINTF_MSG};
use moteconn::{MoteIf, SourceDescriptor};
use std::env;
use std::io;
use std::process;

mod arguments;
mod printer;

fn usage() {
    eprintln!("usage: printf_client [-comm <source>]");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("printf_client=info".parse().unwrap())
                .add_directive("moteconn=info".parse().unwrap()),
        )
        .with_writer(io::stderr)
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    let source = match arguments::comm_source(&args) {
        Ok(source) => source,
        Err(_) => {
            usage();
            process::exit(1);
        }
    };
    let source = match source {
        Some(name) => name
            .parse()
            .with_context(|| format!("invalid source {name:?}"))?,
        None => SourceDescriptor::from_env_or_default()?,
    };
    println!("{source}");

    let mote = MoteIf::open(&source).await?;
    let mut messages = mote.subscribe(AM_PRINTF_MSG).await?;
    let mut printer = Printer::new(io::stdout());

    while let Some(packet) = messages.recv().await {
        let received = Utc::now();
        match PrintfMsg::try_from(&packet) {
            Ok(msg) => printer.print(received, &msg)?,
            Err(e) => tracing::warn!("skipping message from mote {}: {e:#}", packet.src),
        }
    }
    anyhow::bail!("connection to {source} closed")
}
