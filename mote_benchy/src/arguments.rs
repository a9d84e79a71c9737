use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(author, version, about = "Serial forwarder that replays scripted mote output")]
pub struct Arguments {
    /// Socket to serve serial forwarder clients on
    #[arg(short, long, default_value = "127.0.0.1:9002")]
    pub listen: std::net::SocketAddr,

    /// Delay between printf packets
    #[arg(short, long, default_value_t = Duration::from_millis(250).into())]
    pub interval: humantime::Duration,

    /// Mote address stamped into outgoing packets
    #[arg(short, long, default_value_t = 1)]
    pub node_id: u16,

    /// File with lines to replay instead of the built-in script
    #[arg(short, long)]
    pub script: Option<PathBuf>,
}
