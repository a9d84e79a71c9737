use crate::platform;
use anyhow::{bail, Context};
use std::env;
use std::fmt;
use std::str::FromStr;

/// Source used when neither `-comm` nor `MOTECOM` names one.
pub const DEFAULT_SOURCE: &str = "sf@localhost:9002";

const MOTECOM: &str = "MOTECOM";

/// A parsed packet source description, e.g. `sf@localhost:9002` or
/// `serial@/dev/ttyUSB0:telosb`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceDescriptor {
    /// TCP connection to a serial forwarder.
    SerialForwarder { host: String, port: u16 },
    /// Local serial port.
    Serial { port: String, baud_rate: u32 },
    /// TCP connection carrying the serial framing protocol.
    Network { host: String, port: u16 },
}

impl SourceDescriptor {
    /// Descriptor named by the `MOTECOM` environment variable, falling back
    /// to [`DEFAULT_SOURCE`].
    pub fn from_env_or_default() -> anyhow::Result<Self> {
        match env::var(MOTECOM) {
            Ok(name) => name
                .parse()
                .with_context(|| format!("invalid {MOTECOM} value {name:?}")),
            Err(_) => DEFAULT_SOURCE.parse(),
        }
    }
}

impl FromStr for SourceDescriptor {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((kind, rest)) = s.split_once('@') else {
            bail!("source {s:?} has no '@' (expected sf@, serial@ or network@)");
        };
        match kind {
            "sf" => {
                let (host, port) = host_port(rest)?;
                Ok(Self::SerialForwarder { host, port })
            }
            "network" => {
                let (host, port) = host_port(rest)?;
                Ok(Self::Network { host, port })
            }
            "serial" => {
                let Some((port, speed)) = rest.split_once(':') else {
                    bail!("serial source {s:?} is missing a speed (expected serial@PORT:SPEED)");
                };
                // The speed is either a platform name or a literal rate.
                let baud_rate = match platform::baud_rate(speed) {
                    -1 => speed.parse().with_context(|| {
                        format!("speed {speed:?} is neither a known platform nor a number")
                    })?,
                    baud => u32::try_from(baud)
                        .with_context(|| format!("platform {speed:?} has a negative baud rate"))?,
                };
                Ok(Self::Serial {
                    port: port.to_string(),
                    baud_rate,
                })
            }
            other => bail!("unknown source kind {other:?} in {s:?}"),
        }
    }
}

fn host_port(s: &str) -> anyhow::Result<(String, u16)> {
    let (host, port) = s
        .split_once(':')
        .with_context(|| format!("missing ':' in {s:?} (expected HOST:PORT)"))?;
    let port = port
        .parse()
        .with_context(|| format!("invalid port {port:?}"))?;
    Ok((host.to_string(), port))
}

impl fmt::Display for SourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SerialForwarder { host, port } => write!(f, "sf@{host}:{port}"),
            Self::Serial { port, baud_rate } => write!(f, "serial@{port}:{baud_rate}"),
            Self::Network { host, port } => write!(f, "network@{host}:{port}"),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_serial_forwarder() {
        let source: SourceDescriptor = "sf@localhost:9002".parse().unwrap();
        assert_eq!(
            source,
            SourceDescriptor::SerialForwarder {
                host: "localhost".to_string(),
                port: 9002,
            }
        );
        assert_eq!(source.to_string(), "sf@localhost:9002");
    }

    #[test]
    fn parses_network_source() {
        let source: SourceDescriptor = "network@gateway:10002".parse().unwrap();
        assert_eq!(
            source,
            SourceDescriptor::Network {
                host: "gateway".to_string(),
                port: 10002,
            }
        );
    }

    #[test]
    fn parses_serial_source_with_numeric_speed() {
        let source: SourceDescriptor = "serial@/dev/ttyUSB0:57600".parse().unwrap();
        assert_eq!(
            source,
            SourceDescriptor::Serial {
                port: "/dev/ttyUSB0".to_string(),
                baud_rate: 57600,
            }
        );
    }

    #[test]
    fn serial_speed_may_be_a_platform_name() {
        let source: SourceDescriptor = "serial@/dev/ttyUSB0:telosb".parse().unwrap();
        assert_eq!(
            source,
            SourceDescriptor::Serial {
                port: "/dev/ttyUSB0".to_string(),
                baud_rate: 115200,
            }
        );
        assert_eq!(source.to_string(), "serial@/dev/ttyUSB0:115200");
    }

    #[test]
    fn rejects_malformed_sources() {
        assert!("localhost:9002".parse::<SourceDescriptor>().is_err());
        assert!("sf@localhost".parse::<SourceDescriptor>().is_err());
        assert!("sf@localhost:notaport".parse::<SourceDescriptor>().is_err());
        assert!("serial@/dev/ttyUSB0".parse::<SourceDescriptor>().is_err());
        assert!("serial@/dev/ttyUSB0:fast".parse::<SourceDescriptor>().is_err());
        assert!("radio@host:1".parse::<SourceDescriptor>().is_err());
    }

    #[test]
    fn environment_variable_overrides_default() {
        env::remove_var(MOTECOM);
        assert_eq!(
            SourceDescriptor::from_env_or_default().unwrap(),
            DEFAULT_SOURCE.parse().unwrap()
        );
        env::set_var(MOTECOM, "network@gateway:10002");
        assert_eq!(
            SourceDescriptor::from_env_or_default().unwrap(),
            SourceDescriptor::Network {
                host: "gateway".to_string(),
                port: 10002,
            }
        );
        env::remove_var(MOTECOM);
    }
}
