use std::fmt;
use std::str::FromStr;

use crate::error::{Result, TransportError};

/// Port used by Ethernet SCIP sensors when the URL omits one.
pub const DEFAULT_TCP_PORT: u16 = 10940;

/// Baud rate used for serial sensors unless overridden.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

const TCP_SCHEME: &str = "tcp://";

/// Where a sensor lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// Local serial device, e.g. `/dev/ttyACM0`.
    Serial { path: String, baud_rate: u32 },
    /// TCP socket, e.g. `tcp://192.168.0.10:10940`.
    Tcp { host: String, port: u16 },
}

impl Endpoint {
    /// Parse a device path or `tcp://host[:port]` URL.
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        if input.is_empty() {
            return Err(TransportError::InvalidEndpoint(
                "endpoint must not be empty".to_string(),
            ));
        }

        let Some(rest) = input.strip_prefix(TCP_SCHEME) else {
            return Ok(Self::Serial {
                path: input.to_string(),
                baud_rate: DEFAULT_BAUD_RATE,
            });
        };

        let (host, port) = match rest.rsplit_once(':') {
            Some((host, port)) => {
                let port = port.parse::<u16>().map_err(|_| {
                    TransportError::InvalidEndpoint(format!("invalid port in {input}"))
                })?;
                (host, port)
            }
            None => (rest, DEFAULT_TCP_PORT),
        };

        if host.is_empty() {
            return Err(TransportError::InvalidEndpoint(format!(
                "missing host in {input}"
            )));
        }

        Ok(Self::Tcp {
            host: host.to_string(),
            port,
        })
    }

    /// Override the serial baud rate. No effect on TCP endpoints.
    pub fn with_baud_rate(self, baud: u32) -> Self {
        match self {
            Self::Serial { path, .. } => Self::Serial {
                path,
                baud_rate: baud,
            },
            tcp => tcp,
        }
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        match self {
            Self::Serial { .. } => "serial",
            Self::Tcp { .. } => "tcp",
        }
    }
}

impl FromStr for Endpoint {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Serial { path, baud_rate } => write!(f, "{path}@{baud_rate}"),
            Self::Tcp { host, port } => write!(f, "{TCP_SCHEME}{host}:{port}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serial_path_uses_default_baud() {
        let ep = Endpoint::parse("/dev/ttyACM0").unwrap();
        assert_eq!(
            ep,
            Endpoint::Serial {
                path: "/dev/ttyACM0".to_string(),
                baud_rate: DEFAULT_BAUD_RATE,
            }
        );
        assert_eq!(ep.transport_name(), "serial");
    }

    #[test]
    fn tcp_with_port() {
        let ep: Endpoint = "tcp://192.168.0.10:1234".parse().unwrap();
        assert_eq!(
            ep,
            Endpoint::Tcp {
                host: "192.168.0.10".to_string(),
                port: 1234,
            }
        );
    }

    #[test]
    fn tcp_without_port_defaults() {
        let ep = Endpoint::parse("tcp://lidar.local").unwrap();
        assert_eq!(
            ep,
            Endpoint::Tcp {
                host: "lidar.local".to_string(),
                port: DEFAULT_TCP_PORT,
            }
        );
    }

    #[test]
    fn rejects_bad_input() {
        assert!(matches!(
            Endpoint::parse(""),
            Err(TransportError::InvalidEndpoint(_))
        ));
        assert!(matches!(
            Endpoint::parse("tcp://:10940"),
            Err(TransportError::InvalidEndpoint(_))
        ));
        assert!(matches!(
            Endpoint::parse("tcp://host:notaport"),
            Err(TransportError::InvalidEndpoint(_))
        ));
    }

    #[test]
    fn baud_override_only_touches_serial() {
        let serial = Endpoint::parse("/dev/ttyUSB0").unwrap().with_baud_rate(19_200);
        assert!(matches!(serial, Endpoint::Serial { baud_rate: 19_200, .. }));

        let tcp = Endpoint::parse("tcp://h:1").unwrap().with_baud_rate(19_200);
        assert_eq!(tcp.to_string(), "tcp://h:1");
    }
}
