pub use clap::Parser;

use std::{
    net::{IpAddr, SocketAddr},
    path::PathBuf,
    time::Duration,
};

use clap::ArgAction;
use log::LevelFilter;
use thiserror::Error;

use crate::{
    crypto::{Secret, SecretError},
    radius::Code,
    transport::Protocol,
};

pub const MAX_RETRIES: u32 = 1000;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigurationError {
    #[error("Retries must be between 1 and {max}, got {0}", max = MAX_RETRIES)]
    InvalidRetries(u32),

    #[error("Timeout must be a positive number of seconds, got {0}")]
    InvalidTimeout(f64),

    #[error("Invalid server \"{0}\"")]
    InvalidServer(String),

    #[error("Invalid port \"{0}\"")]
    InvalidPort(String),

    #[error("Failed resolving \"{host}\": {reason}")]
    Resolve { host: String, reason: String },

    #[error("No {family} address found for \"{host}\"")]
    NoAddress { host: String, family: &'static str },

    #[error(transparent)]
    Secret(#[from] SecretError),
}

#[derive(Parser, Debug)]
#[command(
    name = "radsnmp",
    version,
    about = "net-snmp pass_persist bridge answering SNMP queries from a RADIUS server",
    disable_version_flag = true
)]
pub struct Configuration {
    /// RADIUS server, as host or host:port (IPv6 literals with a port in brackets)
    pub server: String,
    /// Request type: auth, acct, status, disconnect, coa or a code number
    pub command: Code,
    /// Shared secret
    pub secret: Option<String>,

    /// Use IPv4 when resolving the server
    #[arg(short = '4', conflicts_with = "ipv6")]
    pub ipv4: bool,
    /// Use IPv6 when resolving the server
    #[arg(short = '6')]
    pub ipv6: bool,
    /// Directory with the user dictionary
    #[arg(short = 'd', value_name = "RADDB")]
    pub raddb_dir: Option<PathBuf>,
    /// Directory with the main dictionary
    #[arg(short = 'D', value_name = "DICTDIR")]
    pub dict_dir: Option<PathBuf>,
    /// Log to a file instead of stderr ("stderr" keeps stderr)
    #[arg(short = 'l', value_name = "FILE")]
    pub log_file: Option<PathBuf>,
    /// Send attempts per request
    #[arg(short = 'r', default_value_t = 5)]
    pub retries: u32,
    /// Read the secret from the first line of a file
    #[arg(short = 'S', value_name = "FILE")]
    pub secret_file: Option<PathBuf>,
    /// Seconds to wait for a reply on each attempt
    #[arg(short = 't', default_value_t = 3.0)]
    pub timeout: f64,
    /// Transport protocol
    #[arg(short = 'P', value_enum, default_value_t = Protocol::Udp)]
    pub protocol: Protocol,
    /// Increase debug level (repeatable)
    #[arg(short = 'x', action = ArgAction::Count)]
    pub debug: u8,
    /// Print version and exit
    #[arg(short = 'v', action = ArgAction::Version)]
    pub version: Option<bool>,
}

impl Configuration {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if !(1..=MAX_RETRIES).contains(&self.retries) {
            return Err(ConfigurationError::InvalidRetries(self.retries));
        }
        if !(self.timeout.is_finite() && self.timeout > 0.0) {
            return Err(ConfigurationError::InvalidTimeout(self.timeout));
        }
        split_host_port(&self.server)?;
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs_f64(self.timeout)
    }

    pub fn log_level(&self) -> LevelFilter {
        match self.debug {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }

    /// The positional secret, else the secret file, else the default.
    pub fn load_secret(&self) -> Result<Secret, ConfigurationError> {
        if let Some(secret) = &self.secret {
            return Ok(Secret::new(secret.as_bytes()));
        }
        if let Some(file) = &self.secret_file {
            return Ok(Secret::from_file(file)?);
        }
        Ok(Secret::default())
    }

    /// Resolves the server to one address, honouring `-4`/`-6` and the request type's
    /// default port.
    pub async fn resolve_server(&self) -> Result<SocketAddr, ConfigurationError> {
        let (host, port) = split_host_port(&self.server)?;
        let port = port.unwrap_or_else(|| self.command.default_port());

        let family = if self.ipv4 {
            "IPv4"
        } else if self.ipv6 {
            "IPv6"
        } else {
            "usable"
        };
        let wanted = |ip: &IpAddr| match (self.ipv4, self.ipv6) {
            (true, _) => ip.is_ipv4(),
            (_, true) => ip.is_ipv6(),
            _ => true,
        };

        if let Ok(ip) = host.parse::<IpAddr>() {
            return if wanted(&ip) {
                Ok(SocketAddr::new(ip, port))
            } else {
                Err(ConfigurationError::NoAddress { host, family })
            };
        }

        let mut addrs = tokio::net::lookup_host((host.as_str(), port))
            .await
            .map_err(|e| ConfigurationError::Resolve {
                host: host.clone(),
                reason: e.to_string(),
            })?;
        addrs
            .find(|addr| wanted(&addr.ip()))
            .ok_or_else(|| ConfigurationError::NoAddress {
                host: host.clone(),
                family,
            })
    }
}

/// Splits `host`, `host:port`, `[v6]` or `[v6]:port`. A bare IPv6 literal has no port.
fn split_host_port(server: &str) -> Result<(String, Option<u16>), ConfigurationError> {
    let invalid = || ConfigurationError::InvalidServer(server.to_string());

    let (host, port) = if let Some(rest) = server.strip_prefix('[') {
        let (host, rest) = rest.split_once(']').ok_or_else(invalid)?;
        match rest {
            "" => (host, None),
            _ => (host, Some(rest.strip_prefix(':').ok_or_else(invalid)?)),
        }
    } else {
        match server.split_once(':') {
            Some((host, port)) if !port.contains(':') => (host, Some(port)),
            _ => (server, None),
        }
    };

    if host.is_empty() {
        return Err(invalid());
    }
    let port = port
        .map(|p| match p.parse::<u16>() {
            Ok(port) if port != 0 => Ok(port),
            _ => Err(ConfigurationError::InvalidPort(p.to_string())),
        })
        .transpose()?;
    Ok((host.to_string(), port))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    fn parse(args: &[&str]) -> Configuration {
        Configuration::try_parse_from(std::iter::once("radsnmp").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults() {
        let conf = parse(&["localhost", "auth"]);
        assert_eq!(conf.command, Code::ACCESS_REQUEST);
        assert_eq!(conf.retries, 5);
        assert_eq!(conf.timeout(), Duration::from_secs(3));
        assert_eq!(conf.protocol, Protocol::Udp);
        assert_eq!(conf.log_level(), LevelFilter::Info);
        assert_eq!(conf.load_secret().unwrap(), Secret::default());
        assert!(conf.validate().is_ok());
    }

    #[test]
    fn test_options() {
        let conf = parse(&[
            "-xx", "-r", "2", "-t", "0.5", "-P", "tcp", "-D", "/usr/share/freeradius", "-6",
            "[::1]:1815", "coa", "sekrit",
        ]);
        assert_eq!(conf.log_level(), LevelFilter::Trace);
        assert_eq!(conf.retries, 2);
        assert_eq!(conf.timeout(), Duration::from_millis(500));
        assert_eq!(conf.protocol, Protocol::Tcp);
        assert_eq!(conf.dict_dir, Some(PathBuf::from("/usr/share/freeradius")));
        assert!(conf.ipv6);
        assert_eq!(conf.command, Code::COA_REQUEST);
        assert_eq!(conf.load_secret().unwrap(), Secret::new("sekrit"));
    }

    #[test]
    fn test_rejects_bad_arguments() {
        let bad = |args: &[&str]| {
            Configuration::try_parse_from(std::iter::once("radsnmp").chain(args.iter().copied())).is_err()
        };
        assert!(bad(&["localhost"]));
        assert!(bad(&["localhost", "bogus"]));
        assert!(bad(&["-4", "-6", "localhost", "auth"]));
        assert!(bad(&["-P", "sctp", "localhost", "auth"]));
    }

    #[test]
    fn test_validate_limits() {
        let mut conf = parse(&["localhost", "status"]);
        conf.retries = 0;
        assert_eq!(conf.validate(), Err(ConfigurationError::InvalidRetries(0)));
        conf.retries = 1001;
        assert_eq!(conf.validate(), Err(ConfigurationError::InvalidRetries(1001)));
        conf.retries = 1000;
        conf.timeout = 0.0;
        assert_eq!(conf.validate(), Err(ConfigurationError::InvalidTimeout(0.0)));
        conf.timeout = 0.01;
        assert!(conf.validate().is_ok());
    }

    #[test]
    fn test_split_host_port() {
        assert_eq!(split_host_port("radius").unwrap(), ("radius".to_string(), None));
        assert_eq!(split_host_port("radius:1812").unwrap(), ("radius".to_string(), Some(1812)));
        assert_eq!(split_host_port("::1").unwrap(), ("::1".to_string(), None));
        assert_eq!(split_host_port("[::1]").unwrap(), ("::1".to_string(), None));
        assert_eq!(split_host_port("[::1]:18120").unwrap(), ("::1".to_string(), Some(18120)));
        assert!(split_host_port("").is_err());
        assert!(split_host_port("[::1").is_err());
        assert!(split_host_port("[::1]x").is_err());
        assert_eq!(
            split_host_port("radius:0"),
            Err(ConfigurationError::InvalidPort("0".to_string()))
        );
        assert_eq!(
            split_host_port("radius:http"),
            Err(ConfigurationError::InvalidPort("http".to_string()))
        );
    }

    #[tokio::test]
    async fn test_resolve_default_ports() {
        let conf = parse(&["127.0.0.1", "acct"]);
        assert_eq!(
            conf.resolve_server().await.unwrap(),
            SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 1813)
        );

        let conf = parse(&["[::1]:2000", "disconnect"]);
        assert_eq!(
            conf.resolve_server().await.unwrap(),
            SocketAddr::new(IpAddr::V6(Ipv6Addr::LOCALHOST), 2000)
        );

        let conf = parse(&["-6", "127.0.0.1", "auth"]);
        assert!(matches!(
            conf.resolve_server().await,
            Err(ConfigurationError::NoAddress { .. })
        ));
    }

    #[tokio::test]
    async fn test_resolve_hostname() {
        let conf = parse(&["-4", "localhost", "auth"]);
        assert_eq!(
            conf.resolve_server().await.unwrap(),
            SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 1812)
        );

        let conf = parse(&["localhost:1815", "coa"]);
        let addr = conf.resolve_server().await.unwrap();
        assert!(addr.ip().is_loopback());
        assert_eq!(addr.port(), 1815);

        let conf = parse(&["no-such-host.invalid", "status"]);
        assert!(conf.resolve_server().await.is_err());
    }

    #[test]
    fn test_secret_file() {
        let path = std::env::temp_dir().join(format!("radsnmp-secret-{}", std::process::id()));
        std::fs::write(&path, "from-file\r\nignored\n").unwrap();

        let conf = parse(&["-S", path.to_str().unwrap(), "localhost", "auth"]);
        assert_eq!(conf.load_secret().unwrap(), Secret::new("from-file"));

        let conf = parse(&["-S", path.to_str().unwrap(), "localhost", "auth", "positional"]);
        assert_eq!(conf.load_secret().unwrap(), Secret::new("positional"));

        std::fs::remove_file(&path).unwrap();
    }
}
