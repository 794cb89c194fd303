//! Command line and configuration file handling.
//!
//! Every setting can come from a flag or from a YAML file passed with
//! `--config`. Flags win over the file; upstream URLs from both are used,
//! file entries first.

use std::{
    net::SocketAddr,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context as _, Result, bail};
use clap::Parser;
use httproxy_core::ProxyConfig;
use serde::{Deserialize, Serialize};

pub const DEFAULT_LISTEN: &str = ":8080";
pub const DEFAULT_PREFIX: &str = "httproxy";

/// Load-balancing reverse HTTP proxy.
#[derive(Parser, Debug, Default)]
#[command(name = "httproxy")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// YAML configuration file
    #[arg(short, long, env = "HTTPROXY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Logging prefix
    #[arg(long)]
    pub prefix: Option<String>,

    /// Print request details
    #[arg(short, long)]
    pub verbose: bool,

    /// Dump request body
    #[arg(long)]
    pub dump: bool,

    /// Address to listen on, i.e. :8080 or 127.0.0.1:8080
    #[arg(short, long, alias = "listen")]
    pub port: Option<String>,

    /// URL to proxy to, i.e. http://localhost:8081 (repeatable)
    #[arg(short, long = "url")]
    pub urls: Vec<String>,

    /// Follow 3xx redirects internally
    #[arg(long)]
    pub follow: bool,

    /// Proxy request timeout (ms), 0 means no timeout
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Override HTTP response code on proxy error
    #[arg(long)]
    pub error_response_code: Option<u16>,

    /// Body content on proxy error
    #[arg(long)]
    pub error_response_body: Option<String>,

    /// PEM certificate chain; enables TLS together with --tls-key
    #[arg(long, requires = "tls_key")]
    pub tls_cert: Option<PathBuf>,

    /// PEM private key for --tls-cert
    #[arg(long, requires = "tls_cert")]
    pub tls_key: Option<PathBuf>,
}

/// Settings as they appear in the configuration file.
#[derive(Serialize, Deserialize, Debug, Default, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub prefix: Option<String>,
    pub verbose: Option<bool>,
    pub dump: Option<bool>,
    pub port: Option<String>,
    pub urls: Vec<String>,
    pub follow_redirects: Option<bool>,
    /// Milliseconds, 0 disables the timeout
    pub timeout: Option<u64>,
    pub error_response_code: Option<u16>,
    pub error_response_body: Option<String>,
    pub tls: Option<Tls>,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
pub struct Tls {
    pub certificate: PathBuf,
    pub private_key: PathBuf,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("failed to parse config file {}", path.display()))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(raw)?)
    }
}

/// Fully resolved settings for one process.
#[derive(Debug)]
pub struct Settings {
    pub prefix: String,
    pub verbose: bool,
    pub dump: bool,
    pub listen: SocketAddr,
    pub urls: Vec<String>,
    pub proxy: ProxyConfig,
    pub tls: Option<Tls>,
}

impl Settings {
    /// Reads the optional config file named by `args` and merges it.
    pub fn load(args: Args) -> Result<Self> {
        let file = match &args.config {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };
        Self::merge(args, file)
    }

    pub fn merge(args: Args, file: FileConfig) -> Result<Self> {
        let mut urls = file.urls;
        urls.extend(args.urls);
        if urls.is_empty() {
            bail!("at least one URL has to be specified");
        }

        let listen = args
            .port
            .or(file.port)
            .unwrap_or_else(|| DEFAULT_LISTEN.to_string());
        let listen = parse_listen(&listen)?;

        let timeout = Duration::from_millis(args.timeout.or(file.timeout).unwrap_or(0));
        let error_code = args
            .error_response_code
            .or(file.error_response_code)
            .unwrap_or(502);
        let error_body = args
            .error_response_body
            .or(file.error_response_body)
            .unwrap_or_default();

        let proxy = ProxyConfig::default()
            .with_follow_redirects(args.follow || file.follow_redirects.unwrap_or(false))
            .with_timeout(timeout)
            .with_error_status(error_code)?
            .with_error_body(error_body);

        let tls = match (args.tls_cert, args.tls_key) {
            (Some(certificate), Some(private_key)) => Some(Tls {
                certificate,
                private_key,
            }),
            _ => file.tls,
        };

        Ok(Self {
            prefix: args
                .prefix
                .or(file.prefix)
                .unwrap_or_else(|| DEFAULT_PREFIX.to_string()),
            verbose: args.verbose || file.verbose.unwrap_or(false),
            dump: args.dump || file.dump.unwrap_or(false),
            listen,
            urls,
            proxy,
            tls,
        })
    }
}

/// Accepts `host:port`, or `:port` for all interfaces.
pub fn parse_listen(raw: &str) -> Result<SocketAddr> {
    let full = match raw.strip_prefix(':') {
        Some(port) => format!("0.0.0.0:{port}"),
        None => raw.to_string(),
    };
    full.parse()
        .with_context(|| format!("invalid listen address {raw:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use tempfile::NamedTempFile;

    fn args(urls: &[&str]) -> Args {
        Args {
            urls: urls.iter().map(|u| u.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_listen() {
        assert_eq!(parse_listen(":8080").unwrap(), "0.0.0.0:8080".parse().unwrap());
        assert_eq!(parse_listen("127.0.0.1:9000").unwrap(), "127.0.0.1:9000".parse().unwrap());
        assert!(parse_listen("8080").is_err());
        assert!(parse_listen(":notaport").is_err());
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::merge(args(&["http://localhost:8081"]), FileConfig::default()).unwrap();
        assert_eq!(settings.prefix, "httproxy");
        assert_eq!(settings.listen, "0.0.0.0:8080".parse().unwrap());
        assert!(!settings.verbose);
        assert!(!settings.dump);
        assert!(!settings.proxy.follow_redirects);
        assert!(settings.proxy.timeout.is_none());
        assert_eq!(settings.proxy.error_status.as_u16(), 502);
        assert!(settings.proxy.error_body.is_empty());
        assert!(settings.tls.is_none());
    }

    #[test]
    fn test_urls_required() {
        let err = Settings::merge(Args::default(), FileConfig::default()).unwrap_err();
        assert!(err.to_string().contains("at least one URL"));
    }

    #[test]
    fn test_invalid_error_code_rejected() {
        let mut a = args(&["http://localhost:8081"]);
        a.error_response_code = Some(42);
        assert!(Settings::merge(a, FileConfig::default()).is_err());
    }

    #[test]
    fn test_cli_overrides_file() {
        let file = FileConfig::parse(
            r#"
port: "127.0.0.1:7000"
urls:
  - http://file-upstream:8081
timeout: 5000
error_response_code: 503
error_response_body: from file
follow_redirects: true
"#,
        )
        .unwrap();

        let mut a = args(&["http://cli-upstream:8082"]);
        a.timeout = Some(0);
        a.error_response_body = Some("from cli".to_string());

        let settings = Settings::merge(a, file).unwrap();
        assert_eq!(settings.urls, ["http://file-upstream:8081", "http://cli-upstream:8082"]);
        assert_eq!(settings.listen, "127.0.0.1:7000".parse().unwrap());
        assert!(settings.proxy.timeout.is_none());
        assert_eq!(settings.proxy.error_status.as_u16(), 503);
        assert_eq!(&settings.proxy.error_body[..], b"from cli");
        assert!(settings.proxy.follow_redirects);
    }

    #[test]
    fn test_unknown_file_keys_rejected() {
        assert!(FileConfig::parse("upstreams: [http://a]").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(
            b"urls: [\"http://a:1\", \"http://b:2\"]\ntls:\n  certificate: /tmp/c.pem\n  private_key: /tmp/k.pem\n",
        )
        .unwrap();
        file.flush().unwrap();

        let a = Args {
            config: Some(file.path().to_path_buf()),
            ..Default::default()
        };
        let settings = Settings::load(a).unwrap();
        assert_eq!(settings.urls.len(), 2);
        let tls = settings.tls.unwrap();
        assert_eq!(tls.certificate, PathBuf::from("/tmp/c.pem"));
    }

    #[test]
    fn test_clap_flags() {
        let a = Args::try_parse_from([
            "httproxy",
            "--url",
            "http://a:1",
            "--url",
            "http://b:2",
            "--port",
            ":9090",
            "--timeout",
            "250",
            "--follow",
            "--error-response-code",
            "504",
            "--error-response-body",
            "oops",
            "-v",
            "--dump",
        ])
        .unwrap();
        let settings = Settings::merge(a, FileConfig::default()).unwrap();
        assert_eq!(settings.urls.len(), 2);
        assert_eq!(settings.listen.port(), 9090);
        assert_eq!(settings.proxy.timeout, Some(Duration::from_millis(250)));
        assert!(settings.proxy.follow_redirects);
        assert_eq!(settings.proxy.error_status.as_u16(), 504);
        assert!(settings.verbose && settings.dump);
    }

    #[test]
    fn test_tls_flags_require_each_other() {
        assert!(Args::try_parse_from(["httproxy", "--url", "http://a", "--tls-cert", "c.pem"]).is_err());
    }
}
