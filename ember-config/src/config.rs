use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::io::Write;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::Duration;

use ember_log::{LogConfig, LogLevel};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::byte_size::ByteSize;

/// Defines the source of a config error
#[derive(Debug)]
enum ConfigErrorSource {
    /// An error occurring independently.
    None,
    /// An error originating from a configuration file.
    File(PathBuf),
    /// An error originating in a field override (an env var, or a CLI parameter).
    FieldOverride(String),
}

impl std::fmt::Display for ConfigErrorSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigErrorSource::None => Ok(()),
            ConfigErrorSource::File(file_name) => {
                write!(f, " (file {})", file_name.display())
            }
            ConfigErrorSource::FieldOverride(name) => write!(f, " (field {name})"),
        }
    }
}

/// Indicates config related errors.
#[derive(Debug)]
pub struct ConfigError {
    source: ConfigErrorSource,
    kind: ConfigErrorKind,
    cause: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl ConfigError {
    #[inline]
    fn new(kind: ConfigErrorKind) -> Self {
        Self {
            source: ConfigErrorSource::None,
            kind,
            cause: None,
        }
    }

    #[inline]
    fn wrap<E>(cause: E, kind: ConfigErrorKind) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            source: ConfigErrorSource::None,
            kind,
            cause: Some(Box::new(cause)),
        }
    }

    #[inline]
    fn for_field<E>(cause: E, field: &'static str) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::wrap(cause, ConfigErrorKind::InvalidValue).field(field)
    }

    #[inline]
    fn file(mut self, p: impl AsRef<Path>) -> Self {
        self.source = ConfigErrorSource::File(p.as_ref().to_path_buf());
        self
    }

    #[inline]
    fn field(mut self, name: &'static str) -> Self {
        self.source = ConfigErrorSource::FieldOverride(name.to_owned());
        self
    }

    /// Returns the error kind of the error.
    pub fn kind(&self) -> ConfigErrorKind {
        self.kind
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.kind, self.source)
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause.as_ref().map(|c| c.as_ref() as _)
    }
}

/// Indicates config related errors.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigErrorKind {
    /// Failed to open the file.
    #[error("could not open config file")]
    CouldNotOpenFile,
    /// Failed to save a file.
    #[error("could not write config file")]
    CouldNotWriteFile,
    /// Parsing YAML failed.
    #[error("could not parse yaml config file")]
    BadYaml,
    /// Parsing JSON failed.
    #[error("could not parse json config file")]
    BadJson,
    /// Invalid config value
    #[error("invalid config value")]
    InvalidValue,
}

enum ConfigFormat {
    Yaml,
}

impl ConfigFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ConfigFormat::Yaml => "yml",
        }
    }
}

trait ConfigObject: DeserializeOwned + Serialize {
    /// The format in which to serialize this configuration.
    fn format() -> ConfigFormat;

    /// The basename of the config file.
    fn name() -> &'static str;

    /// The full filename of the config file, including the file extension.
    fn path(base: &Path) -> PathBuf {
        base.join(format!("{}.{}", Self::name(), Self::format().extension()))
    }

    /// Loads the config file from a file within the given directory location.
    fn load(base: &Path) -> Result<Self, ConfigError> {
        let path = Self::path(base);

        let f = fs::File::open(&path)
            .map_err(|e| ConfigError::wrap(e, ConfigErrorKind::CouldNotOpenFile).file(&path))?;

        match Self::format() {
            ConfigFormat::Yaml => serde_yaml::from_reader(io::BufReader::new(f))
                .map_err(|e| ConfigError::wrap(e, ConfigErrorKind::BadYaml).file(&path)),
        }
    }

    /// Writes the configuration object to the given writer.
    fn write<W: Write>(&self, writer: &mut W) -> Result<(), ConfigError> {
        match Self::format() {
            ConfigFormat::Yaml => serde_yaml::to_writer(writer, self)
                .map_err(|e| ConfigError::wrap(e, ConfigErrorKind::CouldNotWriteFile)),
        }
    }

    /// Writes the configuration to a file within the given directory location.
    fn save(&self, base: &Path) -> Result<(), ConfigError> {
        let path = Self::path(base);
        let mut options = fs::OpenOptions::new();
        options.write(true).truncate(true).create(true);

        // Remove all non-user permissions for the newly created file
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut f = options
            .open(&path)
            .map_err(|e| ConfigError::wrap(e, ConfigErrorKind::CouldNotWriteFile).file(&path))?;

        self.write(&mut f).map_err(|e| e.file(&path))?;
        f.write_all(b"\n").ok();

        Ok(())
    }
}

/// Structure used to hold information about configuration overrides via
/// CLI parameters or environment variables
#[derive(Debug, Default)]
pub struct OverridableConfig {
    /// The host the server should bind to (network interface).
    pub host: Option<String>,
    /// The port to bind for the HTTP server.
    pub port: Option<String>,
    /// The URL that record batches are forwarded to.
    pub upstream: Option<String>,
    /// The log level for Ember's crates.
    pub log_level: Option<String>,
    /// Shutdown timeout in seconds.
    pub shutdown_timeout: Option<String>,
}

/// Controls the HTTP server and the ingest endpoint.
#[derive(Serialize, Deserialize, Debug)]
#[serde(default)]
struct Http {
    /// The host to which to bind for the HTTP server.
    host: IpAddr,
    /// The port to which to bind for the HTTP server.
    port: u16,
    /// The maximum size of an ingest request body, including the multipart envelope.
    max_request_body_size: ByteSize,
    /// The maximum size of a profile after decompression.
    max_decompressed_size: ByteSize,
    /// The deadline for processing a single request in seconds.
    ///
    /// When the deadline elapses, the request is answered with `408 Request Timeout`.
    timeout: u64,
    /// Maximum time in seconds to wait for in-flight requests during shutdown.
    shutdown_timeout: u64,
}

impl Default for Http {
    fn default() -> Self {
        Http {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 8062,
            max_request_body_size: ByteSize::mebibytes(20),
            max_decompressed_size: ByteSize::mebibytes(100),
            timeout: 10,
            shutdown_timeout: 10,
        }
    }
}

/// Controls various limits
#[derive(Serialize, Deserialize, Debug)]
#[serde(default)]
struct Limits {
    /// The number of idle decompression buffers kept for reuse.
    buffer_pool_size: usize,
    /// The largest capacity of a decompression buffer that is kept for reuse.
    ///
    /// Larger buffers are deallocated when returned to the pool.
    max_pooled_buffer_size: ByteSize,
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            buffer_pool_size: 64,
            max_pooled_buffer_size: ByteSize::mebibytes(4),
        }
    }
}

/// Control the metrics.
#[derive(Serialize, Deserialize, Debug)]
#[serde(default)]
struct Metrics {
    /// Hostname and port of the statsd server.
    ///
    /// Defaults to `None`.
    statsd: Option<String>,
    /// Common prefix that should be added to all metrics.
    ///
    /// Defaults to `"ember"`.
    prefix: String,
    /// Default tags to apply to all metrics.
    default_tags: BTreeMap<String, String>,
    /// Tag name to report the hostname to for each metric. Defaults to not sending such a tag.
    hostname_tag: Option<String>,
    /// Global sample rate for all emitted metrics between `0.0` and `1.0`.
    ///
    /// For example, a value of `0.3` means that only 30% of the emitted metrics will be sent.
    /// Defaults to `1.0` (100%).
    sample_rate: f64,
}

impl Default for Metrics {
    fn default() -> Self {
        Metrics {
            statsd: None,
            prefix: "ember".into(),
            default_tags: BTreeMap::new(),
            hostname_tag: None,
            sample_rate: 1.0,
        }
    }
}

/// Controls where assembled record batches are sent.
#[derive(Serialize, Deserialize, Debug)]
#[serde(default)]
struct Output {
    /// URL that receives record batches as JSON.
    ///
    /// When not set, batches are logged and dropped.
    upstream: Option<Url>,
    /// Timeout for upstream requests in seconds.
    timeout: u64,
}

impl Default for Output {
    fn default() -> Self {
        Output {
            upstream: None,
            timeout: 5,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Default)]
struct ConfigValues {
    #[serde(default)]
    http: Http,
    #[serde(default)]
    limits: Limits,
    #[serde(default)]
    logging: LogConfig,
    #[serde(default)]
    metrics: Metrics,
    #[serde(default)]
    output: Output,
}

impl ConfigObject for ConfigValues {
    fn format() -> ConfigFormat {
        ConfigFormat::Yaml
    }

    fn name() -> &'static str {
        "config"
    }
}

/// Config struct.
pub struct Config {
    values: ConfigValues,
    path: PathBuf,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("path", &self.path)
            .field("values", &self.values)
            .finish()
    }
}

impl Config {
    /// Loads a config from a given config folder.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
        let path = std::env::current_dir()
            .map(|x| x.join(path.as_ref()))
            .unwrap_or_else(|_| path.as_ref().to_path_buf());

        Ok(Config {
            values: ConfigValues::load(&path)?,
            path,
        })
    }

    /// Creates a config from a JSON value.
    ///
    /// This is mostly useful for tests.
    pub fn from_json_value(value: serde_json::Value) -> Result<Config, ConfigError> {
        Ok(Config {
            values: serde_json::from_value(value)
                .map_err(|err| ConfigError::wrap(err, ConfigErrorKind::BadJson))?,
            path: PathBuf::new(),
        })
    }

    /// Override configuration with values coming from other sources (e.g. env variables or
    /// command line parameters)
    pub fn apply_override(
        &mut self,
        overrides: OverridableConfig,
    ) -> Result<&mut Self, ConfigError> {
        let http = &mut self.values.http;

        if let Some(host) = overrides.host {
            http.host = host
                .parse::<IpAddr>()
                .map_err(|err| ConfigError::for_field(err, "host"))?;
        }

        if let Some(port) = overrides.port {
            http.port = port
                .parse()
                .map_err(|err| ConfigError::for_field(err, "port"))?;
        }

        if let Some(shutdown_timeout) = overrides.shutdown_timeout {
            if let Ok(shutdown_timeout) = shutdown_timeout.parse::<u64>() {
                http.shutdown_timeout = shutdown_timeout;
            }
        }

        if let Some(upstream) = overrides.upstream {
            self.values.output.upstream = match upstream.as_str() {
                "" => None,
                url => Some(
                    url.parse::<Url>()
                        .map_err(|err| ConfigError::for_field(err, "upstream"))?,
                ),
            };
        }

        if let Some(log_level) = overrides.log_level {
            self.values.logging.level = log_level
                .parse::<LogLevel>()
                .map_err(|err| ConfigError::for_field(err, "log_level"))?;
        }

        Ok(self)
    }

    /// Checks if the config is already initialized.
    pub fn config_exists<P: AsRef<Path>>(path: P) -> bool {
        fs::metadata(ConfigValues::path(path.as_ref())).is_ok()
    }

    /// Writes the default configuration into the given config folder.
    pub fn create_default<P: AsRef<Path>>(path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        fs::create_dir_all(path)
            .map_err(|e| ConfigError::wrap(e, ConfigErrorKind::CouldNotWriteFile).file(path))?;
        ConfigValues::default().save(path)
    }

    /// Returns the filename of the config file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Dumps out a YAML string of the values.
    pub fn to_yaml_string(&self) -> Result<String, ConfigError> {
        serde_yaml::to_string(&self.values)
            .map_err(|e| ConfigError::wrap(e, ConfigErrorKind::CouldNotWriteFile))
    }

    /// Returns the socket address to which the HTTP server should bind.
    pub fn listen_addr(&self) -> SocketAddr {
        (self.values.http.host, self.values.http.port).into()
    }

    /// Returns the maximum size of an ingest request body.
    pub fn max_request_body_size(&self) -> usize {
        self.values.http.max_request_body_size.as_bytes() as usize
    }

    /// Returns the maximum size of a decompressed profile.
    pub fn max_decompressed_size(&self) -> usize {
        self.values.http.max_decompressed_size.as_bytes() as usize
    }

    /// Returns the deadline for processing a single ingest request.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.values.http.timeout)
    }

    /// Returns the maximum time to wait for in-flight requests during shutdown.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.values.http.shutdown_timeout)
    }

    /// Returns the number of idle decompression buffers kept for reuse.
    pub fn buffer_pool_size(&self) -> usize {
        self.values.limits.buffer_pool_size
    }

    /// Returns the largest buffer capacity in bytes kept by the buffer pool.
    pub fn max_pooled_buffer_size(&self) -> usize {
        self.values.limits.max_pooled_buffer_size.as_bytes() as usize
    }

    /// Returns the log configuration.
    pub fn logging(&self) -> &LogConfig {
        &self.values.logging
    }

    /// Returns the socket addresses for statsd.
    ///
    /// If stats is disabled an empty vector is returned.
    pub fn statsd_addrs(&self) -> Result<Vec<SocketAddr>, ConfigError> {
        if let Some(ref addr) = self.values.metrics.statsd {
            let addrs = addr
                .as_str()
                .to_socket_addrs()
                .map_err(|e| ConfigError::wrap(e, ConfigErrorKind::InvalidValue).file(&self.path))?
                .collect();
            Ok(addrs)
        } else {
            Ok(vec![])
        }
    }

    /// Return the prefix for statsd metrics.
    pub fn metrics_prefix(&self) -> &str {
        &self.values.metrics.prefix
    }

    /// Returns the default tags for statsd metrics.
    pub fn metrics_default_tags(&self) -> &BTreeMap<String, String> {
        &self.values.metrics.default_tags
    }

    /// Returns the name of the hostname tag that should be attached to each outgoing metric.
    pub fn metrics_hostname_tag(&self) -> Option<&str> {
        self.values.metrics.hostname_tag.as_deref()
    }

    /// Returns the global sample rate for all metrics.
    pub fn metrics_sample_rate(&self) -> f64 {
        self.values.metrics.sample_rate
    }

    /// Returns the URL that record batches are forwarded to, if any.
    pub fn upstream(&self) -> Option<&Url> {
        self.values.output.upstream.as_ref()
    }

    /// Returns the timeout for forwarding a batch upstream.
    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.values.output.timeout)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            values: ConfigValues::default(),
            path: PathBuf::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use ember_log::LogFormat;
    use similar_asserts::assert_eq;

    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.listen_addr(), "127.0.0.1:8062".parse().unwrap());
        assert_eq!(config.max_request_body_size(), 20 * 1024 * 1024);
        assert_eq!(config.max_decompressed_size(), 100 * 1024 * 1024);
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
        assert_eq!(config.buffer_pool_size(), 64);
        assert_eq!(config.max_pooled_buffer_size(), 4 * 1024 * 1024);
        assert_eq!(config.metrics_prefix(), "ember");
        assert!(config.upstream().is_none());
        assert!(config.statsd_addrs().unwrap().is_empty());
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r###"
http:
  port: 4040
  max_request_body_size: 1MiB
  timeout: 3
logging:
  level: debug
  format: json
output:
  upstream: http://collector:4318/profiles
"###;

        let values: ConfigValues = serde_yaml::from_str(yaml).unwrap();
        let config = Config {
            values,
            path: PathBuf::new(),
        };

        assert_eq!(config.listen_addr().port(), 4040);
        assert_eq!(config.max_request_body_size(), 1024 * 1024);
        assert_eq!(config.request_timeout(), Duration::from_secs(3));
        assert_eq!(config.logging().level, LogLevel::Debug);
        assert_eq!(config.logging().format, LogFormat::Json);
        assert_eq!(
            config.upstream().map(Url::as_str),
            Some("http://collector:4318/profiles")
        );
    }

    #[test]
    fn test_from_json_value() {
        let config = Config::from_json_value(serde_json::json!({
            "limits": {"buffer_pool_size": 2, "max_pooled_buffer_size": "64KiB"},
            "metrics": {"statsd": "127.0.0.1:8125", "sample_rate": 0.5},
        }))
        .unwrap();

        assert_eq!(config.buffer_pool_size(), 2);
        assert_eq!(config.max_pooled_buffer_size(), 64 * 1024);
        assert_eq!(config.metrics_sample_rate(), 0.5);
        assert_eq!(
            config.statsd_addrs().unwrap(),
            vec!["127.0.0.1:8125".parse::<SocketAddr>().unwrap()]
        );
    }

    #[test]
    fn test_bad_json() {
        let error = Config::from_json_value(serde_json::json!({"http": {"port": "nope"}}))
            .unwrap_err();
        assert_eq!(error.kind(), ConfigErrorKind::BadJson);
    }

    #[test]
    fn test_apply_override() {
        let mut config = Config::default();
        config
            .apply_override(OverridableConfig {
                host: Some("0.0.0.0".to_owned()),
                port: Some("9000".to_owned()),
                upstream: Some("http://localhost:9999/".to_owned()),
                log_level: Some("trace".to_owned()),
                shutdown_timeout: None,
            })
            .unwrap();

        assert_eq!(config.listen_addr(), "0.0.0.0:9000".parse().unwrap());
        assert_eq!(
            config.upstream().map(Url::as_str),
            Some("http://localhost:9999/")
        );
        assert_eq!(config.logging().level, LogLevel::Trace);
    }

    #[test]
    fn test_invalid_override() {
        let mut config = Config::default();
        let error = config
            .apply_override(OverridableConfig {
                port: Some("many".to_owned()),
                ..Default::default()
            })
            .unwrap_err();

        assert_eq!(error.kind(), ConfigErrorKind::InvalidValue);
        assert_eq!(error.to_string(), "invalid config value (field port)");
    }

    #[test]
    fn test_missing_file() {
        let error = Config::from_path("/nonexistent/ember").unwrap_err();
        assert_eq!(error.kind(), ConfigErrorKind::CouldNotOpenFile);
        assert!(error.to_string().starts_with("could not open config file (file "));
    }

    #[test]
    fn test_yaml_roundtrip_of_defaults() {
        let yaml = Config::default().to_yaml_string().unwrap();
        let values: ConfigValues = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(values.http.port, 8062);
        assert_eq!(values.http.max_request_body_size, ByteSize::mebibytes(20));
    }
}
