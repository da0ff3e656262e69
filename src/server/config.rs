//! Server configuration: runtime state, per-key validation, the binary
//! manifest format and the TOML bootstrap file.
//!
//! The server manifest is a single file holding a marshalled [`Config`]
//! block followed by a marshalled user-list block. Every scalar is written
//! in declared field order with the wire codec primitives.

use std::collections::BTreeMap;
use std::io::{BufReader, Cursor, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tokio::fs;

use crate::auth::user::UserList;
use crate::error::{Error, Result};
use crate::wire::primitive::{
    parse_bool, parse_cert_pairs, parse_duration, parse_string, parse_string_map, parse_u32,
    write_bool, write_cert_pairs, write_duration, write_string, write_string_map, write_u32,
};

/// Default manifest file name produced by `config init`.
pub const DEFAULT_MANIFEST: &str = ".server.lily";

/// Upper bound on the worker pool size.
pub const MAX_WORKERS: u32 = 256;

/// Recognized log level names.
pub const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Runtime server configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Where the manifest lives on disk; not itself marshalled.
    pub file_path: PathBuf,
    pub name: String,
    pub host: String,
    pub port: u16,
    /// Drive name to drive file path; the authoritative set of drives.
    pub drive_files: BTreeMap<String, String>,
    pub num_workers: u32,
    pub backlog: u32,
    pub main_interval: Duration,
    pub session_interval: Duration,
    pub timeout: Duration,
    pub log_to_file: bool,
    pub verbose: bool,
    pub log_level: String,
    pub log_path: String,
    pub default_session_expiration: Duration,
    pub allow_change_session_expiration: bool,
    pub allow_non_expiring_sessions: bool,
    pub per_user_session_limit: u32,
    pub rate_limit_interval: Duration,
    pub max_limit_events: u32,
    /// Certificate/key PEM path pairs for the TLS listener.
    pub cert_files: Vec<(String, String)>,
    pub dirty: bool,
}

impl Config {
    /// A configuration with workable defaults for a fresh server.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            file_path: PathBuf::from(DEFAULT_MANIFEST),
            name: name.into(),
            host: "localhost".to_owned(),
            port: 8001,
            drive_files: BTreeMap::new(),
            num_workers: 8,
            backlog: 64,
            main_interval: Duration::from_secs(300),
            session_interval: Duration::from_secs(30),
            timeout: Duration::from_secs(30),
            log_to_file: false,
            verbose: false,
            log_level: "info".to_owned(),
            log_path: String::new(),
            default_session_expiration: Duration::from_secs(3600),
            allow_change_session_expiration: true,
            allow_non_expiring_sessions: true,
            per_user_session_limit: 16,
            rate_limit_interval: Duration::from_secs(1),
            max_limit_events: 32,
            cert_files: Vec::new(),
            dirty: false,
        }
    }

    pub fn validate_num_workers(value: u32) -> Result<()> {
        if value == 0 || value > MAX_WORKERS {
            return Err(Error::InvalidNumWorkers(value));
        }
        Ok(())
    }

    pub fn validate_timeout(value: Duration) -> Result<()> {
        if value.is_zero() || value > Duration::from_secs(3600) {
            return Err(Error::InvalidTimeout);
        }
        Ok(())
    }

    pub fn validate_log_path(path: &str, log_to_file: bool) -> Result<()> {
        if log_to_file && path.is_empty() {
            return Err(Error::InvalidLogPath(path.to_owned()));
        }
        Ok(())
    }

    pub fn validate_log_level(level: &str) -> Result<()> {
        if !LOG_LEVELS.contains(&level) {
            return Err(Error::InvalidLogLevel(level.to_owned()));
        }
        Ok(())
    }

    pub fn validate_rate_limit(interval: Duration, max_events: u32) -> Result<()> {
        if interval.is_zero() || max_events == 0 {
            return Err(Error::InvalidRateLimit);
        }
        Ok(())
    }

    pub fn validate_server_file_path(path: &str) -> Result<()> {
        if path.is_empty() {
            return Err(Error::InvalidServerFilePath(path.to_owned()));
        }
        Ok(())
    }

    pub fn validate_host_port(host: &str, port: u16) -> Result<()> {
        if host.is_empty() || port == 0 {
            return Err(Error::InvalidHostPort);
        }
        Ok(())
    }

    pub fn validate_drive_file_path(path: &str) -> Result<()> {
        if path.is_empty() {
            return Err(Error::InvalidDriveFilePath(path.to_owned()));
        }
        Ok(())
    }

    /// Whole-config validation, run before serving.
    pub fn validate(&self) -> Result<()> {
        Self::validate_num_workers(self.num_workers)?;
        Self::validate_timeout(self.timeout)?;
        Self::validate_timeout(self.main_interval)?;
        Self::validate_timeout(self.session_interval)?;
        Self::validate_log_path(&self.log_path, self.log_to_file)?;
        Self::validate_log_level(&self.log_level)?;
        Self::validate_rate_limit(self.rate_limit_interval, self.max_limit_events)?;
        Self::validate_host_port(&self.host, self.port)?;
        for path in self.drive_files.values() {
            Self::validate_drive_file_path(path)?;
        }
        Ok(())
    }

    /// Sets one named key from its string form, validating first.
    pub fn set_key(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "name" => self.name = value.to_owned(),
            "host" => {
                Self::validate_host_port(value, self.port)?;
                self.host = value.to_owned();
            }
            "port" => {
                let port = value.parse::<u16>().map_err(|_| Error::InvalidHostPort)?;
                Self::validate_host_port(&self.host, port)?;
                self.port = port;
            }
            "numworkers" => {
                let workers = value
                    .parse::<u32>()
                    .map_err(|_| Error::InvalidNumWorkers(0))?;
                Self::validate_num_workers(workers)?;
                self.num_workers = workers;
            }
            "backlog" => {
                self.backlog = value
                    .parse::<u32>()
                    .map_err(|_| Error::MalformedRequest("backlog must be a number".into()))?;
            }
            "maininterval" => {
                let interval = parse_secs(value, Error::InvalidTimeout)?;
                Self::validate_timeout(interval)?;
                self.main_interval = interval;
            }
            "sessioninterval" => {
                let interval = parse_secs(value, Error::InvalidTimeout)?;
                Self::validate_timeout(interval)?;
                self.session_interval = interval;
            }
            "timeout" => {
                let timeout = parse_secs(value, Error::InvalidTimeout)?;
                Self::validate_timeout(timeout)?;
                self.timeout = timeout;
            }
            "logtofile" => {
                let flag = parse_flag(value)?;
                Self::validate_log_path(&self.log_path, flag)?;
                self.log_to_file = flag;
            }
            "verbose" => self.verbose = parse_flag(value)?,
            "loglevel" => {
                Self::validate_log_level(value)?;
                self.log_level = value.to_owned();
            }
            "logpath" => {
                Self::validate_log_path(value, self.log_to_file)?;
                self.log_path = value.to_owned();
            }
            "sessionexpiration" => {
                self.default_session_expiration = parse_secs(value, Error::InvalidTimeout)?
            }
            "allowchangesessionexpiration" => {
                self.allow_change_session_expiration = parse_flag(value)?
            }
            "allownonexpiringsessions" => {
                self.allow_non_expiring_sessions = parse_flag(value)?
            }
            "usersessionlimit" => {
                self.per_user_session_limit = value.parse::<u32>().map_err(|_| {
                    Error::MalformedRequest("usersessionlimit must be a number".into())
                })?;
            }
            "ratelimitinterval" => {
                let interval = parse_secs(value, Error::InvalidRateLimit)?;
                Self::validate_rate_limit(interval, self.max_limit_events)?;
                self.rate_limit_interval = interval;
            }
            "maxlimitevents" => {
                let events = value.parse::<u32>().map_err(|_| Error::InvalidRateLimit)?;
                Self::validate_rate_limit(self.rate_limit_interval, events)?;
                self.max_limit_events = events;
            }
            other => {
                return Err(Error::MalformedRequest(format!("unknown config key {other:?}")))
            }
        }
        self.dirty = true;
        Ok(())
    }

    /// Reads one named key in its string form.
    pub fn get_key(&self, key: &str) -> Result<String> {
        let value = match key {
            "name" => self.name.clone(),
            "host" => self.host.clone(),
            "port" => self.port.to_string(),
            "numworkers" => self.num_workers.to_string(),
            "backlog" => self.backlog.to_string(),
            "maininterval" => self.main_interval.as_secs().to_string(),
            "sessioninterval" => self.session_interval.as_secs().to_string(),
            "timeout" => self.timeout.as_secs().to_string(),
            "logtofile" => self.log_to_file.to_string(),
            "verbose" => self.verbose.to_string(),
            "loglevel" => self.log_level.clone(),
            "logpath" => self.log_path.clone(),
            "sessionexpiration" => self.default_session_expiration.as_secs().to_string(),
            "allowchangesessionexpiration" => self.allow_change_session_expiration.to_string(),
            "allownonexpiringsessions" => self.allow_non_expiring_sessions.to_string(),
            "usersessionlimit" => self.per_user_session_limit.to_string(),
            "ratelimitinterval" => self.rate_limit_interval.as_secs().to_string(),
            "maxlimitevents" => self.max_limit_events.to_string(),
            other => {
                return Err(Error::MalformedRequest(format!("unknown config key {other:?}")))
            }
        };
        Ok(value)
    }

    /// Every settable key, for `config list`.
    pub fn keys() -> &'static [&'static str] {
        &[
            "name",
            "host",
            "port",
            "numworkers",
            "backlog",
            "maininterval",
            "sessioninterval",
            "timeout",
            "logtofile",
            "verbose",
            "loglevel",
            "logpath",
            "sessionexpiration",
            "allowchangesessionexpiration",
            "allownonexpiringsessions",
            "usersessionlimit",
            "ratelimitinterval",
            "maxlimitevents",
        ]
    }

    /// Serializes the config block in declared field order.
    pub fn marshal(&self, dest: &mut impl Write) -> Result<()> {
        write_string(dest, &self.name)?;
        write_string(dest, &self.host)?;
        write_u32(dest, self.port as u32)?;
        write_string_map(dest, &self.drive_files)?;
        write_u32(dest, self.num_workers)?;
        write_u32(dest, self.backlog)?;
        write_duration(dest, self.main_interval)?;
        write_duration(dest, self.session_interval)?;
        write_duration(dest, self.timeout)?;
        write_bool(dest, self.log_to_file)?;
        write_bool(dest, self.verbose)?;
        write_string(dest, &self.log_level)?;
        write_string(dest, &self.log_path)?;
        write_duration(dest, self.default_session_expiration)?;
        write_bool(dest, self.allow_change_session_expiration)?;
        write_bool(dest, self.allow_non_expiring_sessions)?;
        write_u32(dest, self.per_user_session_limit)?;
        write_duration(dest, self.rate_limit_interval)?;
        write_u32(dest, self.max_limit_events)?;
        write_cert_pairs(dest, &self.cert_files)?;
        Ok(())
    }

    /// Parses the config block.
    pub fn unmarshal(src: &mut impl Read, file_path: &Path) -> Result<Self> {
        Ok(Self {
            file_path: file_path.to_owned(),
            name: parse_string(src)?,
            host: parse_string(src)?,
            port: parse_u32(src)? as u16,
            drive_files: parse_string_map(src)?,
            num_workers: parse_u32(src)?,
            backlog: parse_u32(src)?,
            main_interval: parse_duration(src)?,
            session_interval: parse_duration(src)?,
            timeout: parse_duration(src)?,
            log_to_file: parse_bool(src)?,
            verbose: parse_bool(src)?,
            log_level: parse_string(src)?,
            log_path: parse_string(src)?,
            default_session_expiration: parse_duration(src)?,
            allow_change_session_expiration: parse_bool(src)?,
            allow_non_expiring_sessions: parse_bool(src)?,
            per_user_session_limit: parse_u32(src)?,
            rate_limit_interval: parse_duration(src)?,
            max_limit_events: parse_u32(src)?,
            cert_files: parse_cert_pairs(src)?,
            dirty: false,
        })
    }

    /// Builds the TLS acceptor configuration from the first certificate
    /// pair.
    pub fn load_tls(&self) -> Result<rustls::ServerConfig> {
        let (cert_path, key_path) = self
            .cert_files
            .first()
            .ok_or_else(|| Error::InvalidServerFilePath("no certificate configured".into()))?;

        let mut cert_reader = BufReader::new(std::fs::File::open(cert_path)?);
        let certs = rustls_pemfile::certs(&mut cert_reader).collect::<std::result::Result<Vec<_>, _>>()?;

        let mut key_reader = BufReader::new(std::fs::File::open(key_path)?);
        let key = rustls_pemfile::private_key(&mut key_reader)?
            .ok_or_else(|| Error::InvalidServerFilePath(key_path.clone()))?;

        rustls::ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(certs, key)
            .map_err(|e| Error::Io(std::io::Error::other(e)))
    }
}

fn parse_secs(value: &str, err: Error) -> Result<Duration> {
    match value.parse::<u64>() {
        Ok(secs) => Ok(Duration::from_secs(secs)),
        Err(_) => Err(err),
    }
}

fn parse_flag(value: &str) -> Result<bool> {
    match value {
        "true" | "yes" | "1" => Ok(true),
        "false" | "no" | "0" => Ok(false),
        other => Err(Error::MalformedRequest(format!("not a boolean: {other:?}"))),
    }
}

/// Writes the whole server manifest (config + users) atomically.
pub async fn save_manifest(config: &Config, users: &UserList) -> Result<()> {
    let mut buf = Vec::new();
    config.marshal(&mut buf)?;
    users.marshal(&mut buf).await?;

    let tmp = config.file_path.with_extension("lily.tmp");
    fs::write(&tmp, &buf).await?;
    fs::rename(&tmp, &config.file_path).await?;
    Ok(())
}

/// Loads the server manifest.
pub async fn load_manifest(path: &Path) -> Result<(Config, UserList)> {
    let bytes = fs::read(path).await?;
    let mut src = Cursor::new(bytes);
    let config = Config::unmarshal(&mut src, path)?;
    let users = UserList::unmarshal(&mut src).await?;
    Ok((config, users))
}

/// The TOML bootstrap file consumed by `config init`.
#[derive(Debug, Deserialize)]
pub struct BootstrapFile {
    pub config: BootstrapConfig,
    #[serde(default)]
    pub drives: BTreeMap<String, String>,
    #[serde(default)]
    pub certs: BTreeMap<String, String>,
    pub admin: BootstrapAdmin,
}

/// `[config]` table of the bootstrap file.
#[derive(Debug, Deserialize)]
pub struct BootstrapConfig {
    pub name: String,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub workers: Option<u32>,
    #[serde(default)]
    pub backlog: Option<u32>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub log_level: Option<String>,
}

/// `[admin]` table of the bootstrap file.
#[derive(Debug, Deserialize)]
pub struct BootstrapAdmin {
    pub username: String,
    pub password: String,
}

fn default_host() -> String {
    "localhost".to_owned()
}

fn default_port() -> u16 {
    8001
}

impl BootstrapFile {
    pub fn parse(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::MalformedRequest(e.to_string()))
    }

    /// Expands the bootstrap into a full [`Config`].
    pub fn into_config(self, manifest_path: &Path) -> Result<Config> {
        let mut config = Config::new(self.config.name.clone());
        config.file_path = manifest_path.to_owned();
        config.host = self.config.host.clone();
        config.port = self.config.port;
        if let Some(workers) = self.config.workers {
            Config::validate_num_workers(workers)?;
            config.num_workers = workers;
        }
        if let Some(backlog) = self.config.backlog {
            config.backlog = backlog;
        }
        if let Some(secs) = self.config.timeout_secs {
            let timeout = Duration::from_secs(secs);
            Config::validate_timeout(timeout)?;
            config.timeout = timeout;
        }
        if let Some(level) = &self.config.log_level {
            Config::validate_log_level(level)?;
            config.log_level = level.clone();
        }
        for (name, path) in &self.drives {
            Config::validate_drive_file_path(path)?;
            config.drive_files.insert(name.clone(), path.clone());
        }
        for (cert, key) in &self.certs {
            config.cert_files.push((cert.clone(), key.clone()));
        }
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validators() {
        assert!(Config::validate_num_workers(8).is_ok());
        assert!(matches!(
            Config::validate_num_workers(0),
            Err(Error::InvalidNumWorkers(0))
        ));
        assert!(matches!(
            Config::validate_timeout(Duration::ZERO),
            Err(Error::InvalidTimeout)
        ));
        assert!(matches!(
            Config::validate_log_level("loud"),
            Err(Error::InvalidLogLevel(_))
        ));
        assert!(matches!(
            Config::validate_rate_limit(Duration::ZERO, 1),
            Err(Error::InvalidRateLimit)
        ));
        assert!(matches!(
            Config::validate_host_port("", 80),
            Err(Error::InvalidHostPort)
        ));
        assert!(matches!(
            Config::validate_drive_file_path(""),
            Err(Error::InvalidDriveFilePath(_))
        ));
    }

    #[test]
    fn test_set_get_round_trip() {
        let mut config = Config::new("lily");
        config.set_key("port", "9000").unwrap();
        config.set_key("numworkers", "4").unwrap();
        config.set_key("loglevel", "debug").unwrap();
        assert!(config.dirty);
        assert_eq!(config.get_key("port").unwrap(), "9000");
        assert_eq!(config.get_key("numworkers").unwrap(), "4");
        assert_eq!(config.get_key("loglevel").unwrap(), "debug");

        assert!(matches!(
            config.set_key("loglevel", "loud"),
            Err(Error::InvalidLogLevel(_))
        ));
        assert!(matches!(
            config.set_key("mystery", "1"),
            Err(Error::MalformedRequest(_))
        ));
    }

    #[test]
    fn test_marshal_round_trip() {
        let mut config = Config::new("lily");
        config.drive_files.insert("main".into(), "/srv/main.drive".into());
        config.cert_files.push(("cert.pem".into(), "key.pem".into()));
        config.port = 9999;
        config.verbose = true;

        let mut buf = Vec::new();
        config.marshal(&mut buf).unwrap();
        let parsed =
            Config::unmarshal(&mut Cursor::new(buf), Path::new(DEFAULT_MANIFEST)).unwrap();
        let mut expected = config.clone();
        expected.file_path = PathBuf::from(DEFAULT_MANIFEST);
        expected.dirty = false;
        assert_eq!(parsed, expected);
    }

    #[tokio::test]
    async fn test_manifest_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join(DEFAULT_MANIFEST);
        let mut config = Config::new("lily");
        config.file_path = path.clone();

        let users = UserList::new();
        users
            .add(crate::auth::user::User::new("admin", "admin", 5).unwrap())
            .await
            .unwrap();

        save_manifest(&config, &users).await.unwrap();
        let (loaded_config, loaded_users) = load_manifest(&path).await.unwrap();
        assert_eq!(loaded_config.name, "lily");
        assert!(loaded_users.get("admin").await.is_ok());
    }

    #[test]
    fn test_bootstrap_parse() {
        let text = r#"
            [config]
            name = "homelab"
            host = "0.0.0.0"
            port = 4433
            workers = 4

            [drives]
            main = "/srv/lily/main.drive"

            [certs]
            "cert.pem" = "key.pem"

            [admin]
            username = "admin"
            password = "admin"
        "#;
        let bootstrap = BootstrapFile::parse(text).unwrap();
        let config = bootstrap.into_config(Path::new(DEFAULT_MANIFEST)).unwrap();
        assert_eq!(config.name, "homelab");
        assert_eq!(config.port, 4433);
        assert_eq!(config.num_workers, 4);
        assert_eq!(config.drive_files.get("main").unwrap(), "/srv/lily/main.drive");
        assert_eq!(config.cert_files, vec![("cert.pem".into(), "key.pem".into())]);
    }
}
