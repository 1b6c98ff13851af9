//! Configuration loading (§10.C): an INI-style config file (the
//! gateway's native format) overridden by `clap`-parsed CLI flags.
//! Defaults mirror the compile-time constants the grounding source
//! exposes in `gw/bb.h`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use clap::Parser;

use crate::error::ConfigError;
use crate::lifecycle::GatewayState;
use crate::urltrans::UrlTranslationList;

#[derive(Debug, Parser)]
#[command(name = "bearerbox", about = "Carrier-grade SMS/WAP gateway core")]
pub struct CliArgs {
    /// Logging verbosity, 0 (quiet) through 4 (debug).
    #[arg(short = 'v', long = "verbosity", default_value_t = 1)]
    pub verbosity: i32,

    /// Start in SUSPENDED state.
    #[arg(short = 'S', long = "suspended")]
    pub suspended: bool,

    /// Start in ISOLATED state.
    #[arg(short = 'I', long = "isolated")]
    pub isolated: bool,

    /// Path to the gateway configuration file.
    pub config_file: Option<PathBuf>,
}

impl CliArgs {
    pub fn initial_state(&self) -> GatewayState {
        if self.suspended {
            GatewayState::Suspended
        } else if self.isolated {
            GatewayState::Isolated
        } else {
            GatewayState::Running
        }
    }
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub bearerbox_host: String,
    pub smsbox_port: u16,
    pub wapbox_port: u16,
    pub admin_port: u16,
    pub heartbeat_freq: u64,
    pub max_queue: usize,
    pub dispatcher_pool_size: usize,
    pub http_timeout_secs: u64,
    pub sendsms_number_chars: String,
    pub global_sender: Option<String>,
    pub sms_max_length: usize,
}

impl GatewayConfig {
    pub const DEFAULT_THREAD_MAX: usize = 20;
    pub const DEFAULT_HOST: &'static str = "localhost";
    pub const DEFAULT_SMSBOX_PORT: u16 = 13001;
    pub const DEFAULT_WAPBOX_PORT: u16 = 13002;
    pub const DEFAULT_HTTP_PORT: u16 = 13000;
    pub const DEFAULT_HEARTBEAT: u64 = 30;
    pub const DEFAULT_MAX_QUEUE: usize = 1000;

    /// Parses the gateway's INI-style configuration file: stanzas
    /// delimited by blank lines, each optionally opening with a
    /// `group = ...` line. A stanza with no `group` key (or
    /// `group = core`) supplies the top-level settings on this struct;
    /// `sms-service` and `sendsms-user` stanzas become
    /// [`UrlTranslation`](crate::urltrans::UrlTranslation) entries
    /// (§4.G), returned alongside as a [`UrlTranslationList`]. Kept
    /// intentionally small: the gateway's configuration format is not a
    /// general INI dialect, just grouped `key = value` lines.
    pub fn load(path: &Path) -> std::result::Result<(Self, UrlTranslationList), ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let groups = parse_groups(&text);

        let mut cfg = GatewayConfig::default();
        for group in &groups {
            match group.get("group").map(String::as_str) {
                Some("sms-service") | Some("sendsms-user") => continue,
                _ => cfg.apply_core_group(group)?,
            }
        }
        let translations = UrlTranslationList::load_from_groups(&groups)?;
        Ok((cfg, translations))
    }

    fn apply_core_group(&mut self, flat: &HashMap<String, String>) -> std::result::Result<(), ConfigError> {
        if let Some(v) = flat.get("bearerbox-host") {
            self.bearerbox_host = v.clone();
        }
        if let Some(v) = flat.get("smsbox-port") {
            self.smsbox_port = v
                .parse()
                .map_err(|_| ConfigError::InvalidValue("smsbox-port".into(), v.clone()))?;
        }
        if let Some(v) = flat.get("wapbox-port") {
            self.wapbox_port = v
                .parse()
                .map_err(|_| ConfigError::InvalidValue("wapbox-port".into(), v.clone()))?;
        }
        if let Some(v) = flat.get("admin-port") {
            self.admin_port = v
                .parse()
                .map_err(|_| ConfigError::InvalidValue("admin-port".into(), v.clone()))?;
        }
        if let Some(v) = flat.get("heartbeat-freq") {
            self.heartbeat_freq = v
                .parse()
                .map_err(|_| ConfigError::InvalidValue("heartbeat-freq".into(), v.clone()))?;
        }
        if let Some(v) = flat.get("max-queue") {
            self.max_queue = v
                .parse()
                .map_err(|_| ConfigError::InvalidValue("max-queue".into(), v.clone()))?;
        }
        if let Some(v) = flat.get("dispatcher-pool-size") {
            self.dispatcher_pool_size = v
                .parse()
                .map_err(|_| ConfigError::InvalidValue("dispatcher-pool-size".into(), v.clone()))?;
        }
        if let Some(v) = flat.get("http-timeout-secs") {
            self.http_timeout_secs = v
                .parse()
                .map_err(|_| ConfigError::InvalidValue("http-timeout-secs".into(), v.clone()))?;
        }
        if let Some(v) = flat.get("sms-max-length") {
            self.sms_max_length = v
                .parse()
                .map_err(|_| ConfigError::InvalidValue("sms-max-length".into(), v.clone()))?;
        }
        if let Some(v) = flat.get("global-sender") {
            self.global_sender = Some(v.clone());
        }
        if let Some(v) = flat.get("sendsms-number-chars") {
            self.sendsms_number_chars = v.clone();
        }
        Ok(())
    }
}

/// Splits configuration text into stanzas delimited by blank lines.
/// Each stanza collapses to a flat key/value map (comments starting
/// with `#` and quoting around values are stripped).
fn parse_groups(text: &str) -> Vec<HashMap<String, String>> {
    let mut groups = Vec::new();
    let mut current: HashMap<String, String> = HashMap::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            if !current.is_empty() {
                groups.push(std::mem::take(&mut current));
            }
            continue;
        }
        if line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            let value = value.trim().trim_matches('"');
            current.insert(key.trim().to_string(), value.to_string());
        }
    }
    if !current.is_empty() {
        groups.push(current);
    }
    groups
}

impl Default for GatewayConfig {
    fn default() -> Self {
        GatewayConfig {
            bearerbox_host: Self::DEFAULT_HOST.to_string(),
            smsbox_port: Self::DEFAULT_SMSBOX_PORT,
            wapbox_port: Self::DEFAULT_WAPBOX_PORT,
            admin_port: Self::DEFAULT_HTTP_PORT,
            heartbeat_freq: Self::DEFAULT_HEARTBEAT,
            max_queue: Self::DEFAULT_MAX_QUEUE,
            dispatcher_pool_size: Self::DEFAULT_THREAD_MAX,
            http_timeout_secs: 30,
            sendsms_number_chars: "0123456789+ ".to_string(),
            global_sender: None,
            sms_max_length: 160,
        }
    }
}
