//! Configuration Management
//!
//! Options come from the command line, then the cloud credentials file, then
//! the vApp config file it points at. A key keeps the first value seen.

use crate::driver::node::NetworkSelection;
use anyhow::{bail, Context, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Raw `key → value` options before validation
pub type Options = BTreeMap<String, String>;

pub const DEFAULT_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_IP_MODE: &str = "POOL";

const REQUIRED_KEYS: [&str; 7] = ["apiHost", "org", "vdc", "sizeid", "user", "pass", "vapp"];

/// Validated driver configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub api_host: String,
    pub user: String,
    pub pass: String,
    pub org: String,
    pub vdc: String,
    pub vapp: String,
    pub sizeid: String,
    pub networks: NetworkSelection,
    pub ip_mode: String,
    pub name: Option<String>,
    pub imageid: Option<String>,
    pub id: Option<String>,
    pub deltasince: Option<i64>,
    pub customize: bool,
    pub timeout: Duration,
    /// Accepted for compatibility; history lives in vApp metadata
    pub statefile: Option<PathBuf>,
    pub wrap: bool,
    /// The vApp config file the options were read from
    pub source: Option<PathBuf>,
}

impl Config {
    /// Merge the config files into `cli` and validate the result
    pub fn load(cli: Options) -> Result<Self> {
        Self::load_with_home(cli, zeus_home())
    }

    pub fn load_with_home(mut opts: Options, zeus_home: Option<PathBuf>) -> Result<Self> {
        let cred1 = match opts.get("cred1") {
            Some(path) => PathBuf::from(path),
            None => read_cloud_credentials(&mut opts, zeus_home.as_deref())?,
        };

        merge_file(&mut opts, &cred1)
            .with_context(|| format!("VCloud config file is missing: {}", cred1.display()))?;

        if !opts.contains_key("statefile") {
            if let (Some(home), Some(creds)) = (&zeus_home, opts.get("cloudcreds")) {
                let statefile = home.join("zxtm/internal").join(format!("vcd.{creds}.state"));
                opts.insert("statefile".to_string(), statefile.display().to_string());
            }
        }

        Self::from_options(opts, Some(cred1))
    }

    /// Validate already merged options
    pub fn from_options(opts: Options, source: Option<PathBuf>) -> Result<Self> {
        let origin = source
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        if let Some(missing) = REQUIRED_KEYS.iter().find(|k| !opts.contains_key(**k)) {
            bail!("'{}' must be specified in the VCD config file: {}", missing, origin);
        }
        let required = |key: &str| opts.get(key).cloned().unwrap_or_default();
        let optional = |key: &str| opts.get(key).cloned();

        let timeout = match opts.get("timeout") {
            Some(t) => t
                .trim()
                .parse()
                .with_context(|| format!("'timeout' must be a number of seconds, got '{t}'"))?,
            None => DEFAULT_TIMEOUT_SECS,
        };

        let deltasince = opts
            .get("deltasince")
            .map(|d| {
                d.trim()
                    .parse::<i64>()
                    .with_context(|| format!("'deltasince' must be epoch seconds, got '{d}'"))
            })
            .transpose()?;

        Ok(Self {
            api_host: required("apiHost"),
            user: required("user"),
            pass: required("pass"),
            org: required("org"),
            vdc: required("vdc"),
            vapp: required("vapp"),
            sizeid: required("sizeid"),
            networks: NetworkSelection::new(
                opts.get("pubNet").map(String::as_str),
                opts.get("privNet").map(String::as_str),
                opts.get("networks").map(String::as_str),
            ),
            ip_mode: optional("ipMode").unwrap_or_else(|| DEFAULT_IP_MODE.to_string()),
            name: optional("name"),
            imageid: optional("imageid"),
            id: optional("id"),
            deltasince,
            customize: opts
                .get("customize")
                .map(|c| c.trim().eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            timeout: Duration::from_secs(timeout),
            statefile: optional("statefile").map(PathBuf::from),
            wrap: opts.contains_key("wrap"),
            source,
        })
    }

    /// The network selection, which node reporting cannot do without
    pub fn require_networks(&self) -> Result<&NetworkSelection> {
        if self.networks.is_empty() {
            bail!(
                "You must provide atleast one of 'networks', 'pubNet' or 'privNet' in your configfile: {}",
                self.source
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default()
            );
        }
        Ok(&self.networks)
    }
}

/// `$ZEUSHOME`, or the first standard install location that exists
pub fn zeus_home() -> Option<PathBuf> {
    if let Some(home) = std::env::var_os("ZEUSHOME") {
        return Some(PathBuf::from(home));
    }
    ["/usr/local/zeus", "/opt/zeus"]
        .iter()
        .map(PathBuf::from)
        .find(|p| p.is_dir())
}

/// Read the cloud credentials file into `opts`; returns the vApp config path
fn read_cloud_credentials(opts: &mut Options, zeus_home: Option<&Path>) -> Result<PathBuf> {
    let Some(home) = zeus_home else {
        bail!("Can not find ZEUSHOME");
    };
    let Some(creds) = opts.get("cloudcreds").cloned() else {
        bail!("Either --cred1 or --cloudcreds must be given");
    };

    let path = home.join("zxtm/conf/cloudcredentials").join(&creds);
    if !path.exists() {
        bail!("Cloud credentials file does not exist: {}", path.display());
    }
    merge_file(opts, &path)?;

    let Some(cred1) = opts.get("cred1") else {
        bail!("Credential 1 must be set to the VCloud config file name");
    };
    let cred1 = home.join("zxtm/conf/extra").join(cred1);
    if !cred1.exists() {
        bail!("VCloud config file is missing: {}", cred1.display());
    }
    tracing::debug!("Using VCloud config file {:?}", cred1);
    Ok(cred1)
}

/// Add the `key value` lines of `path` to `opts`, keeping existing keys
pub fn merge_file(opts: &mut Options, path: &Path) -> Result<()> {
    let content = std::fs::read_to_string(path)?;
    for (key, value) in content.lines().filter_map(parse_line) {
        opts.entry(key).or_insert(value);
    }
    Ok(())
}

/// Split a `key<whitespace>value` line; blank and `#` lines yield nothing
pub fn parse_line(line: &str) -> Option<(String, String)> {
    let line = line.trim();
    if line.starts_with('#') {
        return None;
    }
    let (key, value) = line.split_once(char::is_whitespace)?;
    if key.is_empty() || !key.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return None;
    }
    Some((key.to_string(), value.trim_start().to_string()))
}
