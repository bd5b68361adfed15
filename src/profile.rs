use crate::args::CommandLineArgs;
use crate::http::ConnectionProfile;

use anyhow::{Context, Result, anyhow};
use ini::{Ini, Properties};
use reqwest::Url;
use std::{collections::HashMap, path::Path};

pub const DEFAULT_INI_FILE_PATH: &str = "~/.cleanc";
pub const DEFAULT_INI_SECTION: &str = "default";
pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:8000/clean";

const INI_ENDPOINT: &str = "endpoint";
const INI_INSECURE: &str = "insecure";
const INI_CA_CERT: &str = "ca_cert";
const INI_HEADER_PREFIX: &str = "@";

/// Connection settings as written in one section of the INI file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Profile {
    endpoint: Option<String>,
    insecure: Option<bool>,
    ca_cert: Option<String>,
    headers: HashMap<String, String>,
}

impl Profile {
    pub fn endpoint(&self) -> Option<&String> {
        self.endpoint.as_ref()
    }

    pub fn insecure(&self) -> Option<bool> {
        self.insecure
    }

    pub fn ca_cert(&self) -> Option<&String> {
        self.ca_cert.as_ref()
    }

    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    pub fn load(file_path: &str, name: &str) -> Result<Option<Profile>> {
        let extended_path = shellexpand::tilde(file_path).to_string();
        if !Path::new(&extended_path).exists() {
            tracing::debug!(path = %extended_path, "profile file not found");
            return Ok(None);
        }
        let ini = Ini::load_from_file(&extended_path)
            .with_context(|| format!("Failed to read profile file {extended_path}"))?;
        let section = match ini.section(Some(name)) {
            Some(s) => s,
            None => return Ok(None),
        };

        fn try_get<T>(section: &Properties, key: &str) -> Result<Option<T>>
        where
            T: std::str::FromStr,
            T::Err: std::fmt::Display,
        {
            section
                .get(key)
                .map(|s| {
                    s.trim()
                        .parse::<T>()
                        .map_err(|e| anyhow!("Invalid value for '{key}': {e}"))
                })
                .transpose()
        }

        let headers = section
            .iter()
            .filter_map(|(key, value)| {
                key.strip_prefix(INI_HEADER_PREFIX)
                    .map(|name| (name.to_string(), value.to_string()))
            })
            .collect::<HashMap<String, String>>();

        Ok(Some(Profile {
            endpoint: try_get(section, INI_ENDPOINT)?,
            insecure: try_get(section, INI_INSECURE)?,
            ca_cert: try_get(section, INI_CA_CERT)?,
            headers,
        }))
    }
}

/// Effective connection settings after layering the command line over the
/// profile over the built-in defaults.
#[derive(Debug, Clone)]
pub struct Connection {
    endpoint: Url,
    insecure: bool,
    ca_cert: Option<String>,
    headers: HashMap<String, String>,
}

impl Connection {
    pub fn new(endpoint: Url) -> Self {
        Connection {
            endpoint,
            insecure: false,
            ca_cert: None,
            headers: HashMap::new(),
        }
    }

    pub fn resolve(args: &CommandLineArgs, profile: Option<&Profile>) -> Result<Self> {
        let endpoint = args
            .endpoint()
            .or_else(|| profile.and_then(|p| p.endpoint()))
            .map(String::as_str)
            .unwrap_or(DEFAULT_ENDPOINT);
        let endpoint =
            Url::parse(endpoint).with_context(|| format!("Invalid endpoint URL '{endpoint}'"))?;

        let insecure = args.insecure() || profile.and_then(|p| p.insecure()).unwrap_or(false);
        let ca_cert = args
            .ca_cert()
            .or_else(|| profile.and_then(|p| p.ca_cert()))
            .cloned();

        let mut conn = Connection::new(endpoint);
        conn.insecure = insecure;
        conn.ca_cert = ca_cert;
        if let Some(profile) = profile {
            conn.headers = profile.headers().clone();
        }
        conn.headers
            .extend(args.headers().iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(conn)
    }
}

impl ConnectionProfile for Connection {
    fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn insecure(&self) -> bool {
        self.insecure
    }

    fn ca_cert(&self) -> Option<&String> {
        self.ca_cert.as_ref()
    }

    fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }
}
