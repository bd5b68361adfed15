use ini::{EscapePolicy, Ini, WriteOption};
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Key the credential is remembered under.
pub const CREDENTIAL_KEY: &str = "cc_token";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: ini::Error,
    },
    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError>;
}

/// Renders a value so that rust-ini's default parser reads back exactly
/// `value`. Plain values are written as they are; anything the parser would
/// trim, unquote or unescape goes inside double quotes with backslash escapes.
fn encode_value(value: &str) -> Cow<'_, str> {
    let plain = value.trim() == value
        && !value
            .chars()
            .any(|c| matches!(c, '"' | '\'' | '\\') || c.is_control());
    if plain {
        return Cow::Borrowed(value);
    }

    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        match c {
            '"' => quoted.push_str("\\\""),
            '\\' => quoted.push_str("\\\\"),
            '\n' => quoted.push_str("\\n"),
            '\r' => quoted.push_str("\\r"),
            '\t' => quoted.push_str("\\t"),
            '\0' => quoted.push_str("\\0"),
            c if c.is_ascii_control() => quoted.push_str(&format!("\\x{:04x}", u32::from(c))),
            c => quoted.push(c),
        }
    }
    quoted.push('"');
    Cow::Owned(quoted)
}

/// Keeps values in one section of an INI file, leaving the rest of the file
/// (other sections, connection settings) as it was.
#[derive(Debug, Clone)]
pub struct IniStore {
    path: PathBuf,
    section: String,
}

impl IniStore {
    pub fn new(file_path: &str, section: &str) -> Self {
        IniStore {
            path: PathBuf::from(shellexpand::tilde(file_path).to_string()),
            section: section.to_string(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<Option<Ini>, StoreError> {
        if !self.path.exists() {
            return Ok(None);
        }
        Ini::load_from_file(&self.path)
            .map(Some)
            .map_err(|source| StoreError::Read {
                path: self.path.clone(),
                source,
            })
    }
}

impl KeyValueStore for IniStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.load()?.and_then(|ini| {
            ini.get_from(Some(self.section.as_str()), key)
                .map(str::to_string)
        }))
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut ini = self.load()?.unwrap_or_else(Ini::new);
        ini.with_section(Some(self.section.as_str())).set(key, value);

        // Every value was unescaped on load, so all of them are encoded again.
        for (_, properties) in ini.iter_mut() {
            for (_, v) in properties.iter_mut() {
                *v = encode_value(v).into_owned();
            }
        }
        let options = WriteOption {
            escape_policy: EscapePolicy::Nothing,
            ..Default::default()
        };
        ini.write_to_file_opt(&self.path, options)
            .map_err(|source| StoreError::Write {
                path: self.path.clone(),
                source,
            })
    }
}

/// Best-effort wrapper around an optional store: reads that fail come back
/// as `None`, writes that fail are dropped. Neither reaches the user.
#[derive(Debug)]
pub struct Persistence<S> {
    store: Option<S>,
}

impl<S: KeyValueStore> Persistence<S> {
    pub fn new(store: S) -> Self {
        Persistence { store: Some(store) }
    }

    pub fn absent() -> Self {
        Persistence { store: None }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let store = self.store.as_ref()?;
        match store.get(key) {
            Ok(value) => value,
            Err(e) => {
                tracing::debug!(key, error = %e, "ignoring store read failure");
                None
            }
        }
    }

    pub fn set(&mut self, key: &str, value: &str) {
        if let Some(store) = self.store.as_mut() {
            if let Err(e) = store.set(key, value) {
                tracing::debug!(key, error = %e, "ignoring store write failure");
            }
        }
    }
}

#[cfg(test)]
pub use self::memory::MemoryStore;
