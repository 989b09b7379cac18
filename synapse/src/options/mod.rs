//! The persisted connection-option record and its store.
//!
//! The record keeps the most recently used connection options so repeat
//! invocations only need a destination. It is a single `key=value` file,
//! last write wins; a missing file loads as an empty record.

mod error;

use std::path::{Path, PathBuf};

use snafu::ResultExt;

pub use self::error::Error;
use crate::consts;

/// The all-optional persisted form of the connection options.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct StoredOptions {
    pub user: Option<String>,
    pub identity: Option<PathBuf>,
    pub pubkey: Option<PathBuf>,
    pub port: Option<u16>,
}

impl StoredOptions {
    /// Parses `key=value` lines. Unknown keys and blank lines are skipped,
    /// so stale records from older versions still load.
    pub fn from_lines(data: &str) -> Result<Self, Error> {
        let mut record = Self::default();
        for line in data.lines() {
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            match key.trim() {
                "user" => record.user = Some(value.to_string()),
                "identity" => record.identity = Some(PathBuf::from(value)),
                "pubkey" => record.pubkey = Some(PathBuf::from(value)),
                "port" => {
                    record.port = Some(
                        value.parse().context(error::InvalidPortSnafu { value: value.to_string() })?,
                    );
                }
                _ => {}
            }
        }
        Ok(record)
    }

    #[must_use]
    pub fn to_lines(&self) -> String {
        let Self { user, identity, pubkey, port } = self;
        let mut lines = String::new();
        if let Some(user) = user {
            lines.push_str(&format!("user={user}\n"));
        }
        if let Some(identity) = identity {
            lines.push_str(&format!("identity={}\n", identity.display()));
        }
        if let Some(pubkey) = pubkey {
            lines.push_str(&format!("pubkey={}\n", pubkey.display()));
        }
        if let Some(port) = port {
            lines.push_str(&format!("port={port}\n"));
        }
        lines
    }
}

/// Fully resolved connection options for one session.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ConnectionOptions {
    pub user: String,
    pub identity: PathBuf,
    pub pubkey: Option<PathBuf>,
    pub port: u16,
}

impl ConnectionOptions {
    /// Resolves per field: explicit value, then persisted value, then hard
    /// default (`fallback_user`, port 22). The identity has no default.
    pub fn resolve(
        explicit: &StoredOptions,
        persisted: &StoredOptions,
        fallback_user: impl Into<String>,
    ) -> Result<Self, Error> {
        let user = explicit
            .user
            .clone()
            .or_else(|| persisted.user.clone())
            .unwrap_or_else(|| fallback_user.into());
        let identity = explicit
            .identity
            .clone()
            .or_else(|| persisted.identity.clone())
            .ok_or(Error::NoIdentity)?;
        let pubkey = explicit.pubkey.clone().or_else(|| persisted.pubkey.clone());
        let port = explicit.port.or(persisted.port).unwrap_or(consts::DEFAULT_SSH_PORT);

        Ok(Self { user, identity, pubkey, port })
    }

    #[must_use]
    pub fn to_stored(&self) -> StoredOptions {
        let Self { user, identity, pubkey, port } = self;
        StoredOptions {
            user: Some(user.clone()),
            identity: Some(identity.clone()),
            pubkey: pubkey.clone(),
            port: Some(*port),
        }
    }
}

/// Store for the single persisted option record.
///
/// Injected into the orchestrator so tests can substitute an in-memory
/// implementation. No merge, no history, no validation; last write wins.
pub trait OptionStore {
    fn load(&self) -> Result<StoredOptions, Error>;

    fn save(&self, record: &StoredOptions) -> Result<(), Error>;
}

/// File-backed store at a fixed well-known location.
pub struct FileOptionStore {
    file_path: PathBuf,
}

impl FileOptionStore {
    #[must_use]
    pub fn new(data_dir: &Path) -> Self {
        Self { file_path: data_dir.join(consts::OPTIONS_FILE_NAME) }
    }
}

impl OptionStore for FileOptionStore {
    fn load(&self) -> Result<StoredOptions, Error> {
        match std::fs::read_to_string(&self.file_path) {
            Ok(data) => StoredOptions::from_lines(&data),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(StoredOptions::default()),
            Err(source) => {
                Err(Error::ReadRecord { file_path: self.file_path.clone(), source })
            }
        }
    }

    fn save(&self, record: &StoredOptions) -> Result<(), Error> {
        if let Some(parent) = self.file_path.parent() {
            std::fs::create_dir_all(parent)
                .context(error::WriteRecordSnafu { file_path: self.file_path.clone() })?;
        }
        std::fs::write(&self.file_path, record.to_lines())
            .context(error::WriteRecordSnafu { file_path: self.file_path.clone() })
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, path::PathBuf};

    use super::{ConnectionOptions, Error, FileOptionStore, OptionStore, StoredOptions};

    /// In-memory stand-in for the file store.
    #[derive(Default)]
    struct MemoryOptionStore {
        record: RefCell<StoredOptions>,
    }

    impl OptionStore for MemoryOptionStore {
        fn load(&self) -> Result<StoredOptions, Error> { Ok(self.record.borrow().clone()) }

        fn save(&self, record: &StoredOptions) -> Result<(), Error> {
            *self.record.borrow_mut() = record.clone();
            Ok(())
        }
    }

    fn sample_record() -> StoredOptions {
        StoredOptions {
            user: Some("ec2-user".to_string()),
            identity: Some(PathBuf::from("/home/op/.ssh/id_rsa")),
            pubkey: Some(PathBuf::from("/home/op/.ssh/id_rsa.pub")),
            port: Some(2022),
        }
    }

    #[test]
    fn test_lines_round_trip() {
        let original = sample_record();
        let recovered = StoredOptions::from_lines(&original.to_lines()).unwrap();
        assert_eq!(original, recovered);
    }

    #[test]
    fn test_missing_file_loads_empty_record() {
        let store = FileOptionStore::new(&std::env::temp_dir().join("synapse-no-such-dir"));
        assert_eq!(store.load().unwrap(), StoredOptions::default());
    }

    #[test]
    fn test_file_store_round_trip() {
        let dir = std::env::temp_dir()
            .join(format!("synapse-options-test-{}", std::process::id()));
        let store = FileOptionStore::new(&dir);
        let record = sample_record();
        store.save(&record).unwrap();
        assert_eq!(store.load().unwrap(), record);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_unknown_keys_are_skipped() {
        let record = StoredOptions::from_lines("user=alice\ncolor=teal\n\nport=22\n").unwrap();
        assert_eq!(record.user.as_deref(), Some("alice"));
        assert_eq!(record.port, Some(22));
    }

    #[test]
    fn test_invalid_port_is_an_error() {
        let result = StoredOptions::from_lines("port=eleventy\n");
        assert!(matches!(result, Err(Error::InvalidPort { .. })));
    }

    #[test]
    fn test_resolution_prefers_explicit_over_persisted() {
        let explicit = StoredOptions {
            user: Some("admin".to_string()),
            port: Some(22),
            ..StoredOptions::default()
        };
        let resolved =
            ConnectionOptions::resolve(&explicit, &sample_record(), "fallback").unwrap();
        assert_eq!(resolved.user, "admin");
        assert_eq!(resolved.port, 22);
        // untouched fields fall back to the persisted record
        assert_eq!(resolved.identity, PathBuf::from("/home/op/.ssh/id_rsa"));
        assert_eq!(resolved.pubkey, Some(PathBuf::from("/home/op/.ssh/id_rsa.pub")));
    }

    #[test]
    fn test_resolution_without_overrides_equals_persisted() {
        let persisted = sample_record();
        let resolved =
            ConnectionOptions::resolve(&StoredOptions::default(), &persisted, "fallback").unwrap();
        assert_eq!(resolved.to_stored(), persisted);
    }

    #[test]
    fn test_resolution_hard_defaults() {
        let persisted = StoredOptions {
            identity: Some(PathBuf::from("/home/op/.ssh/id_ed25519")),
            ..StoredOptions::default()
        };
        let resolved =
            ConnectionOptions::resolve(&StoredOptions::default(), &persisted, "opuser").unwrap();
        assert_eq!(resolved.user, "opuser");
        assert_eq!(resolved.port, 22);
        assert!(resolved.pubkey.is_none());
    }

    #[test]
    fn test_missing_identity_is_fatal() {
        let result = ConnectionOptions::resolve(
            &StoredOptions::default(),
            &StoredOptions::default(),
            "opuser",
        );
        assert!(matches!(result, Err(Error::NoIdentity)));
    }

    #[test]
    fn test_memory_store_last_write_wins() {
        let store = MemoryOptionStore::default();
        store.save(&sample_record()).unwrap();
        let second = StoredOptions { user: Some("bob".to_string()), ..StoredOptions::default() };
        store.save(&second).unwrap();
        assert_eq!(store.load().unwrap(), second);
    }
}
