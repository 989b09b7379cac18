mod error;
mod log;
mod poll_policy;

use std::path::{Path, PathBuf};

use resolve_path::PathResolveExt;
use serde::{Deserialize, Serialize};
use snafu::ResultExt;

pub use self::{error::Error, log::LogConfig, poll_policy::PollPolicy};
use crate::consts;

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Name of the singleton jump pod; also the reserved destination alias
    /// for opening a shell inside the pod itself.
    #[serde(default = "default_jump_pod_name")]
    pub jump_pod_name: String,

    /// Namespace override; the current context's namespace when absent.
    pub namespace: Option<String>,

    /// Image used by the built-in jump pod manifest.
    #[serde(default = "default_jump_image")]
    pub jump_image: String,

    /// Optional pod manifest file applied instead of the built-in one.
    /// Ignored (with a log message) when the file does not exist.
    pub jump_manifest_path: Option<PathBuf>,

    /// Local port the forwarder binds.
    #[serde(default = "default_local_port")]
    pub local_port: u16,

    /// SSH port inside the jump pod.
    #[serde(default = "default_remote_port")]
    pub remote_port: u16,

    #[serde(default)]
    pub poll: PollPolicy,

    #[serde(default)]
    pub log: LogConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            jump_pod_name: default_jump_pod_name(),
            namespace: None,
            jump_image: default_jump_image(),
            jump_manifest_path: None,
            local_port: default_local_port(),
            remote_port: default_remote_port(),
            poll: PollPolicy::default(),
            log: LogConfig::default(),
        }
    }
}

impl Config {
    pub fn search_config_file_path() -> PathBuf {
        let paths = vec![Self::default_path()]
            .into_iter()
            .chain(crate::fallback_project_config_directories().into_iter().map(|mut path| {
                path.push(crate::CLI_CONFIG_NAME);
                path
            }))
            .collect::<Vec<_>>();
        for path in paths {
            let Ok(exists) = path.try_exists() else {
                continue;
            };
            if exists {
                return path;
            }
        }
        Self::default_path()
    }

    #[inline]
    pub fn default_path() -> PathBuf {
        [crate::PROJECT_CONFIG_DIR.to_path_buf(), PathBuf::from(crate::CLI_CONFIG_NAME)]
            .into_iter()
            .collect()
    }

    #[inline]
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let mut config: Self = {
            let path =
                path.as_ref().try_resolve().map(|path| path.to_path_buf()).with_context(|_| {
                    error::ResolveFilePathSnafu { file_path: path.as_ref().to_path_buf() }
                })?;
            let data =
                std::fs::read(&path).context(error::OpenConfigSnafu { filename: path.clone() })?;
            serde_yaml::from_slice(&data).context(error::ParseConfigSnafu { filename: path })?
        };

        config.log.file_path = match config.log.file_path.map(|path| {
            path.try_resolve()
                .map(|path| path.to_path_buf())
                .with_context(|_| error::ResolveFilePathSnafu { file_path: path.clone() })
        }) {
            Some(Ok(path)) => Some(path),
            Some(Err(err)) => return Err(err),
            None => None,
        };

        Ok(config)
    }

    /// Loads the configuration, falling back to defaults when no file exists.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        match path.as_ref().try_exists() {
            Ok(true) => Self::load(path),
            _ => Ok(Self::default()),
        }
    }

    /// Renders the default configuration as YAML, for `default-config`.
    #[must_use]
    pub fn template_basic() -> Vec<u8> {
        serde_yaml::to_string(&Self::default()).map(String::into_bytes).unwrap_or_default()
    }
}

fn default_jump_pod_name() -> String { consts::DEFAULT_JUMP_POD_NAME.to_string() }

fn default_jump_image() -> String { consts::DEFAULT_JUMP_IMAGE.to_string() }

const fn default_local_port() -> u16 { consts::DEFAULT_LOCAL_PORT }

const fn default_remote_port() -> u16 { consts::DEFAULT_REMOTE_PORT }

#[cfg(test)]
mod tests {
    use super::Config;

    #[test]
    fn test_template_is_parseable() {
        let template = Config::template_basic();
        let config: Config = serde_yaml::from_slice(&template).unwrap();
        assert_eq!(config.jump_pod_name, "sshjump");
        assert_eq!(config.local_port, 2222);
        assert_eq!(config.remote_port, 22);
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let config: Config = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config.jump_image, crate::consts::DEFAULT_JUMP_IMAGE);
        assert!(config.namespace.is_none());
        assert!(config.jump_manifest_path.is_none());
    }
}
