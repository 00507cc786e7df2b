use std::env::current_exe;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::str;
use std::sync::{Arc, Mutex, PoisonError};
use directories_next::ProjectDirs;
use fd_lock::{RwLock, RwLockWriteGuard};
use log::{debug, info, warn};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

use crate::config::types::Config;
use crate::error::ConfigError;

const CONFIG_FILE_NAME: &str = "dglab-link.json";

// <exe>.json next to the executable, for running from a usb stick
fn get_portable_config_path() -> Option<PathBuf> {
    match current_exe() {
        Ok(mut path) => {
            if !path.set_extension("json") {
                warn!("Current exe has no file name: {}", path.to_string_lossy());
                return None;
            }

            Some(path)
        },
        Err(err) => {
            warn!("Failed to get current exe path: {:?}", err);
            None
        },
    }
}

// %AppData% on windows, ~/.config on linux, etc
fn get_local_config_path() -> Option<PathBuf> {
    ProjectDirs::from("com", "dglab", "dglab-link").map(|dirs| {
        dirs.config_dir().join(CONFIG_FILE_NAME)
    })
}

fn get_config_path() -> Result<PathBuf, ConfigError> {
    if let Some(path) = get_portable_config_path() {
        match std::fs::metadata(&path) {
            Ok(attr) if attr.is_file() => return Ok(path),
            Ok(_) => {},
            Err(err) => {
                debug!("No portable config at {}: {:?}", path.to_string_lossy(), err);
            },
        }
    }

    get_local_config_path().ok_or(ConfigError::NoConfigPath)
}

/// Holds the exclusive lock on the config file. Only one instance of the application may
/// drive a device at a time.
pub struct ConfigIOLocker {
    rw_lock: RwLock<std::fs::File>,
}

impl ConfigIOLocker {
    pub fn lock(&mut self) -> Result<RwLockWriteGuard<std::fs::File>, ConfigError> {
        self.rw_lock.try_write().map_err(|source| ConfigError::CanNotLock { source })
    }
}

struct ConfigIOInner {
    file: std::fs::File,
}

#[derive(Clone)]
pub struct ConfigIO {
    inner: Arc<Mutex<ConfigIOInner>>,
}

impl ConfigIO {
    pub fn new_sync() -> Result<Self, ConfigError> {
        let path = get_config_path()?;
        Self::open_sync(&path)
    }

    pub fn open_sync(path: &Path) -> Result<Self, ConfigError> {
        info!("Using config file {}", path.to_string_lossy());

        let directory = path.parent().ok_or(ConfigError::NoConfigPath)?;
        std::fs::create_dir_all(directory)?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .truncate(false)
            .append(false)
            .create(true)
            .open(path)?;

        let inner = ConfigIOInner {
            file,
        };
        Ok(ConfigIO { inner: Arc::new(Mutex::new(inner)) })
    }

    pub fn locker(&self) -> Result<ConfigIOLocker, ConfigError> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);

        Ok(ConfigIOLocker {
            rw_lock: RwLock::new(inner.file.try_clone()?),
        })
    }

    // never close the returned File, it shares the descriptor that holds the lock
    fn get_file(&self) -> Result<File, ConfigError> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let file = inner.file.try_clone()?;
        Ok(File::from_std(file))
    }

    /// An empty file reads as the default config.
    pub async fn read(&self) -> Result<Config, ConfigError> {
        let mut file = self.get_file()?;
        debug!("Reading config file");

        let mut content = vec![];
        file.rewind().await?;
        file.read_to_end(&mut content).await?;

        if content.is_empty() {
            return Ok(Config::default());
        }

        let content = str::from_utf8(&content)?;
        Ok(serde_json::from_str(content)?)
    }

    pub async fn save(&self, config: Config) -> Result<(), ConfigError> {
        let mut file = self.get_file()?;
        debug!("Saving config");

        let content = serde_json::to_string_pretty(&config)?;
        file.rewind().await?;
        file.set_len(0).await?;
        file.write_all(content.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::types::Channel;
    use crate::protocol::BasicWave;

    fn temp_config_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("dglab-link-test-{}-{}", std::process::id(), name))
            .join(CONFIG_FILE_NAME)
    }

    #[tokio::test]
    async fn empty_file_reads_as_default() {
        let path = temp_config_path("empty");
        let _ = std::fs::remove_file(&path);

        let io = ConfigIO::open_sync(&path).unwrap();
        assert_eq!(io.read().await.unwrap(), Config::default());

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn saved_config_is_read_back() {
        let path = temp_config_path("save");
        let _ = std::fs::remove_file(&path);

        let io = ConfigIO::open_sync(&path).unwrap();
        let mut config = Config::default();
        config.set_wave(Channel::B, Some(BasicWave::Batter));
        io.save(config.clone()).await.unwrap();

        // a shorter document must not leave bytes of the previous one behind
        io.save(Config::default()).await.unwrap();
        io.save(config.clone()).await.unwrap();

        assert_eq!(io.read().await.unwrap(), config);
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn invalid_json_is_reported() {
        let path = temp_config_path("invalid");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{ not json").unwrap();

        let io = ConfigIO::open_sync(&path).unwrap();
        let err = io.read().await.unwrap_err();
        assert!(matches!(err, ConfigError::JsonError { .. }), "{:?}", err);
        assert!(!err.is_file_not_found_error());

        let _ = std::fs::remove_file(&path);
    }
}
