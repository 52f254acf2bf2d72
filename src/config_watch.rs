// Config hot reload
//
// Watches the directory holding the config file (editors often replace the
// file instead of writing it in place) and reloads the `[scene]` section
// when the file changes. Polled once per frame from the control thread.

use crate::config::{Config, SceneConfig};
use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver};

pub struct ConfigWatcher {
    path: PathBuf,
    changes: Receiver<()>,
    _watcher: RecommendedWatcher,
}

impl ConfigWatcher {
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file_name = path
            .file_name()
            .map(|name| name.to_os_string())
            .context("Config path has no file name")?;
        let directory = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let (tx, changes) = mpsc::channel();
        let mut watcher = notify::recommended_watcher(move |event: notify::Result<Event>| {
            match event {
                Ok(event) if touches(&event, &file_name) => {
                    let _ = tx.send(());
                }
                Ok(_) => {}
                Err(err) => log::warn!("Config watch error: {}", err),
            }
        })
        .context("Failed to create config watcher")?;
        watcher
            .watch(&directory, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch {:?}", directory))?;

        log::info!("Watching {:?} for scene changes", path);
        Ok(Self {
            path,
            changes,
            _watcher: watcher,
        })
    }

    /// Reloaded scene settings if the file changed since the last poll.
    /// Unreadable or invalid files are logged and ignored.
    pub fn poll(&self) -> Option<SceneConfig> {
        let mut changed = false;
        while self.changes.try_recv().is_ok() {
            changed = true;
        }
        if !changed {
            return None;
        }

        match Config::load_from_path(&self.path) {
            Ok(config) => {
                log::info!("Reloaded scene settings from {:?}", self.path);
                Some(config.scene)
            }
            Err(err) => {
                log::warn!("Ignoring config change: {:#}", err);
                None
            }
        }
    }
}

fn touches(event: &Event, file_name: &OsString) -> bool {
    matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_))
        && event
            .paths
            .iter()
            .any(|path| path.file_name() == Some(file_name.as_os_str()))
}
