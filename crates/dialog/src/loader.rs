//! Dialog loading and hot reload
//!
//! Loads every `.yaml`/`.yml` file from the configured directory, validates
//! it, and serves lookups by dialog name. A watcher reloads the directory on
//! file creation or modification.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{EventKind, RecursiveMode, Watcher};
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

use crate::fsm::StateMachine;
use crate::types::{Dialog, DialogInfo};
use crate::DialogError;

const WATCH_POLL: Duration = Duration::from_millis(500);

/// Loads and optionally hot-reloads dialog definitions from a directory.
pub struct Loader {
    dir: PathBuf,
    dialogs: RwLock<HashMap<String, Arc<StateMachine>>>,
}

impl Loader {
    pub fn new(dir: impl Into<PathBuf>) -> Arc<Self> {
        Arc::new(Self {
            dir: dir.into(),
            dialogs: RwLock::new(HashMap::new()),
        })
    }

    /// Load all dialog files from the directory, replacing the current set.
    /// A single invalid file fails the whole load.
    pub fn load_all(&self) -> Result<usize, DialogError> {
        let entries = std::fs::read_dir(&self.dir).map_err(|source| DialogError::Io {
            path: self.dir.display().to_string(),
            source,
        })?;

        let mut loaded = HashMap::new();
        for entry in entries {
            let entry = entry.map_err(|source| DialogError::Io {
                path: self.dir.display().to_string(),
                source,
            })?;
            let path = entry.path();
            if !is_dialog_file(&path) {
                continue;
            }
            let sm = self.load_file(&path)?;
            loaded.insert(sm.dialog().name.clone(), Arc::new(sm));
        }

        let count = loaded.len();
        *self.dialogs.write() = loaded;
        Ok(count)
    }

    fn load_file(&self, path: &Path) -> Result<StateMachine, DialogError> {
        let raw = std::fs::read_to_string(path).map_err(|source| DialogError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let mut dialog: Dialog =
            serde_yaml::from_str(&raw).map_err(|source| DialogError::Parse {
                path: path.display().to_string(),
                source,
            })?;

        if dialog.name.is_empty() {
            dialog.name = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
        }

        let sm = StateMachine::new(dialog);
        sm.validate()?;
        Ok(sm)
    }

    pub fn get(&self, name: &str) -> Option<Arc<StateMachine>> {
        self.dialogs.read().get(name).cloned()
    }

    pub fn all(&self) -> Vec<Arc<StateMachine>> {
        self.dialogs.read().values().cloned().collect()
    }

    pub fn list(&self) -> Vec<DialogInfo> {
        self.dialogs.read().values().map(|sm| sm.info()).collect()
    }

    /// Watch the dialog directory and reload on changes. Runs until the
    /// token is cancelled.
    pub fn watch(self: &Arc<Self>, cancel: CancellationToken) {
        let loader = Arc::clone(self);
        tokio::task::spawn_blocking(move || {
            let (tx, rx) = std::sync::mpsc::channel();
            let mut watcher = match notify::recommended_watcher(move |res| {
                let _ = tx.send(res);
            }) {
                Ok(watcher) => watcher,
                Err(err) => {
                    tracing::error!(error = %err, "dialog watcher init failed");
                    return;
                }
            };
            if let Err(err) = watcher.watch(&loader.dir, RecursiveMode::NonRecursive) {
                tracing::error!(dir = %loader.dir.display(), error = %err, "dialog watch failed");
                return;
            }
            tracing::info!(dir = %loader.dir.display(), "watching dialog directory");

            loop {
                if cancel.is_cancelled() {
                    return;
                }
                match rx.recv_timeout(WATCH_POLL) {
                    Ok(Ok(event)) => {
                        let relevant = matches!(
                            event.kind,
                            EventKind::Create(_) | EventKind::Modify(_)
                        ) && event.paths.iter().any(|p| is_dialog_file(p));
                        if relevant {
                            match loader.load_all() {
                                Ok(count) => {
                                    tracing::info!(dialogs = count, "dialogs reloaded")
                                }
                                Err(err) => {
                                    tracing::warn!(error = %err, "dialog reload failed")
                                }
                            }
                        }
                    }
                    Ok(Err(err)) => tracing::warn!(error = %err, "dialog watch error"),
                    Err(std::sync::mpsc::RecvTimeoutError::Timeout) => continue,
                    Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => return,
                }
            }
        });
    }
}

fn is_dialog_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const GREETING: &str = r#"
name: greeting
initial_state: hello
states:
  hello:
    transitions:
      - event: speech
        target: done
  done:
    terminal: true
"#;

    fn write_file(dir: &Path, name: &str, content: &str) {
        let mut f = std::fs::File::create(dir.join(name)).unwrap();
        f.write_all(content.as_bytes()).unwrap();
    }

    #[test]
    fn test_load_all_picks_up_yaml_and_yml() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "a.yaml", GREETING);
        write_file(dir.path(), "b.yml", &GREETING.replace("greeting", "other"));
        write_file(dir.path(), "ignored.txt", "not a dialog");

        let loader = Loader::new(dir.path());
        assert_eq!(loader.load_all().unwrap(), 2);
        assert!(loader.get("greeting").is_some());
        assert!(loader.get("other").is_some());
        assert!(loader.get("ignored").is_none());
    }

    #[test]
    fn test_name_defaults_to_file_stem() {
        let dir = tempfile::tempdir().unwrap();
        write_file(
            dir.path(),
            "unnamed.yaml",
            "initial_state: a\nstates:\n  a: {terminal: true}\n",
        );

        let loader = Loader::new(dir.path());
        loader.load_all().unwrap();
        assert!(loader.get("unnamed").is_some());
    }

    #[test]
    fn test_invalid_dialog_rejects_load() {
        let dir = tempfile::tempdir().unwrap();
        write_file(
            dir.path(),
            "bad.yaml",
            "name: bad\ninitial_state: ghost\nstates:\n  a: {}\n",
        );

        let loader = Loader::new(dir.path());
        assert!(matches!(
            loader.load_all(),
            Err(DialogError::Validation { .. })
        ));
    }

    #[tokio::test]
    async fn test_watch_reloads_on_change() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "a.yaml", GREETING);

        let loader = Loader::new(dir.path());
        loader.load_all().unwrap();
        let cancel = CancellationToken::new();
        loader.watch(cancel.clone());

        // Give the watcher a moment to register before writing.
        tokio::time::sleep(Duration::from_millis(300)).await;
        write_file(dir.path(), "new.yaml", &GREETING.replace("greeting", "fresh"));

        let mut found = false;
        for _ in 0..40 {
            if loader.get("fresh").is_some() {
                found = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        cancel.cancel();
        assert!(found, "watcher should reload new dialog");
    }
}
