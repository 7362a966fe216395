// src/store/mod.rs — File-backed, append-only template version store
//
// Layout: `<root>/<template_id>/<version>.txt`, one immutable file per
// version. New versions are written to a temp file and hard-linked into
// place, so a version file either exists with its full text or not at all,
// and an existing version is never overwritten. Saves on the same id are
// serialized in-process by a per-id mutex; the link step catches races with
// other processes.

use serde::Serialize;
use std::collections::HashMap;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::infra::errors::PromptDoctorError;
use crate::infra::paths;

/// Distinguishes temp files of concurrent writers within one process.
static TEMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Placeholder shown for a template id that has never been saved.
pub const SEED_TEMPLATE: &str = "Write your prompt template here using Jinja syntax";

/// One persisted version of a template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TemplateRecord {
    pub template_id: String,
    pub version: u32,
    pub text: String,
}

/// The newest text for an id, or the unpersisted seed (`version == None`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TemplateDraft {
    pub text: String,
    pub version: Option<u32>,
}

impl TemplateDraft {
    pub fn seed() -> Self {
        Self {
            text: SEED_TEMPLATE.to_string(),
            version: None,
        }
    }

    pub fn is_seed(&self) -> bool {
        self.version.is_none()
    }
}

pub struct VersionStore {
    root: PathBuf,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl VersionStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, PromptDoctorError> {
        let root = root.into();
        std::fs::create_dir_all(&root)
            .map_err(|e| PromptDoctorError::store_unavailable(&root, e))?;
        tracing::debug!("Version store opened at {}", root.display());
        Ok(Self {
            root,
            locks: Mutex::new(HashMap::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// All persisted versions of `template_id`, newest first. Empty if unknown.
    pub fn list_versions(&self, template_id: &str) -> Result<Vec<u32>, PromptDoctorError> {
        validate_template_id(template_id)?;
        let dir = paths::template_dir(&self.root, template_id);
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(PromptDoctorError::store_unavailable(&dir, e)),
        };

        let mut versions = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| PromptDoctorError::store_unavailable(&dir, e))?;
            let name = entry.file_name();
            if let Some(v) = name.to_str().and_then(paths::parse_version_file_name) {
                versions.push(v);
            }
        }
        versions.sort_unstable_by(|a, b| b.cmp(a));
        Ok(versions)
    }

    /// Text of one version. `NotFound` if the pair does not exist.
    pub fn get_version(&self, template_id: &str, version: u32) -> Result<String, PromptDoctorError> {
        validate_template_id(template_id)?;
        let path = paths::version_file(&self.root, template_id, version);
        match std::fs::read_to_string(&path) {
            Ok(text) => Ok(text),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(PromptDoctorError::NotFound {
                template_id: template_id.to_string(),
                version,
            }),
            Err(e) => Err(PromptDoctorError::store_unavailable(&path, e)),
        }
    }

    pub fn get_record(
        &self,
        template_id: &str,
        version: u32,
    ) -> Result<TemplateRecord, PromptDoctorError> {
        let text = self.get_version(template_id, version)?;
        Ok(TemplateRecord {
            template_id: template_id.to_string(),
            version,
            text,
        })
    }

    /// Newest version's text, or the seed placeholder when nothing is saved.
    ///
    /// The seed is never written here; it only becomes version 1 through
    /// an explicit [`save_version`](Self::save_version).
    pub fn latest(&self, template_id: &str) -> Result<TemplateDraft, PromptDoctorError> {
        match self.list_versions(template_id)?.first() {
            Some(&version) => Ok(TemplateDraft {
                text: self.get_version(template_id, version)?,
                version: Some(version),
            }),
            None => Ok(TemplateDraft::seed()),
        }
    }

    /// Append `text` as the next version of `template_id` and return its number.
    pub fn save_version(&self, template_id: &str, text: &str) -> Result<u32, PromptDoctorError> {
        validate_template_id(template_id)?;
        let lock = self.id_lock(template_id)?;
        let _guard = lock
            .lock()
            .map_err(|_| anyhow::anyhow!("version lock for '{template_id}' poisoned"))?;

        let dir = paths::template_dir(&self.root, template_id);
        std::fs::create_dir_all(&dir).map_err(|e| PromptDoctorError::store_unavailable(&dir, e))?;

        loop {
            let next = match self.list_versions(template_id)?.first() {
                None => 1,
                Some(latest) => latest.checked_add(1).ok_or_else(|| {
                    PromptDoctorError::VersionsExhausted {
                        template_id: template_id.to_string(),
                    }
                })?,
            };
            let dst = paths::version_file(&self.root, template_id, next);

            match write_new_file(&dir, &dst, next, text) {
                Ok(()) => {
                    tracing::info!("Saved template '{}' version {}", template_id, next);
                    return Ok(next);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    // Another process claimed this number between our read and link.
                    tracing::debug!(
                        "Version {} of '{}' taken concurrently, retrying",
                        next,
                        template_id
                    );
                    continue;
                }
                Err(e) => return Err(PromptDoctorError::store_unavailable(&dst, e)),
            }
        }
    }

    fn id_lock(&self, template_id: &str) -> Result<Arc<Mutex<()>>, PromptDoctorError> {
        let mut locks = self
            .locks
            .lock()
            .map_err(|_| anyhow::anyhow!("version store lock table poisoned"))?;
        Ok(locks
            .entry(template_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone())
    }
}

/// Write `text` to `dst`, failing with `AlreadyExists` instead of overwriting.
fn write_new_file(dir: &Path, dst: &Path, version: u32, text: &str) -> std::io::Result<()> {
    let seq = TEMP_SEQ.fetch_add(1, Ordering::Relaxed);
    let tmp = dir.join(format!(".{version}.txt.{}-{seq}.tmp", std::process::id()));
    stage_temp(&tmp, |f| {
        f.write_all(text.as_bytes())?;
        f.flush()?;
        f.sync_all()
    })?;

    let linked = std::fs::hard_link(&tmp, dst);
    let _ = std::fs::remove_file(&tmp);
    match linked {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::Unsupported => {
            // Filesystems without hard links: exclusive create still refuses to overwrite.
            let mut f = std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(dst)?;
            f.write_all(text.as_bytes())?;
            f.sync_all()
        }
        Err(e) => Err(e),
    }
}

/// Create `tmp` and fill it with `write`. On failure the partial file is removed.
fn stage_temp(
    tmp: &Path,
    write: impl FnOnce(&mut std::fs::File) -> std::io::Result<()>,
) -> std::io::Result<()> {
    let mut f = std::fs::File::create(tmp)?;
    let written = write(&mut f);
    drop(f);
    if written.is_err() {
        let _ = std::fs::remove_file(tmp);
    }
    written
}

/// Template ids name a directory, so they must be a single plain path component.
pub fn validate_template_id(template_id: &str) -> Result<(), PromptDoctorError> {
    let invalid = template_id.is_empty()
        || template_id.starts_with('.')
        || template_id
            .chars()
            .any(|c| c == '/' || c == '\\' || c == ':' || c.is_control());
    if invalid {
        return Err(PromptDoctorError::InvalidTemplateId(template_id.to_string()));
    }
    Ok(())
}
