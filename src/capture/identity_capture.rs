use std::collections::HashSet;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Local};
use log::{info, warn};

use crate::pipeline::{derive_group, Frame, SnapshotSink};
use crate::settings::{ensure_strftime, string_set, IdentityCaptureSettings};

/// Saves frames for allow-listed identities into per-day folders:
/// `<root>/<date>/<identity>_<time>.<ext>`, with `/` in the identity
/// replaced by `_`.
pub struct IdentityCapture {
    root: PathBuf,
    groups: HashSet<String>,
    identities: HashSet<String>,
    date_folder_format: String,
    time_format: String,
    extension: String,
}

impl IdentityCapture {
    pub fn from_settings(settings: &IdentityCaptureSettings) -> Result<Option<Self>> {
        if !settings.enabled {
            return Ok(None);
        }

        ensure_strftime("identity_capture.date_folder_format", &settings.date_folder_format)?;
        ensure_strftime("identity_capture.time_format", &settings.time_format)?;

        fs::create_dir_all(&settings.root).with_context(|| {
            format!("failed to create snapshot directory {}", settings.root.display())
        })?;

        let extension = settings.extension.trim_start_matches('.').to_string();
        Ok(Some(Self {
            root: settings.root.clone(),
            groups: string_set(&settings.groups),
            identities: string_set(&settings.identities),
            date_folder_format: settings.date_folder_format.clone(),
            time_format: settings.time_format.clone(),
            extension,
        }))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn should_capture(&self, identity: &str) -> bool {
        if self.groups.is_empty() && self.identities.is_empty() {
            return true;
        }
        self.identities.contains(identity) || self.groups.contains(derive_group(identity))
    }

    fn target_path(&self, identity: &str, now: DateTime<Local>) -> Result<PathBuf> {
        let mut date_folder = String::new();
        write!(date_folder, "{}", now.format(&self.date_folder_format))
            .map_err(|_| anyhow!("cannot render date folder {:?}", self.date_folder_format))?;

        let mut filename = identity.replace('/', "_");
        write!(filename, "_{}.{}", now.format(&self.time_format), self.extension)
            .map_err(|_| anyhow!("cannot render snapshot time {:?}", self.time_format))?;

        Ok(self.root.join(date_folder).join(filename))
    }

    fn write(&self, path: &Path, frame: &Frame) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        frame
            .image
            .save(path)
            .with_context(|| format!("failed to encode snapshot {}", path.display()))
    }
}

impl SnapshotSink for IdentityCapture {
    fn save(&self, identity: &str, frame: &Frame) -> Option<PathBuf> {
        if !self.should_capture(identity) {
            return None;
        }

        let written = self
            .target_path(identity, Local::now())
            .and_then(|path| self.write(&path, frame).map(|()| path));
        match written {
            Ok(path) => {
                info!("Saved snapshot for {} to {}", identity, path.display());
                Some(path)
            }
            Err(err) => {
                warn!("Unable to save snapshot for {identity}: {err:#}");
                None
            }
        }
    }
}
