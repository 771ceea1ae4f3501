//! Calibration profiles
//!
//! A profile is the saved result of a wizard run: per-camera calibration data
//! plus the dartboard registration and scoring parameters, which the core
//! treats as opaque JSON. Profiles are stored one JSON file per profile.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Seconds since the Unix epoch.
pub fn unix_timestamp() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Calibration state of one camera in a profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraStatus {
    #[default]
    Disconnected,
    Connected,
    Calibrating,
    Calibrated,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

/// One camera's entry in a profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileCamera {
    pub camera_index: usize,
    pub name: String,
    #[serde(default)]
    pub status: CameraStatus,
    #[serde(default)]
    pub intrinsic_matrix: Option<serde_json::Value>,
    #[serde(default)]
    pub distortion_coeffs: Option<serde_json::Value>,
    #[serde(default)]
    pub extrinsic_matrix: Option<serde_json::Value>,
    #[serde(default)]
    pub calibration_error: Option<f64>,
    /// Accepted calibration captures.
    #[serde(default)]
    pub calibration_images: u32,
    #[serde(default)]
    pub resolution: Option<Resolution>,
}

impl ProfileCamera {
    pub fn new(camera_index: usize, name: impl Into<String>) -> Self {
        Self {
            camera_index,
            name: name.into(),
            status: CameraStatus::Disconnected,
            intrinsic_matrix: None,
            distortion_coeffs: None,
            extrinsic_matrix: None,
            calibration_error: None,
            calibration_images: 0,
            resolution: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationProfile {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub cameras: Vec<ProfileCamera>,
    #[serde(default)]
    pub dartboard_registration: Option<serde_json::Value>,
    #[serde(default)]
    pub scoring_parameters: Option<serde_json::Value>,
    pub created_at: u64,
    pub updated_at: u64,
}

impl CalibrationProfile {
    pub fn new(name: impl Into<String>) -> Self {
        let now = unix_timestamp();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            is_active: false,
            cameras: Vec::new(),
            dartboard_registration: None,
            scoring_parameters: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether every camera in the profile has been calibrated.
    pub fn is_complete(&self) -> bool {
        !self.cameras.is_empty()
            && self
                .cameras
                .iter()
                .all(|c| c.status == CameraStatus::Calibrated)
    }
}

/// Directory of saved profiles.
pub struct ProfileStore {
    dir: PathBuf,
}

impl ProfileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: Uuid) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }

    /// Write `profile`, refreshing its `updated_at`.
    pub fn save(&self, profile: &mut CalibrationProfile) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        profile.updated_at = unix_timestamp().max(profile.created_at);
        let path = self.path_for(profile.id);
        fs::write(&path, serde_json::to_string_pretty(profile)?)?;
        log::info!("Saved profile {:?} to {:?}", profile.name, path);
        Ok(path)
    }

    pub fn load(&self, id: Uuid) -> Result<CalibrationProfile> {
        let path = self.path_for(id);
        if !path.exists() {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("profile {} not found", id),
            )));
        }
        let contents = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// All readable profiles, newest first. Unreadable files are skipped.
    pub fn list(&self) -> Result<Vec<CalibrationProfile>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut profiles = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match fs::read_to_string(&path)
                .map_err(Error::from)
                .and_then(|s| serde_json::from_str::<CalibrationProfile>(&s).map_err(Error::from))
            {
                Ok(profile) => profiles.push(profile),
                Err(e) => log::warn!("Skipping unreadable profile {:?}: {}", path, e),
            }
        }
        profiles.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.name.cmp(&b.name)));
        Ok(profiles)
    }

    /// Remove a profile. Returns false when it did not exist.
    pub fn delete(&self, id: Uuid) -> Result<bool> {
        let path = self.path_for(id);
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(&path)?;
        log::info!("Deleted profile {}", id);
        Ok(true)
    }

    /// Mark `id` active and every other profile inactive.
    pub fn set_active(&self, id: Uuid) -> Result<CalibrationProfile> {
        let mut target = self.load(id)?;
        for mut profile in self.list()? {
            if profile.id != id && profile.is_active {
                profile.is_active = false;
                self.save(&mut profile)?;
            }
        }
        target.is_active = true;
        self.save(&mut target)?;
        Ok(target)
    }

    pub fn active(&self) -> Result<Option<CalibrationProfile>> {
        Ok(self.list()?.into_iter().find(|p| p.is_active))
    }
}
