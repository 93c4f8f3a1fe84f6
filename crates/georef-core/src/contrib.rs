//! Community-contributed manual georeferences.
//!
//! When the decoder cannot georeference a plate, users of the client app
//! can mark reference points by hand and upload them. Contributions are
//! keyed by plate, plate effective date and contributor, so a newer upload
//! from the same user replaces the old one while uploads from different
//! users coexist for cross-checking.

use crate::GeorefError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// One hand-marked point: a pixel position and the latitude and/or
/// longitude the user assigned to it. Grid-line marks carry only one of
/// the two coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappedPoint {
    pub bmx: f64,
    pub bmy: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lon: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contribution {
    pub icao_id: String,
    pub plate_id: String,
    /// Plate effective date, yyyymmdd.
    pub eff_date: u32,
    pub username: String,
    pub entered: DateTime<Utc>,
    pub mapping: Vec<MappedPoint>,
}

impl Contribution {
    fn key(&self) -> (String, String, u32, String) {
        (
            self.icao_id.clone(),
            self.plate_id.clone(),
            self.eff_date,
            self.username.clone(),
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct ContribDoc {
    contributions: Vec<Contribution>,
}

pub struct ContribStore {
    path: PathBuf,
    doc: ContribDoc,
}

impl ContribStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, GeorefError> {
        let path = path.as_ref().to_path_buf();
        let doc = if path.exists() {
            serde_json::from_str(&fs::read_to_string(&path)?)?
        } else {
            ContribDoc::default()
        };
        Ok(Self { path, doc })
    }

    /// Insert a contribution, replacing a previous upload with the same
    /// (plate, effective date, user) key.
    pub fn insert(&mut self, contribution: Contribution) {
        let key = contribution.key();
        self.doc.contributions.retain(|c| c.key() != key);
        self.doc.contributions.push(contribution);
    }

    /// Contributions entered at or after `since`, for incremental download
    /// by the distribution pipeline.
    pub fn since(&self, since: DateTime<Utc>) -> Vec<&Contribution> {
        self.doc
            .contributions
            .iter()
            .filter(|c| c.entered >= since)
            .collect()
    }

    pub fn for_plate(&self, icao_id: &str, plate_id: &str) -> Vec<&Contribution> {
        self.doc
            .contributions
            .iter()
            .filter(|c| c.icao_id == icao_id && c.plate_id == plate_id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.doc.contributions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.doc.contributions.is_empty()
    }

    pub fn save(&self) -> Result<(), GeorefError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string_pretty(&self.doc)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
