//! Store of accepted georeferences, one record per verified plate.
//!
//! Records are replaced wholesale on re-verification, never patched. The
//! whole store is one JSON document rewritten through a temp file and an
//! atomic rename, so a crashed run can never leave a half-written record.

use crate::transform::Transform;
use crate::GeorefError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

const CURRENT_STORE_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredTransform {
    pub xfm: Transform,
    pub last_check: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoreDoc {
    version: u32,
    entries: BTreeMap<String, StoredTransform>,
}

impl Default for StoreDoc {
    fn default() -> Self {
        Self {
            version: CURRENT_STORE_VERSION,
            entries: BTreeMap::new(),
        }
    }
}

pub struct AcceptedStore {
    path: PathBuf,
    doc: StoreDoc,
}

/// Store key for a plate. The worklist sometimes hands the plate id around
/// still wrapped in its CSV quoting (`,"PLATE",`); strip that so the same
/// plate always maps to the same record.
pub fn plate_key(icao_id: &str, plate_id: &str) -> String {
    let mut plate = plate_id;
    if let Some(rest) = plate.strip_prefix(",\"") {
        plate = rest;
    }
    if let Some(rest) = plate.strip_suffix("\",") {
        plate = rest;
    }
    format!("{}:{}", icao_id, plate)
}

impl AcceptedStore {
    /// Open the store at `path`, starting empty if the file is absent or
    /// carries a different document version.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, GeorefError> {
        let path = path.as_ref().to_path_buf();
        let doc = if path.exists() {
            let content = fs::read_to_string(&path)?;
            match serde_json::from_str::<StoreDoc>(&content) {
                Ok(doc) if doc.version == CURRENT_STORE_VERSION => doc,
                _ => StoreDoc::default(),
            }
        } else {
            StoreDoc::default()
        };
        Ok(Self { path, doc })
    }

    pub fn get(&self, icao_id: &str, plate_id: &str) -> Option<&StoredTransform> {
        self.doc.entries.get(&plate_key(icao_id, plate_id))
    }

    /// Accept a transform for a plate, replacing any prior record.
    pub fn put(&mut self, icao_id: &str, plate_id: &str, xfm: Transform) {
        self.put_at(icao_id, plate_id, xfm, Utc::now());
    }

    pub fn put_at(&mut self, icao_id: &str, plate_id: &str, xfm: Transform, at: DateTime<Utc>) {
        self.doc.entries.insert(
            plate_key(icao_id, plate_id),
            StoredTransform {
                xfm,
                last_check: at,
            },
        );
    }

    pub fn remove(&mut self, icao_id: &str, plate_id: &str) -> bool {
        self.doc.entries.remove(&plate_key(icao_id, plate_id)).is_some()
    }

    /// Keys whose last verification predates `since`: plates the current
    /// pass never reached, usually because the decoder stopped producing
    /// fix data for them.
    pub fn missed_since(&self, since: DateTime<Utc>) -> Vec<String> {
        self.doc
            .entries
            .iter()
            .filter(|(_, v)| v.last_check < since)
            .map(|(k, _)| k.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.doc.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.doc.entries.is_empty()
    }

    pub fn save(&self) -> Result<(), GeorefError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(&self.doc)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, content)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
