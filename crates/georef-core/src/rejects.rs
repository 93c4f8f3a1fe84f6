//! Append-only log of plates a reviewer marked bad.
//!
//! One file per (region, reason) pair, named `<CC>.<reason>` with spaces
//! removed from the reason, each line `faaid,"plate"`. The files double as
//! a skip list: a plate already recorded for its region is not shown again.

use crate::csvquote;
use crate::GeorefError;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq)]
pub struct RejectEntry {
    pub region: String,
    pub reason: String,
    pub faa_id: String,
    pub plate_id: String,
}

pub struct RejectLog {
    dir: PathBuf,
}

impl RejectLog {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn entry_line(faa_id: &str, plate_id: &str) -> String {
        format!("{},{}\n", faa_id, csvquote::quote(plate_id))
    }

    /// Record a rejection under the operator's reason category.
    pub fn record(
        &self,
        region: &str,
        reason: &str,
        faa_id: &str,
        plate_id: &str,
    ) -> Result<(), GeorefError> {
        let reason = reason.replace(' ', "");
        fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(format!("{}.{}", region, reason));
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        file.write_all(Self::entry_line(faa_id, plate_id).as_bytes())?;
        Ok(())
    }

    /// Whether the plate was already rejected for this region, under any
    /// reason category.
    pub fn contains(
        &self,
        region: &str,
        faa_id: &str,
        plate_id: &str,
    ) -> Result<bool, GeorefError> {
        let needle = Self::entry_line(faa_id, plate_id);
        for (_, path) in self.region_files(region)? {
            let content = fs::read_to_string(&path)?;
            if content
                .lines()
                .any(|line| format!("{}\n", line) == needle)
            {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// All rejections for a region, grouped as flat entries.
    pub fn list(&self, region: &str) -> Result<Vec<RejectEntry>, GeorefError> {
        let mut entries = Vec::new();
        for (reason, path) in self.region_files(region)? {
            let content = fs::read_to_string(&path)?;
            for line in content.lines() {
                let cols = csvquote::split(line);
                if cols.len() >= 2 {
                    entries.push(RejectEntry {
                        region: region.to_string(),
                        reason: reason.clone(),
                        faa_id: cols[0].clone(),
                        plate_id: cols[1].clone(),
                    });
                }
            }
        }
        Ok(entries)
    }

    fn region_files(&self, region: &str) -> Result<Vec<(String, PathBuf)>, GeorefError> {
        let mut files = Vec::new();
        if !self.dir.exists() {
            return Ok(files);
        }
        let prefix = format!("{}.", region);
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if let Some(reason) = name.strip_prefix(&prefix) {
                files.push((reason.to_string(), entry.path()));
            }
        }
        files.sort();
        Ok(files)
    }
}
