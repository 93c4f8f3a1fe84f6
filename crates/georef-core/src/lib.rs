pub mod contrib;
pub mod csvquote;
pub mod decoder;
pub mod geo;
pub mod rejects;
pub mod review;
pub mod store;
pub mod transform;
pub mod waypoints;
pub mod worklist;

use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum GeorefError {
    #[error("datums directory not found")]
    DatumsNotFound,
    #[error("invalid datums directory: {0}")]
    InvalidDatums(String),
    #[error("georeference needs two fixes with distinct pixel and geodetic positions")]
    DegenerateFixPair,
    #[error("decoder failed for {faa_id} {plate_id}: {reason}")]
    Decoder {
        faa_id: String,
        plate_id: String,
        reason: String,
    },
    #[error("no plate is pending a disposition")]
    NothingPending,
    #[error("pending plate has no proposed transform to accept")]
    NoProposal,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("state file error: {0}")]
    State(#[from] serde_json::Error),
}

/// Root of a datums snapshot tree.
///
/// Datasets are versioned by AIRAC cycle number stamped into their names:
/// plates and worklists revise on the 28-day cycle, waypoint reference data
/// on the 56-day cycle. The current cycle numbers live in small expiration
/// files at the top of the tree.
pub struct Datums {
    pub root: PathBuf,
    pub cycle28: u32,
    pub cycle56: u32,
}

impl Datums {
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self, GeorefError> {
        let root = root.as_ref().to_path_buf();
        if !root.exists() {
            return Err(GeorefError::DatumsNotFound);
        }

        let cycle28 = read_cycle(&root.join("aptplates_expdate.dat"))?;
        let cycle56 = read_cycle(&root.join("aptinfo_expdate.dat"))?;

        Ok(Self {
            root,
            cycle28,
            cycle56,
        })
    }

    /// Per-region plate worklists for the current plate cycle.
    pub fn worklist_dir(&self) -> PathBuf {
        self.root.join(format!("iapgeorefs_{}", self.cycle28))
    }

    /// Per-region index of scanned plate image files.
    pub fn plate_index_dir(&self) -> PathBuf {
        self.root
            .join(format!("aptplates_{}", self.cycle28))
            .join("state")
    }

    /// Reference CSV (airports, fixes, navaids, ...) for the waypoint cycle.
    pub fn reference_csv(&self, name: &str) -> PathBuf {
        self.root.join(format!("{}_{}.csv", name, self.cycle56))
    }

    /// Scanned image file name for a plate, from the per-region index.
    pub fn image_name(
        &self,
        region: &str,
        faa_id: &str,
        plate_id: &str,
    ) -> Result<Option<String>, GeorefError> {
        let path = self.plate_index_dir().join(format!("{}.csv", region));
        let content = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        for line in content.lines() {
            let cols = csvquote::split(line.trim());
            if cols.len() >= 3 && cols[0] == faa_id && cols[1] == plate_id {
                return Ok(Some(cols[2].clone()));
            }
        }
        Ok(None)
    }

    /// The two newest snapshot directories with the given prefix, oldest
    /// first. Used to diff a fresh georef run against the previous cycle.
    pub fn latest_snapshot_dirs(&self, prefix: &str) -> (Option<PathBuf>, Option<PathBuf>) {
        let mut names: Vec<PathBuf> = WalkDir::new(&self.root)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_dir())
            .filter(|e| e.file_name().to_string_lossy().starts_with(prefix))
            .map(|e| e.into_path())
            .collect();
        names.sort();
        let latest = names.pop();
        let older = names.pop();
        (older, latest)
    }
}

fn read_cycle(path: &Path) -> Result<u32, GeorefError> {
    let text = fs::read_to_string(path)
        .map_err(|_| GeorefError::InvalidDatums(format!("missing {}", path.display())))?;
    text.trim()
        .parse()
        .map_err(|_| GeorefError::InvalidDatums(format!("bad cycle number in {}", path.display())))
}
