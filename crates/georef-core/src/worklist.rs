//! Plate worklist files and the resumable cursor over them.
//!
//! A worklist directory holds one file per region, named `<CC>.csv`, whose
//! rows are `icaoid,"plate name",fixid,x,y`. Rows for the same plate are
//! consecutive, so a plate is read as a run of rows sharing the leading two
//! columns. Readers resume from a byte offset so a pass can span many
//! invocations without reprocessing.

use crate::csvquote;
use crate::GeorefError;
use log::warn;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::Path;

/// One decoder-reported fix position from a worklist row.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkFix {
    pub fix_id: String,
    pub pixel_x: f64,
    pub pixel_y: f64,
}

/// All worklist rows for one plate.
#[derive(Debug, Clone, PartialEq)]
pub struct PlateRecord {
    pub icao_id: String,
    pub plate_id: String,
    pub fixes: Vec<WorkFix>,
}

/// Read the plate group starting at `offset`.
///
/// Returns the record and the offset of the first row of the following
/// plate, or `None` at end of file. Malformed rows are skipped with a
/// warning; they never abort the run.
pub fn read_plate_at(
    path: &Path,
    offset: u64,
) -> Result<Option<(PlateRecord, u64)>, GeorefError> {
    let mut reader = BufReader::new(File::open(path)?);
    reader.seek(SeekFrom::Start(offset))?;

    let mut pos = offset;
    let mut record: Option<PlateRecord> = None;
    let mut line = String::new();

    loop {
        line.clear();
        let n = reader.read_line(&mut line)?;
        if n == 0 {
            break;
        }
        let line_start = pos;
        pos += n as u64;

        let trimmed = line.trim_end_matches(|c| c == '\n' || c == '\r');
        if trimmed.is_empty() {
            continue;
        }
        let cols = csvquote::split(trimmed);
        if cols.len() < 5 {
            warn!("skipping malformed worklist row at {}:{}", path.display(), line_start);
            continue;
        }
        let (px, py) = match (cols[3].parse(), cols[4].parse()) {
            (Ok(x), Ok(y)) => (x, y),
            _ => {
                warn!("skipping malformed worklist row at {}:{}", path.display(), line_start);
                continue;
            }
        };
        let fix = WorkFix {
            fix_id: cols[2].clone(),
            pixel_x: px,
            pixel_y: py,
        };

        match &mut record {
            None => {
                record = Some(PlateRecord {
                    icao_id: cols[0].clone(),
                    plate_id: cols[1].clone(),
                    fixes: vec![fix],
                });
            }
            Some(r) if r.icao_id == cols[0] && r.plate_id == cols[1] => {
                r.fixes.push(fix);
            }
            Some(_) => {
                // next plate starts here
                pos = line_start;
                break;
            }
        }
    }

    Ok(record.map(|r| (r, pos)))
}

/// Region codes with worklist files in `dir`, ascending.
pub fn regions(dir: &Path) -> Result<Vec<String>, GeorefError> {
    let mut found = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.len() == 6 && name.ends_with(".csv") {
            found.push(name[..2].to_string());
        }
    }
    found.sort();
    Ok(found)
}

/// First region code strictly after `current`, or the first region at all
/// when `current` is `None`.
pub fn next_region(dir: &Path, current: Option<&str>) -> Result<Option<String>, GeorefError> {
    let all = regions(dir)?;
    Ok(all
        .into_iter()
        .find(|r| current.map_or(true, |c| r.as_str() > c)))
}

/// Fraction of the region file consumed, for progress display.
pub fn progress_percent(path: &Path, offset: u64) -> f64 {
    match fs::metadata(path) {
        Ok(meta) if meta.len() > 0 => offset as f64 / meta.len() as f64 * 100.0,
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    const WORKLIST: &str = "\
KBVY,\"IAP-ILS RWY 16\",BOSOX,100,200\n\
KBVY,\"IAP-ILS RWY 16\",LWM,150,150\n\
KBVY,\"IAP-VOR RWY 34\",TAITS,300,400\n\
KBVY,\"IAP-VOR RWY 34\",LWM,320,440\n";

    #[test]
    fn test_read_groups_by_plate() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("MA.csv");
        fs::write(&path, WORKLIST).unwrap();

        let (first, next) = read_plate_at(&path, 0).unwrap().unwrap();
        assert_eq!(first.icao_id, "KBVY");
        assert_eq!(first.plate_id, "IAP-ILS RWY 16");
        assert_eq!(first.fixes.len(), 2);
        assert_eq!(first.fixes[0].fix_id, "BOSOX");
        assert_eq!(first.fixes[1].pixel_y, 150.0);

        // resume from the returned offset lands on the next plate
        let (second, end) = read_plate_at(&path, next).unwrap().unwrap();
        assert_eq!(second.plate_id, "IAP-VOR RWY 34");
        assert_eq!(second.fixes.len(), 2);

        assert!(read_plate_at(&path, end).unwrap().is_none());
    }

    #[test]
    fn test_read_empty_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("WY.csv");
        fs::write(&path, "").unwrap();
        assert!(read_plate_at(&path, 0).unwrap().is_none());
    }

    #[test]
    fn test_malformed_rows_skipped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("MA.csv");
        fs::write(
            &path,
            "garbage line\n\
             KBVY,\"IAP-ILS RWY 16\",BOSOX,100,200\n\
             KBVY,\"IAP-ILS RWY 16\",LWM,not,numeric\n\
             KBVY,\"IAP-ILS RWY 16\",LWM,150,150\n",
        )
        .unwrap();

        let (record, _) = read_plate_at(&path, 0).unwrap().unwrap();
        assert_eq!(record.fixes.len(), 2);
    }

    #[test]
    fn test_region_iteration() {
        let dir = tempdir().unwrap();
        for name in ["MA.csv", "NH.csv", "VT.csv", "notes.txt", "X.csv"] {
            fs::write(dir.path().join(name), "").unwrap();
        }

        assert_eq!(regions(dir.path()).unwrap(), vec!["MA", "NH", "VT"]);
        assert_eq!(next_region(dir.path(), None).unwrap().as_deref(), Some("MA"));
        assert_eq!(
            next_region(dir.path(), Some("MA")).unwrap().as_deref(),
            Some("NH")
        );
        assert_eq!(next_region(dir.path(), Some("VT")).unwrap(), None);
    }
}
