//! Waypoint reference data loaded from a datums snapshot.
//!
//! Replaces the per-request database the original pipeline kept: one
//! `FixDatabase` is built per run from the cycle's reference CSVs and passed
//! to whatever needs airport or fix lookups. Fix identifiers are not unique
//! nationwide, so lookups carry the airport's FAA id for disambiguation.

use crate::csvquote;
use crate::geo;
use crate::{Datums, GeorefError};
use log::warn;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone)]
pub struct Airport {
    pub icao_id: String,
    pub faa_id: String,
    pub elevation: f64,
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    pub variation: f64,
    pub description: String,
    pub state: String,
}

pub struct FixDatabase {
    airports: HashMap<String, Airport>,
    faa_to_icao: HashMap<String, String>,
    fixes: HashMap<String, Vec<LatLon>>,
}

impl FixDatabase {
    /// Load airports, fixes, localizers, navaids and runways for the
    /// snapshot's waypoint cycle. A missing reference file is fatal;
    /// malformed rows are logged and skipped.
    pub fn load(datums: &Datums) -> Result<Self, GeorefError> {
        let mut db = FixDatabase {
            airports: HashMap::new(),
            faa_to_icao: HashMap::new(),
            fixes: HashMap::new(),
        };

        db.load_airports(&datums.reference_csv("airports"))?;
        db.load_three_column(&datums.reference_csv("fixes"))?;
        db.load_aid(&datums.reference_csv("localizers"))?;
        db.load_aid(&datums.reference_csv("navaids"))?;
        db.load_runways(&datums.reference_csv("runways"))?;

        Ok(db)
    }

    fn load_airports(&mut self, path: &Path) -> Result<(), GeorefError> {
        for_each_row(path, |cols| {
            if cols.len() < 9 {
                return None;
            }
            let lat = cols[4].parse().ok()?;
            let lon = cols[5].parse().ok()?;
            let airport = Airport {
                icao_id: cols[0].clone(),
                faa_id: cols[1].clone(),
                elevation: cols[2].parse().unwrap_or(0.0),
                name: cols[3].clone(),
                lat,
                lon,
                variation: cols[6].parse().unwrap_or(0.0),
                description: cols[7].clone(),
                state: cols[8].clone(),
            };
            self.fixes
                .entry(airport.icao_id.clone())
                .or_default()
                .push(LatLon { lat, lon });
            self.faa_to_icao
                .insert(airport.faa_id.clone(), airport.icao_id.clone());
            self.airports.insert(airport.icao_id.clone(), airport);
            Some(())
        })
    }

    /// `fixid,lat,lon` rows.
    fn load_three_column(&mut self, path: &Path) -> Result<(), GeorefError> {
        for_each_row(path, |cols| {
            if cols.len() < 3 {
                return None;
            }
            let lat = cols[1].parse().ok()?;
            let lon = cols[2].parse().ok()?;
            self.fixes
                .entry(cols[0].clone())
                .or_default()
                .push(LatLon { lat, lon });
            Some(())
        })
    }

    /// Localizer/navaid rows: id in column 1, position in columns 4 and 5.
    /// Rows with blank positions exist in the FAA data and are skipped.
    fn load_aid(&mut self, path: &Path) -> Result<(), GeorefError> {
        for_each_row(path, |cols| {
            if cols.len() < 6 {
                return None;
            }
            if cols[4].is_empty() || cols[5].is_empty() {
                return Some(());
            }
            let lat = cols[4].parse().ok()?;
            let lon = cols[5].parse().ok()?;
            self.fixes
                .entry(cols[1].clone())
                .or_default()
                .push(LatLon { lat, lon });
            Some(())
        })
    }

    /// Runway thresholds, keyed `FAAID.RWnn` so plates can reference them.
    fn load_runways(&mut self, path: &Path) -> Result<(), GeorefError> {
        for_each_row(path, |cols| {
            if cols.len() < 6 {
                return None;
            }
            let lat = cols[4].parse().ok()?;
            let lon = cols[5].parse().ok()?;
            self.fixes
                .entry(format!("{}.RW{}", cols[0], cols[1]))
                .or_default()
                .push(LatLon { lat, lon });
            Some(())
        })
    }

    pub fn airport(&self, icao_id: &str) -> Option<&Airport> {
        self.airports.get(icao_id)
    }

    pub fn airport_by_faa(&self, faa_id: &str) -> Option<&Airport> {
        self.faa_to_icao
            .get(faa_id)
            .and_then(|icao| self.airports.get(icao))
    }

    /// Resolve a fix identifier near the given airport.
    ///
    /// The id may be a waypoint, navaid, localizer, airport icao id, or an
    /// airport-scoped name such as a runway (`RW16` matching `BVY.RW16`).
    /// An optional `[dist/hdg` suffix projects the resolved position along
    /// a radial (distance nm, heading degrees true). When several fixes
    /// share the name, the one closest to the airport wins.
    pub fn fix(&self, faa_id: &str, fix_id: &str) -> Option<LatLon> {
        let (base_id, offset) = parse_offset(fix_id);

        let mut candidates: Vec<LatLon> = Vec::new();
        if let Some(found) = self.fixes.get(base_id) {
            candidates.extend_from_slice(found);
        }
        if let Some(found) = self.fixes.get(&format!("{}.{}", faa_id, base_id)) {
            candidates.extend_from_slice(found);
        }

        let mut best = *candidates.first()?;
        if candidates.len() > 1 {
            let airport = match self.airport_by_faa(faa_id) {
                Some(a) => a,
                None => {
                    warn!("airport {} not found, cannot disambiguate {}", faa_id, base_id);
                    return None;
                }
            };
            let mut best_dist = geo::great_circle_nm(airport.lat, airport.lon, best.lat, best.lon);
            for cand in &candidates[1..] {
                let dist = geo::great_circle_nm(airport.lat, airport.lon, cand.lat, cand.lon);
                if dist < best_dist {
                    best_dist = dist;
                    best = *cand;
                }
            }
        }

        if let Some((dist_nm, hdg_true)) = offset {
            let (lat, lon) = geo::radial_offset(best.lat, best.lon, hdg_true, dist_nm);
            best = LatLon { lat, lon };
        }
        Some(best)
    }
}

/// Split `BASE[dist/hdg` into the base id and the offset pair. Anything
/// short of the full suffix leaves the id untouched.
fn parse_offset(fix_id: &str) -> (&str, Option<(f64, f64)>) {
    if let Some(i) = fix_id.find('[') {
        if let Some(j) = fix_id[i..].find('/').map(|j| i + j) {
            let dist = fix_id[i + 1..j].parse().unwrap_or(0.0);
            let hdg = fix_id[j + 1..].parse().unwrap_or(0.0);
            return (&fix_id[..i], Some((dist, hdg)));
        }
    }
    (fix_id, None)
}

fn for_each_row<F>(path: &Path, mut insert: F) -> Result<(), GeorefError>
where
    F: FnMut(&Vec<String>) -> Option<()>,
{
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let cols = csvquote::split(trimmed);
        if insert(&cols).is_none() {
            warn!("skipping malformed row {}:{}", path.display(), lineno + 1);
        }
    }
    Ok(())
}
