//! Verification workflow over the plate worklists.
//!
//! Each plate moves through one pass as
//! `UNSEEN -> COMPUTED -> {CONFIRMED | REJECTED | PENDING_REVIEW}`.
//! A plate whose freshly observed fixes still land where the previously
//! accepted transform predicts them is confirmed without human help; all
//! others are handed to the reviewer with a discrepancy report. The cursor
//! into the worklists advances only when a plate reaches a terminal state,
//! so an interrupted run resumes exactly where it stopped.

use crate::decoder::PlateDecoder;
use crate::rejects::RejectLog;
use crate::store::AcceptedStore;
use crate::transform::{FixPoint, Transform};
use crate::waypoints::FixDatabase;
use crate::worklist::{self, WorkFix};
use crate::{Datums, GeorefError};
use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// A recomputed fix agrees with its observation when the rounded pixel
/// distance is under this many pixels (at the 300 dpi working scale).
pub const CONFIRM_TOLERANCE_PX: i64 = 10;

/// How far each observed fix sits from where a transform predicts it.
#[derive(Debug, Clone, PartialEq)]
pub struct FixDiff {
    pub fix_id: String,
    pub expected_x: f64,
    pub expected_y: f64,
    pub observed_x: f64,
    pub observed_y: f64,
    pub diff_px: i64,
}

impl FixDiff {
    pub fn agrees(&self) -> bool {
        self.diff_px < CONFIRM_TOLERANCE_PX
    }
}

/// Cursor and pass bookkeeping, persisted between invocations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowState {
    pub region: Option<String>,
    pub offset: u64,
    pub pass_started: DateTime<Utc>,
}

impl WorkflowState {
    fn fresh() -> Self {
        Self {
            region: None,
            offset: 0,
            pass_started: Utc::now(),
        }
    }

    pub fn load(path: &Path) -> Result<Self, GeorefError> {
        if !path.exists() {
            return Ok(Self::fresh());
        }
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), GeorefError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string_pretty(self)?)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Drop the saved cursor so the next session starts a new pass.
    pub fn reset(path: &Path) -> Result<(), GeorefError> {
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Disposition {
    Good,
    Bad { reason: String },
}

/// A plate waiting for the reviewer's call.
#[derive(Debug)]
pub struct PendingPlate {
    pub region: String,
    pub icao_id: String,
    pub faa_id: String,
    pub plate_id: String,
    /// How far through the region's worklist this plate sits.
    pub percent: f64,
    /// Discrepancies against the previously accepted transform; empty when
    /// the plate was never verified before.
    pub prior_diffs: Vec<FixDiff>,
    pub previously_verified: bool,
    /// Transform derived from the decoder's freshly detected fixes; absent
    /// when the decoder did not find two usable fixes.
    pub proposed: Option<Transform>,
    pub decoder_log: String,
    pub marked_png: Option<PathBuf>,
    /// Scanned source image, from the plate index.
    pub image_name: Option<String>,
}

#[derive(Debug)]
pub enum PlateOutcome {
    /// Auto-confirmed against the prior transform; no human needed.
    Confirmed {
        region: String,
        icao_id: String,
        plate_id: String,
        diffs: Vec<FixDiff>,
    },
    /// Needs a human disposition; submit one before processing further.
    PendingReview(PendingPlate),
    /// Reference data cannot support this plate (unknown airport, fewer
    /// than two usable fixes). Caller decides to skip or abort.
    RecordNotFound {
        region: String,
        icao_id: String,
        plate_id: String,
        reason: String,
    },
    /// All regions exhausted. Carries plates confirmed in earlier passes
    /// that this pass never reached.
    Done { missed: Vec<String> },
}

struct PendingAdvance {
    region: String,
    icao_id: String,
    faa_id: String,
    plate_id: String,
    next_offset: u64,
    proposed: Option<Transform>,
}

struct ResolvedFix {
    fix_id: String,
    point: FixPoint,
}

pub struct ReviewSession<'a> {
    datums: &'a Datums,
    db: &'a FixDatabase,
    store: &'a mut AcceptedStore,
    rejects: RejectLog,
    state_path: PathBuf,
    state: WorkflowState,
    pending: Option<PendingAdvance>,
}

impl<'a> ReviewSession<'a> {
    /// `workdata` holds the cursor file and the reject log; it is created
    /// on demand. A fresh cursor is persisted immediately so the pass
    /// start time survives across invocations.
    pub fn new(
        datums: &'a Datums,
        db: &'a FixDatabase,
        store: &'a mut AcceptedStore,
        workdata: &Path,
    ) -> Result<Self, GeorefError> {
        let state_path = workdata.join("review_state.json");
        let state = WorkflowState::load(&state_path)?;
        if !state_path.exists() {
            state.save(&state_path)?;
        }
        Ok(Self {
            datums,
            db,
            store,
            rejects: RejectLog::new(workdata.join("iaprejects")),
            state_path,
            state,
            pending: None,
        })
    }

    pub fn state(&self) -> &WorkflowState {
        &self.state
    }

    pub fn rejects(&self) -> &RejectLog {
        &self.rejects
    }

    /// Accepted plates this pass has not re-verified.
    pub fn missed_plates(&self) -> Vec<String> {
        self.store.missed_since(self.state.pass_started)
    }

    /// Advance to the next plate needing attention.
    ///
    /// Auto-confirmable plates are persisted and returned one at a time;
    /// the caller loops under its own time budget. The decoder only runs
    /// for plates that could not be confirmed automatically. A decoder
    /// failure is returned as an error with the cursor untouched, so the
    /// plate is retried on the next invocation.
    pub fn process_next_plate(
        &mut self,
        decoder: &dyn PlateDecoder,
    ) -> Result<PlateOutcome, GeorefError> {
        // a dropped pending disposition just reprocesses the same plate
        self.pending = None;

        loop {
            let worklist_dir = self.datums.worklist_dir();
            let region = match &self.state.region {
                Some(r) => r.clone(),
                None => match worklist::next_region(&worklist_dir, None)? {
                    Some(r) => {
                        self.enter_region(r.clone())?;
                        r
                    }
                    None => return self.finish_pass(),
                },
            };

            let wl_path = worklist_dir.join(format!("{}.csv", region));
            let Some((record, next_offset)) = worklist::read_plate_at(&wl_path, self.state.offset)?
            else {
                match worklist::next_region(&worklist_dir, Some(&region))? {
                    Some(next) => {
                        self.enter_region(next)?;
                        continue;
                    }
                    None => return self.finish_pass(),
                }
            };

            let Some(airport) = self.db.airport(&record.icao_id) else {
                self.pending = Some(PendingAdvance {
                    region: region.clone(),
                    icao_id: record.icao_id.clone(),
                    faa_id: String::new(),
                    plate_id: record.plate_id.clone(),
                    next_offset,
                    proposed: None,
                });
                return Ok(PlateOutcome::RecordNotFound {
                    region,
                    icao_id: record.icao_id.clone(),
                    plate_id: record.plate_id,
                    reason: format!("airport {} not in reference data", record.icao_id),
                });
            };
            let faa_id = airport.faa_id.clone();
            let airport_lat = airport.lat;

            if self.rejects.contains(&region, &faa_id, &record.plate_id)? {
                info!(
                    "{} {} previously rejected, skipping",
                    record.icao_id, record.plate_id
                );
                self.advance_to(next_offset)?;
                continue;
            }

            let resolved = self.resolve_fixes(&faa_id, &record.fixes);
            if resolved.len() != 2 {
                self.pending = Some(PendingAdvance {
                    region: region.clone(),
                    icao_id: record.icao_id.clone(),
                    faa_id,
                    plate_id: record.plate_id.clone(),
                    next_offset,
                    proposed: None,
                });
                return Ok(PlateOutcome::RecordNotFound {
                    region,
                    icao_id: record.icao_id,
                    plate_id: record.plate_id,
                    reason: format!("plate has {} usable fixes, needs 2", resolved.len()),
                });
            }

            let new_xfm = match Transform::compute(airport_lat, &resolved[0].point, &resolved[1].point)
            {
                Ok(x) => x,
                Err(e) => {
                    self.pending = Some(PendingAdvance {
                        region: region.clone(),
                        icao_id: record.icao_id.clone(),
                        faa_id,
                        plate_id: record.plate_id.clone(),
                        next_offset,
                        proposed: None,
                    });
                    return Ok(PlateOutcome::RecordNotFound {
                        region,
                        icao_id: record.icao_id,
                        plate_id: record.plate_id,
                        reason: e.to_string(),
                    });
                }
            };

            let prior = self
                .store
                .get(&record.icao_id, &record.plate_id)
                .map(|s| s.xfm);
            let prior_diffs: Vec<FixDiff> = prior
                .map(|old| diffs_against(&old, &resolved))
                .unwrap_or_default();

            if prior.is_some() {
                let agreeing = prior_diffs.iter().filter(|d| d.agrees()).count();
                if agreeing >= 2 {
                    self.store
                        .put(&record.icao_id, &record.plate_id, new_xfm);
                    self.store.save()?;
                    self.advance_to(next_offset)?;
                    info!(
                        "{} {} already verified ({})",
                        record.icao_id,
                        record.plate_id,
                        format_diffs(&prior_diffs)
                    );
                    return Ok(PlateOutcome::Confirmed {
                        region,
                        icao_id: record.icao_id,
                        plate_id: record.plate_id,
                        diffs: prior_diffs,
                    });
                }
            }

            // needs a human: rasterize a marked-up image and rebuild the
            // proposal from the decoder's own fresh detections
            let decoded = decoder.decode(&faa_id, &record.plate_id)?;
            let fresh: Vec<WorkFix> = decoded
                .fixes
                .iter()
                .map(|f| WorkFix {
                    fix_id: f.fix_id.clone(),
                    pixel_x: f.pixel_x,
                    pixel_y: f.pixel_y,
                })
                .collect();
            let fresh_resolved = self.resolve_fixes(&faa_id, &fresh);
            let proposed = if fresh_resolved.len() == 2 {
                Transform::compute(
                    airport_lat,
                    &fresh_resolved[0].point,
                    &fresh_resolved[1].point,
                )
                .ok()
            } else {
                None
            };

            let percent = worklist::progress_percent(&wl_path, self.state.offset);
            let image_name = self.datums.image_name(&region, &faa_id, &record.plate_id)?;

            self.pending = Some(PendingAdvance {
                region: region.clone(),
                icao_id: record.icao_id.clone(),
                faa_id: faa_id.clone(),
                plate_id: record.plate_id.clone(),
                next_offset,
                proposed,
            });
            return Ok(PlateOutcome::PendingReview(PendingPlate {
                region,
                icao_id: record.icao_id,
                faa_id,
                plate_id: record.plate_id,
                percent,
                previously_verified: prior.is_some(),
                prior_diffs,
                proposed,
                decoder_log: decoded.log,
                marked_png: decoded.marked_png,
                image_name,
            }));
        }
    }

    /// Apply the reviewer's decision to the pending plate and advance.
    ///
    /// `Good` persists the proposed transform as the accepted one; `Bad`
    /// appends to the reject log. Either way the plate is terminal for
    /// this pass.
    pub fn submit_disposition(&mut self, decision: &Disposition) -> Result<(), GeorefError> {
        let pending = self.pending.take().ok_or(GeorefError::NothingPending)?;
        match decision {
            Disposition::Good => {
                let xfm = pending.proposed.ok_or(GeorefError::NoProposal)?;
                self.store.put(&pending.icao_id, &pending.plate_id, xfm);
                self.store.save()?;
                info!("{} {} marked good", pending.icao_id, pending.plate_id);
            }
            Disposition::Bad { reason } => {
                self.rejects
                    .record(&pending.region, reason, &pending.faa_id, &pending.plate_id)?;
                info!(
                    "{} {} rejected: {}",
                    pending.icao_id, pending.plate_id, reason
                );
            }
        }
        self.advance_to(pending.next_offset)
    }

    /// Move past the pending plate without recording anything.
    pub fn skip_current(&mut self) -> Result<(), GeorefError> {
        let pending = self.pending.take().ok_or(GeorefError::NothingPending)?;
        self.advance_to(pending.next_offset)
    }

    fn enter_region(&mut self, region: String) -> Result<(), GeorefError> {
        self.state.region = Some(region);
        self.state.offset = 0;
        self.state.save(&self.state_path)
    }

    fn advance_to(&mut self, offset: u64) -> Result<(), GeorefError> {
        self.state.offset = offset;
        self.state.save(&self.state_path)
    }

    fn finish_pass(&mut self) -> Result<PlateOutcome, GeorefError> {
        Ok(PlateOutcome::Done {
            missed: self.missed_plates(),
        })
    }

    /// Look up each observed fix, dropping the ones the reference data
    /// does not know. A fix reported twice keeps its latest observation.
    fn resolve_fixes(&self, faa_id: &str, fixes: &[WorkFix]) -> Vec<ResolvedFix> {
        let mut resolved: Vec<ResolvedFix> = Vec::new();
        for fix in fixes {
            let Some(ll) = self.db.fix(faa_id, &fix.fix_id) else {
                warn!("fix {}.{} not found", faa_id, fix.fix_id);
                continue;
            };
            let point = FixPoint {
                lat: ll.lat,
                lon: ll.lon,
                pixel_x: fix.pixel_x,
                pixel_y: fix.pixel_y,
            };
            match resolved.iter_mut().find(|r| r.fix_id == fix.fix_id) {
                Some(existing) => existing.point = point,
                None => resolved.push(ResolvedFix {
                    fix_id: fix.fix_id.clone(),
                    point,
                }),
            }
        }
        resolved
    }
}

fn diffs_against(old: &Transform, resolved: &[ResolvedFix]) -> Vec<FixDiff> {
    resolved
        .iter()
        .map(|r| {
            let (ex, ey) = old.latlon_to_pixel(r.point.lat, r.point.lon);
            let diff = (ex - r.point.pixel_x).hypot(ey - r.point.pixel_y);
            FixDiff {
                fix_id: r.fix_id.clone(),
                expected_x: ex,
                expected_y: ey,
                observed_x: r.point.pixel_x,
                observed_y: r.point.pixel_y,
                diff_px: diff.round() as i64,
            }
        })
        .collect()
}

/// `(BOSOX 2; LWM 4)` style summary for logs and the review prompt.
pub fn format_diffs(diffs: &[FixDiff]) -> String {
    let parts: Vec<String> = diffs
        .iter()
        .map(|d| format!("{} {}", d.fix_id, d.diff_px))
        .collect();
    format!("({})", parts.join("; "))
}
