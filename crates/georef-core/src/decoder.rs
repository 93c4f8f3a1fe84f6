//! Seam to the out-of-process plate decoder.
//!
//! The decoder rasterizes a plate PDF, detects fixes on it, and prints one
//! indented `FIXID at X,Y` line per detection along with plenty of other
//! chatter. It is treated strictly as a black box: spawn it, fold stderr
//! into the log, and pull the fix lines out of the text.

use crate::GeorefError;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

#[derive(Debug, Clone, PartialEq)]
pub struct DecodedFix {
    pub fix_id: String,
    pub pixel_x: f64,
    pub pixel_y: f64,
}

#[derive(Debug, Clone)]
pub struct DecodedPlate {
    pub fixes: Vec<DecodedFix>,
    /// Full decoder output, shown to the reviewer alongside the image.
    pub log: String,
    /// Marked-up image written by the decoder, when it produced one.
    pub marked_png: Option<PathBuf>,
}

pub trait PlateDecoder {
    fn decode(&self, faa_id: &str, plate_id: &str) -> Result<DecodedPlate, GeorefError>;
}

/// Reduce a plate id to the character set safe for an image file name.
pub fn plate_file_id(plate_id: &str) -> String {
    let mut id = plate_id.replace("IAP-", "");
    for ch in [" ", "-", ".png", "(", ")", "\"", ","] {
        id = id.replace(ch, "");
    }
    id
}

/// Runs the external decoder command and parses its detected-fix lines.
pub struct CommandDecoder {
    program: String,
    base_args: Vec<String>,
    marked_dir: PathBuf,
}

impl CommandDecoder {
    pub fn new<P: AsRef<Path>>(program: &str, marked_dir: P) -> Self {
        Self {
            program: program.to_string(),
            base_args: Vec::new(),
            marked_dir: marked_dir.as_ref().to_path_buf(),
        }
    }

    /// Pin the decoder to the snapshot's dataset cycles.
    pub fn with_cycles(mut self, cycle28: u32, cycle56: u32) -> Self {
        self.base_args.extend([
            "-cycles28".to_string(),
            cycle28.to_string(),
            "-cycles56".to_string(),
            cycle56.to_string(),
        ]);
        self
    }

    /// Detected-fix lines look like `  BOSOX at 512,1033`: two leading
    /// spaces, then exactly three tokens.
    pub fn parse_fix_lines(text: &str) -> Vec<DecodedFix> {
        let re = Regex::new(r"^  (\S+) at (-?\d+),(-?\d+)\s*$").unwrap();
        let mut fixes = Vec::new();
        for line in text.lines() {
            if let Some(cap) = re.captures(line) {
                fixes.push(DecodedFix {
                    fix_id: cap[1].to_string(),
                    pixel_x: cap[2].parse().unwrap_or(0.0),
                    pixel_y: cap[3].parse().unwrap_or(0.0),
                });
            }
        }
        fixes
    }
}

impl PlateDecoder for CommandDecoder {
    fn decode(&self, faa_id: &str, plate_id: &str) -> Result<DecodedPlate, GeorefError> {
        let png_name = format!("{}-{}.png", faa_id, plate_file_id(plate_id));
        let marked_png = self.marked_dir.join(png_name);
        // stale image from an earlier run would mask a decoder failure
        let _ = fs::remove_file(&marked_png);

        let output = Command::new(&self.program)
            .args(&self.base_args)
            .arg(faa_id)
            .arg(plate_id)
            .arg("-markedpng")
            .arg(&marked_png)
            .arg("-verbose")
            .output()
            .map_err(|e| GeorefError::Decoder {
                faa_id: faa_id.to_string(),
                plate_id: plate_id.to_string(),
                reason: format!("failed to start {}: {}", self.program, e),
            })?;

        let mut log = String::from_utf8_lossy(&output.stdout).into_owned();
        log.push_str(&String::from_utf8_lossy(&output.stderr));

        if !output.status.success() {
            return Err(GeorefError::Decoder {
                faa_id: faa_id.to_string(),
                plate_id: plate_id.to_string(),
                reason: format!("exited with {}: {}", output.status, last_lines(&log, 3)),
            });
        }

        let fixes = Self::parse_fix_lines(&log);
        let marked_png = marked_png.exists().then_some(marked_png);
        Ok(DecodedPlate {
            fixes,
            log,
            marked_png,
        })
    }
}

fn last_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].join(" | ")
}
