use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use georef_core::contrib::ContribStore;
use georef_core::decoder::CommandDecoder;
use georef_core::review::{
    format_diffs, Disposition, PlateOutcome, ReviewSession, WorkflowState,
};
use georef_core::store::AcceptedStore;
use georef_core::waypoints::FixDatabase;
use georef_core::{Datums, GeorefError};
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the datums snapshot root
    #[arg(short, long, env = "GEOREF_DATUMS")]
    datums: PathBuf,

    /// Directory for cursor state, stores and reject logs
    #[arg(short, long, env = "GEOREF_WORKDATA")]
    workdata: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Verify plates, prompting for a disposition when one is needed
    Review {
        /// External decoder command used to produce marked-up images
        #[arg(long, default_value = "DecodePlate")]
        decoder: String,
        /// Stop after this many plates
        #[arg(long, default_value_t = 500)]
        limit: usize,
        /// Never prompt; stop at the first plate needing review
        #[arg(long)]
        batch: bool,
    },
    /// List confirmed plates the current pass has not reached
    Missed,
    /// List rejected plates for a region
    Rejects { region: String },
    /// Forget the cursor so the next review starts a new pass
    Reset,
    /// Resolve a fix position near an airport
    Lookup { faa_id: String, fix_id: String },
    /// List contributed manual georeferences
    Contribs {
        /// Only contributions entered in the last N days
        #[arg(long)]
        days: Option<i64>,
    },
}

fn main() -> Result<()> {
    simplelog::TermLogger::init(
        simplelog::LevelFilter::Info,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )
    .ok();

    let cli = Cli::parse();

    let workdata = match cli.workdata {
        Some(path) => path,
        None => directories::ProjectDirs::from("org", "outerworldcharts", "plate-georef")
            .map(|dirs| dirs.config_dir().join("workdata"))
            .unwrap_or_else(|| PathBuf::from("workdata")),
    };

    let datums = Datums::open(&cli.datums)
        .with_context(|| format!("opening datums root {:?}", cli.datums))?;

    match &cli.command {
        Commands::Review {
            decoder,
            limit,
            batch,
        } => run_review(&datums, &workdata, decoder, *limit, *batch),
        Commands::Missed => {
            let db = FixDatabase::load(&datums)?;
            let mut store = open_store(&datums, &workdata)?;
            let session = ReviewSession::new(&datums, &db, &mut store, &workdata)?;
            let missed = session.missed_plates();
            if missed.is_empty() {
                println!("No missing plates since last check.");
            } else {
                println!("Missing plates (re-run the decoder pipeline for these):");
                for key in missed {
                    println!("  {}", key);
                }
            }
            Ok(())
        }
        Commands::Rejects { region } => {
            let log = georef_core::rejects::RejectLog::new(workdata.join("iaprejects"));
            let entries = log.list(region)?;
            if entries.is_empty() {
                println!("No rejects recorded for {}", region);
            }
            for e in entries {
                println!("{} {} \"{}\" ({})", e.region, e.faa_id, e.plate_id, e.reason);
            }
            Ok(())
        }
        Commands::Reset => {
            WorkflowState::reset(&workdata.join("review_state.json"))?;
            println!("Cursor cleared; next review starts a fresh pass.");
            Ok(())
        }
        Commands::Lookup { faa_id, fix_id } => {
            let db = FixDatabase::load(&datums)?;
            match db.fix(faa_id, fix_id) {
                Some(ll) => println!("{}.{} at {:.6},{:.6}", faa_id, fix_id, ll.lat, ll.lon),
                None => println!("{}.{} not found", faa_id, fix_id),
            }
            Ok(())
        }
        Commands::Contribs { days } => {
            let store = ContribStore::open(workdata.join("manual_georefs.json"))?;
            let since = (*days).map(|d| chrono::Utc::now() - chrono::Duration::days(d));
            let mut shown = 0;
            for c in store.since(since.unwrap_or(chrono::DateTime::<chrono::Utc>::UNIX_EPOCH)) {
                println!(
                    "{} \"{}\" eff {} by {} ({} points, entered {})",
                    c.icao_id,
                    c.plate_id,
                    c.eff_date,
                    c.username,
                    c.mapping.len(),
                    c.entered.format("%Y-%m-%d")
                );
                shown += 1;
            }
            if shown == 0 {
                println!("No contributions recorded.");
            }
            Ok(())
        }
    }
}

fn open_store(datums: &Datums, workdata: &std::path::Path) -> Result<AcceptedStore> {
    let path = workdata.join(format!("good_{}.json", datums.cycle56));
    AcceptedStore::open(&path).with_context(|| format!("opening accepted store {:?}", path))
}

fn run_review(
    datums: &Datums,
    workdata: &std::path::Path,
    decoder_cmd: &str,
    limit: usize,
    batch: bool,
) -> Result<()> {
    let db = FixDatabase::load(datums).context("loading waypoint reference data")?;
    let mut store = open_store(datums, workdata)?;

    let marked_dir = workdata.join("marked");
    fs::create_dir_all(&marked_dir)?;
    let decoder =
        CommandDecoder::new(decoder_cmd, &marked_dir).with_cycles(datums.cycle28, datums.cycle56);

    let mut session = ReviewSession::new(datums, &db, &mut store, workdata)?;

    for _ in 0..limit {
        match session.process_next_plate(&decoder) {
            Ok(PlateOutcome::Confirmed {
                region,
                icao_id,
                plate_id,
                diffs,
            }) => {
                println!(
                    "{} {} \"{}\" already verified {}",
                    region,
                    icao_id,
                    plate_id,
                    format_diffs(&diffs)
                );
            }
            Ok(PlateOutcome::PendingReview(pending)) => {
                println!();
                println!(
                    "=== {} {} \"{}\" ({:.0}% of region) ===",
                    pending.region, pending.icao_id, pending.plate_id, pending.percent
                );
                if pending.previously_verified {
                    println!("previous verification diffs {}", format_diffs(&pending.prior_diffs));
                } else {
                    println!("not previously verified");
                }
                if let Some(png) = &pending.marked_png {
                    println!("marked image: {}", png.display());
                }
                if let Some(name) = &pending.image_name {
                    println!("source image: {}", name);
                }
                println!("{}", pending.decoder_log.trim_end());

                if batch {
                    println!("(batch mode: stopping at plate needing review)");
                    break;
                }
                if !prompt_disposition(&mut session, pending.proposed.is_some())? {
                    break;
                }
            }
            Ok(PlateOutcome::RecordNotFound {
                region,
                icao_id,
                plate_id,
                reason,
            }) => {
                println!("{} {} \"{}\": {} (skipping)", region, icao_id, plate_id, reason);
                session.skip_current()?;
            }
            Ok(PlateOutcome::Done { missed }) => {
                if !missed.is_empty() {
                    println!("Missing plates (confirmed before this pass, not reached now):");
                    for key in &missed {
                        println!("  {}", key);
                    }
                }
                println!("ALL DONE");
                break;
            }
            Err(e @ GeorefError::Decoder { .. }) => {
                // cursor untouched; the plate is retried next invocation
                eprintln!("{}", e);
                break;
            }
            Err(e) => return Err(e.into()),
        }
    }

    Ok(())
}

/// Ask the operator for a disposition. Returns false when the session
/// should end.
fn prompt_disposition(session: &mut ReviewSession<'_>, has_proposal: bool) -> Result<bool> {
    let stdin = io::stdin();
    loop {
        if has_proposal {
            print!("disposition [good / bad <reason> / skip / quit]: ");
        } else {
            print!("no usable transform [bad <reason> / skip / quit]: ");
        }
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            return Ok(false);
        }
        let line = line.trim();

        if line == "good" && has_proposal {
            session.submit_disposition(&Disposition::Good)?;
            return Ok(true);
        }
        if let Some(reason) = line.strip_prefix("bad") {
            let reason = reason.trim();
            if !reason.is_empty() {
                session.submit_disposition(&Disposition::Bad {
                    reason: reason.to_string(),
                })?;
                return Ok(true);
            }
            println!("give a reason, e.g. 'bad missed marker'");
            continue;
        }
        match line {
            "skip" => {
                session.skip_current()?;
                return Ok(true);
            }
            "quit" => return Ok(false),
            _ => println!("unrecognized input"),
        }
    }
}
