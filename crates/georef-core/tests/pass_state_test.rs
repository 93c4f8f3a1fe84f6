use chrono::{Duration, Utc};
use georef_core::decoder::{DecodedFix, DecodedPlate, PlateDecoder};
use georef_core::review::{PlateOutcome, ReviewSession};
use georef_core::store::AcceptedStore;
use georef_core::transform::Transform;
use georef_core::waypoints::FixDatabase;
use georef_core::{Datums, GeorefError};
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

const LWM: (f64, f64) = (42.7272, -71.0956);
const TAITS: (f64, f64) = (42.6461, -70.6869);

struct MockDatums {
    _dir: TempDir,
    pub datums: Datums,
    pub db: FixDatabase,
    pub workdata: PathBuf,
}

/// Datums tree with arbitrary per-region worklists.
fn mock_datums(worklists: &[(&str, &str)]) -> MockDatums {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let root = dir.path();

    fs::write(root.join("aptplates_expdate.dat"), "20250904").unwrap();
    fs::write(root.join("aptinfo_expdate.dat"), "20251002").unwrap();
    fs::write(
        root.join("airports_20251002.csv"),
        "KBVY,BVY,107,\"Beverly Rgnl\",42.5841,-70.9161,-15,\"Beverly MA\",MA\n\
         KASH,ASH,199,\"Boire Field\",42.7817,-71.5148,-15,\"Nashua NH\",NH\n",
    )
    .unwrap();
    fs::write(
        root.join("fixes_20251002.csv"),
        format!("TAITS,{},{}\n", TAITS.0, TAITS.1),
    )
    .unwrap();
    fs::write(root.join("localizers_20251002.csv"), "").unwrap();
    fs::write(
        root.join("navaids_20251002.csv"),
        format!("VOR,LWM,\"Lawrence\",MA,{},{}\n", LWM.0, LWM.1),
    )
    .unwrap();
    fs::write(root.join("runways_20251002.csv"), "").unwrap();

    let wl_dir = root.join("iapgeorefs_20250904");
    fs::create_dir_all(&wl_dir).unwrap();
    for (region, content) in worklists {
        fs::write(wl_dir.join(format!("{}.csv", region)), content).unwrap();
    }

    let workdata = root.join("workdata");
    fs::create_dir_all(&workdata).unwrap();

    let datums = Datums::open(root).unwrap();
    let db = FixDatabase::load(&datums).unwrap();
    MockDatums {
        _dir: dir,
        datums,
        db,
        workdata,
    }
}

fn open_store(mock: &MockDatums) -> AcceptedStore {
    AcceptedStore::open(mock.workdata.join("good_20251002.json")).unwrap()
}

/// Accepted transform that still matches the worklist observations, so the
/// plate auto-confirms.
fn exact_transform(f1: ((f64, f64), (f64, f64)), f2: ((f64, f64), (f64, f64))) -> Transform {
    let ((lat1, lon1), (x1, y1)) = f1;
    let ((lat2, lon2), (x2, y2)) = f2;
    let ppd_lon = (x2 - x1) / (lon2 - lon1);
    let ppd_lat = (y2 - y1) / (lat2 - lat1);
    Transform::from([
        ppd_lon,
        ppd_lat,
        lon1 - x1 / ppd_lon,
        lat1 - y1 / ppd_lat,
        0.0,
        0.0,
    ])
}

struct NullDecoder;

impl PlateDecoder for NullDecoder {
    fn decode(&self, faa_id: &str, plate_id: &str) -> Result<DecodedPlate, GeorefError> {
        Ok(DecodedPlate {
            fixes: vec![
                DecodedFix {
                    fix_id: "LWM".to_string(),
                    pixel_x: 200.0,
                    pixel_y: 300.0,
                },
                DecodedFix {
                    fix_id: "TAITS".to_string(),
                    pixel_x: 1200.0,
                    pixel_y: 500.0,
                },
            ],
            log: format!("decoded {} {}", faa_id, plate_id),
            marked_png: None,
        })
    }
}

struct FailingDecoder;

impl PlateDecoder for FailingDecoder {
    fn decode(&self, faa_id: &str, plate_id: &str) -> Result<DecodedPlate, GeorefError> {
        Err(GeorefError::Decoder {
            faa_id: faa_id.to_string(),
            plate_id: plate_id.to_string(),
            reason: "simulated crash".to_string(),
        })
    }
}

const MA_WORKLIST: &str = "\
KBVY,\"IAP-ILS RWY 16\",LWM,200,300\n\
KBVY,\"IAP-ILS RWY 16\",TAITS,1200,500\n";

const NH_WORKLIST: &str = "\
KASH,\"IAP-RNAV (GPS) RWY 14\",LWM,400,600\n\
KASH,\"IAP-RNAV (GPS) RWY 14\",TAITS,1500,800\n";

#[test]
fn test_empty_worklist_is_done_immediately() {
    let mock = mock_datums(&[("MA", "")]);
    let mut store = open_store(&mock);
    let mut session =
        ReviewSession::new(&mock.datums, &mock.db, &mut store, &mock.workdata).unwrap();
    match session.process_next_plate(&NullDecoder).unwrap() {
        PlateOutcome::Done { missed } => assert!(missed.is_empty()),
        other => panic!("expected Done, got {:?}", other),
    }
}

#[test]
fn test_no_region_files_is_done() {
    let mock = mock_datums(&[]);
    let mut store = open_store(&mock);
    let mut session =
        ReviewSession::new(&mock.datums, &mock.db, &mut store, &mock.workdata).unwrap();
    assert!(matches!(
        session.process_next_plate(&NullDecoder).unwrap(),
        PlateOutcome::Done { .. }
    ));
}

#[test]
fn test_pass_walks_regions_in_order_and_reports_missed() {
    let mock = mock_datums(&[("NH", NH_WORKLIST), ("MA", MA_WORKLIST)]);
    let mut store = open_store(&mock);
    let pass_eve = Utc::now() - Duration::days(28);
    store.put_at(
        "KBVY",
        "IAP-ILS RWY 16",
        exact_transform((LWM, (200.0, 300.0)), (TAITS, (1200.0, 500.0))),
        pass_eve,
    );
    store.put_at(
        "KASH",
        "IAP-RNAV (GPS) RWY 14",
        exact_transform((LWM, (400.0, 600.0)), (TAITS, (1500.0, 800.0))),
        pass_eve,
    );
    // confirmed last cycle, no longer in any worklist
    store.put_at(
        "KOLD",
        "IAP-GONE RWY 1",
        exact_transform((LWM, (1.0, 2.0)), (TAITS, (30.0, 40.0))),
        pass_eve,
    );
    store.save().unwrap();

    let mut session =
        ReviewSession::new(&mock.datums, &mock.db, &mut store, &mock.workdata).unwrap();

    // MA sorts before NH even though NH was written first
    match session.process_next_plate(&NullDecoder).unwrap() {
        PlateOutcome::Confirmed { region, icao_id, .. } => {
            assert_eq!(region, "MA");
            assert_eq!(icao_id, "KBVY");
        }
        other => panic!("expected MA confirmation, got {:?}", other),
    }
    match session.process_next_plate(&NullDecoder).unwrap() {
        PlateOutcome::Confirmed { region, icao_id, .. } => {
            assert_eq!(region, "NH");
            assert_eq!(icao_id, "KASH");
        }
        other => panic!("expected NH confirmation, got {:?}", other),
    }
    match session.process_next_plate(&NullDecoder).unwrap() {
        PlateOutcome::Done { missed } => {
            assert_eq!(missed, vec!["KOLD:IAP-GONE RWY 1"]);
        }
        other => panic!("expected Done, got {:?}", other),
    }
}

#[test]
fn test_cursor_resumes_across_sessions() {
    let worklist = format!("{}{}", MA_WORKLIST, "KBVY,\"IAP-VOR RWY 34\",LWM,210,310\nKBVY,\"IAP-VOR RWY 34\",TAITS,1210,510\n");
    let mock = mock_datums(&[("MA", &worklist)]);
    let mut store = open_store(&mock);
    store.put(
        "KBVY",
        "IAP-ILS RWY 16",
        exact_transform((LWM, (200.0, 300.0)), (TAITS, (1200.0, 500.0))),
    );
    store.save().unwrap();

    {
        let mut session =
            ReviewSession::new(&mock.datums, &mock.db, &mut store, &mock.workdata).unwrap();
        match session.process_next_plate(&NullDecoder).unwrap() {
            PlateOutcome::Confirmed { plate_id, .. } => assert_eq!(plate_id, "IAP-ILS RWY 16"),
            other => panic!("expected confirmation, got {:?}", other),
        }
    }

    // a brand-new session picks up at the second plate
    let mut session =
        ReviewSession::new(&mock.datums, &mock.db, &mut store, &mock.workdata).unwrap();
    match session.process_next_plate(&NullDecoder).unwrap() {
        PlateOutcome::PendingReview(p) => assert_eq!(p.plate_id, "IAP-VOR RWY 34"),
        other => panic!("expected second plate, got {:?}", other),
    }
}

#[test]
fn test_decoder_failure_leaves_plate_for_retry() {
    let mock = mock_datums(&[("MA", MA_WORKLIST)]);
    let mut store = open_store(&mock);

    let mut session =
        ReviewSession::new(&mock.datums, &mock.db, &mut store, &mock.workdata).unwrap();
    let err = session.process_next_plate(&FailingDecoder).unwrap_err();
    assert!(matches!(err, GeorefError::Decoder { .. }));
    assert_eq!(session.state().offset, 0, "cursor must not advance");

    // same plate comes back once the decoder works again
    match session.process_next_plate(&NullDecoder).unwrap() {
        PlateOutcome::PendingReview(p) => assert_eq!(p.plate_id, "IAP-ILS RWY 16"),
        other => panic!("expected retry of same plate, got {:?}", other),
    }
}

#[test]
fn test_unknown_airport_reports_record_not_found() {
    let worklist = "\
KZZZ,\"IAP-ILS RWY 1\",LWM,100,100\n\
KZZZ,\"IAP-ILS RWY 1\",TAITS,900,900\n\
KBVY,\"IAP-ILS RWY 16\",LWM,200,300\n\
KBVY,\"IAP-ILS RWY 16\",TAITS,1200,500\n";
    let mock = mock_datums(&[("MA", worklist)]);
    let mut store = open_store(&mock);

    let mut session =
        ReviewSession::new(&mock.datums, &mock.db, &mut store, &mock.workdata).unwrap();
    match session.process_next_plate(&NullDecoder).unwrap() {
        PlateOutcome::RecordNotFound { icao_id, reason, .. } => {
            assert_eq!(icao_id, "KZZZ");
            assert!(reason.contains("KZZZ"));
        }
        other => panic!("expected RecordNotFound, got {:?}", other),
    }

    session.skip_current().unwrap();
    match session.process_next_plate(&NullDecoder).unwrap() {
        PlateOutcome::PendingReview(p) => assert_eq!(p.icao_id, "KBVY"),
        other => panic!("expected next plate, got {:?}", other),
    }
}

#[test]
fn test_plate_with_unknown_fix_reports_record_not_found() {
    let worklist = "\
KBVY,\"IAP-ILS RWY 16\",NOFIX,200,300\n\
KBVY,\"IAP-ILS RWY 16\",TAITS,1200,500\n";
    let mock = mock_datums(&[("MA", worklist)]);
    let mut store = open_store(&mock);

    let mut session =
        ReviewSession::new(&mock.datums, &mock.db, &mut store, &mock.workdata).unwrap();
    match session.process_next_plate(&NullDecoder).unwrap() {
        PlateOutcome::RecordNotFound { reason, .. } => {
            assert!(reason.contains("usable fixes"), "reason: {}", reason);
        }
        other => panic!("expected RecordNotFound, got {:?}", other),
    }
}
