use ftw_runner::app::jobs::{DownloadJob, InferenceJob, ModelSource, SetupJob};
use ftw_runner::app::Toolchain;
use ftw_runner::core::catalog::{CloudLadder, StacCatalog};
use ftw_runner::core::models::ModelRegistry;
use ftw_runner::core::runner::ScriptRunner;
use ftw_runner::core::windows::calculate_window_dates_str;
use ftw_runner::domain::model::{GeoPoint, JobEvent, Region};
use ftw_runner::domain::ports::Job;
use ftw_runner::{FtwError, JobEngine};
use httpmock::prelude::*;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Shell functions standing in for `conda` and the `ftw` CLI.
const FAKE_CONDA: &str = r#"
conda() {
    case "$1" in
        env) printf 'base /opt/conda\nftw_test /opt/conda/envs/ftw_test\n' ;;
        *) return 0 ;;
    esac
}
ftw() {
    local action="$2"
    shift 2
    local out=""
    local target=""
    while [ $# -gt 0 ]; do
        case "$1" in
            --out) out="$2"; shift 2 ;;
            --model|--simplify|--win_a|--win_b|--bbox) shift 2 ;;
            --*) shift ;;
            *) target="$1"; shift ;;
        esac
    done
    case "$action" in
        --help) return 0 ;;
        download|run) echo "ftw $action writing $out"; printf 'raster' > "$out" ;;
        polygonize) printf 'polygons' > "${target%.tif}.parquet" ;;
    esac
}
"#;

const BROKEN_FTW: &str = r#"
conda() { return 0; }
ftw() {
    echo "RuntimeError: CUDA device not available" >&2
    return 1
}
"#;

fn fake_toolchain(dir: &Path, functions: &str) -> Toolchain {
    let conda_sh = dir.join("conda.sh");
    std::fs::write(&conda_sh, functions).unwrap();
    Toolchain {
        conda_setup: conda_sh,
        env_name: "ftw_test".to_string(),
        runner: ScriptRunner::new(),
    }
}

/// Little-endian classic TIFF with only a SamplesPerPixel entry.
fn write_tiff(path: &Path, bands: u16) {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(b"II");
    bytes.extend_from_slice(&42u16.to_le_bytes());
    bytes.extend_from_slice(&8u32.to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes());
    bytes.extend_from_slice(&277u16.to_le_bytes());
    bytes.extend_from_slice(&3u16.to_le_bytes());
    bytes.extend_from_slice(&1u32.to_le_bytes());
    bytes.extend_from_slice(&bands.to_le_bytes());
    bytes.extend_from_slice(&[0, 0]);
    bytes.extend_from_slice(&0u32.to_le_bytes());
    std::fs::write(path, bytes).unwrap();
}

async fn run_with_events(job: Arc<dyn Job>) -> (Result<String, FtwError>, Vec<JobEvent>) {
    let engine = JobEngine::new();
    let handle = engine.start(job).unwrap();
    let mut events = Vec::new();
    let result = handle.wait(|event| events.push(event.clone())).await;
    assert!(!engine.is_busy());
    (result, events)
}

fn percents(events: &[JobEvent]) -> Vec<u8> {
    events
        .iter()
        .filter_map(|e| match e {
            JobEvent::Progress(p) => Some(p.percent),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_setup_job_reports_milestones() {
    let dir = TempDir::new().unwrap();
    let job = SetupJob {
        toolchain: fake_toolchain(dir.path(), FAKE_CONDA),
        python_version: "3.9".to_string(),
        conda_packages: vec!["gdal".to_string()],
        pip_packages: vec!["ftw-tools".to_string()],
    };

    let (result, events) = run_with_events(Arc::new(job)).await;

    assert_eq!(result.unwrap(), "Environment 'ftw_test' is ready");
    assert_eq!(percents(&events), vec![0, 25, 50, 75, 90, 100]);
    assert!(matches!(events.last(), Some(JobEvent::Finished(Ok(_)))));
}

#[tokio::test]
async fn test_download_job_end_to_end() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/search")
                .body_contains(r#""datetime":"2024-05-17/2024-06-16""#);
            then.status(200).json_body(json!({
                "features": [{ "id": "S2_WIN_A", "properties": { "eo:cloud_cover": 4.0 } }]
            }));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/search")
                .body_contains(r#""datetime":"2024-10-31/2024-11-30""#);
            then.status(200).json_body(json!({
                "features": [{ "id": "S2_WIN_B", "properties": { "eo:cloud_cover": 9.0 } }]
            }));
        })
        .await;

    let dir = TempDir::new().unwrap();
    let output_path = dir.path().join("out").join("stack.tif");
    let job = DownloadJob {
        catalog: Arc::new(
            StacCatalog::new(&server.base_url(), "sentinel-2-l2a", Duration::from_secs(5))
                .unwrap(),
        ),
        region: Region::new(GeoPoint::new(30.0, -1.9), GeoPoint::new(30.2, -2.1)),
        windows: calculate_window_dates_str("2024-06-01", "2024-11-30").unwrap(),
        ladder: CloudLadder::default(),
        output_path: output_path.clone(),
        toolchain: Some(fake_toolchain(dir.path(), FAKE_CONDA)),
    };

    let (result, events) = run_with_events(Arc::new(job)).await;

    let message = result.unwrap();
    assert!(message.contains("stack.tif"));
    assert_eq!(std::fs::read(&output_path).unwrap(), b"raster");
    assert_eq!(percents(&events), vec![5, 40, 60, 100]);
    assert!(events.contains(&JobEvent::Info("Window A scene: S2_WIN_A".to_string())));
}

#[tokio::test]
async fn test_download_job_search_only() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/search");
            then.status(200).json_body(json!({
                "features": [{ "id": "S2_ANY", "properties": { "eo:cloud_cover": 1.0 } }]
            }));
        })
        .await;

    let job = DownloadJob {
        catalog: Arc::new(
            StacCatalog::new(&server.base_url(), "sentinel-2-l2a", Duration::from_secs(5))
                .unwrap(),
        ),
        region: Region::new(GeoPoint::new(-58.5, -34.5), GeoPoint::new(-58.3, -34.7)),
        windows: calculate_window_dates_str("2024-06-01", "2024-11-30").unwrap(),
        ladder: CloudLadder::default(),
        output_path: PathBuf::from("unused.tif"),
        toolchain: None,
    };

    let (result, _) = run_with_events(Arc::new(job)).await;
    let message = result.unwrap();
    assert!(message.starts_with("win_a=S2_ANY win_b=S2_ANY"));
}

#[tokio::test]
async fn test_inference_job_with_polygonize() {
    let dir = TempDir::new().unwrap();
    let raster = dir.path().join("stack.tif");
    write_tiff(&raster, 8);
    let checkpoint = dir.path().join("3_Class_FULL_FTW_Pretrained.ckpt");
    std::fs::write(&checkpoint, b"weights").unwrap();
    let output_path = dir.path().join("results").join("fields.tif");

    let job = InferenceJob {
        toolchain: fake_toolchain(dir.path(), FAKE_CONDA),
        registry: Arc::new(ModelRegistry::with_release_models(dir.path().join("models"))),
        raster_path: raster,
        model: ModelSource::Checkpoint(checkpoint),
        output_path: output_path.clone(),
        polygonize: Some(20.0),
    };

    let (result, events) = run_with_events(Arc::new(job)).await;

    assert!(result.unwrap().contains("fields.tif"));
    assert!(output_path.is_file());
    assert!(dir.path().join("results").join("fields.parquet").is_file());
    assert!(dir
        .path()
        .join("models")
        .join("3_Class_FULL_FTW_Pretrained.ckpt")
        .is_file());
    assert_eq!(percents(&events), vec![45, 85, 90, 95, 100]);
}

#[tokio::test]
async fn test_inference_rejects_wrong_band_count() {
    let dir = TempDir::new().unwrap();
    let raster = dir.path().join("rgb.tif");
    write_tiff(&raster, 3);

    let job = InferenceJob {
        toolchain: fake_toolchain(dir.path(), FAKE_CONDA),
        registry: Arc::new(ModelRegistry::with_release_models(dir.path().join("models"))),
        raster_path: raster,
        model: ModelSource::Known("FTW 3 Classes".to_string()),
        output_path: dir.path().join("fields.tif"),
        polygonize: None,
    };

    let (result, events) = run_with_events(Arc::new(job)).await;

    assert!(matches!(result, Err(FtwError::InvalidRaster { .. })));
    assert!(percents(&events).is_empty());
    assert!(matches!(events.last(), Some(JobEvent::Finished(Err(_)))));
}

#[tokio::test]
async fn test_failed_inference_surfaces_error_lines_and_stderr() {
    let dir = TempDir::new().unwrap();
    let raster = dir.path().join("stack.tif");
    write_tiff(&raster, 8);
    let checkpoint = dir.path().join("custom.ckpt");
    std::fs::write(&checkpoint, b"weights").unwrap();

    let job = InferenceJob {
        toolchain: fake_toolchain(dir.path(), BROKEN_FTW),
        registry: Arc::new(ModelRegistry::with_release_models(dir.path().join("models"))),
        raster_path: raster,
        model: ModelSource::Checkpoint(checkpoint),
        output_path: dir.path().join("fields.tif"),
        polygonize: None,
    };

    let (result, events) = run_with_events(Arc::new(job)).await;

    match result {
        Err(FtwError::Subprocess {
            context,
            exit_code,
            message,
        }) => {
            assert_eq!(context, "Process");
            assert_eq!(exit_code, Some(1));
            assert!(message.contains("Inference failed"));
            assert!(message.contains("CUDA device not available"));
        }
        other => panic!("expected subprocess error, got {:?}", other),
    }
    assert!(events.contains(&JobEvent::Error("Inference failed".to_string())));
    assert!(!dir.path().join("fields.tif").exists());
}
