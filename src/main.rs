use anyhow::Context;
use clap::Parser;
use ftw_runner::app::jobs::{DownloadJob, InferenceJob, ModelSource, SetupJob};
use ftw_runner::app::{normalize_output_path, Toolchain};
use ftw_runner::config::cli::{Command, DownloadArgs, InferArgs, SeasonArgs, SettingsAction};
use ftw_runner::core::bbox::{format_coordinates, parse_coordinates};
use ftw_runner::core::catalog::{CloudLadder, StacCatalog};
use ftw_runner::core::conda::{expand_home, locate_setup_script, resolve_setup_script};
use ftw_runner::core::models::ModelRegistry;
use ftw_runner::core::raster::{band_count, EXPECTED_BANDS};
use ftw_runner::core::runner::ScriptRunner;
use ftw_runner::core::season::{SeasonDateUpdater, SeasonTable};
use ftw_runner::core::windows::{calculate_window_dates, calculate_window_dates_str, parse_date};
use ftw_runner::domain::model::{Composite, Crs, JobEvent, SeasonWindows};
use ftw_runner::domain::ports::Job;
use ftw_runner::utils::error::ErrorSeverity;
use ftw_runner::utils::{logger, validation::Validate};
use ftw_runner::{CliConfig, FtwError, JobEngine, Result, RunConfig, SettingsStore};
use std::path::Path;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = CliConfig::parse();

    // 初始化日誌
    if cli.log_json {
        logger::init_json_logger();
    } else {
        logger::init_cli_logger(cli.verbose);
    }

    tracing::info!("Starting ftw-runner");
    if cli.verbose {
        tracing::debug!("CLI config: {:?}", cli);
    }
    if cli.monitor {
        tracing::info!("🔍 Process monitoring enabled");
    }

    let result = match cli.validate() {
        Ok(()) => run(&cli).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(Some(message)) => {
            tracing::info!("✅ {}", message);
            println!("✅ {}", message);
        }
        Ok(None) => {}
        Err(e) => {
            // 記錄詳細錯誤信息
            tracing::error!(
                "❌ {} (Category: {:?}, Severity: {:?})",
                e,
                e.category(),
                e.severity()
            );
            tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

            eprintln!("❌ {}", e.user_friendly_message());
            eprintln!("💡 建議: {}", e.recovery_suggestion());

            // 根據錯誤嚴重程度決定退出碼
            let exit_code = match e.severity() {
                ErrorSeverity::Low => 0,
                ErrorSeverity::Medium => 2,
                ErrorSeverity::High => 1,
                ErrorSeverity::Critical => 3,
            };
            if exit_code > 0 {
                std::process::exit(exit_code);
            }
        }
    }

    if let Command::Settings {
        action: SettingsAction::Show,
    } = &cli.command
    {
        let store = settings_store(&cli);
        let rendered = serde_json::to_string_pretty(&store.load())
            .context("failed to render settings")?;
        println!("{}", rendered);
        println!("(stored at {})", store.path().display());
    }

    Ok(())
}

fn settings_store(cli: &CliConfig) -> SettingsStore {
    match &cli.settings_file {
        Some(path) => SettingsStore::new(path),
        None => SettingsStore::default_location(),
    }
}

fn load_run_config(cli: &CliConfig) -> Result<RunConfig> {
    let config = RunConfig::load_or_default(cli.config.as_deref())?;
    config.validate()?;
    Ok(config)
}

/// `Some(message)` is printed as the final success line.
async fn run(cli: &CliConfig) -> Result<Option<String>> {
    match &cli.command {
        Command::Windows { sos, eos } => {
            let windows = calculate_window_dates_str(sos, eos)?;
            print_windows(&windows);
            Ok(None)
        }
        Command::Bbox { coordinates } => {
            let parsed = parse_coordinates(coordinates)?;
            println!("center:       {:.6}, {:.6}", parsed.center.lon, parsed.center.lat);
            println!(
                "top-left:     {:.6}, {:.6}",
                parsed.top_left.lon, parsed.top_left.lat
            );
            println!(
                "bottom-right: {:.6}, {:.6}",
                parsed.bottom_right.lon, parsed.bottom_right.lat
            );
            let region = parsed.region().normalized();
            println!("bbox:         {:?}", region.bbox());
            println!(
                "normalized:   {}",
                format_coordinates(
                    (region.top_left.lon, region.top_left.lat),
                    (region.bottom_right.lon, region.bottom_right.lat),
                    Crs::Wgs84,
                )
            );
            Ok(None)
        }
        Command::Season(args) => run_season(cli, args),
        Command::Download(args) => run_download(cli, args).await.map(Some),
        Command::Setup => {
            let config = load_run_config(cli)?;
            let toolchain = resolve_toolchain(cli, &config)?;
            let job = setup_job(toolchain, &config);
            run_job(Arc::new(job)).await.map(Some)
        }
        Command::Infer(args) => run_infer(cli, args).await.map(Some),
        Command::Models => {
            let config = load_run_config(cli)?;
            let registry = ModelRegistry::with_release_models(config.models_dir());
            println!("Models directory: {}", registry.models_dir().display());
            for spec in registry.specs() {
                let status = if registry.cached_path(spec).is_file() {
                    "cached"
                } else {
                    "not downloaded"
                };
                println!(
                    "  {:<16} {:<36} {} classes  [{}]",
                    spec.name, spec.filename, spec.classes, status
                );
            }
            Ok(None)
        }
        Command::Inspect { raster } => {
            let bands = band_count(raster)?;
            println!("{}: {} band(s)", raster.display(), bands);
            if bands == EXPECTED_BANDS {
                for composite in Composite::ALL {
                    let [r, g, b] = composite.bands();
                    println!("  {:<6} R={} G={} B={}", composite.label(), r, g, b);
                }
            } else {
                println!("  not a stacked two-window raster; no composites");
            }
            Ok(None)
        }
        Command::Settings { action } => match action {
            SettingsAction::Show => Ok(None),
            SettingsAction::Set {
                conda_path,
                env_name,
            } => {
                let store = settings_store(cli);
                let mut settings = store.load();
                if let Some(path) = conda_path {
                    let path = expand_home(path);
                    resolve_setup_script(&path)?;
                    settings.conda_path = Some(path);
                }
                if let Some(name) = env_name {
                    settings.env_name = name.clone();
                }
                store.save(&settings)?;
                Ok(Some(format!("Settings saved to {}", store.path().display())))
            }
        },
    }
}

fn print_windows(windows: &SeasonWindows) {
    let (a_start, a_end, b_start, b_end) = windows.to_iso();
    println!("Window A: {} to {}", a_start, a_end);
    println!("Window B: {} to {}", b_start, b_end);
}

fn season_table(config: &RunConfig, explicit: Option<&Path>) -> Result<SeasonTable> {
    let path = explicit
        .map(Path::to_path_buf)
        .or_else(|| config.season.table.clone())
        .ok_or_else(|| FtwError::MissingInput {
            field: "season table (--table or [season].table)".to_string(),
        })?;
    let table = SeasonTable::from_csv_path(&path)?;
    tracing::debug!("Loaded {} season rows from {}", table.len(), path.display());
    Ok(match config.season.max_distance_deg {
        Some(degrees) => table.with_max_distance(degrees),
        None => table,
    })
}

fn run_season(cli: &CliConfig, args: &SeasonArgs) -> Result<Option<String>> {
    // 未選區域時不需載入季節表
    let Some(text) = &args.bbox else {
        println!("No region selected; season dates left unchanged");
        return Ok(None);
    };
    let roi = parse_coordinates(text)?.region();

    let config = load_run_config(cli)?;
    let table = season_table(&config, args.table.as_deref())?;
    let mut updater = SeasonDateUpdater::new(table, args.season, args.year);
    match updater.set_roi(Some(roi)) {
        Some((sos, eos)) => {
            println!("SOS: {}", sos);
            println!("EOS: {}", eos);
            print_windows(&calculate_window_dates(sos, eos));
        }
        None => {
            println!("No {} calendar entry near the selected region", args.season);
        }
    }
    Ok(None)
}

async fn run_download(cli: &CliConfig, args: &DownloadArgs) -> Result<String> {
    let config = load_run_config(cli)?;
    let region = parse_coordinates(&args.bbox)?.region().normalized();

    let windows = match (&args.sos, &args.eos, args.season, args.year) {
        (Some(sos), Some(eos), _, _) => calculate_window_dates(parse_date(sos)?, parse_date(eos)?),
        (_, _, Some(season), Some(year)) => {
            let table = season_table(&config, args.table.as_deref())?;
            let mut updater = SeasonDateUpdater::new(table, season, year);
            let (sos, eos) =
                updater
                    .set_roi(Some(region))
                    .ok_or_else(|| FtwError::MissingInput {
                        field: format!("{} season dates for the selected region", season),
                    })?;
            tracing::info!("📅 Season {} {}: SOS {} EOS {}", season, year, sos, eos);
            calculate_window_dates(sos, eos)
        }
        _ => {
            return Err(FtwError::MissingInput {
                field: "--sos/--eos or --season/--year".to_string(),
            })
        }
    };

    let ladder = match args.max_cloud {
        Some(first) => CloudLadder::new(first, &config.catalog.fallback_thresholds)?,
        None => config.cloud_ladder()?,
    };
    let catalog = StacCatalog::new(
        &config.catalog.url,
        &config.catalog.collection,
        config.request_timeout(),
    )?
    .with_paging(config.catalog.page_limit, config.catalog.max_pages);

    let toolchain = if args.search_only {
        None
    } else {
        Some(resolve_toolchain(cli, &config)?)
    };

    let job = DownloadJob {
        catalog: Arc::new(catalog),
        region,
        windows,
        ladder,
        output_path: normalize_output_path(args.out.as_deref(), "ftw_download.tif"),
        toolchain,
    };
    run_job(Arc::new(job)).await
}

async fn run_infer(cli: &CliConfig, args: &InferArgs) -> Result<String> {
    let config = load_run_config(cli)?;
    let toolchain = resolve_toolchain(cli, &config)?;

    if !args.skip_setup {
        run_job(Arc::new(setup_job(toolchain.clone(), &config))).await?;
    }

    let model = match &args.checkpoint {
        Some(path) => ModelSource::Checkpoint(path.clone()),
        None => ModelSource::Known(args.model.clone()),
    };
    let job = InferenceJob {
        toolchain,
        registry: Arc::new(ModelRegistry::with_release_models(config.models_dir())),
        raster_path: args.raster.clone(),
        model,
        output_path: normalize_output_path(args.out.as_deref(), "ftw_output.tif"),
        polygonize: args.polygonize.then_some(args.simplify),
    };
    run_job(Arc::new(job)).await
}

fn setup_job(toolchain: Toolchain, config: &RunConfig) -> SetupJob {
    SetupJob {
        toolchain,
        python_version: config.environment.python_version.clone(),
        conda_packages: config.environment.conda_packages.clone(),
        pip_packages: config.environment.pip_packages.clone(),
    }
}

/// Finds conda.sh and remembers a working location in the settings file.
fn resolve_toolchain(cli: &CliConfig, config: &RunConfig) -> Result<Toolchain> {
    let store = settings_store(cli);
    let mut settings = store.load();
    let conda_setup = locate_setup_script(settings.conda_path.as_deref())?;

    if settings.conda_path.as_ref() != Some(&conda_setup) {
        settings.conda_path = Some(conda_setup.clone());
        if let Err(e) = store.save(&settings) {
            tracing::warn!("⚠️ Could not save settings: {}", e);
        }
    }

    let env_name = config
        .environment
        .env_name
        .clone()
        .unwrap_or_else(|| settings.env_name.clone());
    tracing::debug!("Using conda setup {} with env '{}'", conda_setup.display(), env_name);

    Ok(Toolchain {
        conda_setup,
        env_name,
        runner: ScriptRunner::new().with_monitoring(cli.monitor),
    })
}

/// Starts the job and prints its events until it finishes.
async fn run_job(job: Arc<dyn Job>) -> Result<String> {
    let engine = JobEngine::new();
    let handle = engine.start(job)?;
    handle
        .wait(|event| match event {
            JobEvent::Progress(p) => println!("[{:>3}%] {}", p.percent, p.message),
            JobEvent::Info(message) => println!("ℹ️  {}", message),
            JobEvent::Error(message) => eprintln!("⚠️  {}", message),
            JobEvent::Finished(Ok(_)) => tracing::debug!("Job finished"),
            JobEvent::Finished(Err(message)) => tracing::debug!("Job failed: {}", message),
        })
        .await
}
