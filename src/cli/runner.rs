use std::path::{Path, PathBuf};

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use geoharmon::api::Catalog;
use geoharmon::core::processing::correlate::SmoothingKernel;
use geoharmon::core::processing::ops::nan_to_value;
use geoharmon::core::processing::validate::{MetadataField, validate_layers};
use geoharmon::core::processing::window::WindowRequest;
use geoharmon::io::writers::metadata::{OutputMetadata, write_metadata_sidecar};
use geoharmon::io::writers::tiff::{TiffGeoref, storage_type, write_geotiff};
use geoharmon::io::writers::worldfile::{write_prj_file, write_world_file};
use geoharmon::io::{
    CoordinateTransformer, GdalCoordTransform, GdalOpener, GdalWarper, LoadOptions,
    SinusoidalTransform, load_raster_directory,
};
use geoharmon::{CorrelationFraming, EngineConfig, SampleType};

use super::args::{CliArgs, Command};
use super::errors::AppError;

fn init_tracing(log: bool) {
    if log {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .init();
    }
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig, AppError> {
    let path = path.ok_or(AppError::MissingArgument {
        arg: "--config".to_string(),
    })?;
    info!("Loading configuration from {:?}", path);
    Ok(EngineConfig::from_json_file(path)?)
}

fn build_catalog(config: &EngineConfig) -> Result<Catalog, AppError> {
    let (catalog, report) = Catalog::build(config, &GdalOpener, &GdalWarper)?;
    for failed in &report.failed {
        warn!("Dataset {} omitted: {}", failed.name, failed.reason);
    }
    Ok(catalog)
}

fn validate_dir(dir: &Path, tolerance: f64, strict: bool) -> Result<(), AppError> {
    let loaded = load_raster_directory(dir, &GdalOpener, LoadOptions::default())?;
    for failure in &loaded.failures {
        warn!("Unreadable raster {}: {}", failure.name, failure.reason);
    }
    let report = validate_layers(
        loaded.layers.iter().map(|(k, l)| (k.as_str(), l.meta())),
        &MetadataField::ALL,
        tolerance,
    );
    match report.mismatch {
        None => {
            println!("{} layers consistent ({} unreadable)", report.checked, loaded.failures.len());
            Ok(())
        }
        Some(m) if strict => Err(AppError::Inconsistent {
            dir: dir.display().to_string(),
            detail: m.to_string(),
        }),
        Some(m) => {
            println!("{} layers checked, inconsistent: {}", report.checked, m);
            Ok(())
        }
    }
}

fn build(config: &EngineConfig) -> Result<(), AppError> {
    let (catalog, report) = Catalog::build(config, &GdalOpener, &GdalWarper)?;
    for ds in &report.datasets {
        println!(
            "{}: {} layers, {} unreadable, {} not reprojected, {} malformed keys, synthetic years {:?}, {} masked pixels",
            ds.name,
            ds.layers,
            ds.load_failures.len(),
            ds.harmonize_failures.len(),
            ds.malformed_keys.len(),
            ds.synthetic_years,
            ds.masked
        );
        if let Some(m) = &ds.mismatch {
            println!("  metadata mismatch: {}", m);
        }
    }
    for failed in &report.failed {
        println!("{}: FAILED ({})", failed.name, failed.reason);
    }
    let (start, end) = catalog.year_range();
    info!(
        "Catalog ready: {} datasets over {}-{}",
        catalog.names().count(),
        start,
        end
    );
    Ok(())
}

struct CutoutArgs {
    dataset: String,
    year: i32,
    request: WindowRequest,
    output: PathBuf,
    world_file: bool,
    sidecar: bool,
    sinusoidal: bool,
}

fn cutout(config: &EngineConfig, args: CutoutArgs) -> Result<(), AppError> {
    let request = args.request;
    if request.width == 0 || request.height == 0 {
        return Err(AppError::ZeroSize {
            width: request.width,
            height: request.height,
        });
    }
    let catalog = build_catalog(config)?;
    let coords: Box<dyn CoordinateTransformer> = if args.sinusoidal {
        Box::new(SinusoidalTransform::modis())
    } else {
        Box::new(GdalCoordTransform::from_lonlat_to(&catalog.grid().crs).map_err(geoharmon::Error::from)?)
    };

    let window = catalog.cutout(&args.dataset, args.year, &request, coords.as_ref(), &GdalWarper)?;
    let stack = catalog.get(&args.dataset)?;

    let mut meta = OutputMetadata::new(
        &args.dataset,
        "cutout",
        &window.transform,
        &window.crs,
        window.array.dim(),
    );
    meta.year = Some(args.year);
    meta.synthetic = stack.is_synthetic(args.year);
    let dtype = storage_type(stack.dtype(), window.nodata);
    meta.dtype = dtype;
    meta.nodata = window.nodata;
    meta.corners = Some([request.corner1, request.corner2]);

    write_geotiff(
        &args.output,
        window.array.view(),
        TiffGeoref {
            crs: &window.crs,
            transform: &window.transform,
            nodata: window.nodata,
        },
        dtype,
        &meta.to_items(),
    )
    .map_err(geoharmon::Error::from)?;
    if args.world_file {
        write_world_file(&args.output, &window.transform)?;
        write_prj_file(&args.output, &window.crs)?;
    }
    if args.sidecar {
        write_metadata_sidecar(&args.output, &meta)?;
    }
    info!("Cutout written to {:?}", args.output);
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn correlate(
    config: &EngineConfig,
    a: &str,
    b: &str,
    past: i32,
    future: i32,
    framing: CorrelationFraming,
    fill_nan: Option<f64>,
    output: &Path,
) -> Result<(), AppError> {
    let catalog = build_catalog(config)?;
    let mut score = catalog.correlate(a, b, past, future, &SmoothingKernel::default(), framing)?;
    if let Some(value) = fill_nan {
        let replaced = nan_to_value(&mut score, value);
        info!("Replaced {} NaN scores with {}", replaced, value);
    }

    let grid = catalog.grid();
    let mut meta = OutputMetadata::new(
        &format!("{}~{}", a, b),
        "correlation",
        &grid.transform,
        &grid.crs,
        score.dim(),
    );
    meta.year = Some(future);
    meta.dtype = SampleType::F32;
    write_geotiff(
        output,
        score.view(),
        TiffGeoref {
            crs: &grid.crs,
            transform: &grid.transform,
            nodata: None,
        },
        SampleType::F32,
        &meta.to_items(),
    )
    .map_err(geoharmon::Error::from)?;
    info!("{} correlation written to {:?}", framing, output);
    Ok(())
}

fn summary(config: &EngineConfig, dataset: &str) -> Result<(), AppError> {
    let catalog = build_catalog(config)?;
    let stats = catalog.summary(dataset)?;
    let json = serde_json::to_string_pretty(&stats).map_err(geoharmon::Error::from)?;
    println!("{}", json);
    Ok(())
}

pub fn run(args: CliArgs) -> Result<(), Box<dyn std::error::Error>> {
    init_tracing(args.log);

    match args.command {
        Command::Validate {
            dir,
            tolerance,
            strict,
        } => validate_dir(&dir, tolerance, strict)?,
        Command::Build => {
            let config = load_config(args.config.as_deref())?;
            build(&config)?;
        }
        Command::Cutout {
            dataset,
            year,
            lon1,
            lat1,
            lon2,
            lat2,
            width,
            height,
            kernel,
            output,
            world_file,
            sidecar,
            sinusoidal,
        } => {
            let config = load_config(args.config.as_deref())?;
            let request = WindowRequest::new((lon1, lat1), (lon2, lat2))
                .with_size(width, height)
                .with_kernel(kernel);
            cutout(
                &config,
                CutoutArgs {
                    dataset,
                    year,
                    request,
                    output,
                    world_file,
                    sidecar,
                    sinusoidal,
                },
            )?;
        }
        Command::Correlate {
            a,
            b,
            past,
            future,
            framing,
            fill_nan,
            output,
        } => {
            let config = load_config(args.config.as_deref())?;
            correlate(&config, &a, &b, past, future, framing, fill_nan, &output)?;
        }
        Command::Summary { dataset } => {
            let config = load_config(args.config.as_deref())?;
            summary(&config, &dataset)?;
        }
    }

    Ok(())
}
