use std::fs;
use std::path::Path;

use approx::assert_abs_diff_eq;
use ndarray::Array2;
use tempfile::TempDir;

use geoharmon::api::Catalog;
use geoharmon::io::{AffineWarper, CoordinateTransformer, RasterOpener};
use geoharmon::{
    CanonicalGrid, CorrelationFraming, DatasetConfig, EngineConfig, Error, FillStrategy,
    GeoTransform, RasterLayer, SampleType, SeriesKind, SmoothingKernel, SpatialMetadata,
    WindowRequest,
};

const NODATA: f64 = 65535.0;

/// 8x6 grid of 10 unit pixels over x 0..80, y 0..60
fn small_grid() -> CanonicalGrid {
    CanonicalGrid {
        crs: "LOCAL_CS[\"catalog\"]".to_string(),
        transform: GeoTransform::new(0.0, 60.0, 10.0, -10.0),
        width: 8,
        height: 6,
        nodata: NODATA,
        dtype: SampleType::F32,
    }
}

/// Reads whitespace separated rows. A matrix of the grid's shape is placed on
/// the grid; a 3x4 matrix covers the same extent with 20 unit pixels.
struct MatrixOpener {
    grid: CanonicalGrid,
}

impl RasterOpener for MatrixOpener {
    fn open(&self, path: &Path) -> geoharmon::Result<RasterLayer> {
        let text = fs::read_to_string(path)?;
        let rows: Vec<Vec<f64>> = text
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| {
                l.split_whitespace()
                    .map(|v| v.parse::<f64>().map_err(Error::external))
                    .collect::<geoharmon::Result<Vec<f64>>>()
            })
            .collect::<geoharmon::Result<_>>()?;
        let height = rows.len();
        let width = rows.first().map(Vec::len).unwrap_or(0);
        let flat: Vec<f64> = rows.into_iter().flatten().collect();
        let array = Array2::from_shape_vec((height, width), flat).map_err(Error::external)?;

        let scale = self.grid.width as f64 / width as f64;
        let t = self.grid.transform;
        let transform = GeoTransform::new(
            t.origin_x,
            t.origin_y,
            t.pixel_width * scale,
            t.pixel_height * scale,
        );
        RasterLayer::new(
            array,
            SpatialMetadata {
                crs: self.grid.crs.clone(),
                transform,
                width,
                height,
                dtype: SampleType::F32,
                nodata: Some(NODATA),
            },
        )
    }
}

/// Degrees pass straight through as grid units
struct PlateCarree;

impl CoordinateTransformer for PlateCarree {
    fn lonlat_to_projected(&self, lon: f64, lat: f64) -> geoharmon::Result<(f64, f64)> {
        Ok((lon, lat))
    }
}

fn write_matrix(dir: &Path, name: &str, array: &Array2<f64>) {
    let text: String = array
        .rows()
        .into_iter()
        .map(|row| {
            row.iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join(" ")
                + "\n"
        })
        .collect();
    fs::write(dir.join(name), text).unwrap();
}

fn constant(value: f64) -> Array2<f64> {
    let grid = small_grid();
    Array2::from_elem(grid.shape(), value)
}

fn dataset_dir(root: &TempDir, name: &str) -> std::path::PathBuf {
    let dir = root.path().join(name);
    fs::create_dir_all(&dir).unwrap();
    dir
}

fn config(start_year: i32, end_year: i32, datasets: Vec<DatasetConfig>) -> EngineConfig {
    EngineConfig {
        grid: small_grid(),
        start_year,
        end_year,
        datasets,
    }
}

#[test]
fn interpolated_series_end_to_end() {
    let root = TempDir::new().unwrap();
    let dir = dataset_dir(&root, "x");
    write_matrix(&dir, "X_2010.tif", &constant(1.0));
    write_matrix(&dir, "X_2015.tif", &constant(5.0));
    write_matrix(&dir, "X_2020.tif", &constant(9.0));
    fs::write(dir.join("README.txt"), "not a raster").unwrap();

    let cfg = config(
        2010,
        2020,
        vec![DatasetConfig::new("x", &dir, SeriesKind::Continuous)],
    );
    let opener = MatrixOpener { grid: small_grid() };
    let (catalog, report) = Catalog::build(&cfg, &opener, &AffineWarper).unwrap();

    assert_eq!(report.built(), 1);
    assert!(report.failed.is_empty());
    let ds = &report.datasets[0];
    assert_eq!(ds.layers, 3);
    assert_eq!(ds.synthetic_years.len(), 8);
    assert!(!ds.synthetic_years.contains(&2015));

    let stack = catalog.get("x").unwrap();
    for v in stack.slice(2012).unwrap().iter() {
        assert_abs_diff_eq!(*v, 2.6, epsilon = 1e-12);
    }
    for v in stack.slice(2015).unwrap().iter() {
        assert_eq!(*v, 5.0);
    }

    let stats = catalog.summary("x").unwrap();
    assert_eq!(stats.len(), 11);
    assert_eq!(stats[0].year, 2010);
    assert!(!stats[0].synthetic);
    assert!(stats[1].synthetic);
    assert_abs_diff_eq!(stats[2].mean, 2.6, epsilon = 1e-12);
    assert_eq!(stats[2].valid_count, 48);
}

#[test]
fn coarser_layers_are_harmonized_onto_the_grid() {
    let root = TempDir::new().unwrap();
    let dir = dataset_dir(&root, "coarse");
    write_matrix(&dir, "c_2010.tif", &Array2::from_elem((3, 4), 4.0));
    write_matrix(&dir, "c_2011.tif", &constant(6.0));

    let mut ds = DatasetConfig::new("coarse", &dir, SeriesKind::Continuous);
    ds.fill = FillStrategy::StackAvailable;
    let cfg = config(2010, 2011, vec![ds]);
    let opener = MatrixOpener { grid: small_grid() };
    let (catalog, report) = Catalog::build(&cfg, &opener, &AffineWarper).unwrap();

    assert!(report.datasets[0].harmonize_failures.is_empty());
    assert!(report.datasets[0].mismatch.is_none());
    let stack = catalog.get("coarse").unwrap();
    assert_eq!(stack.slice_shape(), (6, 8));
    for v in stack.slice(2010).unwrap().iter() {
        assert_abs_diff_eq!(*v, 4.0, epsilon = 1e-9);
    }
}

#[test]
fn failing_dataset_does_not_stop_the_others() {
    let root = TempDir::new().unwrap();
    let good = dataset_dir(&root, "good");
    write_matrix(&good, "g_2010.tif", &constant(1.0));
    let empty = dataset_dir(&root, "empty");
    fs::write(empty.join("notes.tif"), "not numbers").unwrap();

    let cfg = config(
        2010,
        2012,
        vec![
            DatasetConfig::new("empty", &empty, SeriesKind::Continuous),
            DatasetConfig::new("good", &good, SeriesKind::Continuous),
        ],
    );
    let opener = MatrixOpener { grid: small_grid() };
    let (catalog, report) = Catalog::build(&cfg, &opener, &AffineWarper).unwrap();

    assert_eq!(report.built(), 1);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].name, "empty");
    assert!(catalog.contains("good"));
    assert!(matches!(catalog.get("empty"), Err(Error::UnknownDataset(_))));
    // A single sample repeats over the whole range
    assert_eq!(catalog.get("good").unwrap().slice(2012).unwrap()[[3, 3]], 1.0);
}

#[test]
fn mask_with_follows_land_cover_nodata() {
    let root = TempDir::new().unwrap();
    let land = dataset_dir(&root, "land");
    let mut classes = constant(12.0);
    classes[[0, 0]] = -128.0;
    classes[[5, 7]] = NODATA;
    write_matrix(&land, "LCT_2010.tif", &classes);

    let sheep = dataset_dir(&root, "sheep");
    write_matrix(&sheep, "sheep_2010.tif", &constant(3.0));
    write_matrix(&sheep, "sheep_2011.tif", &constant(4.0));

    let mut sheep_cfg = DatasetConfig::new("sheep", &sheep, SeriesKind::Continuous);
    sheep_cfg.mask_with = Some("land".to_string());
    let cfg = config(
        2010,
        2011,
        vec![
            DatasetConfig::new("land", &land, SeriesKind::Categorical),
            sheep_cfg,
        ],
    );
    let opener = MatrixOpener { grid: small_grid() };
    let (catalog, report) = Catalog::build(&cfg, &opener, &AffineWarper).unwrap();

    let land_stack = catalog.get("land").unwrap();
    assert_eq!(land_stack.dtype(), SampleType::U8);
    assert_eq!(land_stack.nodata(), Some(255.0));
    assert_eq!(land_stack.synthetic_years(), &[2011]);
    assert_eq!(land_stack.slice(2011).unwrap()[[0, 0]], 255.0);
    assert_eq!(land_stack.slice(2011).unwrap()[[1, 1]], 12.0);

    let sheep_report = report.datasets.iter().find(|r| r.name == "sheep").unwrap();
    // Two pixels in each of two years
    assert_eq!(sheep_report.masked, 4);
    let sheep_stack = catalog.get("sheep").unwrap();
    for year in [2010, 2011] {
        let slice = sheep_stack.slice(year).unwrap();
        assert_eq!(slice[[0, 0]], NODATA);
        assert_eq!(slice[[5, 7]], NODATA);
        assert_ne!(slice[[2, 2]], NODATA);
    }
}

#[test]
fn cutout_checks_year_and_dataset() {
    let root = TempDir::new().unwrap();
    let dir = dataset_dir(&root, "x");
    let ramp = Array2::from_shape_fn((6, 8), |(r, c)| (r * 8 + c) as f64);
    write_matrix(&dir, "x_2010.tif", &ramp);

    let cfg = config(
        2010,
        2012,
        vec![DatasetConfig::new("x", &dir, SeriesKind::Continuous)],
    );
    let opener = MatrixOpener { grid: small_grid() };
    let (catalog, _) = Catalog::build(&cfg, &opener, &AffineWarper).unwrap();

    let request = WindowRequest::new((20.0, 10.0), (60.0, 50.0)).with_size(4, 4);
    assert!(matches!(
        catalog.cutout("x", 2013, &request, &PlateCarree, &AffineWarper),
        Err(Error::YearOutOfRange { year: 2013, start: 2010, end: 2012 })
    ));
    assert!(matches!(
        catalog.cutout("y", 2011, &request, &PlateCarree, &AffineWarper),
        Err(Error::UnknownDataset(_))
    ));

    let window = catalog
        .cutout("x", 2011, &request, &PlateCarree, &AffineWarper)
        .unwrap();
    assert_eq!(window.array.dim(), (4, 4));
    assert_eq!(window.nodata, Some(NODATA));
    // Output pixel centers land on source pixel centers: rows 1..5, cols 2..6
    assert_eq!(window.array[[0, 0]], 10.0);
    assert_eq!(window.array[[3, 3]], 37.0);
}

#[test]
fn correlation_of_co_moving_datasets_is_positive() {
    let root = TempDir::new().unwrap();
    let a = dataset_dir(&root, "a");
    let b = dataset_dir(&root, "b");
    write_matrix(&a, "a_2010.tif", &constant(10.0));
    write_matrix(&a, "a_2011.tif", &constant(20.0));
    write_matrix(&b, "b_2010.tif", &constant(3.0));
    write_matrix(&b, "b_2011.tif", &constant(6.0));

    let cfg = config(
        2010,
        2011,
        vec![
            DatasetConfig::new("a", &a, SeriesKind::Continuous),
            DatasetConfig::new("b", &b, SeriesKind::Continuous),
        ],
    );
    let opener = MatrixOpener { grid: small_grid() };
    let (catalog, _) = Catalog::build(&cfg, &opener, &AffineWarper).unwrap();

    let score = catalog
        .correlate(
            "a",
            "b",
            2010,
            2011,
            &SmoothingKernel::default(),
            CorrelationFraming::CoMovement,
        )
        .unwrap();
    assert_eq!(score.dim(), (6, 8));
    assert!(score.iter().all(|v| v.is_finite() && *v > 0.0));

    assert!(matches!(
        catalog.correlate(
            "a",
            "b",
            2009,
            2011,
            &SmoothingKernel::default(),
            CorrelationFraming::CoMovement
        ),
        Err(Error::YearOutOfRange { .. })
    ));
}
