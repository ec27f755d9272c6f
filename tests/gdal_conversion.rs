use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rasterconv::{
    BandBuffer, CancelToken, ConversionOutcome, ConversionRequest, Converter, CreateSpec,
    CreationOptions, DestinationRaster, Error, GdalBackend, PixelType, ProgressEvent,
    ProgressSink, RasterBackend, SourceRaster, Tile,
};
use tempfile::TempDir;

const WGS84: &str = r#"GEOGCS["WGS 84",DATUM["WGS_1984",SPHEROID["WGS 84",6378137,298.257223563,AUTHORITY["EPSG","7030"]],AUTHORITY["EPSG","6326"]],PRIMEM["Greenwich",0,AUTHORITY["EPSG","8901"]],UNIT["degree",0.0174532925199433,AUTHORITY["EPSG","9122"]],AUTHORITY["EPSG","4326"]]"#;
const GEO_TRANSFORM: [f64; 6] = [12.0, 0.001, 0.0, 48.0, 0.0, -0.001];

#[derive(Default)]
struct Recorder {
    fractions: Mutex<Vec<f64>>,
    logs: Mutex<Vec<String>>,
}

impl ProgressSink for Recorder {
    fn on_progress(&self, event: ProgressEvent) {
        self.fractions.lock().unwrap().push(event.fraction);
    }

    fn on_log(&self, message: &str) {
        self.logs.lock().unwrap().push(message.to_string());
    }
}

impl Recorder {
    fn fractions(&self) -> Vec<f64> {
        self.fractions.lock().unwrap().clone()
    }

    fn logged(&self, line: &str) -> bool {
        self.logs.lock().unwrap().iter().any(|l| l == line)
    }
}

fn full(width: usize, height: usize) -> Tile {
    Tile {
        x: 0,
        y: 0,
        width,
        height,
    }
}

fn u16_band(band: usize, width: usize, height: usize) -> BandBuffer {
    let tile = full(width, height);
    let mut buffer = BandBuffer::zeroed(band, PixelType::UInt16, &tile);
    for (i, px) in buffer.data.chunks_exact_mut(2).enumerate() {
        let value = ((i * 7 + band * 1000) % 65536) as u16;
        px.copy_from_slice(&value.to_ne_bytes());
    }
    buffer
}

/// Write a georeferenced UInt16 GeoTIFF through the GDAL backend itself
fn write_source(dir: &TempDir, width: usize, height: usize, bands: usize) -> PathBuf {
    let path = dir.path().join("source.tif");
    let backend = GdalBackend::new();
    let spec = CreateSpec {
        width,
        height,
        bands,
        pixel_type: PixelType::UInt16,
    };
    let mut destination = backend
        .create("GTiff", &path, &spec, &CreationOptions::new())
        .unwrap();
    destination.set_projection(WGS84).unwrap();
    destination.set_geo_transform(&GEO_TRANSFORM).unwrap();
    for band in 1..=bands {
        destination
            .write_block(&full(width, height), &u16_band(band, width, height))
            .unwrap();
    }
    path
}

fn read_band(path: &Path, band: usize) -> (PixelType, Vec<u8>) {
    let source = GdalBackend::new().open(path, None).unwrap();
    let descriptor = source.descriptor().unwrap();
    let pixel_type = descriptor.band_types[band - 1];
    let tile = full(descriptor.width, descriptor.height);
    let mut buffer = BandBuffer::zeroed(band, pixel_type, &tile);
    source.read_block(&tile, &mut buffer).unwrap();
    (pixel_type, buffer.data)
}

#[test]
fn gtiff_to_gtiff_streams_four_tiles() {
    let dir = TempDir::new().unwrap();
    let input = write_source(&dir, 512, 512, 2);
    let output = dir.path().join("out.tif");
    let sink = Recorder::default();

    let outcome = Converter::new(GdalBackend::new()).convert(
        &ConversionRequest::new(&input, &output, "GTiff").with_option("COMPRESS", "DEFLATE"),
        &CancelToken::new(),
        &sink,
    );

    assert!(outcome.is_success(), "{}", outcome.message());
    assert!(sink.logged("Using Create method."));
    assert_eq!(sink.fractions(), vec![0.25, 0.5, 0.75, 1.0]);

    let converted = GdalBackend::new().open(&output, None).unwrap();
    let descriptor = converted.descriptor().unwrap();
    assert_eq!((descriptor.width, descriptor.height), (512, 512));
    assert_eq!(descriptor.band_types, vec![PixelType::UInt16; 2]);
    assert_eq!(descriptor.geo_transform, Some(GEO_TRANSFORM));
    assert!(descriptor.projection.unwrap().contains("WGS 84"));
    for band in 1..=2 {
        assert_eq!(read_band(&output, band).1, u16_band(band, 512, 512).data);
    }
}

#[test]
fn png_goes_through_create_copy() {
    let dir = TempDir::new().unwrap();
    let input = write_source(&dir, 300, 200, 1);
    let output = dir.path().join("out.png");
    let sink = Recorder::default();

    let outcome = Converter::new(GdalBackend::new()).convert(
        &ConversionRequest::new(&input, &output, "PNG"),
        &CancelToken::new(),
        &sink,
    );

    assert!(outcome.is_success(), "{}", outcome.message());
    assert!(sink.logged("Using CreateCopy method."));
    let fractions = sink.fractions();
    assert!(fractions.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(fractions.last(), Some(&1.0));

    let (pixel_type, data) = read_band(&output, 1);
    assert_eq!(pixel_type, PixelType::UInt16);
    assert_eq!(data, u16_band(1, 300, 200).data);
}

#[test]
fn hfa_round_trip_is_lossless() {
    let dir = TempDir::new().unwrap();
    let input = write_source(&dir, 700, 300, 2);
    let there = dir.path().join("middle.img");
    let back = dir.path().join("back.tif");
    let converter = Converter::new(GdalBackend::new());

    for (from, to, driver) in [(&input, &there, "HFA"), (&there, &back, "GTiff")] {
        let outcome = converter.convert(
            &ConversionRequest::new(from, to, driver),
            &CancelToken::new(),
            &Recorder::default(),
        );
        assert!(outcome.is_success(), "{}", outcome.message());
    }

    for band in 1..=2 {
        assert_eq!(read_band(&back, band), read_band(&input, band));
    }
}

#[test]
fn unknown_driver_fails_cleanly() {
    let dir = TempDir::new().unwrap();
    let input = write_source(&dir, 16, 16, 1);
    let output = dir.path().join("out.xyz");

    let outcome = Converter::new(GdalBackend::new()).convert(
        &ConversionRequest::new(&input, &output, "NoSuchFormat"),
        &CancelToken::new(),
        &Recorder::default(),
    );

    match outcome {
        ConversionOutcome::Failure(Error::UnknownDriver { name }) => assert_eq!(name, "NoSuchFormat"),
        other => panic!("unexpected outcome: {}", other.message()),
    }
    assert!(!output.exists());
}

#[test]
fn vector_only_driver_is_not_a_raster_target() {
    let dir = TempDir::new().unwrap();
    let input = write_source(&dir, 16, 16, 1);
    let output = dir.path().join("out.shp");
    let sink = Recorder::default();

    let outcome = Converter::new(GdalBackend::new()).convert(
        &ConversionRequest::new(&input, &output, "ESRI Shapefile"),
        &CancelToken::new(),
        &sink,
    );

    match outcome {
        ConversionOutcome::Failure(Error::UnknownDriver { name }) => assert_eq!(name, "ESRI Shapefile"),
        other => panic!("unexpected outcome: {}", other.message()),
    }
    assert!(!sink.logged("Using Create method."));
    assert!(!output.exists());
}

#[test]
fn missing_input_reports_library_text() {
    let dir = TempDir::new().unwrap();
    let outcome = Converter::new(GdalBackend::new()).convert(
        &ConversionRequest::new(dir.path().join("absent.tif"), dir.path().join("out.tif"), "GTiff"),
        &CancelToken::new(),
        &Recorder::default(),
    );

    match outcome {
        ConversionOutcome::Failure(Error::Open { message, .. }) => assert!(!message.is_empty()),
        other => panic!("unexpected outcome: {}", other.message()),
    }
}

#[test]
fn unwritable_output_is_a_create_error() {
    let dir = TempDir::new().unwrap();
    let input = write_source(&dir, 16, 16, 1);
    let output = dir.path().join("missing-dir").join("out.tif");

    let outcome = Converter::new(GdalBackend::new()).convert(
        &ConversionRequest::new(&input, &output, "GTiff"),
        &CancelToken::new(),
        &Recorder::default(),
    );

    assert!(matches!(outcome, ConversionOutcome::Failure(Error::Create { .. })));
}

#[test]
fn cancel_before_start_leaves_blank_output() {
    let dir = TempDir::new().unwrap();
    let input = write_source(&dir, 64, 64, 1);
    let output = dir.path().join("out.tif");
    let cancel = CancelToken::new();
    cancel.cancel();
    let sink = Recorder::default();

    let outcome = Converter::new(GdalBackend::new()).convert(
        &ConversionRequest::new(&input, &output, "GTiff"),
        &cancel,
        &sink,
    );

    assert!(matches!(outcome, ConversionOutcome::Cancelled));
    assert!(sink.fractions().is_empty());
    let (_, data) = read_band(&output, 1);
    assert!(data.iter().all(|&b| b == 0));
}
