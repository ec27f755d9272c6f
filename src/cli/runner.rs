use std::path::PathBuf;
use std::time::Instant;

use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use rasterconv::core::progress::format_eta;
use rasterconv::io::drivers::{creation_option_specs, find_driver};
use rasterconv::{
    ConversionJob, ConversionOutcome, ConversionPreset, ConversionRequest, Converter,
    CreationOptions, GdalBackend, JobEvent, OptionKind, output_drivers, raster_drivers,
    schema_defaults, suggest_output_path,
};

use super::args::{CliArgs, Command, ConvertArgs};
use super::errors::AppError;

const BAR_STEPS: u64 = 1000;

/// Filter used when `RUST_LOG` is unset
fn default_directive(verbose: bool) -> &'static str {
    if verbose { "debug" } else { "info" }
}

fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn parse_creation_option(value: &str) -> Result<(String, String), AppError> {
    match value.split_once('=') {
        Some((key, val)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), val.to_string()))
        }
        _ => Err(AppError::InvalidCreationOption {
            value: value.to_string(),
        }),
    }
}

/// Merge preset, CLI flags and (optionally) driver defaults into the settings to run with
fn effective_preset(args: &ConvertArgs) -> Result<ConversionPreset, AppError> {
    let mut preset = match &args.preset {
        Some(path) => {
            info!("Loading preset from {:?}", path);
            ConversionPreset::load(path)?
        }
        None => ConversionPreset::default(),
    };

    if let Some(format) = &args.format {
        preset.output_driver = format.clone();
    }
    if let Some(mode) = args.mode {
        preset.mode = mode;
    }
    if let Some(jobs) = args.jobs {
        preset.parallelism = jobs;
    }
    if let Some(tile_size) = args.tile_size {
        preset.tile_size = tile_size;
    }

    let mut options = CreationOptions::new();
    if args.with_defaults {
        options = schema_defaults(&creation_option_specs(&preset.output_driver)?);
        debug!("Driver defaults: {:?}", options);
    }
    options.extend(preset.options);
    for raw in &args.creation_options {
        let (key, value) = parse_creation_option(raw)?;
        options.insert(key, value);
    }
    preset.options = options;
    Ok(preset)
}

fn resolve_output(args: &ConvertArgs, driver: &str) -> Result<PathBuf, AppError> {
    if let Some(output) = &args.output {
        return Ok(output.clone());
    }
    let info = find_driver(driver)?;
    let extension = info.default_extension().ok_or_else(|| AppError::NoExtension {
        driver: driver.to_string(),
    })?;
    let output = suggest_output_path(&args.input, None, extension).ok_or_else(|| {
        AppError::MissingArgument {
            arg: "--output".to_string(),
        }
    })?;
    info!("No output given, writing to {:?}", output);
    Ok(output)
}

fn progress_bar(quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(BAR_STEPS);
    let style = ProgressStyle::default_bar()
        .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {percent:>3}% {prefix} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=>-");
    bar.set_style(style);
    bar
}

fn convert(args: ConvertArgs) -> Result<(), AppError> {
    let preset = effective_preset(&args)?;
    let output = resolve_output(&args, &preset.output_driver)?;

    if let Some(path) = &args.save_preset {
        preset.save(path)?;
    }

    let mut request: ConversionRequest = preset.request(&args.input, &output);
    if let Some(driver) = &args.input_format {
        request = request.with_input_driver(driver.clone());
    }

    let converter = Converter::new(GdalBackend::new()).with_tile_size(preset.tile_size)?;
    info!(
        "Converting {:?} -> {:?} with {} ({} worker(s), {}px tiles)",
        request.input,
        request.output,
        request.output_driver,
        request.parallelism,
        converter.tile_size()
    );
    let job = ConversionJob::spawn(converter, request)?;

    let bar = progress_bar(args.quiet);
    let started = Instant::now();
    let outcome = job.finish(|event| match event {
        JobEvent::Progress(p) => {
            bar.set_position((p.fraction * BAR_STEPS as f64).round() as u64);
            bar.set_prefix(format_eta(started.elapsed(), p.fraction));
        }
        JobEvent::Log(line) => {
            bar.suspend(|| info!("{}", line));
            bar.set_message(line.clone());
        }
        JobEvent::Finished(_) => {}
    });
    bar.finish_and_clear();

    match outcome {
        ConversionOutcome::Success { .. } => {
            println!("{}", outcome.message());
            Ok(())
        }
        ConversionOutcome::Cancelled => {
            warn!("{}", outcome.message());
            Err(AppError::Cancelled)
        }
        ConversionOutcome::Failure(e) => Err(e.into()),
    }
}

fn list_drivers(all: bool, json: bool) -> Result<(), AppError> {
    let drivers = if all {
        raster_drivers()?
    } else {
        output_drivers()?
    };

    if json {
        let text = serde_json::to_string_pretty(&drivers).map_err(rasterconv::Error::from)?;
        println!("{}", text);
        return Ok(());
    }

    for driver in &drivers {
        let caps = match (driver.capabilities.create, driver.capabilities.create_copy) {
            (true, _) => "create",
            (false, true) => "copy",
            (false, false) => "read",
        };
        println!(
            "{:<16} {:<7} {:<40} {}",
            driver.short_name,
            caps,
            driver.long_name,
            driver.extensions.join(" ")
        );
    }
    debug!("Listed {} driver(s)", drivers.len());
    Ok(())
}

fn show_options(driver: &str, json: bool) -> Result<(), AppError> {
    let specs = creation_option_specs(driver)?;

    if json {
        let text = serde_json::to_string_pretty(&specs).map_err(rasterconv::Error::from)?;
        println!("{}", text);
        return Ok(());
    }

    if specs.is_empty() {
        println!("{} advertises no creation options", driver);
        return Ok(());
    }
    for spec in &specs {
        let kind = match &spec.kind {
            OptionKind::Boolean => "boolean".to_string(),
            OptionKind::Int => "int".to_string(),
            OptionKind::Float => "float".to_string(),
            OptionKind::String => "string".to_string(),
            OptionKind::Enum(values) => values.join("|"),
        };
        let default = spec
            .default
            .as_deref()
            .map(|d| format!(" [default: {}]", d))
            .unwrap_or_default();
        println!("{:<24} {}{}", spec.name, kind, default);
        if let Some(description) = &spec.description {
            println!("{:<24} {}", "", description);
        }
    }
    Ok(())
}

pub fn run(args: CliArgs) -> Result<(), Box<dyn std::error::Error>> {
    init_logging(args.log);

    match args.command {
        Command::Convert(convert_args) => convert(convert_args)?,
        Command::Drivers { all, json } => list_drivers(all, json)?,
        Command::Options { driver, json } => show_options(&driver, json)?,
    }
    Ok(())
}
