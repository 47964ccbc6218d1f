use anyhow::{Context, bail};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use grid_extract::{
    BoundRange, Boundary, DatasetGuard, DistanceMode, ExtractOptions, FileErrorPolicy, QueryPoint,
    Table, ZarrOpener, ZarrStore, extract, extract_many, list_files, query_points,
};
use log::info;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Format {
    Csv,
    Json,
}

/// Options shared by both subcommands
#[derive(Args, Debug)]
struct ExtractArgs {
    /// Variable to extract (repeatable); defaults to the store's data variables
    #[arg(short = 'v', long = "var", value_name = "VAR")]
    variables: Vec<String>,

    /// Restrict a dimension to an inclusive range, e.g. 'lon=15,25' or 'time=2000-01-01,2000-12-31'
    #[arg(long, value_name = "DIM=MIN,MAX", value_parser = parse_bbox)]
    bbox: Vec<(String, BoundRange)>,

    /// Sample the grid cell nearest to a location (repeatable)
    #[arg(long, value_name = "LON,LAT[,ID]", value_parser = parse_point)]
    point: Vec<QueryPoint>,

    /// Measure point distances along the great circle instead of in the plane
    #[arg(long)]
    great_circle: bool,

    /// Drop the raw time column once dates are decoded
    #[arg(long)]
    drop_raw_time: bool,

    /// Include variable and global attributes (JSON output only)
    #[arg(long)]
    metadata: bool,

    /// Do not echo requested point coordinates into the output
    #[arg(long)]
    no_echo: bool,

    /// Output format
    #[arg(long, value_enum, default_value_t = Format::Csv)]
    format: Format,

    /// Write to a file instead of stdout
    #[arg(short = 'o', long, value_name = "FILE")]
    output: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Extract one Zarr store into a table
    Extract {
        /// Path to the Zarr store root directory
        store: PathBuf,

        #[command(flatten)]
        args: ExtractArgs,
    },
    /// Extract every store in a directory and stack the results
    Merge {
        /// Directory holding the stores
        dir: PathBuf,

        /// Extension of the stores to pick up
        #[arg(long, default_value = "zarr")]
        ext: String,

        /// Name of the leading column holding each row's source
        #[arg(long, default_value = "source")]
        source_column: String,

        /// Log and skip stores that fail instead of stopping
        #[arg(long)]
        skip_bad_files: bool,

        #[command(flatten)]
        args: ExtractArgs,
    },
}

#[derive(Parser)]
#[command(name = "grid-extract")]
#[command(version)]
#[command(about = "Extract boundary- or point-sampled slices of gridded Zarr datasets as tables")]
#[command(arg_required_else_help = true)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// Log progress and dropped data
    #[arg(long, global = true)]
    verbose: bool,
}

fn main() {
    if let Err(e) = run() {
        eprintln!("{} {}", "Error:".red().bold(), e);

        // Print the error chain for better context
        for cause in e.chain().skip(1) {
            eprintln!("  Caused by: {}", cause);
        }

        process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }
    let level = if cli.verbose { "info" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match cli.command {
        Command::Extract { store, args } => {
            validate_store_path(&store)?;
            let options = build_options(&args)?;

            let dataset = ZarrStore::open(&store)
                .with_context(|| format!("Failed to open Zarr store '{}'", store.display()))?;
            let guard = DatasetGuard::new(dataset, &store);
            let table = extract(&*guard, &args.variables, &options)?;
            guard
                .finish()
                .with_context(|| format!("Failed to close '{}'", store.display()))?;

            write_table(&table, &args)
        }
        Command::Merge {
            dir,
            ext,
            source_column,
            skip_bad_files,
            args,
        } => {
            if !dir.is_dir() {
                bail!("'{}' is not a directory", dir.display());
            }
            let mut options = build_options(&args)?;
            options.source_id_column = source_column;
            if skip_bad_files {
                options.on_file_error = FileErrorPolicy::Skip;
            }

            let files = list_files(&dir, &ext)?;
            info!("merging {} stores from {}", files.len(), dir.display());
            let table = extract_many(&ZarrOpener, &files, &args.variables, &options)?;

            write_table(&table, &args)
        }
    }
}

fn validate_store_path(path: &Path) -> anyhow::Result<()> {
    if !path.exists() {
        bail!(
            "Zarr store path '{}' does not exist. Please provide a valid path to a Zarr store directory.",
            path.display()
        );
    }
    if !path.is_dir() {
        bail!(
            "Path '{}' is not a directory. Zarr stores must be directories containing .zarray, .zgroup, or .zmetadata files.",
            path.display()
        );
    }
    Ok(())
}

fn build_options(args: &ExtractArgs) -> anyhow::Result<ExtractOptions> {
    let mut boundary = Boundary::new();
    for (dim, range) in &args.bbox {
        if boundary.insert(dim.clone(), range.clone()).is_some() {
            bail!("--bbox given more than once for dimension '{}'", dim);
        }
    }

    let lon: Vec<f64> = args.point.iter().map(|p| p.lon).collect();
    let lat: Vec<f64> = args.point.iter().map(|p| p.lat).collect();
    let ids: Vec<String> = args.point.iter().filter_map(|p| p.id.clone()).collect();
    let points = query_points(Some(lon.as_slice()), Some(lat.as_slice()), Some(ids.as_slice()))?;

    Ok(ExtractOptions {
        keep_raw_time: !args.drop_raw_time,
        include_metadata: args.metadata,
        boundary: (!boundary.is_empty()).then_some(boundary),
        query_points: (!points.is_empty()).then_some(points),
        echo_points: !args.no_echo,
        distance_mode: if args.great_circle {
            DistanceMode::GreatCircle
        } else {
            DistanceMode::Planar
        },
        ..ExtractOptions::default()
    })
}

fn write_table(table: &Table, args: &ExtractArgs) -> anyhow::Result<()> {
    let mut writer: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path)
                .with_context(|| format!("Failed to create '{}'", path.display()))?,
        )),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    };

    match args.format {
        Format::Csv => table.write_csv(&mut writer)?,
        Format::Json => {
            serde_json::to_writer_pretty(&mut writer, &table.to_json())?;
            writeln!(writer)?;
        }
    }
    writer.flush()?;

    if let Some(path) = &args.output {
        eprintln!(
            "{} {} rows to {}",
            "Wrote".green(),
            table.num_rows(),
            path.display()
        );
    }
    Ok(())
}

/// Parse 'DIM=MIN,MAX'; both endpoints dates (YYYY-MM-DD) or both numbers
fn parse_bbox(raw: &str) -> Result<(String, BoundRange), String> {
    let (dim, range) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected DIM=MIN,MAX, got '{}'", raw))?;
    let (min, max) = range
        .split_once(',')
        .ok_or_else(|| format!("expected MIN,MAX after '{}=', got '{}'", dim, range))?;
    let (min, max) = (min.trim(), max.trim());

    let dates = (
        NaiveDate::parse_from_str(min, "%Y-%m-%d"),
        NaiveDate::parse_from_str(max, "%Y-%m-%d"),
    );
    let range = match dates {
        (Ok(min), Ok(max)) => BoundRange::new(min, max),
        _ => {
            let number = |s: &str| {
                s.parse::<f64>()
                    .map_err(|_| format!("'{}' is neither a number nor a YYYY-MM-DD date", s))
            };
            BoundRange::new(number(min)?, number(max)?)
        }
    };

    let dim = dim.trim();
    if dim.is_empty() {
        return Err(format!("missing dimension name in '{}'", raw));
    }
    Ok((dim.to_string(), range))
}

/// Parse 'LON,LAT' or 'LON,LAT,ID'
fn parse_point(raw: &str) -> Result<QueryPoint, String> {
    let parts: Vec<&str> = raw.splitn(3, ',').map(str::trim).collect();
    if parts.len() < 2 {
        return Err(format!("expected LON,LAT[,ID], got '{}'", raw));
    }

    let coord = |s: &str| {
        s.parse::<f64>()
            .map_err(|_| format!("'{}' is not a valid coordinate", s))
    };
    let point = QueryPoint::new(coord(parts[0])?, coord(parts[1])?);
    Ok(match parts.get(2) {
        Some(id) if !id.is_empty() => point.with_id(*id),
        _ => point,
    })
}
