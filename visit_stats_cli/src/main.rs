use std::fs;
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum, ValueHint};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use visit_stats::{
    counts_by_month, location_counts, parse_envelope, visits_over_time, ChartSurface, DatePolicy,
    VisitRecord,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Visitor analytics aggregation CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render one aggregate view of the visitor records as a PNG chart
    Chart(ChartArgs),
    /// Write all aggregate views as CSV
    Summary(SummaryArgs),
}

#[derive(Parser, Debug)]
struct ChartArgs {
    /// Envelope sources: JSON file paths or http(s) URLs
    #[arg(required = true, value_hint = ValueHint::FilePath)]
    inputs: Vec<String>,

    /// Which aggregate view to chart
    #[arg(long, value_enum, default_value_t = View::Monthly)]
    view: View,

    /// Output PNG path
    #[arg(short, long, default_value = "visits.png", value_hint = ValueHint::FilePath)]
    output: PathBuf,

    /// Chart width in pixels
    #[arg(long, default_value_t = visit_stats::chart::DEFAULT_WIDTH)]
    width: u32,

    /// Chart height in pixels
    #[arg(long, default_value_t = visit_stats::chart::DEFAULT_HEIGHT)]
    height: u32,

    /// Drop records with unparseable visit dates instead of failing
    #[arg(long, action = ArgAction::SetTrue)]
    skip_invalid_dates: bool,

    /// Verbose logging
    #[arg(long, action = ArgAction::SetTrue)]
    verbose: bool,
}

#[derive(Parser, Debug)]
struct SummaryArgs {
    /// Envelope sources: JSON file paths or http(s) URLs
    #[arg(required = true, value_hint = ValueHint::FilePath)]
    inputs: Vec<String>,

    /// Output CSV path (`-` for stdout)
    #[arg(short, long, default_value = "-", value_hint = ValueHint::FilePath)]
    output: PathBuf,

    /// Drop records with unparseable visit dates instead of failing
    #[arg(long, action = ArgAction::SetTrue)]
    skip_invalid_dates: bool,

    /// Verbose logging
    #[arg(long, action = ArgAction::SetTrue)]
    verbose: bool,
}

/// The three aggregate views. The aliases are the tab identifiers the
/// original dashboard used to select a view.
#[derive(Copy, Clone, Debug, ValueEnum)]
enum View {
    #[value(alias = "monthlyData")]
    Monthly,
    #[value(alias = "totalVisitorsData")]
    Cumulative,
    #[value(alias = "visitorLocationData")]
    Locations,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let default_level = match &cli.command {
        Command::Chart(args) => {
            if args.verbose {
                "debug"
            } else {
                "info"
            }
        }
        Command::Summary(args) => {
            if args.verbose {
                "debug"
            } else {
                "info"
            }
        }
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    match cli.command {
        Command::Chart(args) => handle_chart(args),
        Command::Summary(args) => handle_summary(args),
    }
}

fn handle_chart(args: ChartArgs) -> Result<()> {
    let records = load_records(&args.inputs, args.skip_invalid_dates)?;
    info!("Loaded {} visit records", records.len());

    let mut surface = ChartSurface::new(args.width, args.height)?;
    let handle = match args.view {
        View::Monthly => surface.render_monthly_bars(&counts_by_month(&records))?,
        View::Cumulative => surface.render_visits_over_time(&visits_over_time(&records))?,
        View::Locations => surface.render_location_pie(&location_counts(&records))?,
    };

    let png = surface.to_png()?;
    fs::write(&args.output, png)
        .with_context(|| format!("failed to write {}", args.output.display()))?;
    info!("Wrote {:?} chart: {}", handle.kind, args.output.display());
    Ok(())
}

fn handle_summary(args: SummaryArgs) -> Result<()> {
    let records = load_records(&args.inputs, args.skip_invalid_dates)?;
    info!("Loaded {} visit records", records.len());

    if args.output.as_os_str() == "-" {
        let stdout = io::stdout();
        let handle = stdout.lock();
        let mut writer = csv::Writer::from_writer(handle);
        write_summary_rows(&records, &mut writer)
    } else {
        let file = File::create(&args.output)
            .with_context(|| format!("failed to create {}", args.output.display()))?;
        let mut writer = csv::Writer::from_writer(file);
        write_summary_rows(&records, &mut writer)?;
        info!("Wrote summary CSV: {}", args.output.display());
        Ok(())
    }
}

fn write_summary_rows<W: Write>(
    records: &[VisitRecord],
    writer: &mut csv::Writer<W>,
) -> Result<()> {
    writer.write_record([
        "section",
        "label",
        "value",
        "desktop",
        "mobile",
        "new",
        "returning",
    ])?;

    for (key, bucket) in counts_by_month(records) {
        writer.write_record([
            "monthly".to_string(),
            key.label(),
            bucket.visitors.to_string(),
            bucket.desktop.to_string(),
            bucket.mobile.to_string(),
            bucket.new_visitors.to_string(),
            bucket.returning.to_string(),
        ])?;
    }

    for (key, total) in visits_over_time(records) {
        writer.write_record([
            "cumulative".to_string(),
            key.label(),
            total.to_string(),
            String::new(),
            String::new(),
            String::new(),
            String::new(),
        ])?;
    }

    let mut locations: Vec<(String, u64)> = location_counts(records).into_iter().collect();
    locations.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    for (location, count) in locations {
        writer.write_record([
            "location".to_string(),
            location,
            count.to_string(),
            String::new(),
            String::new(),
            String::new(),
            String::new(),
        ])?;
    }

    writer.flush()?;
    Ok(())
}

/// Record Source boundary: read each envelope (file or URL), parse it, and
/// merge the records. A failed fetch aborts with context instead of
/// silently skipping the pipeline.
fn load_records(inputs: &[String], skip_invalid_dates: bool) -> Result<Vec<VisitRecord>> {
    if inputs.is_empty() {
        return Err(anyhow!("no input sources supplied"));
    }
    let policy = if skip_invalid_dates {
        DatePolicy::Skip
    } else {
        DatePolicy::Strict
    };

    let mut records = Vec::new();
    let mut skipped = 0usize;
    for input in inputs {
        let data = read_source(input)?;
        let parsed = parse_envelope(&data, policy)
            .with_context(|| format!("failed to parse envelope from {}", input))?;
        records.extend(parsed.records);
        skipped += parsed.skipped;
    }

    if skipped > 0 {
        warn!("Skipped {} records with unparseable visit dates", skipped);
    }
    Ok(records)
}

fn read_source(input: &str) -> Result<Vec<u8>> {
    if input.starts_with("http://") || input.starts_with("https://") {
        let response = reqwest::blocking::get(input)
            .with_context(|| format!("failed to fetch {}", input))?
            .error_for_status()
            .with_context(|| format!("fetch of {} returned an error status", input))?;
        let bytes = response
            .bytes()
            .with_context(|| format!("failed to read body of {}", input))?;
        Ok(bytes.to_vec())
    } else {
        fs::read(Path::new(input)).with_context(|| format!("failed to read {}", input))
    }
}
