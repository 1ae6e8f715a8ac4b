use std::collections::BTreeMap;
use std::fs;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueHint};
use ngss_map::{
    build_table, default_grade_files, load_manifest, load_records, parse_grade_records, Grade,
    LoadReport, Params, PivotTable,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const EMPTY_CELL: &str = "-";

#[derive(Parser, Debug)]
#[command(author, version, about = "Curriculum practices map CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build the practices-map table for one practice and export it as CSV
    Map(MapArgs),
    /// List the distinct practice values present in the loaded data
    Practices(LoadArgs),
    /// Inspect grade CSV files for column resolution and unit-code coverage
    Diagnose(DiagnoseArgs),
}

#[derive(Parser, Debug)]
struct LoadArgs {
    /// Directory holding the per-grade CSV files
    #[arg(long, default_value = "data", value_hint = ValueHint::DirPath)]
    data_dir: PathBuf,

    /// JSON manifest mapping grade labels to CSV paths (overrides --data-dir)
    #[arg(long, value_hint = ValueHint::FilePath)]
    manifest: Option<PathBuf>,

    /// Fail on positional column fallbacks instead of warning
    #[arg(long, action = ArgAction::SetTrue)]
    strict_headers: bool,

    /// Accept only unit codes inside this inclusive range (e.g. `0-6`)
    #[arg(long)]
    code_range: Option<String>,

    /// Verbose logging
    #[arg(short, long, action = ArgAction::SetTrue)]
    verbose: bool,
}

#[derive(Parser, Debug)]
struct MapArgs {
    /// Practice to select (exact match against the practice column)
    #[arg(short, long)]
    practice: String,

    /// Grades to include, comma separated labels (defaults to all grades)
    #[arg(short, long)]
    grades: Option<String>,

    /// Output CSV path (`-` for stdout)
    #[arg(short, long, default_value = "practices_map.csv", value_hint = ValueHint::FilePath)]
    output: PathBuf,

    /// Print the table as a text grid on stdout
    #[arg(long, action = ArgAction::SetTrue)]
    text: bool,

    #[command(flatten)]
    load: LoadArgs,
}

#[derive(Parser, Debug)]
struct DiagnoseArgs {
    /// Output report path (`-` for stdout)
    #[arg(short, long, default_value = "diagnose.txt", value_hint = ValueHint::FilePath)]
    output: PathBuf,

    #[command(flatten)]
    load: LoadArgs,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let default_level = match &cli.command {
        Command::Map(args) => {
            if args.load.verbose {
                "debug"
            } else {
                "info"
            }
        }
        Command::Practices(args) => {
            if args.verbose {
                "debug"
            } else {
                "info"
            }
        }
        Command::Diagnose(args) => {
            if args.load.verbose {
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
        Command::Map(args) => handle_map(args),
        Command::Practices(args) => handle_practices(args),
        Command::Diagnose(args) => handle_diagnose(args),
    }
}

fn build_params(args: &LoadArgs) -> Result<Params> {
    let mut params = Params::default();
    params.strict_headers = args.strict_headers;
    if let Some(range) = args.code_range.as_ref() {
        params.code_range = Some(parse_code_range(range)?);
    }
    Ok(params)
}

fn resolve_inputs(args: &LoadArgs) -> Result<Vec<(Grade, PathBuf)>> {
    match args.manifest.as_ref() {
        Some(path) => load_manifest(path)
            .with_context(|| format!("failed to load manifest {}", path.display())),
        None => Ok(default_grade_files(&args.data_dir)),
    }
}

fn load_report(args: &LoadArgs, params: &Params) -> Result<LoadReport> {
    let files = resolve_inputs(args)?;
    let report = load_records(&files, params)?;
    for warning in &report.warnings {
        warn!("{warning}");
    }
    if report.is_empty() {
        return Err(anyhow!(
            "no data loaded; checked {} grade files under {}",
            files.len(),
            args.data_dir.display()
        ));
    }
    Ok(report)
}

fn handle_map(args: MapArgs) -> Result<()> {
    let params = build_params(&args.load)?;
    let grades = match args.grades.as_ref() {
        Some(list) => parse_grade_list(list)?,
        None => Grade::ALL.to_vec(),
    };
    if grades.is_empty() {
        return Err(anyhow!("--grades list was empty"));
    }

    let report = load_report(&args.load, &params)?;
    info!(
        "Loaded {} records across {} grades",
        report.records.len(),
        report.grades().len()
    );

    let table = build_table(&report.records, &args.practice, &grades);
    if table.is_empty() {
        warn!(
            "no records matched practice `{}` for the selected grades",
            args.practice
        );
    } else {
        info!(
            "Table built: {} grade rows x {} unit columns for `{}`",
            table.grades.len(),
            table.columns.len(),
            args.practice
        );
    }

    if args.text {
        print_table(&table);
    }

    if args.output.as_os_str() == "-" {
        write_table_stdout(&table)?;
    } else {
        write_table_csv(&table, &args.output)?;
        info!("Wrote table CSV: {}", args.output.display());
    }
    Ok(())
}

fn handle_practices(args: LoadArgs) -> Result<()> {
    let params = build_params(&args)?;
    let report = load_report(&args, &params)?;
    for practice in report.practices() {
        println!("{practice}");
    }
    Ok(())
}

fn handle_diagnose(args: DiagnoseArgs) -> Result<()> {
    let params = build_params(&args.load)?;
    let files = resolve_inputs(&args.load)?;
    let mut report = String::new();

    for (grade, path) in &files {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(err) => {
                report.push_str(&format!(
                    "FILE: {} ({}) -- skipped: {}\n\n",
                    path.display(),
                    grade,
                    err
                ));
                continue;
            }
        };
        let label = path.display().to_string();
        let (records, warnings) = parse_grade_records(file, *grade, &label, &params)?;

        let coded = records.iter().filter(|r| r.unit_code.is_some()).count();
        let mut by_column: BTreeMap<String, usize> = BTreeMap::new();
        for record in &records {
            let key = match record.unit_code {
                Some(code) => code.to_string(),
                None => "(none)".to_string(),
            };
            *by_column.entry(key).or_insert(0) += 1;
        }
        let mut practices: Vec<&str> = Vec::new();
        for record in &records {
            if !record.practice.is_empty() && !practices.contains(&record.practice.as_str()) {
                practices.push(&record.practice);
            }
        }

        report.push_str(&format!("FILE: {} ({})\n", path.display(), grade));
        report.push_str(&format!("  records: {}\n", records.len()));
        report.push_str(&format!(
            "  unit_codes: {}/{} parsed\n",
            coded,
            records.len()
        ));
        report.push_str(&format!("  practices: {}\n", practices.len()));
        if !by_column.is_empty() {
            report.push_str("  columns:\n");
            for (code, count) in &by_column {
                report.push_str(&format!("    - {}: {} records\n", code, count));
            }
        }
        for warning in &warnings {
            report.push_str(&format!("  warning: {}\n", warning));
        }
        report.push('\n');
    }

    if args.output.as_os_str() == "-" {
        print!("{report}");
    } else {
        fs::write(&args.output, report)
            .with_context(|| format!("failed to write {}", args.output.display()))?;
        info!("Diagnostic report written: {}", args.output.display());
    }
    Ok(())
}

fn write_table_stdout(table: &PivotTable) -> Result<()> {
    let stdout = io::stdout();
    let handle = stdout.lock();
    table
        .write_csv(handle)
        .context("failed to write CSV to stdout")
}

fn write_table_csv(table: &PivotTable, path: &Path) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    table
        .write_csv(file)
        .with_context(|| format!("failed to write {}", path.display()))
}

/// Render the table as an indented text grid, one block per grade row.
/// Empty cells show a placeholder dash so the grid stays visually complete.
fn print_table(table: &PivotTable) {
    if table.is_empty() {
        println!("(no matches)");
        return;
    }
    for &grade in &table.grades {
        println!("{grade}");
        for &column in &table.columns {
            let label = match column {
                Some(code) => code.to_string(),
                None => "(no unit)".to_string(),
            };
            match table.cell(grade, column) {
                Some(cell) if !cell.is_empty() => {
                    if cell.title.is_empty() {
                        println!("  {label}");
                    } else {
                        println!("  {label}  {}", cell.title);
                    }
                    for activity in &cell.activities {
                        println!("      - {activity}");
                    }
                }
                _ => println!("  {label}  {EMPTY_CELL}"),
            }
        }
    }
}

fn parse_grade_list(input: &str) -> Result<Vec<Grade>> {
    let mut grades = Vec::new();
    for token in input.split(',') {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        let grade =
            Grade::from_label(token).ok_or_else(|| anyhow!("unknown grade label: `{token}`"))?;
        if !grades.contains(&grade) {
            grades.push(grade);
        }
    }
    Ok(grades)
}

fn parse_code_range(input: &str) -> Result<(u32, u32)> {
    let (lo, hi) = input
        .split_once('-')
        .ok_or_else(|| anyhow!("expected a range like `0-6`, got `{input}`"))?;
    let lo: u32 = lo
        .trim()
        .parse()
        .with_context(|| format!("invalid range start `{lo}`"))?;
    let hi: u32 = hi
        .trim()
        .parse()
        .with_context(|| format!("invalid range end `{hi}`"))?;
    if lo > hi {
        return Err(anyhow!("empty code range {lo}-{hi}"));
    }
    Ok((lo, hi))
}
