// Command line utility for running scater-rs functions

use anyhow::{bail, Context, Error};
use clap::{value_parser, Arg, ArgMatches, Command};
use flate2::write::GzEncoder;
use flate2::Compression;
use log::info;
use ndarray::prelude::*;
use scater_rs::aggregate::{AggregateOptions, Statistic};
use scater_rs::annotated::{
    add_per_cell_qc, add_per_feature_qc, aggregate_across_cells, log_norm_counts, uniquify_feature_names,
};
use scater_rs::mtx::{load_10x_dir, load_mtx};
use scater_rs::normalization::{LogBase, NormalizeOptions};
use scater_rs::outliers::quick_per_cell_qc;
use scater_rs::qc::{Selector, Subset};
use scater_rs::{ParallelConfig, QcOptions};
use scater_types::{
    AnnotatedMatrix, GroupKey, KeyColumn, KeyValues, Label, MetadataTable, COUNTS_ASSAY, LOGCOUNTS_ASSAY,
};
use std::collections::HashMap;
use std::fs::{create_dir, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

pub fn main() -> Result<(), Error> {
    env_logger::init();

    let matches = Command::new("scater-rs-cmd")
        .arg(
            Arg::new("INPUT")
                .help("10x matrix directory or mtx file to use")
                .required(true)
                .index(1)
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("OUT_DIR")
                .help("Output directory")
                .short('o')
                .long("out_dir")
                .default_value(".")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("WORKERS")
                .help("Number of parallel workers")
                .short('w')
                .long("workers")
                .default_value("1")
                .value_parser(value_parser!(usize)),
        )
        .subcommand_required(true)
        .subcommand(
            Command::new("qc")
                .about("Per-cell and per-feature QC metrics with outlier-based cell filtering")
                .arg(
                    Arg::new("MITO_PREFIX")
                        .help("Feature name prefix of mitochondrial genes")
                        .long("mito_prefix")
                        .default_value("MT-"),
                )
                .arg(
                    Arg::new("NMADS")
                        .help("Number of MADs for outlier calls")
                        .long("nmads")
                        .default_value("3")
                        .value_parser(value_parser!(f64)),
                ),
        )
        .subcommand(
            Command::new("aggregate")
                .about("Aggregate cells by group")
                .arg(
                    Arg::new("GROUPS")
                        .help("csv with a barcode column followed by one or more grouping columns")
                        .short('g')
                        .long("groups")
                        .required(true)
                        .value_parser(value_parser!(PathBuf)),
                )
                .arg(
                    Arg::new("STATISTIC")
                        .help("Statistic to compute per group")
                        .short('s')
                        .long("statistic")
                        .default_value("sum")
                        .value_parser(["sum", "mean", "num.detected", "prop.detected"]),
                ),
        )
        .subcommand(
            Command::new("normalize")
                .about("Library size normalization and log transform")
                .arg(
                    Arg::new("LOG_BASE")
                        .help("Base of the log transform")
                        .long("log_base")
                        .default_value("2")
                        .value_parser(["e", "2", "10"]),
                )
                .arg(
                    Arg::new("PSEUDO_COUNT")
                        .help("Pseudo-count added before the log transform")
                        .long("pseudo_count")
                        .default_value("1")
                        .value_parser(value_parser!(f64)),
                ),
        )
        .get_matches();

    let input: &PathBuf = matches.get_one("INPUT").unwrap();
    let out_dir: &PathBuf = matches.get_one("OUT_DIR").unwrap();
    let workers: usize = *matches.get_one("WORKERS").unwrap();
    let parallel = ParallelConfig::rayon(workers);

    let mut container = load_input(input)?;
    if !out_dir.exists() {
        create_dir(out_dir).with_context(|| out_dir.display().to_string())?;
    }

    match matches.subcommand() {
        Some(("qc", sub)) => run_qc(&mut container, sub, parallel, out_dir),
        Some(("aggregate", sub)) => run_aggregate(&container, sub, parallel, out_dir),
        Some(("normalize", sub)) => run_normalize(&mut container, sub, out_dir),
        _ => unreachable!("subcommand is required"),
    }
}

/// Load a 10x directory, or a bare mtx file with placeholder feature and barcode names
fn load_input(path: &Path) -> Result<AnnotatedMatrix, Error> {
    if path.is_dir() {
        return load_10x_dir(path);
    }
    let counts = load_mtx(path)?;
    let features = (0..counts.rows()).map(|i| format!("feature_{i}")).collect();
    let barcodes = (0..counts.cols()).map(|j| format!("barcode_{j}")).collect();
    let name = path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    AnnotatedMatrix::new(name, counts, features, barcodes)
}

fn run_qc(
    container: &mut AnnotatedMatrix,
    args: &ArgMatches,
    parallel: ParallelConfig,
    out_dir: &Path,
) -> Result<(), Error> {
    let prefix: &String = args.get_one("MITO_PREFIX").unwrap();
    let nmads: f64 = *args.get_one("NMADS").unwrap();

    let mito: Vec<usize> = container
        .feature_names
        .iter()
        .enumerate()
        .filter(|(_, n)| n.as_deref().is_some_and(|n| n.starts_with(prefix.as_str())))
        .map(|(i, _)| i)
        .collect();
    info!("{} features match the mitochondrial prefix {}", mito.len(), prefix);
    let subsets = vec![Subset::new("mito", Selector::Indices(mito))];

    let options = QcOptions {
        parallel,
        ..Default::default()
    };
    let metrics = add_per_cell_qc(container, COUNTS_ASSAY, &subsets, &options)?;
    add_per_feature_qc(container, COUNTS_ASSAY, &[], &options)?;

    let filter = quick_per_cell_qc(&metrics, &["mito"], nmads)?;
    let mut cell_table = container.col_data.clone();
    cell_table.extend(filter.to_table()?)?;

    let feature_names = uniquify_feature_names(container)?;
    table_to_csv("barcode", &container.barcodes, &cell_table, out_dir.join("cell_qc.csv.gz"))?;
    table_to_csv("feature", &feature_names, &container.row_data, out_dir.join("feature_qc.csv.gz"))?;
    Ok(())
}

fn run_aggregate(
    container: &AnnotatedMatrix,
    args: &ArgMatches,
    parallel: ParallelConfig,
    out_dir: &Path,
) -> Result<(), Error> {
    let groups: &PathBuf = args.get_one("GROUPS").unwrap();
    let statistic: Statistic = args.get_one::<String>("STATISTIC").unwrap().parse()?;
    let key = read_group_key(groups, &container.barcodes)?;

    let options = AggregateOptions {
        statistic,
        parallel,
        ..Default::default()
    };
    let aggregated = aggregate_across_cells(container, COUNTS_ASSAY, &key, &options)?;
    let values = aggregated
        .assay(COUNTS_ASSAY)
        .context("aggregated counts missing")?
        .to_dense();

    array_to_csv(values, out_dir.join("aggregated.csv.gz"))?;
    table_to_csv("group", &aggregated.barcodes, &aggregated.col_data, out_dir.join("groups.csv.gz"))?;
    Ok(())
}

/// Read a grouping table: a header, then one row per cell with the barcode first.
/// Cells missing from the table and empty or `NA` values are treated as missing.
fn read_group_key(path: &Path, barcodes: &[String]) -> Result<GroupKey, Error> {
    let mut reader = csv::Reader::from_path(path).with_context(|| path.display().to_string())?;
    let headers = reader.headers()?.clone();
    if headers.len() < 2 {
        bail!("{}: expected a barcode column and at least one grouping column", path.display());
    }

    let row_of: HashMap<&str, usize> = barcodes.iter().enumerate().map(|(i, b)| (b.as_str(), i)).collect();
    let mut columns: Vec<Vec<Option<Label>>> = vec![vec![None; barcodes.len()]; headers.len() - 1];
    for record in reader.records() {
        let record = record.with_context(|| path.display().to_string())?;
        let Some(&row) = record.get(0).and_then(|b| row_of.get(b)) else {
            continue;
        };
        for (k, column) in columns.iter_mut().enumerate() {
            column[row] = match record.get(k + 1) {
                None | Some("") | Some("NA") => None,
                Some(v) => Some(Label::parse(v)),
            };
        }
    }

    Ok(GroupKey::Table(
        headers
            .iter()
            .skip(1)
            .zip(columns)
            .map(|(name, values)| KeyColumn::new(name, KeyValues::Labels(values)))
            .collect(),
    ))
}

fn run_normalize(container: &mut AnnotatedMatrix, args: &ArgMatches, out_dir: &Path) -> Result<(), Error> {
    let log_base: LogBase = args.get_one::<String>("LOG_BASE").unwrap().parse()?;
    let pseudo_count: f64 = *args.get_one("PSEUDO_COUNT").unwrap();
    let options = NormalizeOptions {
        log_base,
        pseudo_count,
        ..Default::default()
    };
    log_norm_counts(container, &options)?;

    let logcounts = container.assay(LOGCOUNTS_ASSAY).context("logcounts missing")?.to_dense();
    array_to_csv(logcounts, out_dir.join("logcounts.csv.gz"))?;
    if let Some(sf) = &container.size_factors {
        let n = sf.len();
        array_to_csv(sf.clone().into_shape((n, 1))?, out_dir.join("size_factors.csv.gz"))?;
    }
    Ok(())
}

pub fn array_to_csv(array: Array2<f64>, path: impl AsRef<Path>) -> Result<(), Error> {
    let mut writer = BufWriter::new(GzEncoder::new(File::create(path)?, Compression::default()));
    let num_cols = array.shape()[1];
    for row in array.axis_iter(Axis(0)) {
        for (i, entry) in row.iter().enumerate() {
            write!(writer, "{}", *entry)?;
            if i + 1 < num_cols {
                write!(writer, ",")?;
            }
        }
        writeln!(writer)?;
    }
    Ok(())
}

/// Write a metadata table with a leading name column and a header
pub fn table_to_csv(
    index_name: &str,
    index: &[String],
    table: &MetadataTable,
    path: impl AsRef<Path>,
) -> Result<(), Error> {
    let gz = GzEncoder::new(File::create(path)?, Compression::default());
    let mut writer = csv::Writer::from_writer(gz);

    let mut header = vec![index_name.to_string()];
    header.extend(table.names().map(str::to_string));
    writer.write_record(&header)?;

    for (i, name) in index.iter().enumerate() {
        let mut record = vec![name.clone()];
        record.extend(table.iter().map(|(_, column)| column.format(i)));
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}
