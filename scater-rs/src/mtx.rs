use anyhow::{bail, format_err, Context, Error};
use flate2::bufread::MultiGzDecoder;
use log::info;
use scater_types::{AnnotatedMatrix, CountMatrix, LabelClass};
use sprs::TriMat;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

const DEFAULT_FEATURE_TYPE: &str = "Gene Expression";

/// Open a text file, decompressing it when the name ends in `.gz`
fn open_text(path: &Path) -> Result<Box<dyn BufRead>, Error> {
    let file = BufReader::new(File::open(path).with_context(|| path.display().to_string())?);
    if path.extension().is_some_and(|e| e == "gz") {
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(file))))
    } else {
        Ok(Box::new(file))
    }
}

/// Load a CSC count matrix from a MatrixMarket coordinate file, gzipped or plain
pub fn load_mtx(path: impl AsRef<Path>) -> Result<CountMatrix, Error> {
    let path = path.as_ref();
    let mut reader = open_text(path)?;
    let mut line = String::new();
    let mut mat: Option<TriMat<f64>> = None;

    loop {
        line.clear();
        let sz = reader
            .read_line(&mut line)
            .with_context(|| path.display().to_string())?;
        if sz == 0 {
            break;
        }
        if line.starts_with('%') || line.trim().is_empty() {
            continue;
        }
        let mut data = line.split_whitespace();
        match mat.as_mut() {
            None => {
                let nrow = data.next().ok_or_else(|| format_err!("no NROW"))?.parse::<usize>()?;
                let ncol = data.next().ok_or_else(|| format_err!("no NCOL"))?.parse::<usize>()?;
                let nnz = data.next().ok_or_else(|| format_err!("no NNZ"))?.parse::<usize>()?;
                mat = Some(TriMat::with_capacity((nrow, ncol), nnz));
            }
            Some(m) => {
                let row = data.next().ok_or_else(|| format_err!("missing ROW"))?.parse::<usize>()?;
                let col = data.next().ok_or_else(|| format_err!("missing COL"))?.parse::<usize>()?;
                let val = data.next().ok_or_else(|| format_err!("missing VAL"))?.parse::<f64>()?;
                if row == 0 || col == 0 || row > m.rows() || col > m.cols() {
                    bail!("entry ({}, {}) outside a {} x {} matrix", row, col, m.rows(), m.cols());
                }
                m.add_triplet(row - 1, col - 1, val);
            }
        }
    }

    let Some(matrix) = mat else { bail!("no matrix found in {}", path.display()) };
    Ok(CountMatrix::Sparse(matrix.to_csc()))
}

/// First of `names` that exists in `dir`
fn find_file(dir: &Path, names: &[&str]) -> Result<PathBuf, Error> {
    names
        .iter()
        .map(|n| dir.join(n))
        .find(|p| p.exists())
        .ok_or_else(|| format_err!("none of {:?} found in {}", names, dir.display()))
}

fn read_lines(path: &Path) -> Result<Vec<String>, Error> {
    let reader = open_text(path)?;
    let mut lines = Vec::new();
    for line in reader.lines() {
        let line = line.with_context(|| path.display().to_string())?;
        if !line.is_empty() {
            lines.push(line);
        }
    }
    Ok(lines)
}

/// Load a 10x feature-barcode matrix directory: `matrix.mtx`, `features.tsv` (id, name,
/// type) or the older `genes.tsv` (id, name), and `barcodes.tsv`, each optionally gzipped.
/// The counts go into the `counts` assay.
pub fn load_10x_dir(dir: impl AsRef<Path>) -> Result<AnnotatedMatrix, Error> {
    let dir = dir.as_ref();
    let counts = load_mtx(find_file(dir, &["matrix.mtx.gz", "matrix.mtx"])?)?;
    let features_path = find_file(
        dir,
        &["features.tsv.gz", "features.tsv", "genes.tsv.gz", "genes.tsv"],
    )?;
    let barcodes = read_lines(&find_file(dir, &["barcodes.tsv.gz", "barcodes.tsv"])?)?;

    let mut feature_ids = Vec::new();
    let mut feature_names = Vec::new();
    let mut feature_types = Vec::new();
    for (i, line) in read_lines(&features_path)?.into_iter().enumerate() {
        let mut fields = line.split('\t');
        let id = fields
            .next()
            .ok_or_else(|| format_err!("{}: line {} has no feature id", features_path.display(), i + 1))?;
        feature_ids.push(id.to_string());
        feature_names.push(fields.next().map(str::to_string));
        feature_types.push(fields.next().unwrap_or(DEFAULT_FEATURE_TYPE).to_string());
    }

    let name = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut container = AnnotatedMatrix::new(name, counts, feature_ids, barcodes)
        .with_context(|| format!("inconsistent 10x directory {}", dir.display()))?;
    container.feature_names = feature_names;
    container.feature_types = LabelClass::from_feature_types(&feature_types);

    info!(
        "loaded {} features x {} barcodes from {}",
        container.num_features(),
        container.num_barcodes(),
        dir.display()
    );
    Ok(container)
}
