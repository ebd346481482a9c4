//! Daily bar loading from a directory of per-symbol CSV files.
//!
//! Layout: `<dir>/<SYMBOL>.csv` with a header row
//! `date,open,high,low,close,volume` and ISO dates. Rows may appear in any
//! order; they are sorted by date, and a repeated date is an error.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

use gridlab_core::data::{DataError, Day, InMemoryStorage, StockSeries};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("cannot read data directory {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("no data file for {symbol} at {path}")]
    MissingSymbol { symbol: String, path: PathBuf },
    #[error("malformed CSV in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("no CSV files found in {0}")]
    Empty(PathBuf),
    #[error("data error: {0}")]
    Data(#[from] DataError),
}

/// Load one symbol's file into a series.
pub fn load_series(path: &Path, symbol: &str) -> Result<StockSeries, LoadError> {
    let csv_err = |source| LoadError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(csv_err)?;

    let mut days = reader
        .deserialize::<Day>()
        .collect::<Result<Vec<_>, _>>()
        .map_err(csv_err)?;
    days.sort_by(Day::cmp_date);

    debug!(symbol, rows = days.len(), "loaded series");
    Ok(StockSeries::new(symbol, days)?)
}

/// Load `symbols` from `dir`, or every `*.csv` file when `symbols` is `None`.
pub fn load_dir(dir: &Path, symbols: Option<&[String]>) -> Result<InMemoryStorage, LoadError> {
    let files = match symbols {
        Some(list) => list
            .iter()
            .map(|symbol| {
                let path = dir.join(format!("{symbol}.csv"));
                if path.is_file() {
                    Ok((symbol.clone(), path))
                } else {
                    Err(LoadError::MissingSymbol {
                        symbol: symbol.clone(),
                        path,
                    })
                }
            })
            .collect::<Result<Vec<_>, _>>()?,
        None => discover(dir)?,
    };
    if files.is_empty() {
        return Err(LoadError::Empty(dir.to_path_buf()));
    }

    let mut storage = InMemoryStorage::new();
    for (symbol, path) in &files {
        storage.insert(load_series(path, symbol)?);
    }
    info!(dir = %dir.display(), symbols = storage.len(), "market data loaded");
    Ok(storage)
}

/// Every `<SYMBOL>.csv` in `dir`, sorted by symbol.
fn discover(dir: &Path) -> Result<Vec<(String, PathBuf)>, LoadError> {
    let io_err = |source| LoadError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        let is_csv = path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
        if !is_csv || !path.is_file() {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            files.push((stem.to_string(), path.clone()));
        }
    }
    files.sort();
    Ok(files)
}
