//! Price source reading one quote per line from any buffered reader.
//!
//! Blank lines yield no price. A line that does not parse as a number is a
//! price-source failure; `restart` only clears the failure state since the
//! reader keeps its position.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::domain::error::StochtraderError;
use crate::ports::price_port::PriceSource;

pub struct LinePriceSource<R> {
    asset: String,
    reader: R,
    line: String,
    exhausted: bool,
}

impl<R: BufRead> LinePriceSource<R> {
    pub fn new(asset: impl Into<String>, reader: R) -> Self {
        Self {
            asset: asset.into(),
            reader,
            line: String::new(),
            exhausted: false,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    fn failure(&self, reason: String) -> StochtraderError {
        StochtraderError::PriceSource {
            asset: self.asset.clone(),
            reason,
        }
    }
}

impl LinePriceSource<BufReader<File>> {
    pub fn open<P: AsRef<Path>>(asset: impl Into<String>, path: P) -> Result<Self, StochtraderError> {
        let asset = asset.into();
        let file = File::open(path.as_ref()).map_err(|e| StochtraderError::PriceSource {
            asset: asset.clone(),
            reason: format!("{}: {e}", path.as_ref().display()),
        })?;
        Ok(Self::new(asset, BufReader::new(file)))
    }
}

impl<R: BufRead> PriceSource for LinePriceSource<R> {
    fn get_price(&mut self) -> Result<Option<f64>, StochtraderError> {
        if self.exhausted {
            return Ok(None);
        }

        self.line.clear();
        let read = self
            .reader
            .read_line(&mut self.line)
            .map_err(|e| self.failure(e.to_string()))?;
        if read == 0 {
            self.exhausted = true;
            return Ok(None);
        }

        let trimmed = self.line.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        trimmed
            .parse::<f64>()
            .map(Some)
            .map_err(|e| self.failure(format!("bad quote '{trimmed}': {e}")))
    }

    fn restart(&mut self) -> Result<(), StochtraderError> {
        self.line.clear();
        Ok(())
    }
}
