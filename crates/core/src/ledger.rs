//! Ledger reader seam.
//!
//! The clustering passes only need a restartable, forward-only stream of
//! decoded blocks. Two readers live here: an in-memory one and a
//! newline-delimited JSON file reader.

use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::types::Block;
use crate::{Error, Result};

/// Forward iterator over decoded blocks
pub type BlockIter = Box<dyn Iterator<Item = Result<Block>> + Send>;

/// Source of decoded ledger blocks
///
/// Every call to `blocks` must start again at genesis and yield the same
/// transactions in the same order.
pub trait LedgerSource: Send + Sync {
    /// Number of blocks `blocks` will yield, when known without reading
    /// the ledger. Only used for progress totals.
    fn block_count(&self) -> Option<u64> {
        None
    }

    /// Start a new pass from genesis
    fn blocks(&self) -> Result<BlockIter>;
}

/// Ledger held entirely in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryLedger {
    blocks: Arc<Vec<Block>>,
}

impl MemoryLedger {
    pub fn new(blocks: Vec<Block>) -> Self {
        Self {
            blocks: Arc::new(blocks),
        }
    }
}

impl LedgerSource for MemoryLedger {
    fn block_count(&self) -> Option<u64> {
        Some(self.blocks.len() as u64)
    }

    fn blocks(&self) -> Result<BlockIter> {
        let blocks = Arc::clone(&self.blocks);
        Ok(Box::new((0..blocks.len()).map(move |i| Ok(blocks[i].clone()))))
    }
}

/// Reads one JSON-encoded block per line
#[derive(Debug, Clone)]
pub struct JsonLinesLedger {
    path: PathBuf,
    max_height: Option<u64>,
}

impl JsonLinesLedger {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            max_height: None,
        }
    }

    /// Stop before the first block above `max_height`
    pub fn with_max_height(mut self, max_height: Option<u64>) -> Self {
        self.max_height = max_height;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&self) -> Result<JsonLinesBlocks> {
        let file = File::open(&self.path).map_err(|e| {
            Error::ledger(format!("Failed to open ledger {}: {}", self.path.display(), e))
        })?;
        debug!("Reading ledger {}", self.path.display());
        Ok(JsonLinesBlocks {
            lines: BufReader::new(file).lines(),
            line_no: 0,
            max_height: self.max_height,
            path: self.path.display().to_string(),
            done: false,
        })
    }
}

impl LedgerSource for JsonLinesLedger {
    fn blocks(&self) -> Result<BlockIter> {
        Ok(Box::new(self.open()?))
    }
}

struct JsonLinesBlocks {
    lines: Lines<BufReader<File>>,
    line_no: usize,
    max_height: Option<u64>,
    path: String,
    done: bool,
}

impl Iterator for JsonLinesBlocks {
    type Item = Result<Block>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => {
                    self.done = true;
                    return Some(Err(Error::ledger(format!(
                        "{}: read error after line {}: {}",
                        self.path, self.line_no, e
                    ))));
                }
            };
            self.line_no += 1;
            if line.trim().is_empty() {
                continue;
            }

            let block: Block = match serde_json::from_str(&line) {
                Ok(block) => block,
                Err(e) => {
                    self.done = true;
                    return Some(Err(Error::ledger(format!(
                        "{}: malformed block on line {}: {}",
                        self.path, self.line_no, e
                    ))));
                }
            };

            if let Some(max) = self.max_height {
                if block.height > max {
                    self.done = true;
                    return None;
                }
            }
            return Some(Ok(block));
        }
    }
}
