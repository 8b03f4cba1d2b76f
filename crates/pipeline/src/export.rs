//! Export of per-transaction rows annotated with cluster roots.
//!
//! A third streaming pass over the ledger. Every input and output carrying an
//! address becomes one row; inputs and outputs land in separate directories and
//! are split into partitions by transaction count or by block date.
//!
//! Partitions only move forward. Block timestamps are not monotonic, so a
//! block dated before the current day stays in the current day's partition
//! instead of reopening (and truncating) an earlier file.

use std::fmt;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, NaiveDate};
use cospend_common::{Error, Result};
use cospend_core::config::{ExportConfig, ExportFormat, ExportPartition, PipelineConfig};
use cospend_core::ledger::LedgerSource;
use cospend_core::types::{Address, AddressId, Block};
use cospend_storage::{AddressIndex, ClusterAssignment, KeyValueStore};
use parquet::basic::Compression;
use parquet::data_type::{Int32Type, Int64Type};
use parquet::errors::ParquetError;
use parquet::file::properties::WriterProperties;
use parquet::file::writer::SerializedFileWriter;
use parquet::schema::parser::parse_message_type;
use serde::Serialize;
use tokio::fs::{self, File};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, error, info};

use crate::prefetch::prefetch_blocks;
use crate::progress::PassProgress;

const TSV_HEADER: &str = "time\tamount\taddress_cluster\taddress\ttransaction\tblock\n";

const PARQUET_SCHEMA: &str = "
message export_row {
    required int64 time (UINT_64);
    required int64 amount (UINT_64);
    required int32 address_cluster (UINT_32);
    required int32 address (UINT_32);
    required int64 transaction (UINT_64);
    required int64 block (UINT_64);
}
";

/// One exported input or output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExportRow {
    pub time: u64,
    pub amount: u64,
    pub address_cluster: AddressId,
    pub address: AddressId,
    pub transaction: u64,
    pub block: u64,
}

fn parquet_error(e: ParquetError) -> Error {
    Error::Serialization(format!("Parquet encoding error: {}", e))
}

/// Encode `rows` as a complete file body in `format`
fn encode_rows(rows: &[ExportRow], format: ExportFormat) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(rows.len() * 48);
    match format {
        ExportFormat::Parquet => encode_parquet(rows, &mut buf)?,
        ExportFormat::Jsonl => {
            for row in rows {
                serde_json::to_writer(&mut buf, row)?;
                buf.push(b'\n');
            }
        }
        ExportFormat::Tsv => {
            buf.extend_from_slice(TSV_HEADER.as_bytes());
            for r in rows {
                writeln!(
                    buf,
                    "{}\t{}\t{}\t{}\t{}\t{}",
                    r.time, r.amount, r.address_cluster, r.address, r.transaction, r.block
                )?;
            }
        }
    }
    Ok(buf)
}

/// Unsigned columns are stored in their signed physical type, bit for bit
fn encode_parquet(rows: &[ExportRow], buf: &mut Vec<u8>) -> Result<()> {
    let schema = Arc::new(parse_message_type(PARQUET_SCHEMA).map_err(parquet_error)?);
    let props = Arc::new(
        WriterProperties::builder()
            .set_compression(Compression::SNAPPY)
            .build(),
    );
    let mut writer = SerializedFileWriter::new(buf, schema, props).map_err(parquet_error)?;
    let mut row_group = writer.next_row_group().map_err(parquet_error)?;

    let mut column = 0usize;
    while let Some(mut col) = row_group.next_column().map_err(parquet_error)? {
        match column {
            2 | 3 => {
                let values: Vec<i32> = rows
                    .iter()
                    .map(|r| {
                        let id = if column == 2 { r.address_cluster } else { r.address };
                        id as i32
                    })
                    .collect();
                col.typed::<Int32Type>()
                    .write_batch(&values, None, None)
                    .map_err(parquet_error)?;
            }
            _ => {
                let values: Vec<i64> = rows
                    .iter()
                    .map(|r| {
                        let value = match column {
                            0 => r.time,
                            1 => r.amount,
                            4 => r.transaction,
                            _ => r.block,
                        };
                        value as i64
                    })
                    .collect();
                col.typed::<Int64Type>()
                    .write_batch(&values, None, None)
                    .map_err(parquet_error)?;
            }
        }
        col.close().map_err(parquet_error)?;
        column += 1;
    }
    row_group.close().map_err(parquet_error)?;
    writer.close().map_err(parquet_error)?;
    Ok(())
}

/// Counters from an export run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExportStats {
    pub blocks: u64,

    /// Transactions seen, including skipped ones
    pub transactions: u64,

    /// Transactions below `start_tx`
    pub skipped_transactions: u64,

    pub input_rows: u64,
    pub output_rows: u64,

    /// Files written across both directories
    pub files: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Input,
    Output,
}

impl Side {
    fn name(&self) -> &'static str {
        match self {
            Side::Input => "input",
            Side::Output => "output",
        }
    }
}

/// Ordered partition name
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum PartitionKey {
    /// First transaction slot of a chunk
    Chunk(u64),

    /// UTC block date
    Day(NaiveDate),
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartitionKey::Chunk(first) => write!(f, "{}", first),
            PartitionKey::Day(date) => write!(f, "{}", date.format("%Y-%m-%d")),
        }
    }
}

/// Rows buffered for the partition currently being filled
#[derive(Debug, Default)]
struct Partition {
    key: Option<PartitionKey>,
    inputs: Vec<ExportRow>,
    outputs: Vec<ExportRow>,
}

/// Writes cluster-annotated rows for every transaction in the ledger
#[derive(Debug, Clone, Default)]
pub struct Exporter {
    config: ExportConfig,
    pipeline: PipelineConfig,
    total_blocks: Option<u64>,
}

impl Exporter {
    pub fn new(config: ExportConfig, pipeline: PipelineConfig) -> Self {
        Self {
            config,
            pipeline,
            total_blocks: None,
        }
    }

    pub fn with_total_blocks(mut self, total: Option<u64>) -> Self {
        self.total_blocks = total;
        self
    }

    /// Partition `tx_num` would open if it were the newest seen
    fn partition_key(&self, block: &Block, tx_num: u64) -> Result<PartitionKey> {
        match self.config.partition {
            ExportPartition::Transactions => {
                let chunk = self.config.chunk_size.max(1);
                Ok(PartitionKey::Chunk(tx_num - tx_num % chunk))
            }
            ExportPartition::Day => {
                let date = i64::try_from(block.time)
                    .ok()
                    .and_then(|secs| DateTime::from_timestamp(secs, 0))
                    .ok_or_else(|| {
                        Error::ledger(format!("Block {} time {} out of range", block.height, block.time))
                    })?;
                Ok(PartitionKey::Day(date.date_naive()))
            }
        }
    }

    fn file_path(&self, side: Side, key: PartitionKey) -> PathBuf {
        let dir = match side {
            Side::Input => &self.config.input_dir,
            Side::Output => &self.config.output_dir,
        };
        dir.join(format!("{}.{}.{}", key, side.name(), self.config.format.extension()))
    }

    async fn write_file(&self, path: &Path, body: &[u8]) -> Result<()> {
        let file = File::create(path).await?;
        let mut writer = BufWriter::new(file);
        writer.write_all(body).await?;
        writer.flush().await?;
        writer.into_inner().sync_all().await?;
        Ok(())
    }

    /// Write out the buffered partition; sides without rows produce no file
    async fn flush(&self, partition: &mut Partition, stats: &mut ExportStats) -> Result<()> {
        let Some(key) = partition.key.take() else {
            return Ok(());
        };
        for (side, rows) in [(Side::Input, &partition.inputs), (Side::Output, &partition.outputs)] {
            if rows.is_empty() {
                continue;
            }
            let body = encode_rows(rows, self.config.format)?;
            let path = self.file_path(side, key);
            self.write_file(&path, &body).await?;
            debug!("Wrote {} rows to {}", rows.len(), path.display());
            stats.files += 1;
        }
        partition.inputs.clear();
        partition.outputs.clear();
        Ok(())
    }

    fn resolve<S: KeyValueStore>(
        index: &AddressIndex<S>,
        assignment: &ClusterAssignment,
        address: &Address,
    ) -> Result<(AddressId, AddressId)> {
        let id = index.lookup(address)?;
        let root = assignment.cluster_of(id).ok_or_else(|| Error::SizeMismatch {
            expected: assignment.len() as u64,
            actual: id as u64 + 1,
        })?;
        Ok((id, root))
    }

    pub async fn run<S: KeyValueStore>(
        &self,
        ledger: Arc<dyn LedgerSource>,
        index: &AddressIndex<S>,
        assignment: &ClusterAssignment,
    ) -> Result<ExportStats> {
        if assignment.len() as u64 != index.count() {
            return Err(Error::size_mismatch(index.count(), assignment.len() as u64));
        }

        fs::create_dir_all(&self.config.input_dir).await?;
        fs::create_dir_all(&self.config.output_dir).await?;
        info!(
            input_dir = %self.config.input_dir.display(),
            output_dir = %self.config.output_dir.display(),
            partition = ?self.config.partition,
            format = ?self.config.format,
            "Exporting cluster rows"
        );

        let mut stats = ExportStats::default();
        let mut partition = Partition::default();
        let mut progress = PassProgress::new(self.pipeline.progress_interval, self.total_blocks);
        let mut blocks = prefetch_blocks(ledger, self.pipeline.prefetch_blocks);

        while let Some(block) = blocks.next().await {
            let block = block?;
            for transaction in &block.transactions {
                let tx_num = stats.transactions;
                stats.transactions += 1;
                if tx_num < self.config.start_tx {
                    stats.skipped_transactions += 1;
                    continue;
                }

                let key = self.partition_key(&block, tx_num)?;
                match partition.key {
                    Some(current) if key <= current => {
                        if key < current {
                            debug!(
                                height = block.height,
                                "Block dated {} kept in partition {}", key, current
                            );
                        }
                    }
                    _ => {
                        self.flush(&mut partition, &mut stats).await?;
                        partition.key = Some(key);
                    }
                }

                let inputs = transaction
                    .inputs
                    .iter()
                    .filter_map(|i| i.address.as_ref().map(|a| (Side::Input, a, i.value)));
                let outputs = transaction
                    .outputs
                    .iter()
                    .filter_map(|o| o.address.as_ref().map(|a| (Side::Output, a, o.value)));

                for (side, address, amount) in inputs.chain(outputs) {
                    let (id, root) = Self::resolve(index, assignment, address).map_err(|e| {
                        error!(
                            height = block.height,
                            transaction = tx_num,
                            address = %address,
                            "Export failed to resolve address: {}", e
                        );
                        e
                    })?;
                    let row = ExportRow {
                        time: block.time,
                        amount,
                        address_cluster: root,
                        address: id,
                        transaction: tx_num,
                        block: block.height,
                    };
                    match side {
                        Side::Input => {
                            partition.inputs.push(row);
                            stats.input_rows += 1;
                        }
                        Side::Output => {
                            partition.outputs.push(row);
                            stats.output_rows += 1;
                        }
                    }
                }
            }
            stats.blocks += 1;

            if progress.block_done() {
                info!(
                    height = block.height,
                    blocks = progress.blocks(),
                    total = ?progress.total(),
                    rows = stats.input_rows + stats.output_rows,
                    blocks_per_sec = format!("{:.1}", progress.rate()),
                    "Exporting rows"
                );
            }
        }
        blocks.finish().await?;
        self.flush(&mut partition, &mut stats).await?;

        info!(
            transactions = stats.transactions,
            input_rows = stats.input_rows,
            output_rows = stats.output_rows,
            files = stats.files,
            "Export finished"
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cospend_core::types::{Transaction, TxInput, TxOutput};
    use parquet::file::reader::FileReader;
    use parquet::file::serialized_reader::SerializedFileReader;

    fn exporter(partition: ExportPartition) -> Exporter {
        Exporter::new(
            ExportConfig {
                partition,
                chunk_size: 10,
                format: ExportFormat::Jsonl,
                ..Default::default()
            },
            PipelineConfig::default(),
        )
    }

    fn block_at(time: u64) -> Block {
        Block {
            height: 1,
            time,
            transactions: vec![Transaction {
                inputs: vec![TxInput { address: None, value: 0 }],
                outputs: vec![TxOutput { address: None, value: 0 }],
            }],
        }
    }

    fn row(transaction: u64) -> ExportRow {
        ExportRow {
            time: 5,
            amount: 50,
            address_cluster: 2,
            address: 3,
            transaction,
            block: 1,
        }
    }

    #[test]
    fn test_transaction_partition_key() {
        let exporter = exporter(ExportPartition::Transactions);
        let block = block_at(0);
        assert_eq!(exporter.partition_key(&block, 0).unwrap(), PartitionKey::Chunk(0));
        assert_eq!(exporter.partition_key(&block, 9).unwrap(), PartitionKey::Chunk(0));
        assert_eq!(exporter.partition_key(&block, 10).unwrap(), PartitionKey::Chunk(10));
        assert_eq!(exporter.partition_key(&block, 27).unwrap().to_string(), "20");
    }

    #[test]
    fn test_day_partition_key() {
        let exporter = exporter(ExportPartition::Day);
        // 2009-01-03T18:15:05Z
        let genesis = exporter.partition_key(&block_at(1231006505), 0).unwrap();
        assert_eq!(genesis.to_string(), "2009-01-03");
        let epoch = exporter.partition_key(&block_at(0), 0).unwrap();
        assert_eq!(epoch.to_string(), "1970-01-01");
        assert!(epoch < genesis);
    }

    #[test]
    fn test_text_formats() {
        let tsv = encode_rows(&[row(7)], ExportFormat::Tsv).unwrap();
        assert_eq!(String::from_utf8(tsv).unwrap(), format!("{}5\t50\t2\t3\t7\t1\n", TSV_HEADER));

        let jsonl = encode_rows(&[row(7), row(8)], ExportFormat::Jsonl).unwrap();
        let text = String::from_utf8(jsonl).unwrap();
        let values: Vec<serde_json::Value> =
            text.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
        assert_eq!(values.len(), 2);
        assert_eq!(values[0]["address_cluster"], 2);
        assert_eq!(values[1]["transaction"], 8);
    }

    #[test]
    fn test_parquet_has_six_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("0.output.parquet");
        let body = encode_rows(&[row(7), row(8), row(9)], ExportFormat::Parquet).unwrap();
        std::fs::write(&path, &body).unwrap();

        let reader = SerializedFileReader::new(std::fs::File::open(&path).unwrap()).unwrap();
        let meta = reader.metadata().file_metadata();
        assert_eq!(meta.num_rows(), 3);
        let names: Vec<String> = meta
            .schema_descr()
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect();
        assert_eq!(
            names,
            vec!["time", "amount", "address_cluster", "address", "transaction", "block"]
        );
    }

    #[test]
    fn test_file_names() {
        let exporter = exporter(ExportPartition::Transactions);
        assert_eq!(
            exporter.file_path(Side::Input, PartitionKey::Chunk(20)),
            PathBuf::from("./input").join("20.input.jsonl")
        );
        assert_eq!(
            exporter.file_path(Side::Output, PartitionKey::Chunk(20)),
            PathBuf::from("./output").join("20.output.jsonl")
        );
    }
}
