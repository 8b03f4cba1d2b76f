mod common;

use std::sync::Arc;

use common::{block, sample_blocks, sample_ledger, tx, BrokenLedger, CountingLedger, FullDiskStore};
use cospend_common::Error;
use cospend_core::config::{ClusterConfig, PipelineConfig};
use cospend_core::ledger::{LedgerSource, MemoryLedger};
use cospend_core::types::{Address, KeyEncoding};
use cospend_core::union_find::DisjointSet;
use cospend_pipeline::{ClusterPipeline, ClusteringPass, IndexingPass, ScratchDir};
use cospend_storage::{AddressIndex, ClusterAssignment, MemoryStore, RocksStore};

fn memory_pipeline(ledger: Arc<dyn LedgerSource>) -> ClusterPipeline<MemoryStore> {
    let index = AddressIndex::open(MemoryStore::new(), KeyEncoding::Raw).unwrap();
    let config = PipelineConfig {
        prefetch_blocks: 2,
        progress_interval: 1,
    };
    ClusterPipeline::new(ledger, index, config)
}

#[tokio::test]
async fn test_end_to_end_clusters() {
    let dir = tempfile::tempdir().unwrap();
    let cluster_file = dir.path().join("cluster.bin");
    let outcome = memory_pipeline(sample_ledger()).run(&cluster_file).await.unwrap();

    let cluster = |name: &str| {
        let id = outcome.lookup(&Address::from(name)).unwrap();
        outcome.cluster_of(id).unwrap()
    };
    assert_eq!(cluster("a"), cluster("b"));
    assert_eq!(cluster("c"), cluster("e"));
    assert_ne!(cluster("a"), cluster("c"));
    assert_ne!(cluster("a"), cluster("d"));
    assert_ne!(cluster("d"), cluster("f"));

    let stats = outcome.stats();
    assert_eq!(stats.indexing.identities, 6);
    assert_eq!(stats.indexing.addressed_outputs, 6);
    assert_eq!(stats.clustering.multi_input_transactions, 2);
    assert_eq!(stats.clustering.merges, 2);
    assert_eq!(stats.summary.clusters, 4);
    assert_eq!(stats.summary.largest_cluster, 2);
    assert_eq!(stats.summary.singletons, 2);
}

#[tokio::test]
async fn test_identities_follow_first_output_order() {
    let dir = tempfile::tempdir().unwrap();
    let outcome = memory_pipeline(sample_ledger())
        .run(dir.path().join("cluster.bin"))
        .await
        .unwrap();

    for (expected, name) in ["a", "b", "c", "d", "e", "f"].iter().enumerate() {
        assert_eq!(outcome.lookup(&Address::from(*name)).unwrap(), expected as u32);
        assert_eq!(outcome.reverse_lookup(expected as u32).unwrap(), Address::from(*name));
    }
}

#[tokio::test]
async fn test_output_only_address_stays_singleton() {
    let dir = tempfile::tempdir().unwrap();
    let outcome = memory_pipeline(sample_ledger())
        .run(dir.path().join("cluster.bin"))
        .await
        .unwrap();

    for name in ["d", "f"] {
        let id = outcome.lookup(&Address::from(name)).unwrap();
        assert_eq!(outcome.cluster_of(id), Some(id));
    }
}

#[tokio::test]
async fn test_reused_input_within_transaction() {
    let blocks = vec![
        block(0, 0, vec![tx(&[], &[("x", 1), ("y", 1)])]),
        block(1, 1, vec![tx(&[("x", 1), ("y", 1), ("x", 1)], &[("z", 2)])]),
    ];
    let dir = tempfile::tempdir().unwrap();
    let outcome = memory_pipeline(Arc::new(MemoryLedger::new(blocks)))
        .run(dir.path().join("cluster.bin"))
        .await
        .unwrap();

    let stats = outcome.stats().clustering;
    assert_eq!(stats.unions, 2);
    assert_eq!(stats.merges, 1);
    assert_eq!(outcome.cluster_of(0), outcome.cluster_of(1));
}

#[tokio::test]
async fn test_input_never_seen_as_output_is_fatal() {
    let mut blocks = sample_blocks();
    blocks.push(block(3, 0, vec![tx(&[("a", 50), ("ghost", 1)], &[("g", 51)])]));
    let dir = tempfile::tempdir().unwrap();
    let cluster_file = dir.path().join("cluster.bin");

    let result = memory_pipeline(Arc::new(MemoryLedger::new(blocks)))
        .run(&cluster_file)
        .await;
    match result {
        Err(Error::NotFound { key }) => assert_eq!(key, "ghost"),
        Err(other) => panic!("unexpected error: {}", other),
        Ok(_) => panic!("run should fail on an unknown input"),
    }
    assert!(!cluster_file.exists());
}

#[tokio::test]
async fn test_forest_size_must_match_index() {
    let ledger = sample_ledger();
    let mut index = AddressIndex::open(MemoryStore::new(), KeyEncoding::Raw).unwrap();
    IndexingPass::default()
        .run(Arc::clone(&ledger), &mut index)
        .await
        .unwrap();
    assert_eq!(index.count(), 6);

    let mut forest = DisjointSet::new(5);
    let err = ClusteringPass::default()
        .run(ledger, &index, &mut forest)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::SizeMismatch { expected: 6, actual: 5 }));
}

#[tokio::test]
async fn test_reader_failure_aborts_run() {
    let ledger = BrokenLedger {
        blocks: sample_blocks(),
        good: 1,
    };
    let result = memory_pipeline(Arc::new(ledger))
        .index_addresses()
        .await;
    assert!(matches!(result, Err(Error::Ledger(_))));
}

#[tokio::test]
async fn test_store_failure_mid_pass_writes_no_roots() {
    let dir = tempfile::tempdir().unwrap();
    let cluster_file = dir.path().join("cluster.bin");
    // room for three identities out of six
    let index = AddressIndex::open(FullDiskStore::new(3), KeyEncoding::Raw).unwrap();
    let result = ClusterPipeline::new(sample_ledger(), index, PipelineConfig::default())
        .run(&cluster_file)
        .await;

    let err = match result {
        Err(err) => err,
        Ok(_) => panic!("run succeeded on a full disk"),
    };
    assert!(err.is_storage_failure());
    assert!(matches!(err, Error::RocksDB(_)));
    assert!(!cluster_file.exists());
}

#[tokio::test]
async fn test_run_reads_ledger_once_per_pass() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = Arc::new(CountingLedger::new(sample_blocks()));
    let outcome = memory_pipeline(ledger.clone())
        .run(dir.path().join("cluster.bin"))
        .await
        .unwrap();

    assert_eq!(ledger.reads(), 2);
    assert_eq!(outcome.stats().indexing.blocks, 3);
    assert_eq!(outcome.stats().clustering.clusters, 4);
}

#[tokio::test]
async fn test_persisted_roots_reload() {
    let dir = tempfile::tempdir().unwrap();
    let cluster_file = dir.path().join("out").join("cluster.bin");
    let outcome = memory_pipeline(sample_ledger()).run(&cluster_file).await.unwrap();

    let loaded = ClusterAssignment::load(&cluster_file).unwrap();
    assert_eq!(&loaded, outcome.assignment());
    assert_eq!(loaded.len() as u64, outcome.index().count());
}

#[tokio::test]
async fn test_stages_expose_progress() {
    let dir = tempfile::tempdir().unwrap();
    let indexed = memory_pipeline(sample_ledger()).index_addresses().await.unwrap();
    assert_eq!(indexed.indexing_stats().new_identities, 6);
    assert_eq!(indexed.index().count(), 6);

    let clustered = indexed.cluster().await.unwrap();
    assert_eq!(clustered.clustering_stats().clusters, 4);

    let outcome = clustered.materialize(dir.path().join("cluster.bin")).unwrap();
    assert_eq!(outcome.assignment().len(), 6);
}

#[tokio::test]
async fn test_scratch_dir_removed_on_drop() {
    let dir = tempfile::tempdir().unwrap();
    let scratch_path = dir.path().join("scratch");
    std::fs::create_dir_all(scratch_path.join("stale")).unwrap();

    let scratch = ScratchDir::acquire(&scratch_path).unwrap();
    assert!(!scratch_path.exists());
    std::fs::create_dir_all(&scratch_path).unwrap();

    let outcome = memory_pipeline(sample_ledger())
        .with_scratch(scratch)
        .run(dir.path().join("cluster.bin"))
        .await
        .unwrap();
    assert!(scratch_path.exists());
    drop(outcome);
    assert!(!scratch_path.exists());
}

#[tokio::test]
async fn test_scratch_dir_removed_on_failure() {
    let dir = tempfile::tempdir().unwrap();
    let scratch_path = dir.path().join("scratch");
    std::fs::create_dir_all(&scratch_path).unwrap();
    let scratch = ScratchDir::acquire(&scratch_path).unwrap();
    std::fs::create_dir_all(&scratch_path).unwrap();

    let ledger = BrokenLedger {
        blocks: sample_blocks(),
        good: 2,
    };
    let result = memory_pipeline(Arc::new(ledger))
        .with_scratch(scratch)
        .run(dir.path().join("cluster.bin"))
        .await;
    assert!(result.is_err());
    assert!(!scratch_path.exists());
}

#[tokio::test]
async fn test_rocks_pipeline_from_config() {
    let dir = tempfile::tempdir().unwrap();
    let ledger_path = dir.path().join("ledger.jsonl");
    let lines: Vec<String> = sample_blocks()
        .iter()
        .map(|b| serde_json::to_string(b).unwrap())
        .collect();
    std::fs::write(&ledger_path, lines.join("\n")).unwrap();

    let mut config = ClusterConfig::default();
    config.ledger.path = ledger_path;
    config.index.path = dir.path().join("index");
    config.index.scratch = true;
    config.index.write_buffer_mb = 4;
    config.index.target_file_size_mb = 4;
    config.index.max_bytes_for_level_base_mb = 16;
    config.index.background_jobs = 2;
    config.cluster_file.0 = dir.path().join("cluster.bin");

    let pipeline: ClusterPipeline<RocksStore> = ClusterPipeline::open(&config).unwrap();
    let outcome = pipeline.run(&config.cluster_file).await.unwrap();
    assert_eq!(outcome.stats().summary.clusters, 4);
    assert_eq!(outcome.index().store().path(), config.index.path.as_path());
    drop(outcome);

    assert!(!config.index.path.exists());
    assert_eq!(ClusterAssignment::load(&config.cluster_file).unwrap().len(), 6);
}
