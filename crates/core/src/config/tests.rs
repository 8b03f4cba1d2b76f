use super::*;

#[test]
fn test_cluster_config_default() {
    let config = ClusterConfig::default();
    assert_eq!(config.index.write_buffer_mb, 256);
    assert_eq!(config.index.key_encoding, KeyEncoding::Raw);
    assert_eq!(config.pipeline.prefetch_blocks, 64);
    assert_eq!(config.export.chunk_size, 1_000_000);
    assert_eq!(config.export.format, ExportFormat::Parquet);
    assert_eq!(config.export.format.extension(), "parquet");
    assert!(!config.index.scratch);
    assert!(config.validate().is_ok());
}

#[test]
fn test_validation_collects_every_error() {
    let mut config = ClusterConfig::default();
    config.pipeline.prefetch_blocks = 0;
    config.export.chunk_size = 0;
    config.logging.level = "loud".to_string();

    let errors = config.validate().unwrap_err();
    let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
    assert_eq!(errors.len(), 3);
    assert!(fields.contains(&"pipeline.prefetch_blocks"));
    assert!(fields.contains(&"export.chunk_size"));
    assert!(fields.contains(&"logging.level"));
}

#[test]
fn test_export_dirs_must_differ() {
    let mut config = ClusterConfig::default();
    config.export.output_dir = config.export.input_dir.clone();
    let errors = config.validate().unwrap_err();
    assert_eq!(errors[0].field, "export.output_dir");
}

#[test]
fn test_partial_toml_uses_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cospend.toml");
    fs::write(
        &path,
        r#"
[index]
path = "/scratch/address_index"
scratch = true
key_encoding = "sha256"

[export]
partition = "day"
format = "tsv"
"#,
    )
    .unwrap();

    let manager = ConfigManager::load_from_file(&path).unwrap();
    let config = manager.config();
    assert_eq!(config.index.path, PathBuf::from("/scratch/address_index"));
    assert!(config.index.scratch);
    assert_eq!(config.index.key_encoding, KeyEncoding::Sha256);
    assert_eq!(config.index.bloom_bits_per_key, 12.0);
    assert_eq!(config.export.partition, ExportPartition::Day);
    assert_eq!(config.export.format, ExportFormat::Tsv);
    assert_eq!(config.pipeline.progress_interval, 10_000);
    assert_eq!(manager.config_path(), path.as_path());
}

#[test]
fn test_save_and_reload_each_format() {
    let dir = tempfile::tempdir().unwrap();
    for name in ["cospend.toml", "cospend.json", "cospend.yaml"] {
        let path = dir.path().join(name);
        let mut manager = ConfigManager::new();
        manager.config_mut().pipeline.prefetch_blocks = 7;
        manager.config_mut().export.start_tx = 42;
        manager.save_to_file(&path).unwrap();

        let loaded = ConfigManager::load_from_file(&path).unwrap().into_config();
        assert_eq!(loaded.pipeline.prefetch_blocks, 7, "{}", name);
        assert_eq!(loaded.export.start_tx, 42, "{}", name);
    }
}

#[test]
fn test_unsupported_extension() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cospend.ini");
    fs::write(&path, "").unwrap();
    assert!(ConfigManager::load_from_file(&path).is_err());
    assert!(ConfigManager::generate_default_config(&path).is_err());
}

#[test]
fn test_generate_default_config() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("default.toml");
    ConfigManager::generate_default_config(&path).unwrap();
    let loaded = ConfigManager::load_from_file(&path).unwrap();
    assert!(loaded.validate().is_ok());
}
