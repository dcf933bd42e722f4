//! Tests for the top-level API

use benchmark_store::{BenchmarkResult, LogConfig, TransactionSink, TransactionWriter};
use tempfile::TempDir;

#[test]
fn test_log_config_builder_chain() {
    let config = LogConfig::builder()
        .sync_on_write(true)
        .rewrite_on_upgrade(false)
        .build();

    assert!(config.sync_on_write());
    assert!(!config.rewrite_on_upgrade());
}

#[test]
fn test_log_config_serde() {
    let config = LogConfig::builder().sync_on_write(true).build();
    let encoded = serde_json::to_string(&config).unwrap();
    assert_eq!(encoded, r#"{"sync_on_write":true,"rewrite_on_upgrade":true}"#);

    let decoded: LogConfig = serde_json::from_str(&encoded).unwrap();
    assert_eq!(decoded, config);
}

#[test]
fn test_synced_writer_and_sink() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("log.jsonl");
    let config = LogConfig::builder().sync_on_write(true).build();

    let writer = TransactionWriter::open_with(&path, &config).unwrap();
    assert_eq!(writer.path(), path.as_path());
    drop(writer);

    let sink = TransactionSink::with_config(Some(path.clone()), BenchmarkResult::new(), config)
        .unwrap();
    assert_eq!(sink.log_path(), Some(path.as_path()));

    let result = sink.into_result().unwrap();
    assert_eq!(result.version(), None);
    assert_eq!(
        result.to_string(),
        "{Learners: 0, Simulations: 0, Interactions: 0}"
    );
}
