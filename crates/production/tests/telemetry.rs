use cosign_production::{init_tracing, TelemetryConfig, TelemetryError};

// One test per binary: the subscriber is process-global.
#[test]
fn test_init_tracing_installs_once() {
    if std::env::var("RUST_LOG").is_err() {
        let bad = TelemetryConfig {
            filter: "info,[unclosed".to_string(),
            ..TelemetryConfig::default()
        };
        assert!(matches!(
            init_tracing(&bad),
            Err(TelemetryError::InvalidFilter { .. })
        ));
    }

    let dir = tempfile::tempdir().unwrap();
    let config = TelemetryConfig::default().with_file(dir.path(), "cosign.log");
    let guard = init_tracing(&config).unwrap();
    tracing::info!(component = "telemetry-test", "Subscriber installed");

    assert!(matches!(
        init_tracing(&TelemetryConfig::default()),
        Err(TelemetryError::AlreadyInitialized)
    ));
    drop(guard);
}
