mod common;

use common::{compiled_mapping, User, SCHEMA_SQL};
use repokit_core::{
    Adapter, AdapterConfig, DeletePolicy, ModelError, PublicRepository, Repository,
    SqliteAdapter, SqliteConfig,
};

#[test]
fn memory_is_the_default_adapter() {
    let config: AdapterConfig = serde_json::from_str(r#"{"kind":"memory"}"#).unwrap();
    assert_eq!(config, AdapterConfig::default());

    let adapter = config.build().unwrap();
    assert_eq!(adapter.name(), "memory");
    assert_eq!(adapter.delete_policy(), DeletePolicy::Ignore);
}

#[test]
fn sqlite_config_fills_defaults() {
    let config: AdapterConfig =
        serde_json::from_str(r#"{"kind":"sqlite","delete_policy":"require"}"#).unwrap();

    match &config {
        AdapterConfig::Sqlite(sqlite) => {
            assert_eq!(sqlite.path, None);
            assert_eq!(sqlite.busy_timeout_ms, 5_000);
            assert_eq!(sqlite.delete_policy, DeletePolicy::Require);
        }
        other => panic!("expected sqlite config, got {other:?}"),
    }

    let adapter = config.build().unwrap();
    assert_eq!(adapter.name(), "sqlite");
    assert_eq!(adapter.delete_policy(), DeletePolicy::Require);
}

#[test]
fn invalid_sqlite_settings_are_rejected() {
    let zero_timeout = AdapterConfig::Sqlite(SqliteConfig {
        busy_timeout_ms: 0,
        ..SqliteConfig::default()
    });
    assert!(matches!(zero_timeout.build(), Err(ModelError::InvalidConfig(_))));

    let empty_path = AdapterConfig::Sqlite(SqliteConfig {
        path: Some("".into()),
        ..SqliteConfig::default()
    });
    assert!(matches!(empty_path.build(), Err(ModelError::InvalidConfig(_))));

    assert!(serde_json::from_str::<AdapterConfig>(r#"{"kind":"postgres"}"#).is_err());
}

#[test]
fn configured_file_adapter_serves_repositories() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("configured.sqlite3");
    SqliteAdapter::open(&path)
        .unwrap()
        .execute_batch(SCHEMA_SQL)
        .unwrap();

    let json = serde_json::json!({
        "kind": "sqlite",
        "path": path,
        "busy_timeout_ms": 250,
    });
    let config: AdapterConfig = serde_json::from_value(json).unwrap();
    let repo: Repository<User> = Repository::new(compiled_mapping(), config.build().unwrap());

    let created = repo.create(&User::new("Ada", 30)).unwrap();
    assert_eq!(repo.find(created.id.unwrap()).unwrap(), created);
}

#[test]
fn config_serializes_with_its_kind_tag() {
    let value = serde_json::to_value(AdapterConfig::default()).unwrap();
    assert_eq!(
        value,
        serde_json::json!({ "kind": "memory", "delete_policy": "ignore" })
    );
}
