use super::{load_settings_from, normalize_database_url, prepare_database_url, Settings};

use std::collections::HashMap;

fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key| map.get(key).cloned()
}

#[test]
fn defaults_apply_without_file_or_env() {
    let settings = load_settings_from(None, env_from(&[]));
    assert_eq!(settings, Settings::default());
}

#[test]
fn file_values_override_defaults() {
    let settings = load_settings_from(
        Some(
            r#"
bind_addr = "0.0.0.0:9000"
database_url = "sqlite://./tmp/file.db"
max_body_bytes = 1024
"#,
        ),
        env_from(&[]),
    );
    assert_eq!(settings.server_bind, "0.0.0.0:9000");
    assert_eq!(settings.database_url, "sqlite://./tmp/file.db");
    assert_eq!(settings.max_body_bytes, 1024);
    assert_eq!(settings.log_level, "info");
}

#[test]
fn prefixed_env_wins_over_plain_env_and_file() {
    let settings = load_settings_from(
        Some(r#"bind_addr = "0.0.0.0:9000""#),
        env_from(&[
            ("SERVER_BIND", "127.0.0.1:7000"),
            ("APP__BIND_ADDR", "127.0.0.1:7100"),
            ("DATABASE_URL", "sqlite://plain.db"),
        ]),
    );
    assert_eq!(settings.server_bind, "127.0.0.1:7100");
    assert_eq!(settings.database_url, "sqlite://plain.db");
}

#[test]
fn unparsable_file_and_bad_numbers_are_ignored() {
    let settings = load_settings_from(
        Some("this is = = not toml"),
        env_from(&[("APP__MAX_BODY_BYTES", "lots")]),
    );
    assert_eq!(settings, Settings::default());
}

#[test]
fn normalizes_plain_file_path_to_sqlite_url() {
    assert_eq!(
        normalize_database_url("./data/test.db"),
        "sqlite://./data/test.db"
    );
    assert_eq!(normalize_database_url("  "), Settings::default().database_url);
    assert_eq!(normalize_database_url("sqlite::memory:"), "sqlite::memory:");
}

#[test]
fn creates_parent_dir_for_sqlite_url() {
    let temp_root = tempfile::tempdir().expect("tempdir");
    let db_path = temp_root.path().join("data").join("test.db");

    prepare_database_url(db_path.to_string_lossy().as_ref()).expect("prepare db url");
    assert!(temp_root.path().join("data").exists());
}

#[tokio::test]
async fn prepared_database_url_creates_openable_sqlite_file() {
    let temp_root = tempfile::tempdir().expect("tempdir");
    let db_path = temp_root.path().join("nested").join("server.db");

    let prepared = prepare_database_url(db_path.to_string_lossy().as_ref()).expect("prepare");
    let storage = storage::Storage::new(&prepared).await.expect("open sqlite");
    drop(storage);

    assert!(
        db_path.exists(),
        "database file should be created: {}",
        db_path.display()
    );
}
