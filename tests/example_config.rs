use std::path::Path;

use matrixon_core::{Config, DatabaseBackend};

#[test]
fn test_example_config_is_valid() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config/example.toml");
    let config = Config::load(Some(&path)).unwrap();

    assert_eq!(config.server_name, "example.org");
    assert_eq!(config.database.backend, DatabaseBackend::Sqlite);
    assert_eq!(config.server_notices.room_ids, vec!["!notices:example.org"]);
    assert_eq!(config.devices[0].user_id, "@admin:example.org");
    assert_eq!(config.memberships[0].room_id, "!notices:example.org");
}
