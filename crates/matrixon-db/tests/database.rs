use std::{collections::HashSet, sync::Arc};

use matrixon_core::{
    types::{PseudoIdKey, RoomNid, UserNid},
    DatabaseBackend, DatabaseConfig,
};
use matrixon_db::{Database, NidKind};

fn sqlite_config(dir: &tempfile::TempDir) -> DatabaseConfig {
    DatabaseConfig {
        backend: DatabaseBackend::Sqlite,
        url: format!("sqlite://{}", dir.path().join("keys.db").display()),
        max_connections: 8,
        ..DatabaseConfig::default()
    }
}

#[tokio::test]
async fn test_identities_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let key = PseudoIdKey::generate();

    let (user_nid, room_nid) = {
        let db = Database::open(&sqlite_config(&dir)).await.unwrap();
        let user_nid = UserNid(db.short_ids.get_or_create_nid(NidKind::User, "@alice:example.org").await.unwrap());
        let room_nid = RoomNid(db.short_ids.get_or_create_nid(NidKind::Room, "!room:example.org").await.unwrap());
        db.user_room_keys
            .insert_user_room_private_key(user_nid, room_nid, &key)
            .await
            .unwrap();
        (user_nid, room_nid)
    };

    let db = Database::open(&sqlite_config(&dir)).await.unwrap();
    assert_eq!(
        db.short_ids.get_nid(NidKind::User, "@alice:example.org").await.unwrap(),
        Some(user_nid.0)
    );
    assert_eq!(
        db.user_room_keys.select_user_room_private_key(user_nid, room_nid).await.unwrap(),
        Some(key.clone())
    );

    // a new candidate after reopening still loses to the stored key
    let got = db
        .user_room_keys
        .insert_user_room_private_key(user_nid, room_nid, &PseudoIdKey::generate())
        .await
        .unwrap();
    assert_eq!(got, key);
}

#[tokio::test]
async fn test_concurrent_claims_across_many_rooms() {
    let dir = tempfile::tempdir().unwrap();
    let db = Arc::new(Database::open(&sqlite_config(&dir)).await.unwrap());

    let mut handles = Vec::new();
    for room in 0..4 {
        for _ in 0..8 {
            let db = Arc::clone(&db);
            handles.push(tokio::spawn(async move {
                let room_id = format!("!room{room}:example.org");
                let user = db.short_ids.get_or_create_nid(NidKind::User, "@alice:example.org").await.unwrap();
                let room_nid = db.short_ids.get_or_create_nid(NidKind::Room, &room_id).await.unwrap();
                let key = db
                    .user_room_keys
                    .insert_user_room_private_key(UserNid(user), RoomNid(room_nid), &PseudoIdKey::generate())
                    .await
                    .unwrap();
                (room, key.to_bytes())
            }));
        }
    }

    let mut keys = HashSet::new();
    for handle in handles {
        keys.insert(handle.await.unwrap());
    }
    // one canonical key per room, and rooms never share one
    assert_eq!(keys.len(), 4);
    assert_eq!(keys.iter().map(|(_, key)| *key).collect::<HashSet<_>>().len(), 4);
}
