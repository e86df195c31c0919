use std::collections::HashMap;

use stalker_relay::errors::AppError;
use stalker_relay::models::{Channel, FallbackGroup, GroupMember, MacEntry, Portal};
use stalker_relay::store::{JsonPortalStore, PortalStore, StoreDocument};

fn portal(id: &str, macs: &[&str]) -> Portal {
    Portal {
        id: id.to_string(),
        name: format!("Portal {id}"),
        url: "http://portal.example/stalker_portal/server/load.php".to_string(),
        proxy: None,
        macs: macs.iter().map(|m| MacEntry::new(*m)).collect(),
        streams_per_mac: 1,
        enabled: true,
        custom_channel_names: HashMap::new(),
    }
}

fn channel(id: &str) -> Channel {
    Channel {
        id: id.to_string(),
        name: format!("Channel {id}"),
        number: None,
        genre_id: None,
        logo: None,
        cmd: format!("ffmpeg http://localhost/ch/{id}_"),
    }
}

#[tokio::test]
async fn missing_file_starts_empty() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonPortalStore::open(dir.path().join("portals.json")).await.unwrap();
    assert!(store.portals().await.unwrap().is_empty());
    assert!(store.portal("p1").await.unwrap().is_none());
}

#[tokio::test]
async fn corrupt_document_is_a_configuration_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("portals.json");
    std::fs::write(&path, "{ not json").unwrap();

    let err = JsonPortalStore::open(&path).await.err().unwrap();
    assert!(matches!(err, AppError::Configuration { .. }));
}

#[tokio::test]
async fn writes_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("portals.json");

    let store = JsonPortalStore::open(&path).await.unwrap();
    store.upsert_portal(portal("p1", &["A", "B"])).await.unwrap();
    store
        .save_channels(
            "p1",
            vec![channel("10"), channel("11")],
            HashMap::from([("3".to_string(), "News".to_string())]),
        )
        .await
        .unwrap();

    let mut demoted = store.portal("p1").await.unwrap().unwrap();
    demoted.demote_mac("A");
    store.persist(&demoted).await.unwrap();

    let reopened = JsonPortalStore::open(&path).await.unwrap();
    let stored = reopened.portal("p1").await.unwrap().unwrap();
    let order: Vec<_> = stored.macs.iter().map(|m| m.mac.as_str()).collect();
    assert_eq!(order, vec!["B", "A"]);
    assert_eq!(reopened.channels("p1").await.unwrap().len(), 2);
    assert_eq!(
        reopened.channel("p1", "11").await.unwrap().map(|c| c.name),
        Some("Channel 11".to_string())
    );
    assert_eq!(
        reopened.snapshot().await.channels["p1"].genres.get("3").map(String::as_str),
        Some("News")
    );
}

#[tokio::test]
async fn persisting_unknown_portal_fails() {
    let store = JsonPortalStore::in_memory(StoreDocument::default());
    assert!(store.persist(&portal("ghost", &["A"])).await.is_err());
}

#[tokio::test]
async fn fallback_group_lookup_matches_portal_and_channel() {
    let mut document = StoreDocument::default();
    document.groups.push(FallbackGroup {
        name: "News".to_string(),
        members: vec![GroupMember::new("p1", "10"), GroupMember::new("p2", "20")],
    });
    let store = JsonPortalStore::in_memory(document);

    let group = store.fallback_group("p2", "20").await.unwrap().unwrap();
    assert_eq!(group.name, "News");
    assert!(store.fallback_group("p2", "10").await.unwrap().is_none());
}
