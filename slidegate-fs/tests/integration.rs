use slidegate::{
    ClientId, ClientRateRecord, DocumentStore, Limits, ManualClock, SlidingWindowLimiter,
};
use slidegate_fs::{FsStore, FsStoreError};

#[tokio::test]
async fn missing_record_reads_as_none() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsStore::new(dir.path());
    assert_eq!(store.get("c1").await.unwrap(), None);
}

#[tokio::test]
async fn set_then_get_overwrites_document() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsStore::open(dir.path().join("nested/records")).await.unwrap();

    store.set("c1", &ClientRateRecord::new(vec![1, 2, 3])).await.unwrap();
    store.set("c1", &ClientRateRecord::new(vec![4])).await.unwrap();

    assert_eq!(store.get("c1").await.unwrap(), Some(ClientRateRecord::new(vec![4])));
    let on_disk = std::fs::read_to_string(store.path_for("c1")).unwrap();
    assert_eq!(on_disk, r#"{"actions":[4]}"#);

    // No temporary files left behind.
    let entries = std::fs::read_dir(store.dir()).unwrap().count();
    assert_eq!(entries, 1);
}

#[tokio::test]
async fn awkward_identifiers_stay_inside_the_directory() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsStore::new(dir.path());

    for key in ["", "../escape", "a/b", "C1", "c1"] {
        store.set(key, &ClientRateRecord::new(vec![key.len() as i64])).await.unwrap();
    }
    for key in ["", "../escape", "a/b", "C1", "c1"] {
        let record = store.get(key).await.unwrap().unwrap();
        assert_eq!(record.actions, vec![key.len() as i64], "key {key:?}");
        assert!(store.path_for(key).starts_with(dir.path()));
    }
}

#[tokio::test]
async fn corrupt_document_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsStore::new(dir.path());
    std::fs::write(store.path_for("c1"), b"{not json").unwrap();

    let err = store.get("c1").await.unwrap_err();
    assert!(matches!(err, FsStoreError::Corrupt { .. }));
}

#[tokio::test]
async fn document_without_actions_reads_as_empty() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsStore::new(dir.path());

    for doc in [&b"{}"[..], &br#"{"actions":null}"#[..]] {
        std::fs::write(store.path_for("c1"), doc).unwrap();
        assert_eq!(store.get("c1").await.unwrap(), Some(ClientRateRecord::default()));
    }
}

#[tokio::test]
async fn missing_directory_fails_writes() {
    let dir = tempfile::tempdir().unwrap();
    let store = FsStore::new(dir.path().join("absent"));
    let err = store.set("c1", &ClientRateRecord::new(vec![1])).await.unwrap_err();
    assert!(matches!(err, FsStoreError::Io(_)));
}

#[tokio::test]
async fn limit_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let client = ClientId::new("c1");

    {
        let limiter = SlidingWindowLimiter::builder(FsStore::new(dir.path()))
            .clock(ManualClock::new(0))
            .build();
        for _ in 0..50 {
            assert!(limiter.check_and_record(&client, 0).await.unwrap().is_admitted());
        }
    }

    // Fresh store and limiter over the same directory.
    let limiter = SlidingWindowLimiter::new(FsStore::new(dir.path()));
    assert!(!limiter.check_and_record(&client, 30_000).await.unwrap().is_admitted());
    assert_eq!(limiter.store().get("c1").await.unwrap().unwrap().actions.len(), 50);

    assert!(limiter.check_and_record(&client, 60_000).await.unwrap().is_admitted());
    assert_eq!(
        limiter.store().get("c1").await.unwrap(),
        Some(ClientRateRecord::new(vec![60_000]))
    );
}

#[tokio::test]
async fn long_identifiers_are_limited_like_short_ones() {
    let dir = tempfile::tempdir().unwrap();
    let limits = Limits::builder().max_actions(2).build().unwrap();
    let limiter = SlidingWindowLimiter::builder(FsStore::new(dir.path())).limits(limits).build();

    for len in [100, 101, 200, 4_096] {
        let client = ClientId::new("x".repeat(len));
        assert!(limiter.check_and_record(&client, 0).await.unwrap().is_admitted(), "len {len}");
        assert!(limiter.check_and_record(&client, 1).await.unwrap().is_admitted(), "len {len}");
        assert!(!limiter.check_and_record(&client, 2).await.unwrap().is_admitted(), "len {len}");
        assert_eq!(
            limiter.store().get(client.as_str()).await.unwrap(),
            Some(ClientRateRecord::new(vec![0, 1])),
            "len {len}"
        );
    }

    // One document per client and no temporary files left behind.
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 4);
}
