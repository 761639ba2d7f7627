use std::path::Path;

use docfs_sdk::{DocFs, ErrorKind, FsConfig, MemoryStore};

fn config(path: &Path) -> FsConfig {
    let mut config = FsConfig::default().with_snapshot_path(path);
    config.chunks.max_chunk_length = 16;
    config
}

async fn open(path: &Path) -> DocFs<MemoryStore> {
    DocFs::open_snapshot(config(path)).await.unwrap()
}

#[tokio::test]
async fn namespace_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fs.snap");

    let (root, docs, file) = {
        let fs = open(&path).await;
        let root = fs.root_id().clone();
        let docs = fs.directories().create(&root, "docs").await.unwrap();
        let file = fs
            .files()
            .create(&docs.id, "notes.md", &[7u8; 100])
            .await
            .unwrap();
        fs.save_snapshot().unwrap();
        (root, docs, file)
    };

    let fs = open(&path).await;
    assert_eq!(fs.root_id(), &root);
    let listed = fs.directories().list(&docs.id).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, file.id);
    assert_eq!(fs.files().download(&file.id).await.unwrap().0, vec![7u8; 100]);
}

#[tokio::test]
async fn removed_content_is_gone_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fs.snap");

    let id = {
        let fs = open(&path).await;
        let root = fs.root_id().clone();
        let file = fs.files().create(&root, "f", b"bytes").await.unwrap();
        fs.files().remove(&file.id, true).await.unwrap();
        fs.save_snapshot().unwrap();
        file.id
    };

    let fs = open(&path).await;
    assert!(fs.chunks().stat(&id).await.unwrap().is_none());
    assert_eq!(fs.store().collection_len("chunks"), 0);
    let err = fs.files().download(&id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn unfinished_upload_is_reclaimed_on_open() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fs.snap");

    let id = {
        let fs = open(&path).await;
        let root = fs.root_id().clone();
        let mut up = fs.files().open_upload_stream(&root, "partial").await.unwrap();
        up.write(&[1u8; 40]).await.unwrap();
        // Snapshot while the upload is still open, as a crash would.
        fs.save_snapshot().unwrap();
        up.id().clone()
    };

    let fs = open(&path).await;
    assert!(fs.chunks().stat(&id).await.unwrap().is_none());
    assert_eq!(fs.store().collection_len("chunks"), 0);
    assert_eq!(fs.store().collection_len("elements"), 1);
}

#[tokio::test]
async fn dangling_file_element_is_dropped_on_open() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fs.snap");

    let id = {
        let fs = open(&path).await;
        let root = fs.root_id().clone();
        let file = fs.files().create(&root, "f", b"x").await.unwrap();
        fs.chunks().purge(&file.id).await.unwrap();
        fs.save_snapshot().unwrap();
        file.id
    };

    let fs = open(&path).await;
    let err = fs.files().get(&id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn soft_deleted_file_restores_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fs.snap");

    let (dir_id, file_id) = {
        let fs = open(&path).await;
        let root = fs.root_id().clone();
        let d = fs.directories().create(&root, "d").await.unwrap();
        let f = fs.files().create(&d.id, "keep", b"payload").await.unwrap();
        fs.files().remove(&f.id, false).await.unwrap();
        fs.save_snapshot().unwrap();
        (d.id, f.id)
    };

    let fs = open(&path).await;
    let restored = fs.files().restore(&file_id).await.unwrap();
    assert_eq!(restored.parent_id, Some(dir_id));
    assert_eq!(fs.files().download(&file_id).await.unwrap().0, b"payload");
}
