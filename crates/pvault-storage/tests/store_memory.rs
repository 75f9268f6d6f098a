//! BackupStore against the OpenDAL memory service.

use opendal::Operator;
use pvault_core::types::PhotoMetadata;
use pvault_crypto::{Encryptor, KdfParams};
use pvault_storage::{BackupStore, StorageError, StorageUsage, UploadRequest};
use secrecy::SecretString;

fn memory_store() -> BackupStore {
    let op = Operator::new(opendal::services::Memory::default())
        .expect("memory operator")
        .finish();
    BackupStore::new(op, "backup")
}

fn fast() -> Encryptor {
    Encryptor::new(KdfParams::Pbkdf2Sha256 { iterations: 1_000 })
}

fn request(name: &str, data: &[u8], folder: Option<&str>) -> UploadRequest {
    UploadRequest {
        original_filename: name.to_string(),
        size: data.len() as u64,
        envelope: fast().encrypt_file(data, None).unwrap(),
        folder: folder.map(str::to_string),
        metadata: None,
    }
}

#[tokio::test]
async fn upload_then_download_protected() {
    let store = memory_store();
    let enc = fast();
    let pass = SecretString::from("correct-horse");
    let envelope = enc.encrypt_file(b"holiday pixels", Some(&pass)).unwrap();

    let record = store
        .upload(UploadRequest {
            original_filename: "beach.jpg".into(),
            size: 14,
            envelope,
            folder: Some("2024".into()),
            metadata: Some(PhotoMetadata::default().with_dimensions(4, 3)),
        })
        .await
        .unwrap();

    assert_eq!(record.size, 14);
    assert_eq!(record.encrypted_size, 14 + 16);
    assert!(record.encryption.is_key_protected);

    let (fetched, envelope) = store.download(&record.id).await.unwrap();
    assert_eq!(fetched, record);
    assert_eq!(
        enc.decrypt_file(&envelope, Some(&pass)).unwrap(),
        b"holiday pixels"
    );
}

#[tokio::test]
async fn stored_blob_is_not_plaintext() {
    let store = memory_store();
    let record = store
        .upload(request("note.txt", b"plain words here", None))
        .await
        .unwrap();

    let blob = store
        .operator()
        .read(&format!("backup/blobs/{}", record.id))
        .await
        .unwrap()
        .to_vec();
    assert_eq!(blob.len(), 16 + 16);
    assert!(!blob.windows(5).any(|w| w == b"plain"));
}

#[tokio::test]
async fn list_filters_by_folder_and_sorts() {
    let store = memory_store();
    store.upload(request("b.jpg", b"2", Some("trip"))).await.unwrap();
    store.upload(request("a.jpg", b"1", Some("/trip/"))).await.unwrap();
    store.upload(request("c.jpg", b"3", None)).await.unwrap();

    let all = store.list(None).await.unwrap();
    assert_eq!(all.len(), 3);

    let trip = store.list(Some("trip")).await.unwrap();
    assert!(trip.windows(2).all(|w| {
        (w[0].created_at, &w[0].original_filename) <= (w[1].created_at, &w[1].original_filename)
    }));
    let mut names: Vec<_> = trip.iter().map(|f| f.original_filename.as_str()).collect();
    names.sort();
    assert_eq!(names, ["a.jpg", "b.jpg"]);
}

#[tokio::test]
async fn list_empty_store() {
    assert!(memory_store().list(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn rename_rewrites_record_only() {
    let store = memory_store();
    let record = store.upload(request("old.jpg", b"x", None)).await.unwrap();

    let renamed = store.rename(&record.id, "  new.jpg ").await.unwrap();
    assert_eq!(renamed.original_filename, "new.jpg");
    assert_eq!(renamed.encryption, record.encryption);
    assert_eq!(store.get(&record.id).await.unwrap().original_filename, "new.jpg");

    let err = store.rename(&record.id, "   ").await.unwrap_err();
    assert!(matches!(err, StorageError::InvalidName(_)));
}

#[tokio::test]
async fn delete_removes_blob_and_record() {
    let store = memory_store();
    let record = store.upload(request("gone.jpg", b"bye", None)).await.unwrap();

    store.delete(&record.id).await.unwrap();

    assert!(matches!(
        store.get(&record.id).await,
        Err(StorageError::NotFound(_))
    ));
    assert!(!store
        .operator()
        .exists(&format!("backup/blobs/{}", record.id))
        .await
        .unwrap());
    assert!(matches!(
        store.delete(&record.id).await,
        Err(StorageError::NotFound(_))
    ));
}

#[tokio::test]
async fn unknown_and_malformed_ids_are_not_found() {
    let store = memory_store();
    assert!(matches!(
        store.download("3f1c0c2e-8a4b-4c7e-9d2a-000000000000").await,
        Err(StorageError::NotFound(_))
    ));
    assert!(matches!(
        store.get("../../etc").await,
        Err(StorageError::NotFound(_))
    ));
}

#[tokio::test]
async fn upload_rejects_empty_name() {
    let store = memory_store();
    let err = store.upload(request("  ", b"x", None)).await.unwrap_err();
    assert!(matches!(err, StorageError::InvalidName(_)));
    assert!(store.list(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn delete_leaves_only_complete_records() {
    let store = memory_store();
    let keep = store.upload(request("keep.jpg", b"k", None)).await.unwrap();
    let gone = store.upload(request("gone.jpg", b"g", None)).await.unwrap();

    store.delete(&gone.id).await.unwrap();
    for record in store.list(None).await.unwrap() {
        store.download(&record.id).await.unwrap();
    }

    // An orphan blob, as left by an interrupted delete, is never listed.
    store
        .operator()
        .write(&format!("backup/blobs/{}", gone.id), vec![0u8; 17])
        .await
        .unwrap();
    let listed: Vec<_> = store.list(None).await.unwrap().into_iter().map(|f| f.id).collect();
    assert_eq!(listed, vec![keep.id]);
    assert_eq!(store.usage().await.unwrap().files, 1);
}

#[tokio::test]
async fn move_file_between_folders() {
    let store = memory_store();
    let record = store.upload(request("m.jpg", b"m", Some("inbox"))).await.unwrap();

    let moved = store.move_file(&record.id, Some("/2024/summer/")).await.unwrap();
    assert_eq!(moved.folder.as_deref(), Some("2024/summer"));
    assert!(store.list(Some("inbox")).await.unwrap().is_empty());
    assert_eq!(store.list(Some("2024/summer")).await.unwrap().len(), 1);

    let top = store.move_file(&record.id, None).await.unwrap();
    assert_eq!(top.folder, None);
    assert_eq!(top.encryption, record.encryption);

    assert!(matches!(
        store.move_file("3f1c0c2e-8a4b-4c7e-9d2a-000000000000", Some("x")).await,
        Err(StorageError::NotFound(_))
    ));
}

#[tokio::test]
async fn folders_summarise_their_files() {
    let store = memory_store();
    store.upload(request("a.jpg", b"aa", Some("trip"))).await.unwrap();
    store.upload(request("b.jpg", b"bbb", Some("trip"))).await.unwrap();
    store.upload(request("c.jpg", b"c", Some("pets"))).await.unwrap();
    store.upload(request("d.jpg", b"d", None)).await.unwrap();

    let folders = store.folders().await.unwrap();
    let summary: Vec<_> = folders
        .iter()
        .map(|f| (f.name.as_str(), f.file_count, f.bytes))
        .collect();
    assert_eq!(summary, [("pets", 1, 1), ("trip", 2, 5)]);
}

#[tokio::test]
async fn rename_folder_carries_subfolders() {
    let store = memory_store();
    store.upload(request("a.jpg", b"a", Some("trip"))).await.unwrap();
    store.upload(request("b.jpg", b"b", Some("trip/day1"))).await.unwrap();
    let other = store.upload(request("c.jpg", b"c", Some("trips"))).await.unwrap();

    assert_eq!(store.rename_folder("trip", "italy").await.unwrap(), 2);

    assert_eq!(store.list(Some("italy")).await.unwrap().len(), 1);
    assert_eq!(store.list(Some("italy/day1")).await.unwrap().len(), 1);
    assert!(store.list(Some("trip")).await.unwrap().is_empty());
    assert_eq!(
        store.get(&other.id).await.unwrap().folder.as_deref(),
        Some("trips")
    );

    assert!(matches!(
        store.rename_folder("nowhere", "x").await,
        Err(StorageError::NotFound(_))
    ));
    assert!(matches!(
        store.rename_folder("italy", " / ").await,
        Err(StorageError::InvalidName(_))
    ));
}

#[tokio::test]
async fn delete_folder_removes_contents_only() {
    let store = memory_store();
    let a = store.upload(request("a.jpg", b"a", Some("old"))).await.unwrap();
    store.upload(request("b.jpg", b"b", Some("old/nested"))).await.unwrap();
    let keep = store.upload(request("c.jpg", b"c", Some("older"))).await.unwrap();

    assert_eq!(store.delete_folder("/old/").await.unwrap(), 2);

    let left: Vec<_> = store.list(None).await.unwrap().into_iter().map(|f| f.id).collect();
    assert_eq!(left, vec![keep.id]);
    assert!(!store
        .operator()
        .exists(&format!("backup/blobs/{}", a.id))
        .await
        .unwrap());
    assert!(matches!(
        store.delete_folder("old").await,
        Err(StorageError::NotFound(_))
    ));
}

#[tokio::test]
async fn usage_totals_plain_and_encrypted_bytes() {
    let store = memory_store();
    assert_eq!(store.usage().await.unwrap(), StorageUsage::default());

    store.upload(request("a.jpg", b"1234", None)).await.unwrap();
    store.upload(request("b.jpg", b"56", Some("x"))).await.unwrap();

    let usage = store.usage().await.unwrap();
    assert_eq!(usage.files, 2);
    assert_eq!(usage.bytes, 6);
    assert_eq!(usage.encrypted_bytes, 6 + 2 * 16);
}

#[tokio::test]
async fn dot_names_are_rejected() {
    let store = memory_store();
    for name in [".", "..", "../x.jpg", "a\\b.jpg"] {
        assert!(matches!(
            store.upload(request(name, b"x", None)).await,
            Err(StorageError::InvalidName(_))
        ));
    }
    let record = store.upload(request("ok.jpg", b"x", None)).await.unwrap();
    assert!(matches!(
        store.rename(&record.id, "..").await,
        Err(StorageError::InvalidName(_))
    ));
}
