//! End-to-end scenarios exercising the public `Registry`/`Repository` surface against
//! the in-memory driver, mirroring the concrete walkthroughs used to validate this
//! design (simple upload, resumable upload, digest mismatch, cross-repo dedup, manifest
//! closure checking, and a `SkipDir` walk).

use std::str::FromStr;
use std::sync::Arc;

use distribution_core::blob::Descriptor;
use distribution_core::config::Config;
use distribution_core::digest::{self, Digest};
use distribution_core::error::{BlobError, ManifestError, WalkError};
use distribution_core::manifest::{ManifestStore, TagStore};
use distribution_core::registry::Registry;
use distribution_core::storage::memory::InMemoryDriver;
use distribution_core::storage::paths::PathMapper;
use distribution_core::storage::{walk, StorageDriver};

fn deterministic_bytes(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 256) as u8).collect()
}

#[tokio::test]
async fn simple_upload_and_fetch() {
    let driver: Arc<dyn StorageDriver> = Arc::new(InMemoryDriver::new());
    let registry = Registry::from_driver(driver.clone(), Config::in_memory());
    let repo = registry.repository("foo/bar").unwrap();
    let blobs = repo.blobs();

    let bytes = deterministic_bytes(1_048_576);
    let d = digest::sha256(&bytes);

    let mut writer = blobs.create();
    writer.write(&bytes).await.unwrap();
    writer.close().await.unwrap();
    let descriptor = writer
        .commit(&Descriptor {
            digest: d.clone(),
            length: 1_048_576,
            media_type: None,
        })
        .await
        .unwrap();
    assert_eq!(descriptor.length, 1_048_576);

    let paths = PathMapper::new();
    let blob_path = paths.blob_data_path(&d);
    assert_eq!(driver.stat(&blob_path).await.unwrap().size, 1_048_576);

    let link_path = paths.layer_link_path("foo/bar", &d).unwrap();
    assert_eq!(driver.get_content(&link_path).await.unwrap(), d.to_string().as_bytes());

    assert_eq!(blobs.stat(&d).await.unwrap().length, 1_048_576);
    assert_eq!(blobs.get(&d).await.unwrap(), bytes);
}

#[tokio::test]
async fn resumable_upload_across_two_sessions() {
    let driver: Arc<dyn StorageDriver> = Arc::new(InMemoryDriver::new());
    let registry = Registry::from_driver(driver.clone(), Config::in_memory());
    let repo = registry.repository("foo/bar").unwrap();
    let blobs = repo.blobs();

    let bytes = deterministic_bytes(1_048_576);
    let (b1, b2) = bytes.split_at(524_288);
    let d = digest::sha256(&bytes);

    let mut session_one = blobs.create();
    let upload_id = session_one.id().to_string();
    session_one.write(b1).await.unwrap();
    session_one.close().await.unwrap();

    let paths = PathMapper::new();
    let checkpoint_path = paths
        .upload_hash_state_path("foo/bar", &upload_id, "sha256", Some(524_288))
        .unwrap();
    assert!(driver.stat(&checkpoint_path).await.is_ok());

    let mut session_two = blobs.resume(&upload_id, 524_288);
    session_two.write(b2).await.unwrap();
    let descriptor = session_two
        .commit(&Descriptor {
            digest: d.clone(),
            length: 1_048_576,
            media_type: None,
        })
        .await
        .unwrap();
    assert_eq!(descriptor.length, 1_048_576);
    assert_eq!(blobs.get(&d).await.unwrap(), bytes);

    let upload_path = paths.upload_path("foo/bar", &upload_id).unwrap();
    assert!(driver.get_content(&upload_path).await.is_err());
}

#[tokio::test]
async fn digest_mismatch_rejects_upload() {
    let driver: Arc<dyn StorageDriver> = Arc::new(InMemoryDriver::new());
    let registry = Registry::from_driver(driver.clone(), Config::in_memory());
    let repo = registry.repository("foo/bar").unwrap();
    let blobs = repo.blobs();

    let bytes = deterministic_bytes(1_048_576);
    let wrong = Digest::from_str(
        "sha256:0000000000000000000000000000000000000000000000000000000000000000",
    )
    .unwrap();

    let mut writer = blobs.create();
    writer.write(&bytes).await.unwrap();
    writer.close().await.unwrap();
    let data_path = writer.id().to_string();
    let result = writer
        .commit(&Descriptor {
            digest: wrong.clone(),
            length: 1_048_576,
            media_type: None,
        })
        .await;
    assert!(matches!(result, Err(BlobError::InvalidDigest { .. })));

    let paths = PathMapper::new();
    let scratch_path = paths.upload_data_path("foo/bar", &data_path).unwrap();
    assert!(driver.get_content(&scratch_path).await.is_ok());

    let wrong_blob_path = paths.blob_data_path(&wrong);
    assert!(driver.stat(&wrong_blob_path).await.is_err());
}

#[tokio::test]
async fn dedup_across_repositories() {
    let driver: Arc<dyn StorageDriver> = Arc::new(InMemoryDriver::new());
    let registry = Registry::from_driver(driver.clone(), Config::in_memory());
    let repo_a = registry.repository("a/x").unwrap();
    let repo_b = registry.repository("a/y").unwrap();

    let bytes = b"shared layer content".to_vec();
    let descriptor_a = repo_a.blobs().put(&bytes).await.unwrap();
    let descriptor_b = repo_b.blobs().put(&bytes).await.unwrap();
    assert_eq!(descriptor_a.digest.to_string(), descriptor_b.digest.to_string());

    let paths = PathMapper::new();
    let blob_path = paths.blob_data_path(&descriptor_a.digest);
    assert_eq!(driver.get_content(&blob_path).await.unwrap(), bytes);

    assert!(driver
        .get_content(&paths.layer_link_path("a/x", &descriptor_a.digest).unwrap())
        .await
        .is_ok());
    assert!(driver
        .get_content(&paths.layer_link_path("a/y", &descriptor_a.digest).unwrap())
        .await
        .is_ok());

    let stat_a = repo_a.blobs().stat(&descriptor_a.digest).await.unwrap();
    let stat_b = repo_b.blobs().stat(&descriptor_a.digest).await.unwrap();
    assert_eq!(stat_a.digest.to_string(), stat_b.digest.to_string());
    assert_eq!(stat_a.length, stat_b.length);
}

fn manifest_with_layer_and_config(layer: &Digest, config: &Digest) -> Vec<u8> {
    format!(
        r#"{{
            "schemaVersion": 2,
            "mediaType": "application/vnd.oci.image.manifest.v1+json",
            "config": {{"mediaType":"application/vnd.oci.image.config.v1+json","digest":"{config}","size":2}},
            "layers": [
                {{"mediaType":"application/vnd.oci.image.layer.v1.tar","digest":"{layer}","size":6}}
            ]
        }}"#,
    )
    .into_bytes()
}

#[tokio::test]
async fn manifest_closure_check() {
    let driver: Arc<dyn StorageDriver> = Arc::new(InMemoryDriver::new());
    let registry = Registry::from_driver(driver, Config::in_memory());
    let repo = registry.repository("foo/bar").unwrap();
    let manifests = repo.manifests();

    let layer = digest::sha256(b"layer1");
    let config = digest::sha256(b"config");
    repo.blobs().put(b"layer1").await.unwrap();
    let bytes = manifest_with_layer_and_config(&layer, &config);

    let err = manifests.put(&bytes, Some("latest")).await.unwrap_err();
    match err {
        ManifestError::BlobUnknown(missing) => {
            assert_eq!(missing, vec![config.to_string()]);
        }
        other => panic!("expected BlobUnknown, got {other:?}"),
    }
    assert!(matches!(
        manifests.resolve("latest").await,
        Err(ManifestError::ManifestUnknown(_))
    ));

    repo.blobs().put(b"config").await.unwrap();
    let revision = manifests.put(&bytes, Some("latest")).await.unwrap();
    let resolved = manifests.resolve("latest").await.unwrap();
    assert_eq!(resolved.to_string(), revision.to_string());
}

#[tokio::test]
async fn walk_with_skip_dir() {
    let driver = InMemoryDriver::new();
    driver.put_content("/a/1", b"one").await.unwrap();
    driver.put_content("/a/2", b"two").await.unwrap();
    driver.put_content("/b/1", b"three").await.unwrap();

    let mut visited = Vec::new();
    let mut visitor = |info: &distribution_core::storage::FileInfo| -> Result<(), WalkError> {
        visited.push(info.path.clone());
        if info.path == "/a" {
            return Err(WalkError::SkipDir);
        }
        Ok(())
    };

    walk::walk(&driver, "/", None, &mut visitor).await.unwrap();
    assert_eq!(visited, vec!["/a", "/b", "/b/1"]);
}
