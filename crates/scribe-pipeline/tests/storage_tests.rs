//! Storage integration tests
//!
//! These tests exercise [`Storage`] against a real S3-compatible endpoint:
//! - Upload and download round trips
//! - Missing keys reported as `None`
//! - Paginated, prefix-scoped listing
//!
//! **Requirements**:
//! - MinIO or S3 must be running and accessible
//! - `SCRIBE_TEST_S3_ENDPOINT` (e.g. "http://localhost:9000") and
//!   `SCRIBE_TEST_S3_BUCKET` must be set; the bucket must already exist
//! - Credentials come from the default AWS provider chain
//! - Tests are skipped when the endpoint is not configured
//!
//! **Running tests**:
//! ```bash
//! SCRIBE_TEST_S3_ENDPOINT=http://localhost:9000 SCRIBE_TEST_S3_BUCKET=scribe-test \
//!     cargo test -p scribe-pipeline --test storage_tests
//! ```

#![allow(clippy::unwrap_used, clippy::expect_used)]

use scribe_pipeline::aws::load_sdk_config;
use scribe_pipeline::config::AwsConfig;
use scribe_pipeline::storage::Storage;
use scribe_pipeline::ObjectStore;

/// Storage scoped to a fresh prefix, if an endpoint is configured
async fn setup_storage(test_name: &str) -> Option<(Storage, String)> {
    let endpoint = std::env::var("SCRIBE_TEST_S3_ENDPOINT").ok()?;
    let bucket = std::env::var("SCRIBE_TEST_S3_BUCKET").ok()?;

    let sdk_config = load_sdk_config(&AwsConfig {
        region: Some("us-east-1".to_string()),
        endpoint_url: Some(endpoint),
        force_path_style: true,
    })
    .await;

    let prefix = format!("test/{}/{}/", test_name, uuid::Uuid::new_v4().simple());
    Some((Storage::new(&sdk_config, bucket, prefix.clone(), true), prefix))
}

// ============================================================================
// Upload and Download Tests
// ============================================================================

#[tokio::test]
async fn test_storage_upload_download() {
    let Some((storage, prefix)) = setup_storage("upload_download").await else {
        println!("Skipping test: SCRIBE_TEST_S3_ENDPOINT not configured");
        return;
    };

    let key = format!("{}redacted_job-1.json", prefix);
    let body = br#"[{"text":"hello","start_time":0.0,"end_time":1.0,"speaker":"spk0"}]"#.to_vec();

    storage
        .upload(&key, body.clone(), "application/json")
        .await
        .expect("Upload should succeed");

    let downloaded = storage.get(&key).await.expect("Download should succeed");
    assert_eq!(downloaded, Some(body));
}

#[tokio::test]
async fn test_storage_missing_key_is_none() {
    let Some((storage, prefix)) = setup_storage("missing_key").await else {
        println!("Skipping test: SCRIBE_TEST_S3_ENDPOINT not configured");
        return;
    };

    let key = format!("{}job-does-not-exist.json", prefix);
    assert_eq!(storage.get(&key).await.unwrap(), None);
}

// ============================================================================
// List Tests
// ============================================================================

#[tokio::test]
async fn test_storage_list_scoped_to_prefix() {
    let Some((storage, prefix)) = setup_storage("list").await else {
        println!("Skipping test: SCRIBE_TEST_S3_ENDPOINT not configured");
        return;
    };

    let mut expected = Vec::new();
    for i in 0..3 {
        let key = format!("{}call-{}.mp3", prefix, i);
        storage
            .put(&key, vec![0x42; 16], "audio/mpeg")
            .await
            .expect("Upload should succeed");
        expected.push(key);
    }

    let mut keys = storage.list_keys().await.expect("List should succeed");
    keys.sort();
    assert_eq!(keys, expected);
}
