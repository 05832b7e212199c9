// storageto - Rust client for the storage.to file sharing service
// Copyright 2025 The storageto Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::path::PathBuf;
use std::time::Duration;

use storageto::error::{Error, ValidationErr};
use storageto::upload::utils::crc32;
use storageto_common::mock_service::{MockService, single_url, upload_id_for};
use storageto_common::mock_transport::MockTransport;
use storageto_common::rand_src::rand_bytes;
use storageto_common::test_context::{TestContext, fast_config};

fn write_files(ctx: &TestContext, count: usize) -> Vec<PathBuf> {
    (1..=count)
        .map(|i| ctx.write_file(&format!("file{i:02}.txt"), &rand_bytes(200 + i, i as u64)))
        .collect()
}

#[tokio::test]
async fn one_failed_negotiation_does_not_stop_the_batch() {
    let ctx = TestContext::new(
        MockService::new().fail_init_for("file03.txt"),
        MockTransport::new(),
    );
    let paths = write_files(&ctx, 10);

    let result = ctx
        .uploader(fast_config().batch_page_size(4))
        .upload_files(&paths, false)
        .await
        .unwrap();

    let collection = result.collection().unwrap();
    assert_eq!(collection.id, "col-1");
    let summary = result.summary().unwrap();
    assert_eq!(summary.files_total, 10);
    assert_eq!(summary.files_uploaded, 9);
    assert_eq!(summary.files_failed, 1);
    assert_eq!(summary.failures[0].filename, "file03.txt");
    assert_eq!(summary.failures[0].error, "cannot accept file03.txt");
    assert_eq!(summary.files.len(), 9);
    assert_eq!(summary.files[0].filename, "file01.txt");
    assert!(summary.files.iter().all(|f| f.filename != "file03.txt"));

    assert_eq!(ctx.service.collections_created(), vec![10]);
    assert_eq!(ctx.service.init_batch_sizes(), vec![4, 4, 2]);
    assert_eq!(ctx.service.confirm_batch_sizes(), vec![4, 4, 1]);
    assert_eq!(ctx.service.ready(), vec!["col-1".to_string()]);
    assert_eq!(ctx.transport.stored_count(), 9);
    assert!(ctx.transport.object(&single_url("file03.txt")).is_none());

    let confirmed = ctx.service.confirmed();
    assert_eq!(confirmed.len(), 9);
    assert!(confirmed.iter().all(|c| c.crc32.is_some()));
    assert!(!confirmed.iter().any(|c| c.filename == "file03.txt"));

    assert_eq!(
        ctx.observer.stages(),
        vec![
            "Initializing 10 files...".to_string(),
            "Uploading 9 files (6 concurrent)...".to_string(),
            "Confirming 9 files...".to_string(),
        ]
    );
    assert_eq!(ctx.observer.files_completed().last(), Some(&(9, 9)));
    assert_eq!(ctx.observer.warnings(), vec!["1 files failed to upload".to_string()]);
}

#[tokio::test]
async fn confirmation_follows_submission_order() {
    let ctx = TestContext::new(
        MockService::new(),
        MockTransport::new().delay(Duration::from_millis(5)),
    );
    let paths = write_files(&ctx, 8);

    ctx.uploader(fast_config())
        .upload_files(&paths, false)
        .await
        .unwrap();

    let names: Vec<String> = ctx
        .service
        .confirmed()
        .into_iter()
        .map(|c| c.filename)
        .collect();
    let expected: Vec<String> = (1..=8).map(|i| format!("file{i:02}.txt")).collect();
    assert_eq!(names, expected);
}

#[tokio::test]
async fn file_transfers_respect_the_concurrency_ceiling() {
    let ctx = TestContext::new(
        MockService::new(),
        MockTransport::new().delay(Duration::from_millis(30)),
    );
    let paths = write_files(&ctx, 14);

    let result = ctx
        .uploader(fast_config())
        .upload_files(&paths, false)
        .await
        .unwrap();

    assert_eq!(result.summary().unwrap().files_uploaded, 14);
    let max = ctx.transport.max_in_flight();
    assert!(max <= 6, "{max} files in flight");
    assert!(max >= 2, "files were not uploaded concurrently");
}

#[tokio::test]
async fn transfer_failure_is_isolated_to_its_file() {
    let ctx = TestContext::new(
        MockService::new(),
        MockTransport::new().always_fail_suffix("file02.txt"),
    );
    let paths = write_files(&ctx, 4);

    let result = ctx
        .uploader(fast_config())
        .upload_files(&paths, false)
        .await
        .unwrap();

    let summary = result.summary().unwrap();
    assert_eq!(summary.files_uploaded, 3);
    assert_eq!(summary.files_failed, 1);
    assert_eq!(
        summary.failures[0].error,
        "upload failed (HTTP 500): injected failure"
    );
    assert_eq!(ctx.transport.attempts(&single_url("file02.txt")), 3);
    assert_eq!(ctx.service.confirmed().len(), 3);
    assert_eq!(ctx.service.ready().len(), 1);
}

#[tokio::test]
async fn rejected_confirmation_is_isolated_to_its_file() {
    let ctx = TestContext::new(
        MockService::new().fail_confirm_for("file04.txt"),
        MockTransport::new(),
    );
    let paths = write_files(&ctx, 5);

    let result = ctx
        .uploader(fast_config())
        .upload_files(&paths, false)
        .await
        .unwrap();

    let summary = result.summary().unwrap();
    assert_eq!(summary.files_uploaded, 4);
    assert_eq!(summary.failures[0].filename, "file04.txt");
    assert_eq!(ctx.transport.stored_count(), 5);
    assert_eq!(ctx.service.ready().len(), 1);
}

#[tokio::test]
async fn large_files_in_a_batch_go_multipart() {
    let ctx = TestContext::new(
        MockService::new().multipart_above(2048, 1000),
        MockTransport::new(),
    );
    let small = ctx.write_file("small.txt", b"tiny");
    let big_data = rand_bytes(5_000, 3);
    let big = ctx.write_file("big.bin", &big_data);

    let result = ctx
        .uploader(fast_config())
        .upload_files(&[small, big], false)
        .await
        .unwrap();

    assert_eq!(result.summary().unwrap().files_uploaded, 2);
    let completed = ctx.service.completed();
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].0, upload_id_for("big.bin"));
    assert_eq!(completed[0].1.len(), 5);

    let big_confirm = ctx
        .service
        .confirmed()
        .into_iter()
        .find(|c| c.filename == "big.bin")
        .unwrap();
    assert_eq!(big_confirm.crc32, Some(crc32(&big_data)));
}

#[tokio::test]
async fn unreadable_input_fails_before_the_collection_exists() {
    let ctx = TestContext::with_defaults();
    let mut paths = write_files(&ctx, 3);
    paths.push(ctx.dir.path().join("gone.txt"));

    let err = ctx
        .uploader(fast_config())
        .upload_files(&paths, false)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Validation(ValidationErr::FileNotFound(_))));
    assert!(ctx.service.collections_created().is_empty());
    assert!(ctx.transport.requests().is_empty());
}

#[tokio::test]
async fn collection_is_finalized_even_when_every_file_fails() {
    let ctx = TestContext::new(
        MockService::new()
            .fail_init_for("file01.txt")
            .fail_init_for("file02.txt"),
        MockTransport::new(),
    );
    let paths = write_files(&ctx, 2);

    let result = ctx
        .uploader(fast_config())
        .upload_files(&paths, false)
        .await
        .unwrap();

    let summary = result.summary().unwrap();
    assert_eq!(summary.files_failed, 2);
    assert_eq!(summary.files_uploaded, 0);
    assert!(ctx.service.confirm_batch_sizes().is_empty());
    assert_eq!(ctx.service.ready().len(), 1);
}
