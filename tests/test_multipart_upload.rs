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

use std::time::Duration;

use storageto::upload::utils::crc32;
use storageto_common::mock_service::{MockService, part_url, upload_id_for};
use storageto_common::mock_transport::MockTransport;
use storageto_common::rand_src::rand_bytes;
use storageto_common::test_context::{TestContext, fast_config};

const FILE_SIZE: usize = 9_500;
const PART_SIZE: u64 = 1_000;

fn multipart_service() -> MockService {
    MockService::new()
        .multipart_above(4096, PART_SIZE)
        .initial_urls(2)
}

#[tokio::test]
async fn parts_are_uploaded_completed_in_order_and_checksummed() {
    let ctx = TestContext::new(multipart_service(), MockTransport::new());
    let data = rand_bytes(FILE_SIZE, 7);
    let path = ctx.write_file("big.bin", &data);

    let result = ctx
        .uploader(fast_config().part_url_page_size(3))
        .upload_files(&[path], false)
        .await
        .unwrap();
    assert_eq!(result.file().unwrap().size, FILE_SIZE as u64);

    let upload_id = upload_id_for("big.bin");
    // parts 1 and 2 came with the session, the rest in pages of three
    assert_eq!(
        ctx.service.part_url_requests(),
        vec![vec![3, 4, 5], vec![6, 7, 8], vec![9, 10]]
    );

    let mut stored = Vec::new();
    for n in 1..=10 {
        stored.extend(ctx.transport.object(&part_url(&upload_id, n)).unwrap());
    }
    assert_eq!(stored, data);

    let requests = ctx.transport.requests();
    assert_eq!(requests.len(), 10);
    assert!(requests.iter().all(|r| r.content_type.is_none()));
    let last = requests
        .iter()
        .find(|r| r.url == part_url(&upload_id, 10))
        .unwrap();
    assert_eq!(last.content_length, 500);

    let completed = ctx.service.completed();
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].0, upload_id);
    let numbers: Vec<u32> = completed[0].1.iter().map(|p| p.part_number).collect();
    assert_eq!(numbers, (1..=10).collect::<Vec<_>>());
    assert_eq!(completed[0].1[3].etag, "etag-4");

    let confirmed = ctx.service.confirmed();
    assert_eq!(confirmed[0].storage_key, "uploads/big.bin");
    assert_eq!(confirmed[0].crc32, Some(crc32(&data)));

    assert!(ctx.service.aborted().is_empty());
    assert_eq!(
        ctx.observer.last_transferred("big.bin"),
        Some((FILE_SIZE as u64, FILE_SIZE as u64))
    );
}

#[tokio::test]
async fn part_uploads_respect_the_concurrency_ceiling() {
    let ctx = TestContext::new(
        multipart_service(),
        MockTransport::new().delay(Duration::from_millis(30)),
    );
    let path = ctx.write_file("big.bin", &rand_bytes(FILE_SIZE, 8));

    ctx.uploader(fast_config())
        .upload_files(&[path], false)
        .await
        .unwrap();

    let max = ctx.transport.max_in_flight();
    assert!(max <= 4, "{max} parts in flight");
    assert!(max >= 2, "parts were not uploaded concurrently");
}

#[tokio::test]
async fn failed_part_attempts_are_retried() {
    let upload_id = upload_id_for("big.bin");
    let ctx = TestContext::new(
        multipart_service(),
        MockTransport::new().fail_times(&part_url(&upload_id, 4), 2),
    );
    let data = rand_bytes(FILE_SIZE, 9);
    let path = ctx.write_file("big.bin", &data);

    ctx.uploader(fast_config())
        .upload_files(&[path], false)
        .await
        .unwrap();

    assert_eq!(ctx.transport.attempts(&part_url(&upload_id, 4)), 3);
    assert_eq!(ctx.transport.attempts(&part_url(&upload_id, 5)), 1);
    assert_eq!(ctx.service.completed().len(), 1);
    assert_eq!(ctx.service.confirmed()[0].crc32, Some(crc32(&data)));
}

#[tokio::test]
async fn exhausted_part_aborts_the_session() {
    let ctx = TestContext::new(
        multipart_service(),
        MockTransport::new().always_fail_suffix("/3"),
    );
    let path = ctx.write_file("big.bin", &rand_bytes(FILE_SIZE, 10));

    let err = ctx
        .uploader(fast_config())
        .upload_files(&[path], false)
        .await
        .unwrap_err();

    assert_eq!(
        err.to_string(),
        "failed to upload big.bin: part 3 failed: upload failed (HTTP 500): injected failure"
    );
    assert!(ctx.service.completed().is_empty());
    assert!(ctx.service.confirmed().is_empty());
    assert_eq!(ctx.service.aborted(), vec![upload_id_for("big.bin")]);
}

#[tokio::test]
async fn missing_etag_fails_the_part() {
    let ctx = TestContext::new(multipart_service(), MockTransport::new().omit_etag());
    let path = ctx.write_file("big.bin", &rand_bytes(FILE_SIZE, 11));

    let err = ctx
        .uploader(fast_config())
        .upload_files(&[path], false)
        .await
        .unwrap_err();

    assert!(err.to_string().contains("server did not return an ETag"), "{err}");
    assert!(ctx.service.completed().is_empty());
    assert_eq!(ctx.service.aborted(), vec![upload_id_for("big.bin")]);
}

#[tokio::test]
async fn failed_completion_aborts_the_session() {
    let ctx = TestContext::new(multipart_service().fail_complete(), MockTransport::new());
    let path = ctx.write_file("big.bin", &rand_bytes(FILE_SIZE, 12));

    let err = ctx
        .uploader(fast_config())
        .upload_files(&[path], false)
        .await
        .unwrap_err();

    assert_eq!(
        err.to_string(),
        "failed to upload big.bin: failed to complete upload of big.bin: complete failed"
    );
    assert_eq!(ctx.service.aborted(), vec![upload_id_for("big.bin")]);
    assert!(ctx.service.confirmed().is_empty());
}

#[tokio::test]
async fn files_at_the_threshold_stay_single_shot() {
    let ctx = TestContext::new(multipart_service(), MockTransport::new());
    let path = ctx.write_file("edge.bin", &rand_bytes(4096, 13));

    ctx.uploader(fast_config())
        .upload_files(&[path], false)
        .await
        .unwrap();

    assert!(ctx.service.part_url_requests().is_empty());
    assert!(ctx.service.completed().is_empty());
    assert_eq!(ctx.transport.requests().len(), 1);
}
