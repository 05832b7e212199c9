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

use std::time::{Duration, Instant};

use storageto::error::Error;
use storageto::upload::RetryPolicy;
use storageto_common::mock_service::{MockService, single_url, upload_id_for};
use storageto_common::mock_transport::MockTransport;
use storageto_common::rand_src::rand_bytes;
use storageto_common::test_context::{TestContext, fast_config};

const STALL: Duration = Duration::from_secs(10);

async fn cancel_after(token: tokio_util::sync::CancellationToken, delay: Duration) {
    tokio::time::sleep(delay).await;
    token.cancel();
}

#[tokio::test]
async fn cancelling_a_single_upload_returns_promptly() {
    let ctx = TestContext::new(MockService::new(), MockTransport::new().delay(STALL));
    let path = ctx.write_file("a.txt", b"hello");
    let uploader = ctx.uploader(fast_config());
    let token = uploader.cancellation_token().clone();

    let paths = [path];
    let started = Instant::now();
    let (result, _) = tokio::join!(
        uploader.upload_files(&paths, false),
        cancel_after(token, Duration::from_millis(50)),
    );

    let err = result.unwrap_err();
    assert!(matches!(err, Error::Cancelled), "{err}");
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(ctx.service.confirmed().is_empty());
}

#[tokio::test]
async fn cancelling_a_multipart_upload_aborts_the_session() {
    let ctx = TestContext::new(
        MockService::new().multipart_above(1024, 1000),
        MockTransport::new().delay(STALL),
    );
    let path = ctx.write_file("big.bin", &rand_bytes(5_000, 4));
    let uploader = ctx.uploader(fast_config());
    let token = uploader.cancellation_token().clone();

    let paths = [path];
    let (result, _) = tokio::join!(
        uploader.upload_files(&paths, false),
        cancel_after(token, Duration::from_millis(50)),
    );

    assert!(result.unwrap_err().is_cancelled());
    assert_eq!(ctx.service.aborted(), vec![upload_id_for("big.bin")]);
    assert!(ctx.service.completed().is_empty());
}

#[tokio::test]
async fn cancelling_a_batch_skips_confirmation() {
    let ctx = TestContext::new(MockService::new(), MockTransport::new().delay(STALL));
    let paths: Vec<_> = (0..8)
        .map(|i| ctx.write_file(&format!("f{i}.txt"), b"data"))
        .collect();
    let uploader = ctx.uploader(fast_config());
    let token = uploader.cancellation_token().clone();

    let started = Instant::now();
    let (result, _) = tokio::join!(
        uploader.upload_files(&paths, false),
        cancel_after(token, Duration::from_millis(50)),
    );

    assert!(matches!(result.unwrap_err(), Error::Cancelled));
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(ctx.service.confirm_batch_sizes().is_empty());
    assert!(ctx.service.ready().is_empty());
}

#[tokio::test]
async fn cancelled_uploader_makes_no_calls() {
    let ctx = TestContext::with_defaults();
    let path = ctx.write_file("a.txt", b"hello");
    let uploader = ctx.uploader(fast_config());
    uploader.cancellation_token().cancel();

    let err = uploader.upload_files(&[path], false).await.unwrap_err();

    assert!(err.is_cancelled());
    assert!(ctx.service.init_calls().is_empty());
    assert!(ctx.transport.requests().is_empty());
}

#[tokio::test]
async fn cancellation_interrupts_the_retry_delay() {
    let ctx = TestContext::new(
        MockService::new(),
        MockTransport::new().always_fail_suffix("a.txt"),
    );
    let path = ctx.write_file("a.txt", b"hello");
    let config = fast_config().retry(RetryPolicy::new(5, STALL));
    let uploader = ctx.uploader(config);
    let token = uploader.cancellation_token().clone();

    let paths = [path];
    let started = Instant::now();
    let (result, _) = tokio::join!(
        uploader.upload_files(&paths, false),
        cancel_after(token, Duration::from_millis(50)),
    );

    assert!(matches!(result.unwrap_err(), Error::Cancelled));
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(ctx.transport.attempts(&single_url("a.txt")), 1);
}
