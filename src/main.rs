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

use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use storageto::api::ApiClient;
use storageto::config::{self, IdentityStore};
use storageto::error::Error;
use storageto::upload::utils::human_size;
use storageto::upload::{
    HttpTransport, NoProgress, ProgressObserver, UploadResult, Uploader, expand_paths,
};
use storageto::version;
use tokio_util::sync::CancellationToken;

/// Upload files to storage.to and get shareable links.
#[derive(Parser)]
#[command(name = "storageto", version = version::short())]
struct Cli {
    /// API base URL
    #[arg(long, global = true, env = config::API_URL_ENV, default_value = config::DEFAULT_API_URL)]
    api: String,
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
    /// Don't send the visitor token
    #[arg(long, global = true)]
    no_token: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Upload one or more files.
    ///
    /// Several files become a collection; large files are split into parts
    /// automatically.
    Upload {
        /// Files or glob patterns
        #[arg(required = true)]
        files: Vec<String>,
        /// Create a collection even for a single file
        #[arg(short, long)]
        collection: bool,
        /// Output result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print version information
    Version,
}

/// Renders upload progress on the terminal.
struct TerminalProgress {
    bar: ProgressBar,
}

impl TerminalProgress {
    fn new() -> Self {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{msg} {wide_bar:.cyan/dim}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("##-"),
        );
        Self { bar }
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ProgressObserver for TerminalProgress {
    fn transferred(&self, _file: &str, uploaded: u64, total: u64) {
        let percent = if total > 0 { uploaded * 100 / total } else { 100 };
        self.bar.set_length(total);
        self.bar.set_position(uploaded);
        self.bar.set_message(format!(
            "{} / {} ({percent}%)",
            human_size(uploaded),
            human_size(total)
        ));
    }

    fn stage(&self, message: &str) {
        self.bar.suspend(|| eprintln!("{message}"));
    }

    fn files_completed(&self, done: usize, total: usize) {
        self.bar.set_length(total as u64);
        self.bar.set_position(done as u64);
        self.bar.set_message(format!("Uploaded {done}/{total} files"));
    }

    fn warning(&self, message: &str) {
        self.bar.suspend(|| eprintln!("Warning: {message}"));
    }
}

async fn ctrl_c() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut terminate) => {
            tokio::select! {
                _ = ctrl_c() => {}
                _ = terminate.recv() => {}
            }
        }
        Err(_) => ctrl_c().await,
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    ctrl_c().await
}

fn init_logging(verbose: bool) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
    if verbose {
        builder.filter_module("storageto", log::LevelFilter::Debug);
    }
    builder.init();
}

fn print_result(result: &UploadResult, json: bool) -> Result<(), Error> {
    if json {
        let output = serde_json::to_string_pretty(result).map_err(|e| {
            Error::from(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        })?;
        println!("{output}");
        return Ok(());
    }

    println!();
    match result {
        UploadResult::Collection { collection, .. } => {
            println!("Collection: {}", collection.url);
            println!("Expires:    {}", collection.expires_at);
        }
        UploadResult::File { file } => {
            println!("URL:     {}", file.url);
            println!("Raw:     {}", file.raw_url);
            println!("Size:    {}", file.human_size);
            println!("Expires: {}", file.expires_at);
        }
    }
    Ok(())
}

async fn run_upload(
    cli: &Cli,
    files: &[String],
    collection: bool,
    json: bool,
) -> Result<(), Error> {
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            eprintln!("\nCancelling upload...");
            cancel.cancel();
        });
    }

    let paths = expand_paths(files)?;
    let as_collection = collection || paths.len() > 1;

    let visitor_token = if cli.no_token {
        None
    } else {
        Some(IdentityStore::from_env()?.visitor_token()?)
    };

    let client = ApiClient::builder(cli.api.as_str())
        .visitor_token(visitor_token)
        .build()?;
    log::debug!("Using API at {}", client.base_url());

    let terminal = (!json).then(|| Arc::new(TerminalProgress::new()));
    let observer: Arc<dyn ProgressObserver> = match &terminal {
        Some(terminal) => terminal.clone(),
        None => Arc::new(NoProgress),
    };
    let uploader = Uploader::builder()
        .transport(Arc::new(HttpTransport::from_api_client(&client)))
        .service(Arc::new(client))
        .observer(observer)
        .cancel(cancel.clone())
        .build();

    let result = uploader.upload_files(paths.as_slice(), as_collection).await;
    if let Some(terminal) = &terminal {
        terminal.finish();
    }

    match result {
        Ok(result) => print_result(&result, json),
        Err(_) if cancel.is_cancelled() => Err(Error::Cancelled),
        Err(e) => Err(e),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let outcome = match &cli.command {
        Command::Upload {
            files,
            collection,
            json,
        } => run_upload(&cli, files, *collection, *json).await,
        Command::Version => {
            println!("storageto {}", version::full());
            Ok(())
        }
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
