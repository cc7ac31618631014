/*!
# Overview
cloney copies a whole bucket from a cloud object storage to local disk, or a whole local directory
tree to a bucket, moving every object concurrently.

## Features
- Four providers behind one interface
  - Amazon S3 (and S3-compatible storage)
  - Google Cloud Storage
  - Azure Blob Storage
  - Alibaba Cloud OSS

- Bounded concurrency
  Objects are moved by a fixed number of workers (`--worker-size`, default 16) pulling from a shared
  queue, so a bucket with millions of objects does not spawn millions of tasks.

- Partial failures are contained
  A failed object is logged and recorded in the [`types::TransferReport`], and never stops the other
  objects. Configuration errors and missing buckets stop the run before anything is transferred.

- Safe local paths
  Object keys are mapped under the local directory and a key that would escape it (`../`) is
  rejected. Downloads are written to a temporary file and renamed into place.

## As a library
cloney CLI is a thin wrapper of the cloney library.

Example usage
=============

```Toml
[dependencies]
cloney = "0.3"
tokio = { version = "1", features = ["full"] }
```

```no_run
use cloney::config::Config;
use cloney::config::args::parse_from_args;
use cloney::pipeline::Pipeline;
use cloney::types::TransferStatistics;
use cloney::types::token::create_pipeline_cancellation_token;

#[tokio::main]
async fn main() {
    // You can use all the arguments for cloney CLI.
    let args = vec![
        "program_name",
        "download",
        "--source-service",
        "s3",
        "--source-bucket",
        "my-bucket",
        "--local-dir",
        "/tmp/out",
    ];

    let config = Config::try_from(parse_from_args(args).unwrap()).unwrap();

    // You can use this token to cancel the pipeline.
    let cancellation_token = create_pipeline_cancellation_token();
    let mut pipeline = Pipeline::new(config, cancellation_token);
    let stats_receiver = pipeline.get_stats_receiver();

    pipeline.run().await;

    let mut completed = 0;
    while let Ok(stats) = stats_receiver.try_recv() {
        if matches!(stats, TransferStatistics::TransferComplete { .. }) {
            completed += 1;
        }
    }
    println!("Completed: {completed}");

    // Errors that stopped the run before any transfer.
    if pipeline.has_error() {
        println!("{:?}", pipeline.get_errors_and_consume().unwrap()[0]);
    }

    // Objects that failed to transfer.
    if let Some(report) = pipeline.get_transfer_report() {
        for failure in &report.failures {
            println!("{}: {:?}", failure.unit.name(), failure.error());
        }
    }
}
```

[`pipeline::BucketSync`] can also be used directly with any [`storage::GatewayFactory`], for
example the in-memory one in [`storage::memory`].
*/

pub use config::Config;
pub use config::args::CLIArgs;
pub use pipeline::Pipeline;

pub mod config;
pub mod pipeline;
pub mod storage;
pub mod types;
