use anyhow::{Result, anyhow};
use tokio::time::Instant;
use tracing::{error, trace, warn};

use cloney::Config;
use cloney::pipeline::Pipeline;
use cloney::types::token::{PipelineCancellationToken, create_pipeline_cancellation_token};

mod ctrl_c_handler;
mod indicator;
mod ui_config;

#[allow(dead_code)]
const EXIT_CODE_SUCCESS: i32 = 0;
#[allow(dead_code)]
const EXIT_CODE_ERROR: i32 = 1;
#[allow(dead_code)]
const EXIT_CODE_INVALID_ARGS: i32 = 2;
const EXIT_CODE_TRANSFER_FAILURE: i32 = 3;

pub async fn run(config: Config) -> Result<()> {
    let cancellation_token = create_pipeline_cancellation_token();
    ctrl_c_handler::spawn_ctrl_c_handler(cancellation_token.clone());

    let pipeline = Pipeline::new(config.clone(), cancellation_token.clone());
    let has_transfer_failure = execute(&config, pipeline, cancellation_token).await?;

    if has_transfer_failure && config.fail_on_transfer_error {
        std::process::exit(EXIT_CODE_TRANSFER_FAILURE);
    }

    Ok(())
}

/// Runs `pipeline` with the progress indicator attached.
///
/// Returns whether any unit failed. A pipeline error (bad configuration, missing bucket) is
/// returned as `Err`.
async fn execute(
    config: &Config,
    mut pipeline: Pipeline,
    cancellation_token: PipelineCancellationToken,
) -> Result<bool> {
    let start_time = Instant::now();
    trace!("transfer pipeline start.");

    let indicator_join_handle = indicator::show_indicator(
        pipeline.get_stats_receiver(),
        ui_config::is_progress_indicator_needed(config),
        ui_config::is_show_result_needed(config),
    );

    pipeline.run().await;
    indicator_join_handle.await?;

    // stops the ctrl-c handler
    cancellation_token.cancel();

    let duration_sec = format!("{:.3}", start_time.elapsed().as_secs_f32());
    if pipeline.has_error() {
        error!(duration_sec = duration_sec, "cloney failed.");

        return Err(anyhow!("cloney failed."));
    }

    let has_transfer_failure = pipeline.has_transfer_failure();
    if has_transfer_failure {
        if let Some(report) = pipeline.get_transfer_report() {
            warn!(
                failed = report.failed,
                number_of_units = report.number_of_units,
                duration_sec = duration_sec,
                "some objects failed to transfer."
            );
        }
    }

    trace!(duration_sec = duration_sec, "cloney has been completed.");

    Ok(has_transfer_failure)
}
