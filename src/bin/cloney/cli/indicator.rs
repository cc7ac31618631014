use std::io;
use std::io::Write;

use async_channel::Receiver;
use indicatif::{HumanBytes, HumanCount, HumanDuration, ProgressBar, ProgressStyle};
use simple_moving_average::{SMA, SumTreeSMA};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::warn;

use cloney::types::TransferStatistics;

const MOVING_AVERAGE_PERIOD_SECS: usize = 10;
const REFRESH_INTERVAL: f32 = 1.0;
const POLL_INTERVAL: f32 = 0.05;

#[derive(Default)]
struct Totals {
    bytes: u64,
    completed: u64,
    failed: u64,
}

impl Totals {
    fn message(&self, bytes_per_sec: u64, objects_per_sec: u64) -> String {
        format!(
            "{:>3} | {:>3}/sec,  transferred {:>3} objects | {:>3} objects/sec,  failed {} objects",
            HumanBytes(self.bytes),
            HumanBytes(bytes_per_sec),
            self.completed,
            HumanCount(objects_per_sec),
            self.failed,
        )
    }
}

/// Drains transfer statistics until the pipeline closes the channel.
pub fn show_indicator(
    stats_receiver: Receiver<TransferStatistics>,
    show_progress: bool,
    show_result: bool,
) -> JoinHandle<()> {
    let progress_text = ProgressBar::new(0);
    if let Ok(progress_style) = ProgressStyle::with_template("{wide_msg}") {
        progress_text.set_style(progress_style);
    }

    tokio::spawn(async move {
        let start_time = Instant::now();

        let mut ma_transferred_bytes = SumTreeSMA::<_, u64, MOVING_AVERAGE_PERIOD_SECS>::new();
        let mut ma_transferred_count = SumTreeSMA::<_, u64, MOVING_AVERAGE_PERIOD_SECS>::new();

        let mut totals = Totals::default();

        loop {
            let mut period_bytes: u64 = 0;
            let mut period_count: u64 = 0;

            let period = Instant::now();
            loop {
                while let Ok(stats) = stats_receiver.try_recv() {
                    match stats {
                        TransferStatistics::TransferBytes(size) => {
                            period_bytes += size;
                            totals.bytes += size;
                        }
                        TransferStatistics::TransferComplete { .. } => {
                            period_count += 1;
                            totals.completed += 1;
                        }
                        TransferStatistics::TransferError { .. } => {
                            totals.failed += 1;
                        }
                    }
                }

                if REFRESH_INTERVAL < period.elapsed().as_secs_f32() {
                    break;
                }

                if stats_receiver.is_closed() && stats_receiver.is_empty() {
                    if show_result {
                        let elapsed = start_time.elapsed();
                        let elapsed_secs_f64 = elapsed.as_secs_f64();

                        let (bytes_per_sec, objects_per_sec) =
                            if elapsed_secs_f64 < REFRESH_INTERVAL as f64 {
                                (totals.bytes, totals.completed)
                            } else {
                                (
                                    (totals.bytes as f64 / elapsed_secs_f64) as u64,
                                    (totals.completed as f64 / elapsed_secs_f64) as u64,
                                )
                            };

                        if let Ok(result_style) = ProgressStyle::with_template("{msg}") {
                            progress_text.set_style(result_style);
                        }
                        progress_text.finish_with_message(format!(
                            "{},  duration {}",
                            totals.message(bytes_per_sec, objects_per_sec),
                            HumanDuration(elapsed),
                        ));

                        println!();
                        if let Err(e) = io::stdout().flush() {
                            warn!("failed to flush stdout: {e}");
                        }
                    }

                    return;
                }

                tokio::time::sleep(std::time::Duration::from_secs_f32(POLL_INTERVAL)).await;
            }

            ma_transferred_bytes.add_sample(period_bytes);
            ma_transferred_count.add_sample(period_count);

            if show_progress {
                progress_text.set_message(totals.message(
                    ma_transferred_bytes.get_average(),
                    ma_transferred_count.get_average(),
                ));
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    const WAITING_TIME_MILLIS_FOR_INDICATOR_REFRESH: u64 = 1500;

    #[tokio::test]
    async fn indicator_shows_result() {
        init_dummy_tracing_subscriber();

        let (stats_sender, stats_receiver) = async_channel::unbounded();
        let join_handle = show_indicator(stats_receiver, true, true);

        send_sample_statistics(&stats_sender).await;

        tokio::time::sleep(Duration::from_millis(
            WAITING_TIME_MILLIS_FOR_INDICATOR_REFRESH,
        ))
        .await;
        stats_sender.close();

        join_handle.await.unwrap();
    }

    #[tokio::test]
    async fn indicator_without_result() {
        init_dummy_tracing_subscriber();

        let (stats_sender, stats_receiver) = async_channel::unbounded();
        let join_handle = show_indicator(stats_receiver, false, false);

        send_sample_statistics(&stats_sender).await;
        stats_sender.close();

        tokio::time::timeout(Duration::from_secs(5), join_handle)
            .await
            .unwrap()
            .unwrap();
    }

    async fn send_sample_statistics(stats_sender: &async_channel::Sender<TransferStatistics>) {
        stats_sender
            .send(TransferStatistics::TransferBytes(1024))
            .await
            .unwrap();
        stats_sender
            .send(TransferStatistics::TransferComplete {
                key: "data/a.bin".to_string(),
            })
            .await
            .unwrap();
        stats_sender
            .send(TransferStatistics::TransferError {
                key: "data/b.bin".to_string(),
            })
            .await
            .unwrap();
    }

    fn init_dummy_tracing_subscriber() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("dummy=trace")
            .try_init();
    }
}
