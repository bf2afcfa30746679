//! Live-feed subscription task.
//!
//! One task per active channel view: it establishes the subscription,
//! filters events by channel, forwards matches to the coordinator tagged
//! with the view epoch, and resubscribes with backoff when the feed drops.
//! The coordinator cancels the task when the view is torn down.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use sync_core::{FeedStatus, ResubscribeBackoff};
use sync_transport::LiveFeed;

use crate::TaskReport;

pub(crate) fn spawn_feed_task<T>(
    transport: Arc<T>,
    channel_id: String,
    epoch: u64,
    report_tx: mpsc::Sender<TaskReport>,
    stop: CancellationToken,
    backoff: ResubscribeBackoff,
) where
    T: LiveFeed + 'static,
{
    tokio::spawn(async move {
        let mut attempt: u32 = 0;

        loop {
            let subscribed = tokio::select! {
                _ = stop.cancelled() => return,
                result = transport.subscribe(&channel_id) => result,
            };

            match subscribed {
                Ok(mut subscription) => {
                    attempt = 0;
                    report_status(&report_tx, epoch, true, None).await;

                    loop {
                        tokio::select! {
                            _ = stop.cancelled() => return,
                            event = subscription.next_event() => match event {
                                Some(event) if event.channel_id() == channel_id => {
                                    if report_tx
                                        .send(TaskReport::Live { epoch, event })
                                        .await
                                        .is_err()
                                    {
                                        return;
                                    }
                                }
                                Some(event) => {
                                    debug!(
                                        active = %channel_id,
                                        received = %event.channel_id(),
                                        "dropped live event for inactive channel"
                                    );
                                }
                                None => {
                                    warn!(channel_id = %channel_id, "live feed closed");
                                    break;
                                }
                            },
                        }
                    }
                }
                Err(err) => {
                    warn!(channel_id = %channel_id, error = %err, "live subscribe failed");
                }
            }

            let delay = backoff.delay_for_attempt(attempt, None);
            attempt = attempt.saturating_add(1);
            report_status(&report_tx, epoch, false, Some(delay.as_millis() as u64)).await;

            tokio::select! {
                _ = stop.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    });
}

async fn report_status(
    report_tx: &mpsc::Sender<TaskReport>,
    epoch: u64,
    connected: bool,
    retry_hint_ms: Option<u64>,
) {
    let _ = report_tx
        .send(TaskReport::FeedStatus {
            epoch,
            status: FeedStatus {
                connected,
                retry_hint_ms,
            },
        })
        .await;
}
