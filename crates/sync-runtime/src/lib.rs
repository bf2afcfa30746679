//! Synchronization coordinator for the chat history engine.
//!
//! The runtime owns the active [`ChannelView`], drives a transport's page
//! fetch and live feed, and exposes a single reactive surface: commands in,
//! snapshot events out. Fetches and the live subscription run as spawned
//! tasks reporting back over an internal channel tagged with the view
//! epoch; results for a replaced view are discarded.

use std::{sync::Arc, time::Instant};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use sync_core::{
    ChannelView, EventStream, FeedStatus, FetchPlan, LiveEvent, MessagePage, ScrollMetrics,
    ScrollProximityDetector, SyncChannelError, SyncChannels, SyncCommand, SyncError,
    SyncErrorCategory, SyncEvent, ViewPhase, classify_http_status,
};
use sync_transport::{FetchError, LiveFeed, PageFetch};

mod config;
mod feed;

pub use config::{ConfigError, SyncConfig};

const COMMAND_BUFFER: usize = 128;
const EVENT_BUFFER: usize = 512;
const REPORT_BUFFER: usize = 256;

/// Handle to a spawned sync runtime.
#[derive(Clone, Debug)]
pub struct SyncHandle {
    channels: SyncChannels,
}

impl SyncHandle {
    /// Send one command to the runtime.
    pub async fn send(&self, command: SyncCommand) -> Result<(), SyncChannelError> {
        self.channels.send_command(command).await
    }

    /// Subscribe to emitted sync events.
    pub fn subscribe(&self) -> EventStream {
        self.channels.subscribe()
    }
}

/// Spawn the coordinator runtime on the current tokio runtime.
pub fn spawn_runtime<T>(transport: Arc<T>, config: SyncConfig) -> SyncHandle
where
    T: PageFetch + LiveFeed + 'static,
{
    let (channels, command_rx) = SyncChannels::new(COMMAND_BUFFER, EVENT_BUFFER);
    let runtime = SyncRuntime::new(channels.clone(), command_rx, transport, config);
    tokio::spawn(async move {
        runtime.run().await;
    });

    SyncHandle { channels }
}

/// Completion message from a spawned fetch or feed task.
pub(crate) enum TaskReport {
    FetchResolved {
        epoch: u64,
        result: Result<MessagePage, SyncError>,
    },
    Live {
        epoch: u64,
        event: LiveEvent,
    },
    FeedStatus {
        epoch: u64,
        status: FeedStatus,
    },
}

struct ActiveChannel {
    view: ChannelView,
    epoch: u64,
    detector: ScrollProximityDetector,
    stop: CancellationToken,
}

struct SyncRuntime<T> {
    channels: SyncChannels,
    command_rx: mpsc::Receiver<SyncCommand>,
    report_tx: mpsc::Sender<TaskReport>,
    report_rx: mpsc::Receiver<TaskReport>,
    transport: Arc<T>,
    config: SyncConfig,
    active: Option<ActiveChannel>,
    epoch_counter: u64,
}

impl<T> SyncRuntime<T>
where
    T: PageFetch + LiveFeed + 'static,
{
    fn new(
        channels: SyncChannels,
        command_rx: mpsc::Receiver<SyncCommand>,
        transport: Arc<T>,
        config: SyncConfig,
    ) -> Self {
        let (report_tx, report_rx) = mpsc::channel(REPORT_BUFFER);
        Self {
            channels,
            command_rx,
            report_tx,
            report_rx,
            transport,
            config,
            active: None,
            epoch_counter: 0,
        }
    }

    async fn run(mut self) {
        loop {
            tokio::select! {
                command = self.command_rx.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                report = self.report_rx.recv() => {
                    if let Some(report) = report {
                        self.handle_report(report);
                    }
                }
            }
        }
    }

    fn handle_command(&mut self, command: SyncCommand) {
        match command {
            SyncCommand::ActivateChannel { channel_id } => self.activate_channel(channel_id),
            SyncCommand::DeactivateChannel => self.teardown_view(),
            SyncCommand::RequestOlder => self.request_older(),
            SyncCommand::RetryFetch => self.retry_fetch(),
            SyncCommand::ScrollChanged { metrics } => self.handle_scroll(metrics),
        }
    }

    fn activate_channel(&mut self, channel_id: String) {
        self.teardown_view();

        self.epoch_counter += 1;
        let epoch = self.epoch_counter;
        let stop = CancellationToken::new();
        debug!(channel_id = %channel_id, epoch, "channel activated");

        self.active = Some(ActiveChannel {
            view: ChannelView::new(channel_id.clone()),
            epoch,
            detector: ScrollProximityDetector::new(
                self.config.scroll_threshold,
                self.config.scroll_cooldown(),
            ),
            stop: stop.clone(),
        });
        self.channels.emit(SyncEvent::ChannelActivated {
            channel_id: channel_id.clone(),
        });

        feed::spawn_feed_task(
            Arc::clone(&self.transport),
            channel_id,
            epoch,
            self.report_tx.clone(),
            stop,
            self.config.backoff(),
        );

        // Initial page load for the fresh view.
        self.request_older();
    }

    fn teardown_view(&mut self) {
        if let Some(active) = self.active.take() {
            active.stop.cancel();
            let channel_id = active.view.channel_id().to_owned();
            debug!(channel_id = %channel_id, "channel view torn down");
            self.channels
                .emit(SyncEvent::ChannelDeactivated { channel_id });
        }
    }

    fn request_older(&mut self) {
        let plan = match self.active.as_ref() {
            Some(active) => active.view.cursor().next_fetch_cursor(),
            None => {
                trace!("request_older with no active channel");
                return;
            }
        };

        match plan {
            FetchPlan::Busy => trace!("fetch already in flight; request absorbed"),
            FetchPlan::Exhausted => trace!("start of history reached; request ignored"),
            FetchPlan::Initial => self.start_fetch(None),
            FetchPlan::Before(cursor) => self.start_fetch(Some(cursor)),
        }
    }

    fn retry_fetch(&mut self) {
        if let Some(active) = self.active.as_mut()
            && active.view.phase() == ViewPhase::Error
            && let Err(err) = active.view.clear_error()
        {
            warn!(code = %err.code, "error clear rejected");
            return;
        }
        self.request_older();
    }

    fn handle_scroll(&mut self, metrics: ScrollMetrics) {
        let triggered = match self.active.as_mut() {
            Some(active) => active.detector.observe(metrics, Instant::now()),
            None => false,
        };
        if triggered {
            trace!("scroll proximity trigger");
            self.request_older();
        }
    }

    fn start_fetch(&mut self, before: Option<String>) {
        let requested = self.config.page_size;
        let Some(active) = self.active.as_mut() else {
            return;
        };

        if let Err(err) = active.view.begin_loading() {
            debug!(code = %err.code, "fetch not started");
            return;
        }
        active.view.cursor_mut().begin_fetch();

        let channel_id = active.view.channel_id().to_owned();
        let epoch = active.epoch;
        let transport = Arc::clone(&self.transport);
        let report_tx = self.report_tx.clone();
        tokio::spawn(async move {
            let result = transport
                .fetch_page(&channel_id, before.as_deref(), requested)
                .await
                .map_err(map_fetch_error);
            let _ = report_tx
                .send(TaskReport::FetchResolved { epoch, result })
                .await;
        });

        self.emit_snapshot();
    }

    fn handle_report(&mut self, report: TaskReport) {
        match report {
            TaskReport::FetchResolved { epoch, result } => self.finish_fetch(epoch, result),
            TaskReport::Live { epoch, event } => self.merge_live_event(epoch, event),
            TaskReport::FeedStatus { epoch, status } => {
                if self
                    .active
                    .as_ref()
                    .is_some_and(|active| active.epoch == epoch)
                {
                    self.channels.emit(SyncEvent::FeedStatus(status));
                }
            }
        }
    }

    fn finish_fetch(&mut self, epoch: u64, result: Result<MessagePage, SyncError>) {
        let requested = self.config.page_size;
        let Some(active) = self.active.as_mut() else {
            debug!("fetch resolved with no active view; discarded");
            return;
        };
        if active.epoch != epoch {
            debug!(
                channel_id = %active.view.channel_id(),
                "late fetch result for a replaced view discarded"
            );
            return;
        }

        match result {
            Ok(page) => {
                let returned = page.message_count();
                let oldest = page.oldest_message_id().map(ToOwned::to_owned);
                let changed = active.view.store_mut().ingest_page(page);
                active
                    .view
                    .cursor_mut()
                    .record_page_result(oldest, returned, requested);
                if let Err(err) = active.view.finish_loading() {
                    warn!(code = %err.code, "unexpected phase after fetch completion");
                }
                debug!(
                    channel_id = %active.view.channel_id(),
                    returned,
                    changed,
                    end_of_history = active.view.cursor().end_of_history(),
                    "page ingested"
                );
            }
            Err(error) => {
                warn!(
                    channel_id = %active.view.channel_id(),
                    code = %error.code,
                    "page fetch failed"
                );
                active.view.cursor_mut().abort_fetch();
                if let Err(err) = active.view.fail_loading(error) {
                    warn!(code = %err.code, "unexpected phase after fetch failure");
                }
            }
        }

        self.emit_snapshot();
    }

    fn merge_live_event(&mut self, epoch: u64, event: LiveEvent) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        if active.epoch != epoch {
            debug!("live event for a replaced view discarded");
            return;
        }
        if event.channel_id() != active.view.channel_id() {
            debug!(
                received = %event.channel_id(),
                "live event for another channel dropped"
            );
            return;
        }

        if active.view.store_mut().apply_live_event(event) {
            self.emit_snapshot();
        }
    }

    fn emit_snapshot(&self) {
        if let Some(active) = &self.active {
            self.channels.emit(SyncEvent::ViewUpdated {
                snapshot: active.view.snapshot(),
            });
        }
    }
}

fn map_fetch_error(err: FetchError) -> SyncError {
    match err {
        FetchError::Upstream { status, message } => {
            SyncError::new(classify_http_status(status), "page_fetch_failed", message)
        }
        FetchError::Unavailable(message) => SyncError::new(
            SyncErrorCategory::Network,
            "transport_unavailable",
            message,
        ),
    }
}
