use crate::{
    blocks::blocks_for,
    cursor::PaginationCursor,
    error::SyncError,
    store::MessageStore,
    types::{ViewPhase, ViewSnapshot},
};

/// Per-channel view state owned by the coordinator.
///
/// Bundles the message store, the pagination cursor and the fetch phase
/// machine. A view is constructed when its channel becomes active and torn
/// down when the channel is deactivated; state never leaks across channels.
#[derive(Debug, Clone)]
pub struct ChannelView {
    channel_id: String,
    store: MessageStore,
    cursor: PaginationCursor,
    phase: ViewPhase,
    last_error: Option<SyncError>,
}

impl ChannelView {
    /// Create a fresh view for the given channel.
    pub fn new(channel_id: impl Into<String>) -> Self {
        Self {
            channel_id: channel_id.into(),
            store: MessageStore::new(),
            cursor: PaginationCursor::new(),
            phase: ViewPhase::Idle,
            last_error: None,
        }
    }

    /// Channel this view belongs to.
    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    /// Shared access to the message store.
    pub fn store(&self) -> &MessageStore {
        &self.store
    }

    /// Mutable access to the message store.
    pub fn store_mut(&mut self) -> &mut MessageStore {
        &mut self.store
    }

    /// Shared access to the pagination cursor.
    pub fn cursor(&self) -> &PaginationCursor {
        &self.cursor
    }

    /// Mutable access to the pagination cursor.
    pub fn cursor_mut(&mut self) -> &mut PaginationCursor {
        &mut self.cursor
    }

    /// Current fetch phase.
    pub fn phase(&self) -> ViewPhase {
        self.phase
    }

    /// Last fetch error, present while the phase is `Error`.
    pub fn last_error(&self) -> Option<&SyncError> {
        self.last_error.as_ref()
    }

    /// Enter `Loading`. Only valid from `Idle`.
    pub fn begin_loading(&mut self) -> Result<(), SyncError> {
        if self.phase != ViewPhase::Idle {
            return Err(SyncError::invalid_phase(self.phase, "begin_loading"));
        }
        self.phase = ViewPhase::Loading;
        Ok(())
    }

    /// Return to `Idle` after a successful fetch.
    pub fn finish_loading(&mut self) -> Result<(), SyncError> {
        if self.phase != ViewPhase::Loading {
            return Err(SyncError::invalid_phase(self.phase, "finish_loading"));
        }
        self.phase = ViewPhase::Idle;
        Ok(())
    }

    /// Enter `Error` after a failed fetch, retaining the error for display.
    pub fn fail_loading(&mut self, error: SyncError) -> Result<(), SyncError> {
        if self.phase != ViewPhase::Loading {
            return Err(SyncError::invalid_phase(self.phase, "fail_loading"));
        }
        self.phase = ViewPhase::Error;
        self.last_error = Some(error);
        Ok(())
    }

    /// Clear an error state back to `Idle` so a retry can begin.
    pub fn clear_error(&mut self) -> Result<(), SyncError> {
        if self.phase != ViewPhase::Error {
            return Err(SyncError::invalid_phase(self.phase, "clear_error"));
        }
        self.phase = ViewPhase::Idle;
        self.last_error = None;
        Ok(())
    }

    /// Assemble the externally observable snapshot.
    pub fn snapshot(&self) -> ViewSnapshot {
        ViewSnapshot {
            channel_id: self.channel_id.clone(),
            blocks: blocks_for(self.store.snapshot()),
            phase: self.phase,
            end_of_history: self.cursor.end_of_history(),
            error: self.last_error.clone(),
        }
    }
}
