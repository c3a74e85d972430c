//! Event system for document changes and analysis notifications
//!
//! Provides `DocumentEvent` enum for representing command history and
//! analyzer activity, and `EventChannel` for distributing events to
//! observers. The channel is shared between the interactive thread and the
//! analysis workers, so every method takes `&self`.

use crate::core::{BlockKey, BlockStatus, EditorError, Result};
use parking_lot::Mutex;
use std::time::Instant;
use tracing::{debug, warn};

/// Types of events that can occur in the editor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentEvent {
    /// A command was executed (interactively or from the deferred queue)
    CommandExecuted {
        description: String,
        blocks: Vec<BlockKey>,
        deferred: bool,
    },

    /// A deferred command was rejected when it finally ran
    CommandFailed { description: String, message: String },

    /// Undo operation was performed
    UndoPerformed {
        description: String,
        blocks: Vec<BlockKey>,
    },

    /// Redo operation was performed
    RedoPerformed {
        description: String,
        blocks: Vec<BlockKey>,
    },

    /// An analysis run finished and its spans were committed
    BlockAnalyzed {
        block: BlockKey,
        revision: u64,
        status: BlockStatus,
        span_count: usize,
    },

    /// An analysis run was discarded because the block changed underneath it
    AnalysisAbandoned { block: BlockKey, revision: u64 },

    /// One analyzer failed on one block
    AnalyzerFailed {
        block: BlockKey,
        analyzer: String,
        message: String,
    },

    /// An analyzer joined the registry
    AnalyzerRegistered { name: String },
}

impl DocumentEvent {
    /// Human-readable one-line summary
    pub fn description(&self) -> String {
        match self {
            Self::CommandExecuted {
                description,
                blocks,
                deferred,
            } => {
                let origin = if *deferred { "deferred " } else { "" };
                format!(
                    "Executed {origin}command '{description}' on {} block(s)",
                    blocks.len()
                )
            }
            Self::CommandFailed {
                description,
                message,
            } => format!("Deferred command '{description}' failed: {message}"),
            Self::UndoPerformed { description, .. } => format!("Undo: {description}"),
            Self::RedoPerformed { description, .. } => format!("Redo: {description}"),
            Self::BlockAnalyzed {
                block,
                revision,
                status,
                span_count,
            } => format!(
                "Analyzed block {block} at revision {revision}: {status:?} with {span_count} span(s)"
            ),
            Self::AnalysisAbandoned { block, revision } => {
                format!("Abandoned stale analysis of block {block} (revision {revision})")
            }
            Self::AnalyzerFailed {
                block,
                analyzer,
                message,
            } => format!("Analyzer '{analyzer}' failed on block {block}: {message}"),
            Self::AnalyzerRegistered { name } => format!("Registered analyzer '{name}'"),
        }
    }

    /// Whether the event reports a change of document content
    pub fn is_modification(&self) -> bool {
        matches!(
            self,
            Self::CommandExecuted { .. } | Self::UndoPerformed { .. } | Self::RedoPerformed { .. }
        )
    }

    /// Whether the event comes from the analysis pipeline
    pub fn is_analysis(&self) -> bool {
        matches!(
            self,
            Self::BlockAnalyzed { .. }
                | Self::AnalysisAbandoned { .. }
                | Self::AnalyzerFailed { .. }
                | Self::AnalyzerRegistered { .. }
        )
    }

    /// Blocks the event is about
    pub fn blocks(&self) -> Vec<BlockKey> {
        match self {
            Self::CommandExecuted { blocks, .. }
            | Self::UndoPerformed { blocks, .. }
            | Self::RedoPerformed { blocks, .. } => blocks.clone(),
            Self::BlockAnalyzed { block, .. }
            | Self::AnalysisAbandoned { block, .. }
            | Self::AnalyzerFailed { block, .. } => vec![*block],
            Self::CommandFailed { .. } | Self::AnalyzerRegistered { .. } => Vec::new(),
        }
    }

    /// Get the event type as a string for filtering
    pub fn event_type_name(&self) -> &'static str {
        match self {
            Self::CommandExecuted { .. } => "CommandExecuted",
            Self::CommandFailed { .. } => "CommandFailed",
            Self::UndoPerformed { .. } => "UndoPerformed",
            Self::RedoPerformed { .. } => "RedoPerformed",
            Self::BlockAnalyzed { .. } => "BlockAnalyzed",
            Self::AnalysisAbandoned { .. } => "AnalysisAbandoned",
            Self::AnalyzerFailed { .. } => "AnalyzerFailed",
            Self::AnalyzerRegistered { .. } => "AnalyzerRegistered",
        }
    }
}

/// Event filter for selective event handling
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Event types to include (empty means all types)
    include_types: Vec<String>,
    /// Event types to exclude
    exclude_types: Vec<String>,
    /// Whether to include modification events
    include_modifications: Option<bool>,
    /// Whether to include analysis events
    include_analysis: Option<bool>,
    /// Only events about this block
    block: Option<BlockKey>,
}

impl EventFilter {
    /// Create a new event filter that accepts all events
    pub fn new() -> Self {
        Self::default()
    }

    /// Only include specific event types
    #[must_use]
    pub fn include_types<S: Into<String>>(mut self, types: impl IntoIterator<Item = S>) -> Self {
        self.include_types = types.into_iter().map(Into::into).collect();
        self
    }

    /// Exclude specific event types
    #[must_use]
    pub fn exclude_types<S: Into<String>>(mut self, types: impl IntoIterator<Item = S>) -> Self {
        self.exclude_types = types.into_iter().map(Into::into).collect();
        self
    }

    /// Set whether to include modification events
    #[must_use]
    pub fn include_modifications(mut self, include: bool) -> Self {
        self.include_modifications = Some(include);
        self
    }

    /// Set whether to include analysis events
    #[must_use]
    pub fn include_analysis(mut self, include: bool) -> Self {
        self.include_analysis = Some(include);
        self
    }

    /// Only pass events concerning one block
    #[must_use]
    pub fn for_block(mut self, key: BlockKey) -> Self {
        self.block = Some(key);
        self
    }

    /// Check if an event passes this filter
    pub fn matches(&self, event: &DocumentEvent) -> bool {
        let event_type = event.event_type_name();

        if self.exclude_types.iter().any(|t| t == event_type) {
            return false;
        }

        if !self.include_types.is_empty() && !self.include_types.iter().any(|t| t == event_type) {
            return false;
        }

        if let Some(include_mods) = self.include_modifications {
            if event.is_modification() != include_mods {
                return false;
            }
        }

        if let Some(include_analysis) = self.include_analysis {
            if event.is_analysis() != include_analysis {
                return false;
            }
        }

        if let Some(key) = self.block {
            if !event.blocks().contains(&key) {
                return false;
            }
        }

        true
    }
}

/// Event handler trait for responding to document events
///
/// Handlers run on whichever thread produced the event, possibly an analysis
/// worker. They must not dispatch into the same channel; to react with an
/// edit, hand a command to a `DeferredSender`.
pub trait EventHandler: Send + Sync {
    /// Handle a document event
    fn handle_event(&mut self, event: &DocumentEvent) -> Result<()>;

    /// Get the event filter for this handler
    fn event_filter(&self) -> EventFilter {
        EventFilter::new()
    }

    /// Get handler priority (higher numbers = higher priority)
    fn priority(&self) -> i32 {
        0
    }
}

/// Statistics about event handling
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventStats {
    /// Total number of events dispatched
    pub events_dispatched: usize,
    /// Number of handlers currently registered
    pub handlers_count: usize,
    /// Number of handler deliveries skipped by filters
    pub events_filtered: usize,
    /// Number of handler invocations that returned an error
    pub handler_errors: usize,
    /// Average event processing time in microseconds
    pub avg_processing_time_us: u64,
}

/// Event channel configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventChannelConfig {
    /// Maximum number of handlers
    pub max_handlers: usize,
    /// Whether to log every dispatched event at debug level
    pub enable_logging: bool,
}

impl Default for EventChannelConfig {
    fn default() -> Self {
        Self {
            max_handlers: 100,
            enable_logging: false,
        }
    }
}

/// Information about a registered handler
struct HandlerInfo {
    /// Unique handler ID
    id: usize,
    /// Handler implementation
    handler: Box<dyn EventHandler>,
    /// Event filter for this handler
    filter: EventFilter,
    /// Handler priority
    priority: i32,
    /// Number of events processed by this handler
    events_processed: usize,
}

impl core::fmt::Debug for HandlerInfo {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("HandlerInfo")
            .field("id", &self.id)
            .field("filter", &self.filter)
            .field("priority", &self.priority)
            .field("events_processed", &self.events_processed)
            .field("handler", &"<EventHandler>")
            .finish()
    }
}

#[derive(Debug, Default)]
struct ChannelState {
    handlers: Vec<HandlerInfo>,
    stats: EventStats,
    next_handler_id: usize,
}

/// Event channel for distributing document events to handlers
#[derive(Debug)]
pub struct EventChannel {
    /// Configuration for this channel
    config: EventChannelConfig,

    state: Mutex<ChannelState>,
}

impl EventChannel {
    /// Create a new event channel with default configuration
    pub fn new() -> Self {
        Self::with_config(EventChannelConfig::default())
    }

    /// Create a new event channel with custom configuration
    pub fn with_config(config: EventChannelConfig) -> Self {
        Self {
            config,
            state: Mutex::new(ChannelState::default()),
        }
    }

    /// Channel configuration
    pub fn config(&self) -> &EventChannelConfig {
        &self.config
    }

    /// Register an event handler
    pub fn register_handler(&self, handler: Box<dyn EventHandler>) -> Result<usize> {
        let mut state = self.state.lock();

        if state.handlers.len() >= self.config.max_handlers {
            return Err(EditorError::event_channel(format!(
                "Handler limit reached: {}",
                self.config.max_handlers
            )));
        }

        let handler_id = state.next_handler_id;
        state.next_handler_id += 1;

        let filter = handler.event_filter();
        let priority = handler.priority();
        state.handlers.push(HandlerInfo {
            id: handler_id,
            handler,
            filter,
            priority,
            events_processed: 0,
        });
        // Sort by priority (highest first)
        state.handlers.sort_by(|a, b| b.priority.cmp(&a.priority));
        state.stats.handlers_count = state.handlers.len();

        Ok(handler_id)
    }

    /// Unregister an event handler by ID
    pub fn unregister_handler(&self, handler_id: usize) -> bool {
        let mut state = self.state.lock();
        let Some(pos) = state.handlers.iter().position(|h| h.id == handler_id) else {
            return false;
        };
        state.handlers.remove(pos);
        state.stats.handlers_count = state.handlers.len();
        true
    }

    /// Dispatch an event to all registered handlers
    ///
    /// Handler errors are logged and counted; they never interrupt dispatch
    /// or the operation that produced the event.
    pub fn dispatch(&self, event: DocumentEvent) {
        let start_time = Instant::now();
        let mut state = self.state.lock();
        let ChannelState {
            handlers, stats, ..
        } = &mut *state;

        stats.events_dispatched += 1;
        let mut processed_count = 0;

        for handler_info in handlers.iter_mut() {
            if !handler_info.filter.matches(&event) {
                stats.events_filtered += 1;
                continue;
            }
            if let Err(err) = handler_info.handler.handle_event(&event) {
                stats.handler_errors += 1;
                warn!(
                    handler = handler_info.id,
                    event = event.event_type_name(),
                    error = %err,
                    "event handler failed"
                );
            }
            handler_info.events_processed += 1;
            processed_count += 1;
        }

        // Update average processing time
        let processing_time = u64::try_from(start_time.elapsed().as_micros()).unwrap_or(u64::MAX);
        if stats.events_dispatched == 1 {
            stats.avg_processing_time_us = processing_time;
        } else {
            stats.avg_processing_time_us = (stats.avg_processing_time_us + processing_time) / 2;
        }

        if self.config.enable_logging {
            debug!(
                event = %event.description(),
                handlers = processed_count,
                "event dispatched"
            );
        }
    }

    /// Get event statistics
    pub fn stats(&self) -> EventStats {
        self.state.lock().stats.clone()
    }

    /// Remove every handler
    pub fn clear_handlers(&self) {
        let mut state = self.state.lock();
        state.handlers.clear();
        state.stats.handlers_count = 0;
    }
}

impl Default for EventChannel {
    fn default() -> Self {
        Self::new()
    }
}

static_assertions::assert_impl_all!(EventChannel: Send, Sync);
