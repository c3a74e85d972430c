//! Analysis supervisor: a worker pool re-analyzing dirty blocks
//!
//! Dirty keys go through a [`DirtyQueue`]; a key is handed to one worker at a
//! time and a key re-dirtied while in flight is requeued once that run ends.
//! A run repeats passes over the block under collection Read + block Write
//! until no analyzer makes progress. Output is committed only while the
//! block's revision still equals the one the run started from.

use super::commands::{CommandSupervisor, DeferredSender};
use crate::analyzers::actions::sort_by_importance;
use crate::analyzers::{
    AnalysisContext, AnalyzerRegistry, AnalyzerStatus, BlockAnalyzer, EditorAction,
};
use crate::core::lock::held_by_current_thread;
use crate::core::{
    BlockCollection, BlockKey, BlockStatus, CommandError, EditorError, HierarchicalGuard,
    LockMode, Result, TaggedSpan,
};
use crate::events::{DocumentEvent, EventChannel};
use parking_lot::{Condvar, Mutex, RwLock};
use std::any::Any;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

#[derive(Debug, Default)]
struct QueueState {
    pending: VecDeque<BlockKey>,
    queued: HashSet<BlockKey>,
    in_flight: HashSet<BlockKey>,
    redirty: HashSet<BlockKey>,
    shutdown: bool,
}

impl QueueState {
    fn is_idle(&self) -> bool {
        self.pending.is_empty() && self.in_flight.is_empty()
    }
}

/// Deduplicating FIFO of blocks awaiting analysis
#[derive(Debug, Default)]
pub(crate) struct DirtyQueue {
    state: Mutex<QueueState>,
    available: Condvar,
    idle: Condvar,
}

impl DirtyQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn mark_dirty(&self, key: BlockKey) {
        let mut state = self.state.lock();
        if state.shutdown {
            return;
        }
        if state.in_flight.contains(&key) {
            state.redirty.insert(key);
        } else if state.queued.insert(key) {
            state.pending.push_back(key);
            self.available.notify_one();
        }
    }

    pub(crate) fn mark_all(&self, keys: &[BlockKey]) {
        for &key in keys {
            self.mark_dirty(key);
        }
    }

    /// Block until a key is available; `None` once shut down
    pub(crate) fn next(&self) -> Option<BlockKey> {
        let mut state = self.state.lock();
        loop {
            if state.shutdown {
                return None;
            }
            if let Some(key) = state.pending.pop_front() {
                state.queued.remove(&key);
                state.in_flight.insert(key);
                return Some(key);
            }
            self.available.wait(&mut state);
        }
    }

    /// End the run on `key`, requeueing it if it was re-dirtied meanwhile
    pub(crate) fn finish(&self, key: BlockKey) {
        let mut state = self.state.lock();
        state.in_flight.remove(&key);
        if state.redirty.remove(&key) && !state.shutdown && state.queued.insert(key) {
            state.pending.push_back(key);
            self.available.notify_one();
        }
        if state.is_idle() {
            self.idle.notify_all();
        }
    }

    pub(crate) fn is_idle(&self) -> bool {
        self.state.lock().is_idle()
    }

    pub(crate) fn is_shut_down(&self) -> bool {
        self.state.lock().shutdown
    }

    /// Wait until nothing is queued or in flight; `false` on deadline
    pub(crate) fn wait_idle(&self, deadline: Option<Instant>) -> bool {
        let mut state = self.state.lock();
        while !state.is_idle() {
            if state.shutdown {
                return false;
            }
            match deadline {
                Some(deadline) => {
                    if self.idle.wait_until(&mut state, deadline).timed_out() {
                        return state.is_idle();
                    }
                }
                None => self.idle.wait(&mut state),
            }
        }
        true
    }

    pub(crate) fn shutdown(&self) {
        let mut state = self.state.lock();
        state.shutdown = true;
        self.available.notify_all();
        self.idle.notify_all();
    }
}

/// Analyzers that failed on one block revision
#[derive(Debug)]
struct FailureRecord {
    revision: u64,
    /// Analyzer name to failure reason
    analyzers: BTreeMap<String, String>,
}

/// Analyzer plus the required names some other registered analyzer provides
struct Planned {
    analyzer: Arc<dyn BlockAnalyzer>,
    needs: BTreeSet<String>,
}

/// Progress of one run over one block, carried across passes
struct BlockRun {
    key: BlockKey,
    revision: Option<u64>,
    completed: HashSet<String>,
    satisfied: BTreeSet<String>,
    upstream: HashMap<String, Vec<TaggedSpan>>,
}

impl BlockRun {
    fn new(key: BlockKey) -> Self {
        Self {
            key,
            revision: None,
            completed: HashSet::new(),
            satisfied: BTreeSet::new(),
            upstream: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PassOutcome {
    /// Something succeeded and analyzers remain
    Continue,
    Finished,
    Abandoned,
    /// The block is gone or could not be locked
    Skipped,
}

struct AnalysisShared {
    collection: Arc<BlockCollection>,
    registry: RwLock<AnalyzerRegistry>,
    queue: Arc<DirtyQueue>,
    commands: Arc<CommandSupervisor>,
    events: Arc<EventChannel>,
    failures: Mutex<HashMap<BlockKey, FailureRecord>>,
}

impl AnalysisShared {
    fn worker_loop(&self) {
        while let Some(key) = self.queue.next() {
            self.analyze_block(key);
            self.queue.finish(key);
        }
        debug!("analysis worker stopped");
    }

    fn analyze_block(&self, key: BlockKey) {
        let sender = self.commands.deferred_sender();
        let mut run = BlockRun::new(key);
        loop {
            let outcome = self.run_pass(&mut run, &sender);
            // Edits deferred by this pass run now that its locks are released.
            self.commands.drain_deferred();
            if outcome != PassOutcome::Continue {
                break;
            }
        }
    }

    fn plan(&self) -> Vec<Planned> {
        let registry = self.registry.read();
        registry
            .ordered()
            .into_iter()
            .map(|analyzer| {
                let info = analyzer.info();
                let needs = info
                    .requires
                    .iter()
                    .filter(|name| registry.provided_by_other(name, &info.name))
                    .cloned()
                    .collect();
                Planned { analyzer, needs }
            })
            .collect()
    }

    fn run_pass(&self, run: &mut BlockRun, sender: &DeferredSender) -> PassOutcome {
        let plan = self.plan();
        let key = run.key;

        let mut guard = match self
            .collection
            .acquire_block_lock(LockMode::Read, LockMode::Write, key)
        {
            Ok(guard) => guard,
            Err(EditorError::Command(CommandError::BlockNotFound { .. })) => {
                trace!(block = %key, "block removed before analysis");
                self.failures.lock().remove(&key);
                for planned in &plan {
                    planned.analyzer.forget_block(key);
                }
                return PassOutcome::Skipped;
            }
            Err(err) => {
                warn!(block = %key, error = %err, "could not lock block for analysis");
                self.queue.mark_dirty(key);
                return PassOutcome::Skipped;
            }
        };

        let block = guard.snapshot();
        let revision = block.revision();
        match run.revision {
            None => run.revision = Some(revision),
            Some(started) if started != revision => {
                drop(guard);
                self.abandon(key, started);
                return PassOutcome::Abandoned;
            }
            Some(_) => {}
        }

        if let Err(err) = guard.with_block_mut(|block| block.set_status(BlockStatus::Analyzing)) {
            warn!(block = %key, error = %err, "analysis guard lacks write access");
            return PassOutcome::Skipped;
        }

        let failed_before = self.failures_at(key, revision);
        let mut staged: Vec<(String, Vec<TaggedSpan>)> = Vec::new();
        let mut failed_now: Vec<(String, String)> = Vec::new();
        let mut progressed = false;

        for planned in &plan {
            let info = planned.analyzer.info();
            if run.completed.contains(&info.name) {
                continue;
            }
            if failed_before.contains(&info.name) {
                run.completed.insert(info.name.clone());
                continue;
            }
            if !planned.needs.is_subset(&run.satisfied) {
                trace!(block = %key, analyzer = %info.name, "requirements not yet satisfied");
                continue;
            }

            let mut context = AnalysisContext::new(&info.name, &block, &run.upstream, sender);
            let status = catch_unwind(AssertUnwindSafe(|| {
                planned.analyzer.analyze(&block, &mut context)
            }))
            .unwrap_or_else(|payload| AnalyzerStatus::failed(panic_message(&*payload)));

            match status {
                AnalyzerStatus::Succeeded => {
                    let spans = context.into_spans();
                    for name in &info.provides {
                        run.upstream.insert(name.clone(), spans.clone());
                        run.satisfied.insert(name.clone());
                    }
                    run.completed.insert(info.name.clone());
                    staged.push((info.name.clone(), spans));
                    progressed = true;
                }
                AnalyzerStatus::Failed { reason } => {
                    run.completed.insert(info.name.clone());
                    staged.push((info.name.clone(), Vec::new()));
                    failed_now.push((info.name.clone(), reason));
                }
                AnalyzerStatus::Deferred => {
                    trace!(block = %key, analyzer = %info.name, "analyzer deferred");
                }
            }
        }

        // An analyzer may have edited the block through a reentrant command.
        if guard.with_block(|block| block.revision()) != revision {
            drop(guard);
            self.abandon(key, revision);
            return PassOutcome::Abandoned;
        }

        let remaining = plan
            .iter()
            .any(|planned| !run.completed.contains(&planned.analyzer.info().name));
        let status = if remaining {
            BlockStatus::Deferred
        } else {
            BlockStatus::Clean
        };
        let committed = guard.with_block_mut(|block| {
            for (name, spans) in staged {
                block.replace_spans(&name, spans);
            }
            block.set_status(status);
            block.spans().len()
        });
        drop(guard);

        let span_count = match committed {
            Ok(count) => count,
            Err(err) => {
                warn!(block = %key, error = %err, "could not commit analysis");
                return PassOutcome::Skipped;
            }
        };

        self.record_failures(key, revision, &failed_now);
        for (analyzer, message) in failed_now {
            let err = EditorError::AnalyzerFailed {
                analyzer: analyzer.clone(),
                block: key,
                message: message.clone(),
            };
            warn!(revision, error = %err, "analyzer failed");
            self.events.dispatch(DocumentEvent::AnalyzerFailed {
                block: key,
                analyzer,
                message,
            });
        }

        debug!(
            block = %key,
            revision,
            status = ?status,
            span_count,
            "analysis pass committed"
        );

        if progressed && remaining {
            return PassOutcome::Continue;
        }
        self.events.dispatch(DocumentEvent::BlockAnalyzed {
            block: key,
            revision,
            status,
            span_count,
        });
        PassOutcome::Finished
    }

    fn abandon(&self, key: BlockKey, revision: u64) {
        warn!(block = %key, revision, "block changed during analysis; discarding stale pass");
        self.queue.mark_dirty(key);
        self.events
            .dispatch(DocumentEvent::AnalysisAbandoned { block: key, revision });
    }

    fn failures_at(&self, key: BlockKey, revision: u64) -> BTreeSet<String> {
        let mut failures = self.failures.lock();
        match failures.get(&key) {
            Some(record) if record.revision == revision => {
                record.analyzers.keys().cloned().collect()
            }
            Some(_) => {
                failures.remove(&key);
                BTreeSet::new()
            }
            None => BTreeSet::new(),
        }
    }

    fn record_failures(&self, key: BlockKey, revision: u64, failed: &[(String, String)]) {
        if failed.is_empty() {
            return;
        }
        let mut failures = self.failures.lock();
        let record = failures.entry(key).or_insert_with(|| FailureRecord {
            revision,
            analyzers: BTreeMap::new(),
        });
        if record.revision != revision {
            record.revision = revision;
            record.analyzers.clear();
        }
        record.analyzers.extend(failed.iter().cloned());
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|message| (*message).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .map_or_else(
            || "analyzer panicked".to_string(),
            |message| format!("analyzer panicked: {message}"),
        )
}

/// Runs registered analyzers over dirty blocks on a pool of worker threads
pub struct AnalysisSupervisor {
    shared: Arc<AnalysisShared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl AnalysisSupervisor {
    pub(crate) fn start(
        collection: Arc<BlockCollection>,
        commands: Arc<CommandSupervisor>,
        queue: Arc<DirtyQueue>,
        events: Arc<EventChannel>,
        worker_count: usize,
    ) -> Result<Self> {
        let shared = Arc::new(AnalysisShared {
            collection,
            registry: RwLock::new(AnalyzerRegistry::new()),
            queue,
            commands,
            events,
            failures: Mutex::new(HashMap::new()),
        });
        let supervisor = Self {
            shared,
            workers: Mutex::new(Vec::new()),
        };

        for index in 0..worker_count.max(1) {
            let shared = Arc::clone(&supervisor.shared);
            let handle = thread::Builder::new()
                .name(format!("blockdoc-analysis-{index}"))
                .spawn(move || shared.worker_loop())
                .map_err(|err| EditorError::WorkerSpawn {
                    message: err.to_string(),
                })?;
            supervisor.workers.lock().push(handle);
        }

        debug!(workers = worker_count.max(1), "analysis supervisor started");
        Ok(supervisor)
    }

    /// Add an analyzer and re-queue every block
    pub fn register(&self, analyzer: Arc<dyn BlockAnalyzer>) -> Result<()> {
        let name = analyzer.info().name.clone();
        self.shared.registry.write().register(analyzer)?;
        self.shared.failures.lock().clear();
        self.requeue_all()?;
        self.shared
            .events
            .dispatch(DocumentEvent::AnalyzerRegistered { name });
        Ok(())
    }

    /// Remove an analyzer and re-queue every block
    pub fn unregister(&self, name: &str) -> Result<bool> {
        if self.shared.registry.write().unregister(name).is_none() {
            return Ok(false);
        }
        self.requeue_all()?;
        Ok(true)
    }

    /// Registered analyzer names in dependency order
    pub fn analyzer_names(&self) -> Vec<String> {
        self.shared.registry.read().names()
    }

    /// Analyzers in, or downstream of, a dependency cycle
    pub fn cycles(&self) -> Vec<String> {
        self.shared.registry.read().cycles().to_vec()
    }

    /// Analyzers that failed on the block's latest analyzed revision
    ///
    /// Each entry is an [`EditorError::AnalyzerFailed`]. They are not retried
    /// until the block changes or a new analyzer is registered.
    pub fn failures(&self, key: BlockKey) -> Vec<EditorError> {
        self.shared
            .failures
            .lock()
            .get(&key)
            .map(|record| {
                record
                    .analyzers
                    .iter()
                    .map(|(analyzer, message)| EditorError::AnalyzerFailed {
                        analyzer: analyzer.clone(),
                        block: key,
                        message: message.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Queue a block for analysis
    pub fn mark_dirty(&self, key: BlockKey) {
        self.shared.queue.mark_dirty(key);
    }

    /// Queue every block for analysis
    pub fn requeue_all(&self) -> Result<()> {
        let keys = self
            .shared
            .collection
            .acquire_collection_lock(LockMode::Read)?
            .keys();
        self.shared.queue.mark_all(&keys);
        Ok(())
    }

    /// Whether no block is queued or being analyzed
    pub fn is_idle(&self) -> bool {
        self.shared.queue.is_idle()
    }

    /// Block until every dirty block is analyzed and the deferred queue is empty
    ///
    /// Fails with [`EditorError::LockHeldDuringWait`] on a thread holding a
    /// document lock, since the workers would need that lock to finish.
    pub fn wait_for_block_analyzers(&self) -> Result<()> {
        self.wait_until(None).map(drop)
    }

    /// Bounded [`wait_for_block_analyzers`](Self::wait_for_block_analyzers);
    /// `Ok(false)` on timeout
    pub fn wait_for_block_analyzers_timeout(&self, timeout: Duration) -> Result<bool> {
        self.wait_until(Some(Instant::now() + timeout))
    }

    fn wait_until(&self, deadline: Option<Instant>) -> Result<bool> {
        if held_by_current_thread() {
            return Err(EditorError::LockHeldDuringWait);
        }
        loop {
            self.shared.commands.drain_deferred();
            if !self.shared.queue.wait_idle(deadline) {
                if self.shared.queue.is_shut_down() {
                    return Err(EditorError::Shutdown);
                }
                return Ok(false);
            }
            if self.shared.commands.deferred_pending() == 0 && self.shared.queue.is_idle() {
                return Ok(true);
            }
        }
    }

    /// Actions the analyzers offer for spans overlapping `span` on `key`
    ///
    /// Meaningful once the block is analyzed; sorted by importance, highest
    /// first.
    pub fn editor_actions(&self, key: BlockKey, span: &TaggedSpan) -> Result<Vec<EditorAction>> {
        let block = HierarchicalGuard::read(&self.shared.collection, key)?.snapshot();
        let owners: Vec<(Arc<dyn BlockAnalyzer>, &TaggedSpan)> = {
            let registry = self.shared.registry.read();
            block
                .spans()
                .iter()
                .filter(|own| own.overlaps(span))
                .filter_map(|own| registry.get(&own.source).map(|analyzer| (analyzer, own)))
                .collect()
        };

        let mut actions: Vec<EditorAction> = owners
            .into_iter()
            .flat_map(|(analyzer, own)| analyzer.editor_actions(&block, own))
            .collect();
        sort_by_importance(&mut actions);
        Ok(actions)
    }

    /// Stop the workers and wait for them to exit
    pub fn shutdown(&self) {
        self.shared.queue.shutdown();
        let workers = std::mem::take(&mut *self.workers.lock());
        let current = thread::current().id();
        for worker in workers {
            if worker.thread().id() == current {
                continue;
            }
            if worker.join().is_err() {
                warn!("analysis worker exited with a panic");
            }
        }
    }
}

impl Drop for AnalysisSupervisor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for AnalysisSupervisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisSupervisor")
            .field("analyzers", &self.analyzer_names())
            .field("workers", &self.workers.lock().len())
            .field("idle", &self.is_idle())
            .finish()
    }
}
