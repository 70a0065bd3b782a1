//! The document session façade: one unit of work over a repository port.
//!
//! # Responsibility
//! - Expose the CRUD/query surface applications program against.
//! - Stage mutation intents and drain them in order on commit.
//! - Merge staged intents over remote reads so a session observes its
//!   own pending writes.
//!
//! # Invariants
//! - No staged write touches the store before `commit_changes`.
//! - Commit drains strictly in enqueue order, one intent at a time.
//! - A failed commit leaves the failed intent and its successors
//!   queued and moves the session to `Faulted`; intents already
//!   applied are durable (at-least-once, not atomic across intents).

use crate::model::aggregate::{now_epoch_ms, stamp_aggregate, AggregateRoot};
use crate::repo::document_repo::{DocumentRecord, DocumentRepository};
use crate::session::changes::{continuation_for, ChangeSet, ChangeToken};
use crate::session::operation_log::{OperationId, OperationKind, OperationLog, OperationRecord};
use crate::session::queue::{QueuedWrite, WriteKind};
use crate::session::replay::replay_queued_writes;
use crate::session::retry::RetryExecutor;
use crate::session::{SessionError, SessionResult, SessionState};
use log::{error, info};
use std::time::Instant;
use uuid::Uuid;

/// One unit-of-work session over a document repository.
pub struct DocumentSession<R: DocumentRepository> {
    repo: R,
    log: OperationLog,
    queue: Vec<QueuedWrite>,
    state: SessionState,
    retry: RetryExecutor,
}

impl<R: DocumentRepository> DocumentSession<R> {
    /// Opens a session with the default retry policy.
    pub fn new(repo: R) -> Self {
        Self::with_retry(repo, RetryExecutor::default())
    }

    /// Opens a session with a caller-supplied retry executor.
    pub fn with_retry(repo: R, retry: RetryExecutor) -> Self {
        Self {
            repo,
            log: OperationLog::new(),
            queue: Vec::new(),
            state: SessionState::Open,
            retry,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Staged intents awaiting commit, in enqueue order.
    pub fn queued_writes(&self) -> &[QueuedWrite] {
        &self.queue
    }

    /// Every operation this session has issued, in emission order.
    pub fn operations(&self) -> &[OperationRecord] {
        self.log.operations()
    }

    /// Committed-only and change-feed reads, bypassing the overlay.
    pub fn advanced(&mut self) -> Advanced<'_, R> {
        Advanced { session: self }
    }

    // ---- reads (overlayed) ----

    /// Reads one aggregate by id, pending session writes included.
    pub fn read_by_id<T: AggregateRoot>(&mut self, id: Uuid) -> SessionResult<Option<T>> {
        self.read_one::<T>("read_by_id", id, false)
    }

    /// Like `read_by_id`, but returns nothing for tombstoned aggregates.
    pub fn read_active_by_id<T: AggregateRoot>(&mut self, id: Uuid) -> SessionResult<Option<T>> {
        self.read_one::<T>("read_active_by_id", id, true)
    }

    /// Reads all aggregates of `T` matching `predicate`, overlayed.
    pub fn read<T: AggregateRoot>(
        &mut self,
        predicate: impl Fn(&T) -> bool,
    ) -> SessionResult<Vec<T>> {
        self.read_query("read", OperationKind::ReadQuery, predicate, false)
    }

    /// Like `read`, restricted to active aggregates after overlay.
    pub fn read_active<T: AggregateRoot>(
        &mut self,
        predicate: impl Fn(&T) -> bool,
    ) -> SessionResult<Vec<T>> {
        self.read_query("read_active", OperationKind::ReadQuery, predicate, true)
    }

    /// Query with projection: matching aggregates mapped through
    /// `project` instead of being returned whole.
    pub fn read_with<T: AggregateRoot, Out>(
        &mut self,
        predicate: impl Fn(&T) -> bool,
        project: impl Fn(&T) -> Out,
    ) -> SessionResult<Vec<Out>> {
        let matched = self.read_query::<T>(
            "read_with",
            OperationKind::ReadQueryWithProjection,
            predicate,
            false,
        )?;
        Ok(matched.iter().map(project).collect())
    }

    /// True when the id is stored remotely or staged for creation in
    /// this session; a staged hard-delete overrides a remote row.
    pub fn exists(&mut self, id: Uuid) -> SessionResult<bool> {
        if id.is_nil() {
            return Ok(false);
        }

        let mut staged_verdict = None;
        for intent in &self.queue {
            if intent.target_id() == id {
                staged_verdict = Some(intent.kind() != WriteKind::HardDelete);
            }
        }
        if let Some(verdict) = staged_verdict {
            return Ok(verdict);
        }

        let op = self.log.record(OperationKind::ReadById, "exists", "");
        let started = Instant::now();
        let found = self.retry.execute(|| self.repo.exists(id))?;
        self.log.finish(op, 0.0, started.elapsed());
        Ok(found)
    }

    // ---- staged writes ----

    /// Stamps metadata onto the aggregate tree and stages its creation.
    /// Returns the stamped copy the store will receive at commit.
    pub fn add<T: AggregateRoot>(&mut self, mut aggregate: T) -> SessionResult<T> {
        self.ensure_accepting_writes()?;

        stamp_aggregate(&mut aggregate, now_epoch_ms());
        {
            let meta = aggregate.aggregate_meta_mut();
            meta.active = true;
            meta.version = 0;
        }

        let record = DocumentRecord::from_aggregate(&aggregate)?;
        let op = self.log.record(OperationKind::Write, "add", T::SCHEMA);
        self.queue.push(QueuedWrite::Create { record, op });
        Ok(aggregate)
    }

    /// Stages a full-snapshot update. Returns `Ok(None)` and queues
    /// nothing when the target does not exist in session view.
    pub fn update<T: AggregateRoot>(&mut self, aggregate: &T) -> SessionResult<Option<T>> {
        self.update_with_options(aggregate, false)
    }

    pub fn update_with_options<T: AggregateRoot>(
        &mut self,
        aggregate: &T,
        overwrite_read_only: bool,
    ) -> SessionResult<Option<T>> {
        let replacement = aggregate.clone();
        self.stage_update(
            "update",
            aggregate.aggregate_meta().id,
            move |current: &mut T| {
                // Creation time survives a whole-snapshot replacement.
                let created_ms = current.aggregate_meta().created_ms;
                *current = replacement;
                current.aggregate_meta_mut().created_ms = created_ms;
            },
            overwrite_read_only,
        )
    }

    /// Resolves the target through the session overlay, applies the
    /// mutator in memory, and stages the result.
    pub fn update_by_id<T: AggregateRoot>(
        &mut self,
        id: Uuid,
        mutate: impl FnOnce(&mut T),
    ) -> SessionResult<Option<T>> {
        self.stage_update("update_by_id", id, mutate, false)
    }

    pub fn update_by_id_with_options<T: AggregateRoot>(
        &mut self,
        id: Uuid,
        mutate: impl FnOnce(&mut T),
        overwrite_read_only: bool,
    ) -> SessionResult<Option<T>> {
        self.stage_update("update_by_id", id, mutate, overwrite_read_only)
    }

    /// Bulk update over a predicate. Read-only targets fail the whole
    /// call before anything is queued, unless overridden.
    pub fn update_where<T: AggregateRoot>(
        &mut self,
        predicate: impl Fn(&T) -> bool,
        mutate: impl Fn(&mut T),
    ) -> SessionResult<Vec<T>> {
        self.update_where_with_options(predicate, mutate, false)
    }

    pub fn update_where_with_options<T: AggregateRoot>(
        &mut self,
        predicate: impl Fn(&T) -> bool,
        mutate: impl Fn(&mut T),
        overwrite_read_only: bool,
    ) -> SessionResult<Vec<T>> {
        self.ensure_accepting_writes()?;

        let targets = self.fetch_effective_query::<T>(&predicate)?;
        if !overwrite_read_only {
            if let Some(locked) = targets.iter().find(|t| t.aggregate_meta().read_only) {
                return Err(SessionError::ReadOnlyViolation(locked.aggregate_meta().id));
            }
        }

        let now_ms = now_epoch_ms();
        let mut staged = Vec::with_capacity(targets.len());
        for mut target in targets {
            mutate(&mut target);
            self.finalize_update(&mut target, now_ms, "update_where")?;
            staged.push(target);
        }
        Ok(staged)
    }

    /// Stages a tombstone for one aggregate (`active = false`).
    pub fn delete_soft_by_id<T: AggregateRoot>(&mut self, id: Uuid) -> SessionResult<Option<T>> {
        self.ensure_accepting_writes()?;
        require_id(id)?;

        let Some(mut current) = self.fetch_effective::<T>(id)? else {
            return Ok(None);
        };
        current.aggregate_meta_mut().soft_delete(now_epoch_ms());

        let record = DocumentRecord::from_aggregate(&current)?;
        let op = self
            .log
            .record(OperationKind::Write, "delete_soft_by_id", T::SCHEMA);
        self.queue.push(QueuedWrite::SoftDelete { record, op });
        Ok(Some(current))
    }

    /// Stages a physical removal for one aggregate.
    pub fn delete_hard_by_id<T: AggregateRoot>(&mut self, id: Uuid) -> SessionResult<Option<T>> {
        self.ensure_accepting_writes()?;
        require_id(id)?;

        let Some(current) = self.fetch_effective::<T>(id)? else {
            return Ok(None);
        };

        let op = self
            .log
            .record(OperationKind::Write, "delete_hard_by_id", T::SCHEMA);
        self.queue.push(QueuedWrite::HardDelete {
            schema: T::SCHEMA.to_string(),
            id,
            op,
        });
        Ok(Some(current))
    }

    /// Bulk tombstone over a predicate.
    pub fn delete_soft_where<T: AggregateRoot>(
        &mut self,
        predicate: impl Fn(&T) -> bool,
    ) -> SessionResult<Vec<T>> {
        self.ensure_accepting_writes()?;

        let targets = self.fetch_effective_query::<T>(&predicate)?;
        let now_ms = now_epoch_ms();
        let mut staged = Vec::with_capacity(targets.len());
        for mut target in targets {
            target.aggregate_meta_mut().soft_delete(now_ms);
            let record = DocumentRecord::from_aggregate(&target)?;
            let op = self
                .log
                .record(OperationKind::Write, "delete_soft_where", T::SCHEMA);
            self.queue.push(QueuedWrite::SoftDelete { record, op });
            staged.push(target);
        }
        Ok(staged)
    }

    /// Bulk physical removal over a predicate.
    pub fn delete_hard_where<T: AggregateRoot>(
        &mut self,
        predicate: impl Fn(&T) -> bool,
    ) -> SessionResult<Vec<T>> {
        self.ensure_accepting_writes()?;

        let targets = self.fetch_effective_query::<T>(&predicate)?;
        let mut staged = Vec::with_capacity(targets.len());
        for target in targets {
            let op = self
                .log
                .record(OperationKind::Write, "delete_hard_where", T::SCHEMA);
            self.queue.push(QueuedWrite::HardDelete {
                schema: T::SCHEMA.to_string(),
                id: target.aggregate_meta().id,
                op,
            });
            staged.push(target);
        }
        Ok(staged)
    }

    // ---- commit ----

    /// Drains the queue in enqueue order against the repository port.
    ///
    /// On failure the session faults and the failed intent plus its
    /// successors stay queued; calling `commit_changes` again retries
    /// exactly the remainder. An empty queue is a no-op.
    pub fn commit_changes(&mut self) -> SessionResult<()> {
        if self.queue.is_empty() {
            self.state = SessionState::Open;
            return Ok(());
        }

        info!(
            "event=commit module=session status=start queued={}",
            self.queue.len()
        );

        let mut applied = 0;
        for index in 0..self.queue.len() {
            let intent = &self.queue[index];
            let op = intent.operation();
            let started = Instant::now();

            let result = match intent {
                QueuedWrite::Create { record, .. } => self.retry.execute(|| self.repo.add(record)),
                QueuedWrite::Update { record, .. } => {
                    self.retry.execute(|| self.repo.update(record))
                }
                QueuedWrite::SoftDelete { record, .. } => {
                    self.retry.execute(|| self.repo.delete_soft(record))
                }
                QueuedWrite::HardDelete { schema, id, .. } => {
                    self.retry.execute(|| self.repo.delete_hard(schema, *id))
                }
            };

            match result {
                Ok(receipt) => {
                    self.log.finish(op, receipt.cost, started.elapsed());
                    applied += 1;
                }
                Err(err) => {
                    let kind = intent.kind();
                    let schema = intent.schema().to_string();
                    let id = intent.target_id();
                    self.queue.drain(..applied);
                    self.state = SessionState::Faulted;
                    error!(
                        "event=commit module=session status=error applied={applied} failed_kind={kind} schema={schema} id={id} error={err}"
                    );
                    return Err(SessionError::CommitFailed {
                        kind,
                        schema,
                        id,
                        source: Box::new(err),
                    });
                }
            }
        }

        info!(
            "event=commit module=session status=ok committed={}",
            self.queue.len()
        );
        self.queue.clear();
        self.state = SessionState::Open;
        Ok(())
    }

    // ---- internals ----

    fn ensure_accepting_writes(&self) -> SessionResult<()> {
        match self.state {
            SessionState::Open => Ok(()),
            SessionState::Faulted => Err(SessionError::SessionFaulted),
        }
    }

    fn read_one<T: AggregateRoot>(
        &mut self,
        method: &'static str,
        id: Uuid,
        active_only: bool,
    ) -> SessionResult<Option<T>> {
        require_id(id)?;

        let op = self.log.record(OperationKind::ReadById, method, T::SCHEMA);
        let started = Instant::now();
        let fetched = self.retry.execute(|| self.repo.get_by_id(T::SCHEMA, id))?;
        self.log.finish(op, 0.0, started.elapsed());

        let effective =
            replay_queued_writes(T::SCHEMA, fetched.into_iter().collect(), &self.queue);
        let record = effective
            .into_iter()
            .find(|row| row.id == id && (!active_only || row.active));
        match record {
            Some(row) => Ok(Some(row.to_aggregate()?)),
            None => Ok(None),
        }
    }

    fn read_query<T: AggregateRoot>(
        &mut self,
        method: &'static str,
        kind: OperationKind,
        predicate: impl Fn(&T) -> bool,
        active_only: bool,
    ) -> SessionResult<Vec<T>> {
        let op = self.log.record(kind, method, T::SCHEMA);
        let started = Instant::now();
        let batch = self.retry.execute(|| self.repo.query(T::SCHEMA))?;
        self.log.finish(op, batch.cost, started.elapsed());

        let effective = replay_queued_writes(T::SCHEMA, batch.records, &self.queue);
        let mut matched = Vec::new();
        for row in effective {
            if active_only && !row.active {
                continue;
            }
            let aggregate: T = row.to_aggregate()?;
            if predicate(&aggregate) {
                matched.push(aggregate);
            }
        }
        Ok(matched)
    }

    /// Resolves one aggregate through the overlay without recording an
    /// operation; write paths record their own Write operation instead.
    fn fetch_effective<T: AggregateRoot>(&self, id: Uuid) -> SessionResult<Option<T>> {
        let fetched = self.retry.execute(|| self.repo.get_by_id(T::SCHEMA, id))?;
        let effective =
            replay_queued_writes(T::SCHEMA, fetched.into_iter().collect(), &self.queue);
        match effective.into_iter().find(|row| row.id == id) {
            Some(row) => Ok(Some(row.to_aggregate()?)),
            None => Ok(None),
        }
    }

    fn fetch_effective_query<T: AggregateRoot>(
        &self,
        predicate: &impl Fn(&T) -> bool,
    ) -> SessionResult<Vec<T>> {
        let batch = self.retry.execute(|| self.repo.query(T::SCHEMA))?;
        let effective = replay_queued_writes(T::SCHEMA, batch.records, &self.queue);
        let mut matched = Vec::new();
        for row in effective {
            let aggregate: T = row.to_aggregate()?;
            if predicate(&aggregate) {
                matched.push(aggregate);
            }
        }
        Ok(matched)
    }

    fn stage_update<T: AggregateRoot>(
        &mut self,
        method: &'static str,
        id: Uuid,
        mutate: impl FnOnce(&mut T),
        overwrite_read_only: bool,
    ) -> SessionResult<Option<T>> {
        self.ensure_accepting_writes()?;
        require_id(id)?;

        let Some(mut current) = self.fetch_effective::<T>(id)? else {
            return Ok(None);
        };
        if current.aggregate_meta().read_only && !overwrite_read_only {
            return Err(SessionError::ReadOnlyViolation(id));
        }

        mutate(&mut current);
        current.aggregate_meta_mut().id = id; // mutators cannot reassign identity
        self.finalize_update(&mut current, now_epoch_ms(), method)?;
        Ok(Some(current))
    }

    fn finalize_update<T: AggregateRoot>(
        &mut self,
        current: &mut T,
        now_ms: i64,
        method: &'static str,
    ) -> SessionResult<()> {
        // Re-stamp so entities added by the mutator get identity too.
        stamp_aggregate(current, now_ms);

        let record = DocumentRecord::from_aggregate(current)?;
        let op = self.log.record(OperationKind::Write, method, T::SCHEMA);
        self.queue.push(QueuedWrite::Update { record, op });
        Ok(())
    }
}

/// Committed-only reads and the change feed; bypasses the overlay so a
/// caller can explicitly ignore this session's pending queue.
pub struct Advanced<'s, R: DocumentRepository> {
    session: &'s mut DocumentSession<R>,
}

impl<R: DocumentRepository> Advanced<'_, R> {
    /// Reads one aggregate exactly as the store holds it right now.
    pub fn read_committed_by_id<T: AggregateRoot>(
        &mut self,
        id: Uuid,
    ) -> SessionResult<Option<T>> {
        require_id(id)?;

        let session = &mut *self.session;
        let op = session
            .log
            .record(OperationKind::ReadById, "read_committed_by_id", T::SCHEMA);
        let started = Instant::now();
        let fetched = session
            .retry
            .execute(|| session.repo.get_by_id(T::SCHEMA, id))?;
        session.log.finish(op, 0.0, started.elapsed());

        match fetched {
            Some(row) => Ok(Some(row.to_aggregate()?)),
            None => Ok(None),
        }
    }

    /// Queries committed state only.
    pub fn read_committed<T: AggregateRoot>(
        &mut self,
        predicate: impl Fn(&T) -> bool,
    ) -> SessionResult<Vec<T>> {
        self.committed_query("read_committed", predicate, false)
    }

    /// Queries committed state, restricted to active aggregates.
    pub fn read_active_committed<T: AggregateRoot>(
        &mut self,
        predicate: impl Fn(&T) -> bool,
    ) -> SessionResult<Vec<T>> {
        self.committed_query("read_active_committed", predicate, true)
    }

    /// Incremental change query: everything committed after `token`,
    /// plus the continuation to resume from.
    pub fn read_changed<T: AggregateRoot>(
        &mut self,
        token: &ChangeToken,
    ) -> SessionResult<ChangeSet<T>> {
        let since = token.watermark()?;

        let session = &mut *self.session;
        let op = session
            .log
            .record(OperationKind::ReadChanges, "read_changed", T::SCHEMA);
        let started = Instant::now();
        let scan = session
            .retry
            .execute(|| session.repo.changed_since(T::SCHEMA, since))?;
        session.log.finish(op, scan.cost, started.elapsed());

        let continuation =
            continuation_for(token, since, scan.records.iter().map(|row| row.version));
        let mut changed = Vec::with_capacity(scan.records.len());
        for row in &scan.records {
            changed.push(row.to_aggregate()?);
        }
        Ok(ChangeSet {
            changed,
            continuation,
        })
    }

    fn committed_query<T: AggregateRoot>(
        &mut self,
        method: &'static str,
        predicate: impl Fn(&T) -> bool,
        active_only: bool,
    ) -> SessionResult<Vec<T>> {
        let session = &mut *self.session;
        let op = session.log.record(OperationKind::ReadQuery, method, T::SCHEMA);
        let started = Instant::now();
        let batch = session.retry.execute(|| session.repo.query(T::SCHEMA))?;
        session.log.finish(op, batch.cost, started.elapsed());

        let mut matched = Vec::new();
        for row in batch.records {
            if active_only && !row.active {
                continue;
            }
            let aggregate: T = row.to_aggregate()?;
            if predicate(&aggregate) {
                matched.push(aggregate);
            }
        }
        Ok(matched)
    }
}

fn require_id(id: Uuid) -> SessionResult<()> {
    if id.is_nil() {
        return Err(SessionError::InvalidArgument(
            "aggregate id must not be nil".to_string(),
        ));
    }
    Ok(())
}
