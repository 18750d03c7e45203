//! Entry reconciler
//!
//! Converges one entry at a time: fetch, diff, and at most one write. The
//! only retry is the recovery from a concurrent create, which re-reads the
//! entry and applies the remaining difference as a single update.

use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use dirstate_api::requests::EntryState;
use dirstate_api::responses::{ApplyReport, BatchItem, BatchReport, EntryOutcome, ErrorBody};
use dirstate_ldap::{DirectoryClient, DirectoryError, Dn, ObservedEntry};
use tracing::{debug, error, info, instrument, warn};

use crate::config::{DesiredEntry, EntrySpec, ReconcileConfig};
use crate::diff::{AttributeComparator, DiffPlan, compute_diff};
use crate::error::ReconcileError;
use crate::report::error_body;

/// Result of applying a desired entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Entry already matched
    Unchanged,
    /// Entry was added
    Created,
    /// Entry was modified
    Updated,
}

/// Result of removing an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    /// Entry was deleted
    Removed,
    /// Entry did not exist
    Absent,
}

impl From<ApplyOutcome> for EntryOutcome {
    fn from(outcome: ApplyOutcome) -> Self {
        match outcome {
            ApplyOutcome::Unchanged => EntryOutcome::Unchanged,
            ApplyOutcome::Created => EntryOutcome::Created,
            ApplyOutcome::Updated => EntryOutcome::Updated,
        }
    }
}

impl From<RemoveOutcome> for EntryOutcome {
    fn from(outcome: RemoveOutcome) -> Self {
        match outcome {
            RemoveOutcome::Removed => EntryOutcome::Removed,
            RemoveOutcome::Absent => EntryOutcome::Absent,
        }
    }
}

/// Details of one apply
#[derive(Debug, Clone)]
pub struct Applied {
    pub dn: Dn,
    pub outcome: ApplyOutcome,
    /// Plan that was written (or would have been, in check mode)
    pub plan: DiffPlan,
    pub check_mode: bool,
    /// Post-write convergence, when verification is enabled
    pub verified: Option<bool>,
}

impl Applied {
    /// Report in the shape automation tooling expects
    #[must_use]
    pub fn report(&self) -> ApplyReport {
        let outcome = EntryOutcome::from(self.outcome);
        ApplyReport {
            dn: self.dn.to_string(),
            outcome,
            changed: outcome.is_change(),
            actions: actions(outcome, &self.dn),
            modifications: if self.plan.is_empty() {
                Vec::new()
            } else {
                self.plan.describe()
            },
            check_mode: self.check_mode,
            verified: self.verified,
        }
    }
}

fn actions(outcome: EntryOutcome, dn: &Dn) -> Vec<String> {
    match outcome {
        EntryOutcome::Created => vec![format!("Created dn '{dn}'")],
        EntryOutcome::Updated => vec![format!("Modified dn '{dn}'")],
        EntryOutcome::Removed => vec![format!("Deleted dn '{dn}'")],
        EntryOutcome::Unchanged | EntryOutcome::Absent => Vec::new(),
    }
}

/// Report for a remove
#[must_use]
pub fn remove_report(dn: &Dn, outcome: RemoveOutcome, check_mode: bool) -> ApplyReport {
    let outcome = EntryOutcome::from(outcome);
    ApplyReport {
        dn: dn.to_string(),
        outcome,
        changed: outcome.is_change(),
        actions: actions(outcome, dn),
        modifications: Vec::new(),
        check_mode,
        verified: None,
    }
}

// ============================================================================
// Reconciler
// ============================================================================

/// Converges directory entries to their desired state
#[derive(Clone)]
pub struct Reconciler {
    client: Arc<dyn DirectoryClient>,
    config: ReconcileConfig,
    comparator: AttributeComparator,
}

impl Reconciler {
    /// Create a reconciler
    pub fn new(client: Arc<dyn DirectoryClient>, config: ReconcileConfig) -> Self {
        let comparator = config.comparator();
        Self {
            client,
            config,
            comparator,
        }
    }

    /// Reconciler settings
    #[must_use]
    pub fn config(&self) -> &ReconcileConfig {
        &self.config
    }

    /// Name of the directory client in use
    #[must_use]
    pub fn client_type(&self) -> &'static str {
        self.client.client_type()
    }

    /// Copy of this reconciler with check mode forced on
    #[must_use]
    pub fn checked(&self, check_mode: bool) -> Self {
        let mut copy = self.clone();
        copy.config.check_mode |= check_mode;
        copy
    }

    async fn call<T>(
        &self,
        request: impl Future<Output = Result<T, DirectoryError>>,
    ) -> Result<T, DirectoryError> {
        let timeout = self.config.timeout();
        tokio::time::timeout(timeout, request)
            .await
            .map_err(|_| DirectoryError::Timeout { timeout })?
    }

    async fn fetch(&self, desired: &DesiredEntry) -> Result<Option<ObservedEntry>, DirectoryError> {
        let mut attributes: Vec<&str> = vec!["objectClass"];
        attributes.extend(desired.attributes.names());
        self.call(self.client.fetch(&desired.dn, &attributes)).await
    }

    /// Fetch and diff without writing
    ///
    /// # Errors
    /// Returns a directory error if the entry cannot be read.
    #[instrument(skip(self, desired), fields(dn = %desired.dn))]
    pub async fn plan(&self, desired: &DesiredEntry) -> Result<DiffPlan, ReconcileError> {
        let observed = self
            .fetch(desired)
            .await
            .map_err(|e| ReconcileError::directory(&desired.dn, e))?;
        Ok(compute_diff(desired, observed.as_ref(), &self.comparator))
    }

    /// Converge an entry
    ///
    /// # Errors
    /// Directory errors surface immediately, except the one recovery from a
    /// concurrent create.
    pub async fn apply(&self, desired: &DesiredEntry) -> Result<ApplyOutcome, ReconcileError> {
        self.reconcile(desired).await.map(|applied| applied.outcome)
    }

    /// Converge an entry and keep the details
    ///
    /// # Errors
    /// See [`Reconciler::apply`].
    #[instrument(skip(self, desired), fields(dn = %desired.dn, client = self.client.client_type()))]
    pub async fn reconcile(&self, desired: &DesiredEntry) -> Result<Applied, ReconcileError> {
        let dn = &desired.dn;
        let plan = self.plan(desired).await?;
        let check_mode = self.config.check_mode;

        let applied = |outcome, plan| Applied {
            dn: dn.clone(),
            outcome,
            plan,
            check_mode,
            verified: None,
        };

        if plan.is_empty() {
            debug!("entry already converged");
            return Ok(applied(ApplyOutcome::Unchanged, plan));
        }

        if check_mode {
            let outcome = if plan.is_create() {
                ApplyOutcome::Created
            } else {
                ApplyOutcome::Updated
            };
            info!(outcome = ?outcome, "check mode, not writing");
            return Ok(applied(outcome, plan));
        }

        let mut result = match &plan {
            DiffPlan::Create {
                object_classes,
                attributes,
            } => match self
                .call(self.client.add(dn, object_classes, attributes))
                .await
            {
                Ok(()) => {
                    info!("entry created");
                    applied(ApplyOutcome::Created, plan)
                }
                Err(e) if e.is_create_conflict() => self.recover_create_race(desired, e).await?,
                Err(e) => return Err(ReconcileError::directory(dn, e)),
            },
            DiffPlan::Modify(mods) => {
                self.call(self.client.modify(dn, mods))
                    .await
                    .map_err(|e| ReconcileError::directory(dn, e))?;
                info!(modifications = mods.len(), "entry updated");
                applied(ApplyOutcome::Updated, plan)
            }
        };

        if self.config.verify && result.outcome != ApplyOutcome::Unchanged {
            result.verified = Some(self.verify(desired).await);
        }
        Ok(result)
    }

    /// Another writer created the entry between our fetch and add
    async fn recover_create_race(
        &self,
        desired: &DesiredEntry,
        original: DirectoryError,
    ) -> Result<Applied, ReconcileError> {
        let dn = &desired.dn;
        warn!(error = %original, "add conflicted, re-reading entry");

        let observed = self
            .fetch(desired)
            .await
            .map_err(|e| ReconcileError::directory(dn, e))?;
        let Some(observed) = observed else {
            return Err(ReconcileError::directory(dn, original));
        };

        let plan = compute_diff(desired, Some(&observed), &self.comparator);
        let outcome = match &plan {
            DiffPlan::Modify(mods) if mods.is_empty() => {
                debug!("concurrent writer already converged the entry");
                ApplyOutcome::Unchanged
            }
            DiffPlan::Modify(mods) => {
                self.call(self.client.modify(dn, mods))
                    .await
                    .map_err(|source| ReconcileError::CreateRace {
                        dn: dn.to_string(),
                        source,
                    })?;
                info!(modifications = mods.len(), "entry updated after concurrent create");
                ApplyOutcome::Updated
            }
            DiffPlan::Create { .. } => return Err(ReconcileError::directory(dn, original)),
        };

        Ok(Applied {
            dn: dn.clone(),
            outcome,
            plan,
            check_mode: false,
            verified: None,
        })
    }

    /// Re-read after a write; never retries
    async fn verify(&self, desired: &DesiredEntry) -> bool {
        match self.fetch(desired).await {
            Ok(observed) => {
                let plan = compute_diff(desired, observed.as_ref(), &self.comparator);
                if !plan.is_empty() {
                    warn!(dn = %desired.dn, remaining = %plan, "entry has not converged after write");
                }
                plan.is_empty()
            }
            Err(e) => {
                warn!(dn = %desired.dn, error = %e, "could not re-read entry after write");
                false
            }
        }
    }

    /// Ensure an entry does not exist
    ///
    /// # Errors
    /// Returns a directory error if the entry cannot be read or deleted.
    /// Deleting an entry that has children fails.
    #[instrument(skip(self), fields(dn = %dn, client = self.client.client_type()))]
    pub async fn remove(&self, dn: &Dn) -> Result<RemoveOutcome, ReconcileError> {
        let observed = self
            .call(self.client.fetch(dn, &["objectClass"]))
            .await
            .map_err(|e| ReconcileError::directory(dn, e))?;

        if observed.is_none() {
            debug!("entry already absent");
            return Ok(RemoveOutcome::Absent);
        }
        if self.config.check_mode {
            info!("check mode, not deleting");
            return Ok(RemoveOutcome::Removed);
        }

        match self.call(self.client.delete(dn)).await {
            Ok(()) => {
                info!("entry deleted");
                Ok(RemoveOutcome::Removed)
            }
            Err(DirectoryError::NotFound(_)) => {
                debug!("entry deleted concurrently");
                Ok(RemoveOutcome::Absent)
            }
            Err(e) => Err(ReconcileError::directory(dn, e)),
        }
    }

    /// Reconcile a declarative entry, honouring its `state`
    ///
    /// # Errors
    /// Configuration errors for bad templates; otherwise as `apply`/`remove`.
    pub async fn apply_spec(&self, spec: &EntrySpec) -> Result<ApplyReport, ReconcileError> {
        match spec.state {
            EntryState::Present => {
                let desired = spec.desired()?;
                Ok(self.reconcile(&desired).await?.report())
            }
            EntryState::Absent => {
                let dn = spec.resolved_dn()?;
                let outcome = self.remove(&dn).await?;
                Ok(remove_report(&dn, outcome, self.config.check_mode))
            }
        }
    }

    /// Reconcile independent entries, `batch_size` at a time
    ///
    /// A failing entry never stops the others; each gets its own result.
    #[instrument(skip(self, specs), fields(total = specs.len()))]
    pub async fn apply_batch(&self, specs: Vec<EntrySpec>, batch_size: usize) -> BatchReport {
        let total = specs.len();
        let batch_size = batch_size.max(1);
        let mut results = Vec::with_capacity(total);

        info!(total, batch_size, "starting batch apply");

        for batch in specs.chunks(batch_size) {
            let mut handles = Vec::new();

            for spec in batch {
                let reconciler = self.clone();
                let spec = spec.clone();
                let label = spec
                    .resolved_dn()
                    .map_or_else(|_| spec.dn.clone(), |dn| dn.to_string());

                let handle = tokio::spawn(async move { reconciler.apply_spec(&spec).await });
                handles.push((label, handle));
            }

            for (dn, handle) in handles {
                let item = match handle.await {
                    Ok(Ok(report)) => BatchItem {
                        dn,
                        report: Some(report),
                        error: None,
                    },
                    Ok(Err(e)) => {
                        error!(dn = %dn, error = %e, "entry failed");
                        BatchItem {
                            dn,
                            report: None,
                            error: Some(error_body(&e)),
                        }
                    }
                    Err(e) => {
                        error!(dn = %dn, error = %e, "task panicked");
                        BatchItem {
                            dn,
                            report: None,
                            error: Some(ErrorBody {
                                kind: "task".to_string(),
                                message: e.to_string(),
                            }),
                        }
                    }
                };
                results.push(item);
            }
        }

        let changed = results
            .iter()
            .filter(|r| r.report.as_ref().is_some_and(|r| r.changed))
            .count();
        let failed = results.iter().filter(|r| r.error.is_some()).count();

        info!(total, changed, failed, "batch apply finished");

        BatchReport {
            total,
            changed,
            failed,
            results,
            finished_at: Utc::now(),
        }
    }
}
