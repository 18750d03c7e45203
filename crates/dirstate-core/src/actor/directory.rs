//! `DirectoryActor`: Serialized access to one directory
//!
//! Owns the reconciler and the inventory source for a connection profile,
//! and announces every change on the event channel.

use dirstate_api::events::DirectoryEvent;
use dirstate_api::inventory::InventoryResponse;
use dirstate_api::responses::{ApplyReport, BatchReport, EntryOutcome, PlanResponse};
use dirstate_inventory::{HostVariableRules, InventoryBuilder, NamingRules};
use dirstate_ldap::Dn;
use kameo::actor::{ActorRef, WeakActorRef};
use kameo::error::ActorStopReason;
use kameo::message::{Context, Message};
use kameo::prelude::*;
use tokio::sync::broadcast;
use tracing::{error, info};

use crate::error::ReconcileError;
use crate::message::{
    ActorStatus, ApplyBatch, ApplyEntry, BuildInventory, GetStatus, PlanEntry, RemoveEntry,
};
use crate::reconcile::{Reconciler, remove_report};
use crate::report::{inventory_response, plan_response};

/// Where inventories are built from
#[derive(Clone)]
pub struct InventorySource {
    pub builder: InventoryBuilder,
    /// Root groups; discovered below the hostgroup base when empty
    pub roots: Vec<Dn>,
    pub naming: NamingRules,
    pub variables: HostVariableRules,
}

/// Arguments for spawning a `DirectoryActor`
pub struct DirectoryActorArgs {
    pub reconciler: Reconciler,
    /// Inventory building is unavailable when `None`
    pub inventory: Option<InventorySource>,
    /// Event broadcast sender
    pub event_tx: broadcast::Sender<DirectoryEvent>,
}

/// Actor that reconciles entries and builds inventories
pub struct DirectoryActor {
    reconciler: Reconciler,
    inventory: Option<InventorySource>,
    event_tx: broadcast::Sender<DirectoryEvent>,
    changed: u64,
    failed: u64,
}

impl DirectoryActor {
    fn emit(&self, event: DirectoryEvent) {
        // No subscribers is fine
        let _ = self.event_tx.send(event);
    }

    /// Count and announce a successful entry
    fn record_report(&mut self, report: &ApplyReport) {
        if report.check_mode {
            return;
        }
        let event = match report.outcome {
            EntryOutcome::Created => DirectoryEvent::EntryCreated {
                dn: report.dn.clone(),
            },
            EntryOutcome::Updated => DirectoryEvent::EntryUpdated {
                dn: report.dn.clone(),
                modifications: report.modifications.len(),
            },
            EntryOutcome::Removed => DirectoryEvent::EntryRemoved {
                dn: report.dn.clone(),
            },
            EntryOutcome::Unchanged | EntryOutcome::Absent => return,
        };
        self.changed += 1;
        self.emit(event);
    }

    /// Count and announce a failed entry
    fn record_failure(&mut self, dn: &str, error: String) {
        self.failed += 1;
        self.emit(DirectoryEvent::ReconcileFailed {
            dn: dn.to_string(),
            error,
        });
    }

    fn record(&mut self, dn: &str, result: &Result<ApplyReport, ReconcileError>) {
        match result {
            Ok(report) => self.record_report(report),
            Err(e) => {
                error!(dn = %dn, error = %e, "reconcile failed");
                self.record_failure(dn, e.to_string());
            }
        }
    }
}

impl Actor for DirectoryActor {
    type Args = DirectoryActorArgs;
    type Error = ReconcileError;

    async fn on_start(args: Self::Args, actor_ref: ActorRef<Self>) -> Result<Self, Self::Error> {
        info!(
            id = %actor_ref.id(),
            client = args.reconciler.client_type(),
            inventory = args.inventory.is_some(),
            "DirectoryActor starting"
        );

        Ok(Self {
            reconciler: args.reconciler,
            inventory: args.inventory,
            event_tx: args.event_tx,
            changed: 0,
            failed: 0,
        })
    }

    async fn on_stop(
        &mut self,
        _actor_ref: WeakActorRef<Self>,
        reason: ActorStopReason,
    ) -> Result<(), Self::Error> {
        info!(
            reason = ?reason,
            changed = self.changed,
            failed = self.failed,
            "DirectoryActor stopping"
        );
        Ok(())
    }
}

// ============================================================================
// Message Handlers
// ============================================================================

impl Message<ApplyEntry> for DirectoryActor {
    type Reply = Result<ApplyReport, ReconcileError>;

    async fn handle(
        &mut self,
        msg: ApplyEntry,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        let result = self
            .reconciler
            .checked(msg.check_mode)
            .apply_spec(&msg.spec)
            .await;
        self.record(&msg.spec.dn, &result);
        result
    }
}

impl Message<RemoveEntry> for DirectoryActor {
    type Reply = Result<ApplyReport, ReconcileError>;

    async fn handle(
        &mut self,
        msg: RemoveEntry,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        let reconciler = self.reconciler.checked(msg.check_mode);
        let result = reconciler
            .remove(&msg.dn)
            .await
            .map(|outcome| remove_report(&msg.dn, outcome, reconciler.config().check_mode));
        self.record(msg.dn.as_str(), &result);
        result
    }
}

impl Message<PlanEntry> for DirectoryActor {
    type Reply = Result<PlanResponse, ReconcileError>;

    async fn handle(
        &mut self,
        msg: PlanEntry,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        let desired = msg.spec.desired()?;
        let plan = self.reconciler.plan(&desired).await?;
        Ok(plan_response(&desired.dn, &plan))
    }
}

impl Message<ApplyBatch> for DirectoryActor {
    type Reply = Result<BatchReport, ReconcileError>;

    async fn handle(
        &mut self,
        msg: ApplyBatch,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        let reconciler = self.reconciler.checked(msg.check_mode);
        let batch_size = msg
            .batch_size
            .unwrap_or(reconciler.config().batch_size);

        let report = reconciler.apply_batch(msg.specs, batch_size).await;

        for item in &report.results {
            if let Some(entry) = &item.report {
                self.record_report(entry);
            } else if let Some(error) = &item.error {
                self.record_failure(&item.dn, error.message.clone());
            }
        }

        Ok(report)
    }
}

impl Message<BuildInventory> for DirectoryActor {
    type Reply = Result<InventoryResponse, ReconcileError>;

    async fn handle(
        &mut self,
        _msg: BuildInventory,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        let Some(source) = &self.inventory else {
            return Err(ReconcileError::NotConfigured(
                "no inventory roots or hostgroup base".to_string(),
            ));
        };

        let build = source
            .builder
            .build(&source.roots, &source.naming, &source.variables)
            .await;

        let event = DirectoryEvent::InventoryBuilt {
            groups: build.inventory.groups.len(),
            hosts: build.inventory.hosts().len(),
            warnings: build.warnings.len(),
        };
        self.emit(event);

        Ok(inventory_response(&build))
    }
}

impl Message<GetStatus> for DirectoryActor {
    type Reply = ActorStatus;

    async fn handle(
        &mut self,
        _msg: GetStatus,
        _ctx: &mut Context<Self, Self::Reply>,
    ) -> Self::Reply {
        ActorStatus {
            client: self.reconciler.client_type().to_string(),
            inventory_configured: self.inventory.is_some(),
            changed: self.changed,
            failed: self.failed,
        }
    }
}
