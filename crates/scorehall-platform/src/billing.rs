//! Cross-shard billing report.
//!
//! Per tenant, per finished competition:
//! - every player with at least one score is charged [`SCORED_PLAYER_YEN`];
//! - every other player who opened the ranking no later than the finish time
//!   is charged [`VISITOR_YEN`].
//!
//! A player marked as scored anywhere in a tenant is never charged as a
//! visitor in that tenant.
//!
//! # Consistency
//!
//! The tenant lock covers only the read of each tenant's scores, not the
//! whole report. A tenant provisioned and scored while a report is being
//! built can be billed off by one cycle. This is accepted behavior.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use scorehall_core::error::Result;
use scorehall_core::types::{CompetitionRow, TenantBilling, TenantRow};

use crate::registry::TenantRegistry;
use crate::shard::{ShardManager, ShardStore};

/// Tenants per report page.
pub const BILLING_PAGE_SIZE: usize = 10;
/// Charge per (scored player, finished competition).
pub const SCORED_PLAYER_YEN: i64 = 100;
/// Charge per (visit-only player, finished competition).
pub const VISITOR_YEN: i64 = 10;

/// First page of tenants strictly below `before`, keeping the input order.
pub fn select_page(tenants: Vec<TenantRow>, before: Option<i64>) -> Vec<TenantRow> {
    tenants
        .into_iter()
        .filter(|t| before.is_none_or(|b| t.id < b))
        .take(BILLING_PAGE_SIZE)
        .collect()
}

/// Remembers the most recently resolved competition. Scores and visits both
/// arrive grouped by competition, so this saves most lookups.
#[derive(Default)]
struct CompetitionCache {
    last: Option<(i64, String, Option<CompetitionRow>)>,
}

impl CompetitionCache {
    fn resolve(&mut self, shard: &ShardStore, competition_id: &str) -> Result<Option<CompetitionRow>> {
        if let Some((tenant_id, id, comp)) = &self.last {
            if *tenant_id == shard.tenant_id() && id == competition_id {
                return Ok(comp.clone());
            }
        }
        let comp = shard.retrieve_competition(competition_id)?;
        if comp.is_none() {
            tracing::warn!(
                "tenant {} references unknown competition {}",
                shard.tenant_id(),
                competition_id
            );
        }
        self.last = Some((shard.tenant_id(), competition_id.to_string(), comp.clone()));
        Ok(comp)
    }
}

/// Builds billing reports from the registry and the tenant shards.
pub struct BillingAggregator {
    registry: Arc<TenantRegistry>,
    shards: Arc<ShardManager>,
}

impl BillingAggregator {
    pub fn new(registry: Arc<TenantRegistry>, shards: Arc<ShardManager>) -> Self {
        Self { registry, shards }
    }

    /// Up to [`BILLING_PAGE_SIZE`] tenants with id < `before`, id descending.
    ///
    /// Fails as a whole if the directory or any selected shard is unreachable.
    pub fn report(&self, before: Option<i64>) -> Result<Vec<TenantBilling>> {
        let page = select_page(self.registry.list_tenants_desc()?, before);
        let mut billings: Vec<TenantBilling> = page.iter().map(TenantBilling::unbilled).collect();

        let mut shards: HashMap<i64, (usize, Arc<ShardStore>)> = HashMap::with_capacity(page.len());
        for (idx, tenant) in page.iter().enumerate() {
            shards.insert(tenant.id, (idx, self.shards.open(tenant.id)?));
        }

        let mut competitions = CompetitionCache::default();
        let mut scored: HashSet<(i64, String)> = HashSet::new();

        // Scored players, read under each tenant's lock.
        for tenant in &page {
            let (idx, shard) = &shards[&tenant.id];
            let pairs = self
                .shards
                .with_exclusive_lock(tenant.id, || shard.scored_pairs())?;

            for (player_id, competition_id) in pairs {
                let Some(comp) = competitions.resolve(shard, &competition_id)? else {
                    continue;
                };
                if !comp.is_finished() {
                    continue;
                }
                scored.insert((tenant.id, player_id));
                billings[*idx].billing_yen += SCORED_PLAYER_YEN;
            }
        }

        // Visit-only players, from one batched query over the visit log.
        let tenant_ids: Vec<i64> = page.iter().map(|t| t.id).collect();
        for visit in self.registry.earliest_visits(&tenant_ids)? {
            let Some((idx, shard)) = shards.get(&visit.tenant_id) else {
                continue;
            };
            let Some(comp) = competitions.resolve(shard, &visit.competition_id)? else {
                continue;
            };
            let Some(finished_at) = comp.finished_at else {
                continue;
            };
            if visit.min_created_at > finished_at {
                continue;
            }
            if scored.contains(&(visit.tenant_id, visit.player_id)) {
                continue;
            }
            billings[*idx].billing_yen += VISITOR_YEN;
        }

        tracing::debug!("billing report: {} tenants (before={:?})", billings.len(), before);
        Ok(billings)
    }
}
