//! Point-in-time view of slot accounting

use serde::Serialize;

use crate::tenant::TenantId;

/// Backlog load status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadStatus {
    /// Less than 75% of the backlog in use
    Normal,
    /// At least 75% of the backlog in use
    Warning,
    /// At least 90% of the backlog in use
    Critical,
}

impl LoadStatus {
    fn from_usage(in_use: usize, limit: usize) -> Self {
        if limit == 0 {
            return LoadStatus::Critical;
        }
        let percent = (in_use as f64 / limit as f64) * 100.0;
        if percent >= 90.0 {
            LoadStatus::Critical
        } else if percent >= 75.0 {
            LoadStatus::Warning
        } else {
            LoadStatus::Normal
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TenantStats {
    pub tenant_id: TenantId,
    pub in_flight_limit: usize,
    /// Free in-flight slots. `in_flight_limit - in_flight_available` are held.
    pub in_flight_available: usize,
    /// Requests waiting in the tenant queue (not counting one the dispatcher holds)
    pub queued: usize,
}

impl TenantStats {
    pub fn in_flight_held(&self) -> usize {
        self.in_flight_limit - self.in_flight_available
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ThrottleStats {
    pub backlog_limit: usize,
    /// Free backlog tickets. Tickets held by queued, executing, or
    /// abandoned-but-not-yet-repaired requests are not counted.
    pub backlog_available: usize,
    pub load_status: LoadStatus,
    pub tenants: Vec<TenantStats>,
}

impl ThrottleStats {
    pub(crate) fn new(backlog_limit: usize, backlog_available: usize, tenants: Vec<TenantStats>) -> Self {
        Self {
            backlog_limit,
            backlog_available,
            load_status: LoadStatus::from_usage(backlog_limit - backlog_available, backlog_limit),
            tenants,
        }
    }

    pub fn backlog_in_use(&self) -> usize {
        self.backlog_limit - self.backlog_available
    }

    /// True when every slot in every pool is back where it started
    pub fn is_idle(&self) -> bool {
        self.backlog_available == self.backlog_limit
            && self
                .tenants
                .iter()
                .all(|t| t.in_flight_available == t.in_flight_limit && t.queued == 0)
    }

    pub fn tenant(&self, tenant: TenantId) -> Option<&TenantStats> {
        self.tenants.iter().find(|t| t.tenant_id == tenant)
    }
}
