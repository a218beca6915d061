//! Platform-wide summary figures and the tenant CSV export.

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use liyaqa_core::Money;

use crate::api_keys::ApiKeyService;
use crate::impersonation::ImpersonationService;
use crate::tenancy::{ClientSubscriptionStatus, PricingTier, Tenant, TenantService, TenantStatus};

#[derive(Debug, Clone, Serialize)]
pub struct PlatformSummary {
    pub total_tenants: usize,
    pub tenants_by_status: BTreeMap<TenantStatus, usize>,
    pub tenants_by_tier: BTreeMap<PricingTier, usize>,
    /// Monthly recurring revenue of active tenants with an active subscription.
    pub mrr: Money,
    pub mrr_by_tier: BTreeMap<PricingTier, Money>,
    pub active_api_keys: usize,
    pub active_impersonations: usize,
    pub generated_at: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct PlatformAnalytics {
    tenants: TenantService,
    api_keys: ApiKeyService,
    impersonation: ImpersonationService,
}

impl PlatformAnalytics {
    pub fn new(tenants: TenantService, api_keys: ApiKeyService, impersonation: ImpersonationService) -> Self {
        Self {
            tenants,
            api_keys,
            impersonation,
        }
    }

    pub fn summary(&self, now: DateTime<Utc>) -> PlatformSummary {
        let tenants = self.tenants.all(None);
        let mut by_status = BTreeMap::new();
        let mut by_tier = BTreeMap::new();
        let mut mrr_by_tier: BTreeMap<PricingTier, Money> = BTreeMap::new();
        for tenant in &tenants {
            *by_status.entry(tenant.status).or_insert(0) += 1;
            *by_tier.entry(tenant.tier).or_insert(0) += 1;
            if is_paying(tenant) {
                *mrr_by_tier.entry(tenant.tier).or_insert(Money::ZERO) += tenant.tier.monthly_price();
            }
        }
        PlatformSummary {
            total_tenants: tenants.len(),
            tenants_by_status: by_status,
            tenants_by_tier: by_tier,
            mrr: mrr_by_tier.values().copied().sum(),
            mrr_by_tier,
            active_api_keys: self.api_keys.count_active(now),
            active_impersonations: self.impersonation.count_active(now),
            generated_at: now,
        }
    }

    /// All tenants as RFC 4180 CSV, newest first.
    pub fn export_tenants_csv(&self) -> String {
        let mut csv = String::from(
            "id,facility_name,subdomain,contact_email,status,tier,subscription_status,onboarding_progress,created_at\r\n",
        );
        for tenant in self.tenants.all(None) {
            let row = [
                tenant.id.to_string(),
                tenant.facility_name.clone(),
                tenant.subdomain.clone(),
                tenant.contact_email.clone(),
                label(&tenant.status),
                label(&tenant.tier),
                label(&tenant.subscription_status),
                format!("{:.2}", tenant.onboarding_progress()),
                tenant.created_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            ];
            let cells: Vec<String> = row.iter().map(|cell| escape(cell)).collect();
            csv.push_str(&cells.join(","));
            csv.push_str("\r\n");
        }
        csv
    }
}

fn is_paying(tenant: &Tenant) -> bool {
    tenant.status == TenantStatus::Active
        && tenant.subscription_status == ClientSubscriptionStatus::Active
}

/// Serde name of a unit enum variant.
fn label<T: Serialize>(value: &T) -> String {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::String(s)) => s,
        _ => String::new(),
    }
}

fn escape(cell: &str) -> String {
    if cell.contains(&[',', '"', '\r', '\n'][..]) {
        format!("\"{}\"", cell.replace('"', "\"\""))
    } else {
        cell.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditLogger;
    use crate::impersonation::StartImpersonation;
    use crate::tenancy::tests::{active_tenant, provision};
    use liyaqa_core::config::PlatformConfig;
    use uuid::Uuid;

    fn analytics() -> (PlatformAnalytics, TenantService, ApiKeyService, ImpersonationService) {
        let audit = AuditLogger::new();
        let tenants = TenantService::new(audit.clone());
        let config = PlatformConfig::default();
        let keys = ApiKeyService::new(tenants.clone(), audit.clone(), &config);
        let impersonation = ImpersonationService::new(tenants.clone(), audit, &config);
        (
            PlatformAnalytics::new(tenants.clone(), keys.clone(), impersonation.clone()),
            tenants,
            keys,
            impersonation,
        )
    }

    #[test]
    fn test_summary() {
        let (analytics, tenants, keys, impersonation) = analytics();
        let paying = active_tenant(&tenants, "paying-gym");
        tenants.activate_subscription(paying.id).unwrap();
        let trial = active_tenant(&tenants, "trial-gym");
        provision(&tenants, "new-gym");

        keys.generate(paying.id, "POS", vec![], None, Uuid::new_v4()).unwrap();
        impersonation
            .start(StartImpersonation {
                platform_user_id: Uuid::new_v4(),
                tenant_id: trial.id,
                target_user_id: None,
                reason: "Checking class schedule".into(),
                duration_minutes: None,
            })
            .unwrap();

        let summary = analytics.summary(Utc::now());
        assert_eq!(summary.total_tenants, 3);
        assert_eq!(summary.tenants_by_status[&TenantStatus::Active], 2);
        assert_eq!(summary.tenants_by_status[&TenantStatus::Provisioning], 1);
        assert_eq!(summary.tenants_by_tier[&PricingTier::Professional], 3);
        assert_eq!(summary.mrr, PricingTier::Professional.monthly_price());
        assert_eq!(summary.active_api_keys, 1);
        assert_eq!(summary.active_impersonations, 1);
    }

    #[test]
    fn test_csv_export() {
        let (analytics, tenants, _, _) = analytics();
        provision(&tenants, "csv-gym");
        let csv = analytics.export_tenants_csv();
        let lines: Vec<&str> = csv.split("\r\n").filter(|l| !l.is_empty()).collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("id,facility_name"));
        assert!(lines[1].contains(",csv-gym,test@gym.com,provisioning,professional,trial,12.50,"));
    }

    #[test]
    fn test_escape() {
        assert_eq!(escape("plain"), "plain");
        assert_eq!(escape("Gym, Riyadh"), "\"Gym, Riyadh\"");
        assert_eq!(escape("The \"Best\" Gym"), "\"The \"\"Best\"\" Gym\"");
    }
}
