//! Per-tenant cancellation policy data and the read-only store that
//! resolves it for the refund calculator.

use std::collections::{BTreeSet, HashMap};
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use super::domain::{ApplicationStatus, FeeTemplate, FeeTemplateId, TenantId};

/// Policy key selecting which `CancellationSetting` governs a cancellation.
///
/// A closed set: every variant has a handler in the refund calculator, so an
/// "unknown strategy" runtime path cannot exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CancellationType {
    #[serde(rename = "pre_arrival_client")]
    PreArrivalClient,
    #[serde(rename = "pre_arrival_candidate")]
    PreArrivalCandidate,
    #[serde(rename = "post_arrival_within_3_months")]
    PostArrivalWithin3Months,
    #[serde(rename = "post_arrival_after_3_months")]
    PostArrivalAfter3Months,
    #[serde(rename = "candidate_cancellation")]
    CandidateCancellation,
}

impl CancellationType {
    pub const ALL: [CancellationType; 5] = [
        Self::PreArrivalClient,
        Self::PreArrivalCandidate,
        Self::PostArrivalWithin3Months,
        Self::PostArrivalAfter3Months,
        Self::CandidateCancellation,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            Self::PreArrivalClient => "pre_arrival_client",
            Self::PreArrivalCandidate => "pre_arrival_candidate",
            Self::PostArrivalWithin3Months => "post_arrival_within_3_months",
            Self::PostArrivalAfter3Months => "post_arrival_after_3_months",
            Self::CandidateCancellation => "candidate_cancellation",
        }
    }

    /// The application status this cancellation family lands in.
    pub fn target_status(&self) -> ApplicationStatus {
        match self {
            Self::PreArrivalClient | Self::PreArrivalCandidate => {
                ApplicationStatus::CancelledPreArrival
            }
            Self::PostArrivalWithin3Months | Self::PostArrivalAfter3Months => {
                ApplicationStatus::CancelledPostArrival
            }
            Self::CandidateCancellation => ApplicationStatus::CancelledByCandidate,
        }
    }

    /// Whether the component-level `refundable_after_arrival` exclusion
    /// applies to this type.
    pub fn is_post_arrival(&self) -> bool {
        matches!(
            self,
            Self::PostArrivalWithin3Months
                | Self::PostArrivalAfter3Months
                | Self::CandidateCancellation
        )
    }
}

impl std::fmt::Display for CancellationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for CancellationType {
    type Err = UnknownCancellationType;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pre_arrival_client" => Ok(Self::PreArrivalClient),
            "pre_arrival_candidate" => Ok(Self::PreArrivalCandidate),
            "post_arrival_within_3_months" => Ok(Self::PostArrivalWithin3Months),
            "post_arrival_after_3_months" => Ok(Self::PostArrivalAfter3Months),
            "candidate_cancellation" => Ok(Self::CandidateCancellation),
            // The retired undifferentiated key is rejected rather than
            // re-derived from dates; callers must pick the explicit bucket.
            "post_arrival" => Err(UnknownCancellationType::RetiredAlias),
            other => Err(UnknownCancellationType::Unknown(other.to_string())),
        }
    }
}

/// Parse failure for a cancellation-type key.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UnknownCancellationType {
    #[error(
        "'post_arrival' is no longer accepted; use 'post_arrival_within_3_months' \
         or 'post_arrival_after_3_months'"
    )]
    RetiredAlias,
    #[error("unknown cancellation type '{0}'")]
    Unknown(String),
}

/// Per-tenant, per-type cancellation policy. Unique per (tenant, type).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancellationSetting {
    pub tenant_id: TenantId,
    pub cancellation_type: CancellationType,
    /// Flat fee deducted from the refundable amount.
    pub penalty_fee: Decimal,
    /// Portion of the post-deduction refund actually returned, 0-100.
    pub refund_percentage: Decimal,
    /// Component names that are categorically non-refundable for this type.
    pub non_refundable_components: BTreeSet<String>,
    /// Charged once per elapsed month after arrival.
    pub monthly_service_fee: Decimal,
    /// Cap on the final refund; never extends it.
    pub max_refund_amount: Option<Decimal>,
    pub active: bool,
}

impl CancellationSetting {
    /// Validation applied at the policy-write boundary, never at read time.
    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.refund_percentage < Decimal::ZERO || self.refund_percentage > dec!(100) {
            return Err(PolicyError::InvalidSetting {
                cancellation_type: self.cancellation_type,
                detail: format!(
                    "refund_percentage must be between 0 and 100, got {}",
                    self.refund_percentage
                ),
            });
        }
        for (field, value) in [
            ("penalty_fee", self.penalty_fee),
            ("monthly_service_fee", self.monthly_service_fee),
        ] {
            if value < Decimal::ZERO {
                return Err(PolicyError::InvalidSetting {
                    cancellation_type: self.cancellation_type,
                    detail: format!("{field} must not be negative, got {value}"),
                });
            }
        }
        if let Some(cap) = self.max_refund_amount {
            if cap < Decimal::ZERO {
                return Err(PolicyError::InvalidSetting {
                    cancellation_type: self.cancellation_type,
                    detail: format!("max_refund_amount must not be negative, got {cap}"),
                });
            }
        }
        Ok(())
    }
}

/// Refund percentages for the guarantor-change heuristic, keyed by where the
/// candidate currently is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuarantorRefundPolicy {
    pub abroad_percentage: Decimal,
    pub in_country_under_3_months_percentage: Decimal,
    pub in_country_over_3_months_percentage: Decimal,
}

impl Default for GuarantorRefundPolicy {
    fn default() -> Self {
        Self {
            abroad_percentage: dec!(100),
            in_country_under_3_months_percentage: dec!(50),
            in_country_over_3_months_percentage: dec!(25),
        }
    }
}

/// Lawyer-service price list for a tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LawyerServicePricing {
    pub registration_fee: Decimal,
    pub renewal_fee: Decimal,
}

impl Default for LawyerServicePricing {
    fn default() -> Self {
        Self {
            registration_fee: dec!(250),
            renewal_fee: dec!(150),
        }
    }
}

/// Errors raised while resolving or validating policy data.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PolicyError {
    #[error("no active cancellation setting for type '{cancellation_type}'")]
    SettingMissing { cancellation_type: CancellationType },
    #[error("fee template {0:?} not found for tenant")]
    TemplateMissing(FeeTemplateId),
    #[error("no in-country fee template configured for tenant")]
    InCountryTemplateMissing,
    #[error("invalid cancellation setting for '{cancellation_type}': {detail}")]
    InvalidSetting {
        cancellation_type: CancellationType,
        detail: String,
    },
}

/// Read-only accessor over per-tenant policy configuration.
///
/// Resolution failures surface as errors; a missing policy must hard-fail the
/// calculation rather than default to zeroes.
pub trait PolicyStore: Send + Sync {
    /// The active setting for (tenant, type). Inactive settings do not resolve.
    fn cancellation_setting(
        &self,
        tenant: &TenantId,
        cancellation_type: CancellationType,
    ) -> Result<CancellationSetting, PolicyError>;

    fn fee_template(
        &self,
        tenant: &TenantId,
        id: &FeeTemplateId,
    ) -> Result<FeeTemplate, PolicyError>;

    /// Pricing template applied to candidates already in the country
    /// (guarantor-change applications).
    fn in_country_fee_template(&self, tenant: &TenantId) -> Result<FeeTemplate, PolicyError>;

    /// Flat cost booked when a cancellation requests deportation.
    fn deportation_cost(&self, tenant: &TenantId) -> Decimal;

    fn guarantor_refund_policy(&self, tenant: &TenantId) -> GuarantorRefundPolicy;

    fn lawyer_service_pricing(&self, tenant: &TenantId) -> LawyerServicePricing;
}

#[derive(Default)]
struct PolicyState {
    settings: HashMap<(TenantId, CancellationType), CancellationSetting>,
    templates: HashMap<(TenantId, FeeTemplateId), FeeTemplate>,
    in_country_templates: HashMap<TenantId, FeeTemplateId>,
    deportation_costs: HashMap<TenantId, Decimal>,
    guarantor_policies: HashMap<TenantId, GuarantorRefundPolicy>,
    lawyer_pricing: HashMap<TenantId, LawyerServicePricing>,
}

/// In-memory `PolicyStore` used by the service binary and tests.
#[derive(Default, Clone)]
pub struct InMemoryPolicyStore {
    state: Arc<Mutex<PolicyState>>,
}

impl InMemoryPolicyStore {
    pub fn upsert_setting(&self, setting: CancellationSetting) -> Result<(), PolicyError> {
        setting.validate()?;
        let mut state = self.state.lock().expect("policy mutex poisoned");
        state.settings.insert(
            (setting.tenant_id.clone(), setting.cancellation_type),
            setting,
        );
        Ok(())
    }

    pub fn upsert_template(&self, template: FeeTemplate) {
        let mut state = self.state.lock().expect("policy mutex poisoned");
        state
            .templates
            .insert((template.tenant_id.clone(), template.id.clone()), template);
    }

    pub fn set_in_country_template(&self, tenant: TenantId, template: FeeTemplateId) {
        let mut state = self.state.lock().expect("policy mutex poisoned");
        state.in_country_templates.insert(tenant, template);
    }

    pub fn set_deportation_cost(&self, tenant: TenantId, cost: Decimal) {
        let mut state = self.state.lock().expect("policy mutex poisoned");
        state.deportation_costs.insert(tenant, cost);
    }

    pub fn set_guarantor_refund_policy(&self, tenant: TenantId, policy: GuarantorRefundPolicy) {
        let mut state = self.state.lock().expect("policy mutex poisoned");
        state.guarantor_policies.insert(tenant, policy);
    }

    pub fn set_lawyer_service_pricing(&self, tenant: TenantId, pricing: LawyerServicePricing) {
        let mut state = self.state.lock().expect("policy mutex poisoned");
        state.lawyer_pricing.insert(tenant, pricing);
    }
}

/// Default deportation cost applied when a tenant has not configured one.
pub const DEFAULT_DEPORTATION_COST: Decimal = dec!(500);

impl PolicyStore for InMemoryPolicyStore {
    fn cancellation_setting(
        &self,
        tenant: &TenantId,
        cancellation_type: CancellationType,
    ) -> Result<CancellationSetting, PolicyError> {
        let state = self.state.lock().expect("policy mutex poisoned");
        state
            .settings
            .get(&(tenant.clone(), cancellation_type))
            .filter(|setting| setting.active)
            .cloned()
            .ok_or(PolicyError::SettingMissing { cancellation_type })
    }

    fn fee_template(
        &self,
        tenant: &TenantId,
        id: &FeeTemplateId,
    ) -> Result<FeeTemplate, PolicyError> {
        let state = self.state.lock().expect("policy mutex poisoned");
        state
            .templates
            .get(&(tenant.clone(), id.clone()))
            .cloned()
            .ok_or_else(|| PolicyError::TemplateMissing(id.clone()))
    }

    fn in_country_fee_template(&self, tenant: &TenantId) -> Result<FeeTemplate, PolicyError> {
        let state = self.state.lock().expect("policy mutex poisoned");
        let id = state
            .in_country_templates
            .get(tenant)
            .ok_or(PolicyError::InCountryTemplateMissing)?;
        state
            .templates
            .get(&(tenant.clone(), id.clone()))
            .cloned()
            .ok_or_else(|| PolicyError::TemplateMissing(id.clone()))
    }

    fn deportation_cost(&self, tenant: &TenantId) -> Decimal {
        let state = self.state.lock().expect("policy mutex poisoned");
        state
            .deportation_costs
            .get(tenant)
            .copied()
            .unwrap_or(DEFAULT_DEPORTATION_COST)
    }

    fn guarantor_refund_policy(&self, tenant: &TenantId) -> GuarantorRefundPolicy {
        let state = self.state.lock().expect("policy mutex poisoned");
        state
            .guarantor_policies
            .get(tenant)
            .cloned()
            .unwrap_or_default()
    }

    fn lawyer_service_pricing(&self, tenant: &TenantId) -> LawyerServicePricing {
        let state = self.state.lock().expect("policy mutex poisoned");
        state
            .lawyer_pricing
            .get(tenant)
            .cloned()
            .unwrap_or_default()
    }
}
