//! Component-aware refund calculator.
//!
//! Pure arithmetic over resolved inputs: the orchestrator loads payments,
//! fee components, and the tenant's cancellation setting, then calls
//! [`compute_refund`]. Nothing here reads a clock or a store, which keeps the
//! probation and deduction math deterministic under test.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use super::domain::FeeComponent;
use super::policy::{CancellationSetting, CancellationType};

/// Resolved inputs for one refund computation.
#[derive(Debug, Clone)]
pub struct RefundInputs {
    pub cancellation_type: CancellationType,
    pub setting: CancellationSetting,
    /// Components of the application's fee template; may be empty, in which
    /// case the whole paid total is treated as one synthetic component.
    pub components: Vec<FeeComponent>,
    /// Sum of all payments recorded against the application.
    pub total_paid: Decimal,
    /// Whole months elapsed since arrival; zero when not applicable.
    pub months_since_arrival: u32,
    /// Super-admin override replacing the calculated refund.
    pub custom_refund_amount: Option<Decimal>,
    /// Replaces the policy's flat penalty fee.
    pub penalty_fee_override: Option<Decimal>,
    /// A departed candidate forfeits the refund entirely.
    pub candidate_departed: bool,
}

/// Per-component audit line in a refund breakdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentLine {
    pub name: String,
    pub amount: Decimal,
    pub refundable: bool,
    /// Human-readable reason shown on cancellation paperwork.
    pub reason: String,
}

/// Deterministic result of one refund computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefundBreakdown {
    pub cancellation_type: CancellationType,
    pub total_paid: Decimal,
    pub refundable_total: Decimal,
    pub non_refundable_total: Decimal,
    pub penalty_fee: Decimal,
    pub monthly_service_deduction: Decimal,
    pub months_since_arrival: u32,
    /// Policy-derived refund before any super-admin override.
    pub calculated_refund: Decimal,
    pub final_refund: Decimal,
    pub components: Vec<ComponentLine>,
    pub description: String,
}

/// Whole months between arrival and `today`: day difference divided by 30,
/// any partial month counting as a full one.
pub fn months_since_arrival(arrival: NaiveDate, today: NaiveDate) -> u32 {
    let days = (today - arrival).num_days().max(0);
    ((days + 29) / 30) as u32
}

const SYNTHETIC_COMPONENT: &str = "Application Fee";

fn resolved_components(inputs: &RefundInputs) -> Vec<FeeComponent> {
    if inputs.components.is_empty() {
        vec![FeeComponent {
            name: SYNTHETIC_COMPONENT.to_string(),
            amount: inputs.total_paid,
            is_refundable: true,
            refundable_after_arrival: true,
        }]
    } else {
        inputs.components.clone()
    }
}

/// Refundability decision for one component. The post-arrival exclusion takes
/// precedence over the component's generic refundability flag.
fn classify(component: &FeeComponent, inputs: &RefundInputs) -> (bool, String) {
    if inputs.cancellation_type.is_post_arrival() && !component.refundable_after_arrival {
        return (
            false,
            format!("'{}' is not refundable after arrival", component.name),
        );
    }
    if inputs
        .setting
        .non_refundable_components
        .contains(&component.name)
    {
        return (
            false,
            format!(
                "'{}' is non-refundable under the {} policy",
                component.name, inputs.cancellation_type
            ),
        );
    }
    if !component.is_refundable {
        return (false, format!("'{}' is a non-refundable fee", component.name));
    }
    (true, format!("'{}' is refundable", component.name))
}

/// Computes the canonical component-aware refund breakdown.
pub fn compute_refund(inputs: &RefundInputs) -> RefundBreakdown {
    if inputs.cancellation_type == CancellationType::PreArrivalCandidate {
        return full_refund(inputs);
    }

    let mut components = Vec::new();
    let mut refundable_total = Decimal::ZERO;
    let mut non_refundable_total = Decimal::ZERO;

    for component in resolved_components(inputs) {
        let (refundable, reason) = classify(&component, inputs);
        if refundable {
            refundable_total += component.amount;
        } else {
            non_refundable_total += component.amount;
        }
        components.push(ComponentLine {
            name: component.name,
            amount: component.amount,
            refundable,
            reason,
        });
    }

    let penalty_fee = inputs
        .penalty_fee_override
        .unwrap_or(inputs.setting.penalty_fee);
    let monthly_service_deduction =
        Decimal::from(inputs.months_since_arrival) * inputs.setting.monthly_service_fee;

    let mut calculated = refundable_total - penalty_fee - monthly_service_deduction;
    if inputs.setting.refund_percentage < dec!(100) {
        calculated = calculated * inputs.setting.refund_percentage / dec!(100);
    }
    if let Some(cap) = inputs.setting.max_refund_amount {
        calculated = calculated.min(cap);
    }
    calculated = calculated.max(Decimal::ZERO);

    let final_refund = resolve_final(inputs, calculated);

    let description = describe(
        inputs,
        refundable_total,
        non_refundable_total,
        penalty_fee,
        monthly_service_deduction,
        final_refund,
    );

    RefundBreakdown {
        cancellation_type: inputs.cancellation_type,
        total_paid: inputs.total_paid,
        refundable_total,
        non_refundable_total,
        penalty_fee,
        monthly_service_deduction,
        months_since_arrival: inputs.months_since_arrival,
        calculated_refund: calculated,
        final_refund,
        components,
        description,
    }
}

/// Candidate-initiated pre-arrival cancellation: everything the client paid
/// comes back, regardless of component flags, with no deductions.
fn full_refund(inputs: &RefundInputs) -> RefundBreakdown {
    let components = resolved_components(inputs)
        .into_iter()
        .map(|component| ComponentLine {
            name: component.name,
            amount: component.amount,
            refundable: true,
            reason: "fully refundable: candidate cancelled before arrival".to_string(),
        })
        .collect();

    let mut calculated = inputs.total_paid;
    if let Some(cap) = inputs.setting.max_refund_amount {
        calculated = calculated.min(cap);
    }
    calculated = calculated.max(Decimal::ZERO);

    let final_refund = resolve_final(inputs, calculated);

    RefundBreakdown {
        cancellation_type: inputs.cancellation_type,
        total_paid: inputs.total_paid,
        refundable_total: inputs.total_paid,
        non_refundable_total: Decimal::ZERO,
        penalty_fee: Decimal::ZERO,
        monthly_service_deduction: Decimal::ZERO,
        months_since_arrival: inputs.months_since_arrival,
        calculated_refund: calculated,
        final_refund,
        components,
        description: format!(
            "Candidate cancelled before arrival: full refund of {} owed to the client.",
            calculated
        ),
    }
}

fn resolve_final(inputs: &RefundInputs, calculated: Decimal) -> Decimal {
    if let Some(custom) = inputs.custom_refund_amount {
        return custom;
    }
    if inputs.candidate_departed {
        return Decimal::ZERO;
    }
    calculated
}

fn describe(
    inputs: &RefundInputs,
    refundable_total: Decimal,
    non_refundable_total: Decimal,
    penalty_fee: Decimal,
    monthly_service_deduction: Decimal,
    final_refund: Decimal,
) -> String {
    let mut parts = vec![format!(
        "Cancellation ({}): total paid {}, refundable {}, non-refundable {}",
        inputs.cancellation_type, inputs.total_paid, refundable_total, non_refundable_total
    )];
    if penalty_fee > Decimal::ZERO {
        parts.push(format!("penalty fee {penalty_fee}"));
    }
    if monthly_service_deduction > Decimal::ZERO {
        parts.push(format!(
            "monthly service charge {} ({} month(s))",
            monthly_service_deduction, inputs.months_since_arrival
        ));
    }
    if inputs.setting.refund_percentage < dec!(100) {
        parts.push(format!(
            "refund percentage {}%",
            inputs.setting.refund_percentage
        ));
    }
    if inputs.candidate_departed && inputs.custom_refund_amount.is_none() {
        parts.push("candidate departed: refund forfeited".to_string());
    }
    if inputs.custom_refund_amount.is_some() {
        parts.push("refund amount set manually".to_string());
    }
    parts.push(format!("final refund {final_refund}"));
    parts.join("; ")
}
