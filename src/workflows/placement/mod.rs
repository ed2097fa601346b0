//! Placement application lifecycle: state machine, cancellation/refund
//! engine, guarantor changes, and the append-only audit trail.

pub mod domain;
pub mod guarantor;
pub mod history;
pub mod memory;
pub mod policy;
pub mod refund;
pub mod repository;
pub mod router;
pub mod service;
pub mod state;

#[cfg(test)]
mod tests;

pub use domain::{
    Application, ApplicationId, ApplicationStatus, ApplicationType, Candidate, CandidateId,
    CandidateStatus, ClientId, Clock, Cost, DocumentChecklistItem, FeeComponent, FeeTemplate,
    FeeTemplateId, GuarantorChange, GuarantorChangeId, Payment, SystemClock, TenantId,
};
pub use guarantor::{CandidateSituation, GuarantorChangeService, InitiateGuarantorChangeRequest};
pub use history::{
    HistoryFilter, HistoryPage, HistoryRecorder, LifecycleAction, LifecycleEntry,
    LifecycleSummary, TenantHistoryStats,
};
pub use memory::MemoryPlacementStore;
pub use policy::{
    CancellationSetting, CancellationType, GuarantorRefundPolicy, InMemoryPolicyStore,
    LawyerServicePricing, PolicyError, PolicyStore,
};
pub use refund::{compute_refund, months_since_arrival, ComponentLine, RefundBreakdown, RefundInputs};
pub use repository::{PlacementStore, PlacementTx, RepositoryError};
pub use router::{placement_router, PlacementRouterState};
pub use service::{
    CancellationOptions, CancellationOutcome, CancellationRequest, FinancialImpact,
    PlacementError, PlacementLifecycleService, TransitionRequest,
};
