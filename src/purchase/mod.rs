//! Credit pack purchase negotiation and storage fallback.

pub mod negotiator;
pub mod pricing;
pub mod retry;
pub mod state;

pub use negotiator::{
    PurchaseContext, PurchaseNegotiator, PurchaseOutcome, PurchaseReceipt, PurchaseReport,
};
pub use pricing::{burn_amount, evaluate_quote, PriceCeilings, QuoteEvaluation, ResolvedCeilings};
pub use retry::RetryCoordinator;
pub use state::{PurchaseState, PurchaseTrace, Transition};
