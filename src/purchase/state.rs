//! Purchase attempt states and the transitions between them.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use std::fmt;
use tracing::info;

/// Where a purchase attempt stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PurchaseState {
    /// Request built, hashed and signed.
    Drafted,
    /// Request sent to the selected supernode.
    QuoteRequested,
    /// Preliminary quote received and validated.
    QuoteReceived,
    /// Supernode refused the request.
    Rejected,
    /// Quote accepted and the agreement sent.
    PriceAgreed,
    /// Burn transaction submitted.
    Paid,
    /// Burn confirmation sent.
    ConfirmationSent,
    /// Waiting on a status report.
    StatusPending,
    /// Status not completed; a fallback supernode is needed.
    RetryNeeded,
    /// Credit pack stored and registered.
    Completed,
    /// Attempt ended without a credit pack.
    Terminal,
}

impl PurchaseState {
    /// Whether no further transition is possible.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Rejected | Self::Completed | Self::Terminal)
    }

    /// Whether the attempt may move from `self` to `next`.
    #[must_use]
    pub fn can_advance_to(self, next: Self) -> bool {
        use PurchaseState::{
            Completed, ConfirmationSent, Drafted, Paid, PriceAgreed, QuoteReceived,
            QuoteRequested, Rejected, RetryNeeded, StatusPending, Terminal,
        };
        if next == Terminal {
            return !self.is_terminal();
        }
        matches!(
            (self, next),
            (Drafted, QuoteRequested)
                | (QuoteRequested, QuoteReceived | Rejected)
                | (QuoteReceived, PriceAgreed)
                | (PriceAgreed, Paid)
                | (Paid, ConfirmationSent)
                | (ConfirmationSent | StatusPending | RetryNeeded, Completed)
                | (ConfirmationSent, StatusPending)
                | (StatusPending, RetryNeeded)
        )
    }
}

impl fmt::Display for PurchaseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Drafted => "drafted",
            Self::QuoteRequested => "quote requested",
            Self::QuoteReceived => "quote received",
            Self::Rejected => "rejected",
            Self::PriceAgreed => "price agreed",
            Self::Paid => "paid",
            Self::ConfirmationSent => "confirmation sent",
            Self::StatusPending => "status pending",
            Self::RetryNeeded => "retry needed",
            Self::Completed => "completed",
            Self::Terminal => "terminal",
        };
        f.write_str(name)
    }
}

/// A state entered at a point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    /// State entered.
    pub state: PurchaseState,
    /// When it was entered.
    pub at: DateTime<Utc>,
}

/// Ordered record of the states one attempt passed through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseTrace {
    label: String,
    transitions: Vec<Transition>,
}

impl PurchaseTrace {
    /// Start a trace in [`PurchaseState::Drafted`]. `label` tags log lines,
    /// typically the request hash.
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        let label = label.into();
        info!("Purchase {label}: {}", PurchaseState::Drafted);
        Self {
            label,
            transitions: vec![Transition {
                state: PurchaseState::Drafted,
                at: Utc::now(),
            }],
        }
    }

    /// Current state.
    #[must_use]
    pub fn current(&self) -> PurchaseState {
        self.transitions
            .last()
            .map_or(PurchaseState::Drafted, |t| t.state)
    }

    /// Enter `next`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTransition`] if `next` does not follow the
    /// current state.
    pub fn advance(&mut self, next: PurchaseState) -> Result<()> {
        let current = self.current();
        if !current.can_advance_to(next) {
            return Err(Error::InvalidTransition(format!(
                "{current} -> {next} for {}",
                self.label
            )));
        }
        info!("Purchase {}: {current} -> {next}", self.label);
        self.transitions.push(Transition {
            state: next,
            at: Utc::now(),
        });
        Ok(())
    }

    /// States entered so far, oldest first.
    #[must_use]
    pub fn states(&self) -> Vec<PurchaseState> {
        self.transitions.iter().map(|t| t.state).collect()
    }

    /// Full transition log.
    #[must_use]
    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    /// Whether the attempt ever reached `state`.
    #[must_use]
    pub fn reached(&self, state: PurchaseState) -> bool {
        self.transitions.iter().any(|t| t.state == state)
    }
}
