//! Credit purchase wizard: pick a package, enter a card, charge, credit.

use log::{info, warn};
use thiserror::Error;

use crate::api::client::ApiClient;
use crate::api::models::{CreditPackage, CreditShortfall, PaymentConfirmation};
use crate::api::stripe::{CardDetails, CardProcessor};
use crate::error::{ApiError, Result};

#[derive(Debug, Error)]
pub enum PurchaseError {
    /// Creating the intent failed; nothing was charged.
    #[error("{}", .0.user_message())]
    Intent(ApiError),

    #[error("{0}")]
    Declined(String),

    #[error("Payment was not completed (status: {0})")]
    Incomplete(String),

    /// The card was charged but our backend did not credit the account.
    #[error("Payment succeeded but failed to add credits: {}", .0.user_message())]
    NotCredited(ApiError),
}

/// Create intent, confirm the card with the processor, then confirm with
/// the backend so it credits the account.
pub async fn purchase(
    client: &ApiClient,
    processor: &dyn CardProcessor,
    package: &CreditPackage,
    card: &CardDetails,
) -> std::result::Result<PaymentConfirmation, PurchaseError> {
    let intent = client
        .create_payment_intent(package.credits)
        .await
        .map_err(PurchaseError::Intent)?;
    let charge = processor
        .confirm_card(&intent, card)
        .await
        .map_err(PurchaseError::Declined)?;
    if !charge.succeeded() {
        return Err(PurchaseError::Incomplete(charge.status));
    }
    let confirmation = client
        .confirm_payment(&charge.payment_intent_id)
        .await
        .map_err(PurchaseError::NotCredited)?;
    info!("purchased {} credits, balance now {}", confirmation.credits_added, confirmation.new_balance);
    Ok(confirmation)
}

#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Loading,
    ChoosePackage,
    EnterCard { package: CreditPackage, error: Option<String> },
    Processing { package: CreditPackage },
    Completed(PaymentConfirmation),
}

#[derive(Debug)]
pub struct PaymentFlow {
    packages: Vec<CreditPackage>,
    step: Step,
    shortfall: Option<CreditShortfall>,
}

impl PaymentFlow {
    /// `shortfall` is set when the flow was opened by a 402 from chat.
    pub fn new(shortfall: Option<CreditShortfall>) -> Self {
        Self { packages: Vec::new(), step: Step::Loading, shortfall }
    }

    pub fn step(&self) -> &Step {
        &self.step
    }

    pub fn packages(&self) -> &[CreditPackage] {
        &self.packages
    }

    pub fn shortfall(&self) -> Option<&CreditShortfall> {
        self.shortfall.as_ref()
    }

    /// Headline shown above the catalogue.
    pub fn headline(&self) -> String {
        match &self.shortfall {
            Some(s) if !s.message.is_empty() => s.message.clone(),
            Some(s) => format!("You have {} credits left.", s.current_balance),
            None => "Choose a credit package".to_string(),
        }
    }

    /// When opened from a 402 whose suggested amount matches a package, that
    /// package is preselected.
    pub fn apply_packages(&mut self, result: Result<Vec<CreditPackage>>) -> Result<()> {
        let outcome = match result {
            Ok(packages) => {
                self.packages = packages;
                Ok(())
            }
            Err(e) => {
                warn!("failed to load packages: {e}");
                Err(e)
            }
        };
        let suggested = self
            .shortfall
            .as_ref()
            .and_then(|s| self.packages.iter().find(|p| p.credits == s.suggested_purchase))
            .cloned();
        self.step = match suggested {
            Some(package) => Step::EnterCard { package, error: None },
            None => Step::ChoosePackage,
        };
        outcome
    }

    pub fn select(&mut self, index: usize) -> Option<&CreditPackage> {
        let package = self.packages.get(index)?.clone();
        self.step = Step::EnterCard { package, error: None };
        self.packages.get(index)
    }

    /// Back from the card step to the catalogue.
    pub fn back(&mut self) {
        if matches!(self.step, Step::EnterCard { .. }) {
            self.step = Step::ChoosePackage;
        }
    }

    /// Validates the card and moves to processing. Returns what to charge, or
    /// `None` when the form is invalid (the error is shown on the card step)
    /// or a charge is already running.
    pub fn begin_purchase(&mut self, number: &str, expiry: &str, cvc: &str) -> Option<(CreditPackage, CardDetails)> {
        let package = match &self.step {
            Step::EnterCard { package, .. } => package.clone(),
            _ => return None,
        };
        match CardDetails::parse(number, expiry, cvc) {
            Ok(card) => {
                self.step = Step::Processing { package: package.clone() };
                Some((package, card))
            }
            Err(msg) => {
                self.step = Step::EnterCard { package, error: Some(msg) };
                None
            }
        }
    }

    pub fn finish_purchase(&mut self, result: std::result::Result<PaymentConfirmation, PurchaseError>) {
        let package = match &self.step {
            Step::Processing { package } => package.clone(),
            _ => return,
        };
        self.step = match result {
            Ok(confirmation) => Step::Completed(confirmation),
            Err(e) => {
                warn!("purchase failed: {e}");
                Step::EnterCard { package, error: Some(e.to_string()) }
            }
        };
    }

    pub fn is_completed(&self) -> bool {
        matches!(self.step, Step::Completed(_))
    }
}
