//! Client-side confirmation of a PaymentIntent against Stripe, the step the
//! hosted card widget performs in a browser.

use async_trait::async_trait;
use chrono::{Datelike, Local, NaiveDate};
use log::{debug, warn};
use serde::Deserialize;

use crate::api::models::PaymentIntent;

pub const STRIPE_API_BASE: &str = "https://api.stripe.com";

/// Card fields as typed into the purchase form, already validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardDetails {
    pub number: String,
    pub exp_month: u8,
    pub exp_year: u16,
    pub cvc: String,
}

impl CardDetails {
    /// Validates the three form fields. `expiry` is `MM/YY` or `MM/YYYY` and
    /// must not be before the current month.
    pub fn parse(number: &str, expiry: &str, cvc: &str) -> Result<Self, String> {
        Self::parse_at(number, expiry, cvc, Local::now().date_naive())
    }

    fn parse_at(number: &str, expiry: &str, cvc: &str, today: NaiveDate) -> Result<Self, String> {
        let number: String = number.chars().filter(|c| !c.is_whitespace() && *c != '-').collect();
        if number.len() < 12 || number.len() > 19 || !number.chars().all(|c| c.is_ascii_digit()) {
            return Err("Card number is incomplete.".into());
        }
        if !luhn_valid(&number) {
            return Err("Card number is invalid.".into());
        }

        let (month, year) = expiry
            .trim()
            .split_once('/')
            .ok_or_else(|| "Expiry date must look like MM/YY.".to_string())?;
        let exp_month: u8 = month.trim().parse().map_err(|_| "Expiry month is invalid.".to_string())?;
        if !(1..=12).contains(&exp_month) {
            return Err("Expiry month is invalid.".into());
        }
        let year = year.trim();
        let exp_year: u16 = match (year.len(), year.parse::<u16>()) {
            (2, Ok(y)) => 2000 + y,
            (4, Ok(y)) => y,
            _ => return Err("Expiry year is invalid.".into()),
        };
        if (i32::from(exp_year), u32::from(exp_month)) < (today.year(), today.month()) {
            return Err("Card has expired.".into());
        }

        let cvc = cvc.trim();
        if !(3..=4).contains(&cvc.len()) || !cvc.chars().all(|c| c.is_ascii_digit()) {
            return Err("CVC is invalid.".into());
        }

        Ok(Self { number, exp_month, exp_year, cvc: cvc.to_string() })
    }

    pub fn last4(&self) -> &str {
        &self.number[self.number.len() - 4..]
    }
}

fn luhn_valid(digits: &str) -> bool {
    let mut sum = 0u32;
    for (i, c) in digits.chars().rev().enumerate() {
        let Some(mut d) = c.to_digit(10) else { return false };
        if i % 2 == 1 {
            d *= 2;
            if d > 9 {
                d -= 9;
            }
        }
        sum += d;
    }
    sum % 10 == 0
}

/// Outcome of a client-side confirmation that the processor accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmedCharge {
    pub payment_intent_id: String,
    pub status: String,
}

impl ConfirmedCharge {
    pub fn succeeded(&self) -> bool {
        self.status == "succeeded"
    }
}

/// The external card processor. Errors are the processor's own message,
/// shown to the user verbatim.
#[async_trait]
pub trait CardProcessor: Send + Sync {
    async fn confirm_card(&self, intent: &PaymentIntent, card: &CardDetails) -> Result<ConfirmedCharge, String>;
}

pub struct StripeCardProcessor {
    http: reqwest::Client,
    publishable_key: String,
    api_base: String,
}

#[derive(Deserialize)]
struct IntentBody {
    id: String,
    status: String,
}

#[derive(Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Deserialize)]
struct StripeErrorDetail {
    #[serde(default)]
    message: Option<String>,
}

impl StripeCardProcessor {
    pub fn new(publishable_key: impl Into<String>) -> Self {
        Self::with_api_base(publishable_key, STRIPE_API_BASE)
    }

    pub fn with_api_base(publishable_key: impl Into<String>, api_base: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            publishable_key: publishable_key.into(),
            api_base: api_base.trim_end_matches('/').to_string(),
        }
    }

    /// The intent id is the part of the client secret before `_secret_`.
    fn intent_id(intent: &PaymentIntent) -> String {
        if !intent.payment_intent_id.is_empty() {
            return intent.payment_intent_id.clone();
        }
        intent
            .client_secret
            .split("_secret_")
            .next()
            .unwrap_or_default()
            .to_string()
    }
}

#[async_trait]
impl CardProcessor for StripeCardProcessor {
    async fn confirm_card(&self, intent: &PaymentIntent, card: &CardDetails) -> Result<ConfirmedCharge, String> {
        let id = Self::intent_id(intent);
        let url = format!("{}/v1/payment_intents/{}/confirm", self.api_base, id);
        debug!("confirming payment intent {id} with card ending {}", card.last4());
        let exp_month = card.exp_month.to_string();
        let exp_year = card.exp_year.to_string();
        let form = [
            ("client_secret", intent.client_secret.as_str()),
            ("payment_method_data[type]", "card"),
            ("payment_method_data[card][number]", card.number.as_str()),
            ("payment_method_data[card][exp_month]", exp_month.as_str()),
            ("payment_method_data[card][exp_year]", exp_year.as_str()),
            ("payment_method_data[card][cvc]", card.cvc.as_str()),
        ];
        let resp = self
            .http
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.publishable_key))
            .form(&form)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        let status = resp.status();
        let text = resp.text().await.map_err(|e| e.to_string())?;
        if !status.is_success() {
            let message = serde_json::from_str::<StripeErrorBody>(&text)
                .ok()
                .and_then(|b| b.error.message)
                .unwrap_or_else(|| "Payment failed".to_string());
            warn!("card confirmation declined: {message}");
            return Err(message);
        }
        let body: IntentBody = serde_json::from_str(&text).map_err(|e| e.to_string())?;
        Ok(ConfirmedCharge { payment_intent_id: body.id, status: body.status })
    }
}
