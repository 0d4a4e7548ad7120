use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Ai,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    #[default]
    Text,
    Image,
}

/// One transcript entry. For `Image` messages `content` is the image URL.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub timestamp: String,
    #[serde(rename = "type", default)]
    pub kind: MessageKind,
}

impl Message {
    /// A locally authored message stamped with the current UTC time.
    pub fn local(role: Role, kind: MessageKind, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            kind,
        }
    }

    /// `HH:MM` in local time, or an empty string when the server sent
    /// something unparseable.
    pub fn time_label(&self) -> String {
        use chrono::{DateTime, Local, NaiveDateTime};
        if let Ok(dt) = DateTime::parse_from_rfc3339(&self.timestamp) {
            return dt.with_timezone(&Local).format("%H:%M").to_string();
        }
        // naive timestamps from the backend are UTC
        NaiveDateTime::parse_from_str(&self.timestamp, "%Y-%m-%dT%H:%M:%S%.f")
            .map(|n| n.and_utc().with_timezone(&Local).format("%H:%M").to_string())
            .unwrap_or_default()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub last_message: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub message_count: u32,
}

impl Session {
    pub fn preview(&self) -> &str {
        if self.last_message.is_empty() { "No messages yet" } else { &self.last_message }
    }
}

#[derive(Debug, Deserialize)]
pub struct SessionList {
    pub sessions: Vec<Session>,
}

#[derive(Debug, Deserialize)]
pub struct CreatedSession {
    pub session_id: String,
}

#[derive(Debug, Deserialize)]
pub struct History {
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub messages: Vec<Message>,
}

#[derive(Debug, Serialize, Default)]
pub struct ChatRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatReply {
    pub reply: Message,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
}

#[derive(Debug, Deserialize)]
pub struct UploadResponse {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
pub struct Usage {
    #[serde(default)]
    pub credits_used: i64,
    #[serde(default)]
    pub credits_available: i64,
    #[serde(default)]
    pub total_credits_purchased: i64,
}

pub const LOW_BALANCE_THRESHOLD: i64 = 100;

impl Usage {
    pub fn is_low(&self) -> bool {
        self.credits_available < LOW_BALANCE_THRESHOLD
    }

    /// Fill level of the balance bar, in `0.0..=1.0`.
    pub fn fill_fraction(&self) -> f64 {
        let scale = self.total_credits_purchased.max(1000) as f64;
        (self.credits_available.max(0) as f64 / scale).min(1.0)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct CreditPackage {
    pub credits: u32,
    pub price_gbp: f64,
    #[serde(default)]
    pub popular: bool,
    #[serde(default)]
    pub discount: Option<String>,
}

impl CreditPackage {
    /// Price per 1000 credits as shown on the package card.
    pub fn unit_price_label(&self) -> String {
        let per_thousand = if self.credits == 0 {
            0.0
        } else {
            self.price_gbp / self.credits as f64 * 1000.0
        };
        format!("{per_thousand:.2}p per 1000 credits")
    }

    pub fn pay_label(&self) -> String {
        format!("Pay £{:.2}", self.price_gbp)
    }
}

/// Detail payload of an HTTP 402 response.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct CreditShortfall {
    pub error: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub current_balance: i64,
    #[serde(default)]
    pub required: i64,
    #[serde(default)]
    pub suggested_purchase: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PaymentIntent {
    pub client_secret: String,
    pub payment_intent_id: String,
    #[serde(default)]
    pub amount: u64,
    #[serde(default)]
    pub currency: String,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct PaymentConfirmation {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub credits_added: i64,
    #[serde(default)]
    pub new_balance: i64,
    #[serde(default)]
    pub total_purchased: i64,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct VoiceRoom {
    pub room_name: String,
    pub room_sid: String,
    pub token: String,
    pub ws_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_wire_format() {
        let m: Message = serde_json::from_str(
            r#"{"role":"ai","content":"hey","timestamp":"2025-01-30T10:00:00+00:00","type":"text"}"#,
        )
        .unwrap();
        assert_eq!(m.role, Role::Ai);
        assert_eq!(m.kind, MessageKind::Text);

        let json = serde_json::to_value(Message::local(Role::User, MessageKind::Image, "/uploads/a.png")).unwrap();
        assert_eq!(json["role"], "user");
        assert_eq!(json["type"], "image");
    }

    #[test]
    fn time_label_accepts_naive_timestamps() {
        let mut m = Message::local(Role::Ai, MessageKind::Text, "x");
        assert_eq!(m.time_label().len(), 5);
        m.timestamp = "2025-01-30T10:00:00.123456".into();
        assert_eq!(m.time_label().len(), 5);
        m.timestamp = "yesterday".into();
        assert!(m.time_label().is_empty());
    }

    #[test]
    fn session_uses_camel_case() {
        let s: Session = serde_json::from_str(
            r#"{"id":"a1","title":"Hi","lastMessage":"","timestamp":"t","messageCount":4}"#,
        )
        .unwrap();
        assert_eq!(s.message_count, 4);
        assert_eq!(s.preview(), "No messages yet");
    }

    #[test]
    fn unit_price_label_matches_price_over_credits() {
        let pkg = CreditPackage { credits: 1000, price_gbp: 5.0, popular: false, discount: None };
        assert_eq!(pkg.unit_price_label(), format!("{:.2}p per 1000 credits", 5.0 / 1000.0 * 1000.0));
        assert_eq!(pkg.unit_price_label(), "5.00p per 1000 credits");

        let pkg = CreditPackage { credits: 5000, price_gbp: 4.5, popular: true, discount: Some("10% off".into()) };
        assert_eq!(pkg.unit_price_label(), "0.90p per 1000 credits");
        assert_eq!(pkg.pay_label(), "Pay £4.50");
    }

    #[test]
    fn usage_balance_bar() {
        let usage = Usage { credits_used: 0, credits_available: 500, total_credits_purchased: 0 };
        assert!(!usage.is_low());
        assert!((usage.fill_fraction() - 0.5).abs() < f64::EPSILON);

        let usage = Usage { credits_used: 10, credits_available: 99, total_credits_purchased: 0 };
        assert!(usage.is_low());

        let usage = Usage { credits_used: 0, credits_available: 9000, total_credits_purchased: 5000 };
        assert_eq!(usage.fill_fraction(), 1.0);
    }

    #[test]
    fn chat_request_omits_missing_fields() {
        let body = serde_json::to_string(&ChatRequest { text: Some("hi".into()), image_url: None }).unwrap();
        assert_eq!(body, r#"{"text":"hi"}"#);
    }
}
