use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::Serialize;

use crate::models::Booking;

const TOKEN_BYTES: usize = 32;

/// An opaque, unguessable lifecycle token. Carries no data; only ever
/// matched exactly against the stored value.
pub fn mint_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Customer-facing links for whichever tokens a booking currently holds.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BookingLinks {
    pub confirm: Option<String>,
    pub cancel: Option<String>,
    pub reschedule: Option<String>,
}

impl BookingLinks {
    pub fn for_booking(base_url: &str, booking: &Booking) -> Self {
        let base = base_url.trim_end_matches('/');
        let link = |action: &str, token: &Option<String>| {
            token
                .as_ref()
                .map(|t| format!("{base}/booking/{action}/{t}"))
        };
        Self {
            confirm: link("confirm", &booking.confirmation_token),
            cancel: link("cancel", &booking.cancellation_token),
            reschedule: link("reschedule", &booking.reschedule_token),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BookingStatus, CustomerInfo};
    use std::collections::HashSet;

    #[test]
    fn test_tokens_are_fixed_length_and_url_safe() {
        let token = mint_token();
        assert_eq!(token.len(), 43);
        assert!(token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_tokens_do_not_repeat() {
        let tokens: HashSet<String> = (0..1000).map(|_| mint_token()).collect();
        assert_eq!(tokens.len(), 1000);
    }

    #[test]
    fn test_links_skip_missing_tokens() {
        let now = chrono::NaiveDateTime::parse_from_str("2025-06-16 09:00", "%Y-%m-%d %H:%M").unwrap();
        let booking = Booking {
            id: "bk".to_string(),
            company_id: "c".to_string(),
            service_id: "s".to_string(),
            resource_id: "r".to_string(),
            start_time: now,
            end_time: now,
            status: BookingStatus::Confirmed,
            customer: CustomerInfo::default(),
            notes: None,
            confirmation_token: None,
            cancellation_token: Some("cxl".to_string()),
            reschedule_token: Some("rsc".to_string()),
            created_at: now,
            updated_at: now,
        };

        let links = BookingLinks::for_booking("https://book.example/", &booking);
        assert_eq!(links.confirm, None);
        assert_eq!(links.cancel.as_deref(), Some("https://book.example/booking/cancel/cxl"));
        assert_eq!(
            links.reschedule.as_deref(),
            Some("https://book.example/booking/reschedule/rsc")
        );
    }
}
