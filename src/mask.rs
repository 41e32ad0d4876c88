//! Masking of personal data before it reaches a log record.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value as JsonValue;

const MASK: &str = "***";

static EMAIL_REGEX: OnceLock<Regex> = OnceLock::new();
static PHONE_REGEX: OnceLock<Regex> = OnceLock::new();

fn email_regex() -> &'static Regex {
    EMAIL_REGEX.get_or_init(|| {
        Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}")
            .expect("email pattern is valid")
    })
}

// Requires a separator or parentheses so bare numeric ids are left alone.
fn phone_regex() -> &'static Regex {
    PHONE_REGEX.get_or_init(|| {
        Regex::new(r"(?:\+\d{1,3}[\s.-]?)?(?:\(\d{2,4}\)[\s.-]?|\d{2,4}[\s.-])\d{3,4}[\s.-]?\d{3,4}")
            .expect("phone pattern is valid")
    })
}

/// Replaces email- and phone-shaped substrings.
pub fn mask_text(input: &str) -> String {
    let masked = email_regex().replace_all(input, MASK);
    phone_regex().replace_all(&masked, MASK).into_owned()
}

/// Returns a copy of `value` with personal fields masked.
///
/// Whole values under address, email, phone, street and person-name keys are
/// replaced; any other string is passed through [`mask_text`].
pub fn mask_value(value: &JsonValue) -> JsonValue {
    let mut masked = value.clone();
    mask_in_place(&mut masked);
    masked
}

fn mask_in_place(value: &mut JsonValue) {
    match value {
        JsonValue::Object(map) => {
            for (key, item) in map.iter_mut() {
                if is_personal_key(key) {
                    *item = JsonValue::String(MASK.to_owned());
                } else {
                    mask_in_place(item);
                }
            }
        }
        JsonValue::Array(items) => items.iter_mut().for_each(mask_in_place),
        JsonValue::String(text) => *text = mask_text(text),
        _ => {}
    }
}

fn is_personal_key(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    ["email", "phone", "street", "address", "company", "first_name", "last_name", "full_name"]
        .iter()
        .any(|needle| key.contains(needle))
        || matches!(key.as_str(), "line1" | "line2" | "line_1" | "line_2")
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{mask_text, mask_value};

    #[test]
    fn masks_emails_and_phones_in_text() {
        assert_eq!(
            mask_text("contact jane.doe@example.com or +1 415-555-0100"),
            "contact *** or ***"
        );
        assert_eq!(mask_text("call (415) 555-0100"), "call ***");
    }

    #[test]
    fn leaves_ids_and_dates_alone() {
        assert_eq!(mask_text("/orders/123456789"), "/orders/123456789");
        assert_eq!(mask_text("2024-01-15"), "2024-01-15");
        assert_eq!(mask_text("shp_abc123"), "shp_abc123");
    }

    #[test]
    fn masks_personal_keys_recursively() {
        let payload = json!({
            "shipment": {
                "to_address": {"name": "Jane", "street1": "1 Main St"},
                "parcel": {"weight": 10.5},
                "customs_info": {"contents_explanation": "mail me at a@b.io"}
            },
            "customer": {"email": "a@b.io", "phone": "4155550100", "first_name": "Jane"},
            "line_items": [{"sku": "SKU-1", "quantity": 2}]
        });
        let masked = mask_value(&payload);

        assert_eq!(masked["shipment"]["to_address"], "***");
        assert_eq!(masked["shipment"]["parcel"]["weight"], 10.5);
        assert_eq!(
            masked["shipment"]["customs_info"]["contents_explanation"],
            "mail me at ***"
        );
        assert_eq!(masked["customer"]["email"], "***");
        assert_eq!(masked["customer"]["phone"], "***");
        assert_eq!(masked["customer"]["first_name"], "***");
        assert_eq!(masked["line_items"][0]["sku"], "SKU-1");
    }
}
