use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const MAX_ANNUAL_FEE_AMOUNT: i64 = 10_000_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSettings {
    pub tenant_id: String,
    pub annual_fee_enabled: bool,
    pub annual_fee_amount: i64,
    pub annual_fee_description: Option<String>,
    pub donation_enabled: bool,
    pub donation_min_amount: i64,
    pub donation_max_amount: i64,
    pub donation_presets: Vec<i64>,
    pub show_donor_list: bool,
    pub allow_anonymous: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl PaymentSettings {
    /// In-memory defaults for tenants that have never saved settings.
    /// Timestamps stay None until a row actually exists.
    pub fn defaults(tenant_id: &str) -> Self {
        Self {
            tenant_id: tenant_id.to_string(),
            annual_fee_enabled: false,
            annual_fee_amount: 5000,
            annual_fee_description: None,
            donation_enabled: false,
            donation_min_amount: 1000,
            donation_max_amount: 1_000_000,
            donation_presets: vec![1000, 3000, 5000, 10000],
            show_donor_list: true,
            allow_anonymous: true,
            created_at: None,
            updated_at: None,
        }
    }

    /// Overlays a partial update on the current settings (or the defaults
    /// when the tenant has none). Pure so the merge rules can be tested
    /// without storage.
    pub fn merged(current: Option<&PaymentSettings>, tenant_id: &str, patch: &PaymentSettingsUpdate) -> Self {
        let base = match current {
            Some(settings) => settings.clone(),
            None => PaymentSettings::defaults(tenant_id),
        };

        Self {
            tenant_id: tenant_id.to_string(),
            annual_fee_enabled: patch.annual_fee_enabled.unwrap_or(base.annual_fee_enabled),
            annual_fee_amount: patch.annual_fee_amount.unwrap_or(base.annual_fee_amount),
            annual_fee_description: match &patch.annual_fee_description {
                Some(description) => description.clone(),
                None => base.annual_fee_description,
            },
            donation_enabled: patch.donation_enabled.unwrap_or(base.donation_enabled),
            donation_min_amount: patch.donation_min_amount.unwrap_or(base.donation_min_amount),
            donation_max_amount: patch.donation_max_amount.unwrap_or(base.donation_max_amount),
            donation_presets: patch
                .donation_presets
                .clone()
                .unwrap_or(base.donation_presets),
            show_donor_list: patch.show_donor_list.unwrap_or(base.show_donor_list),
            allow_anonymous: patch.allow_anonymous.unwrap_or(base.allow_anonymous),
            created_at: base.created_at,
            updated_at: base.updated_at,
        }
    }
}

/// Partial settings update. Absent fields keep their current value; the
/// description uses a nested Option so callers can clear it explicitly.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSettingsUpdate {
    pub annual_fee_enabled: Option<bool>,
    pub annual_fee_amount: Option<i64>,
    #[serde(default, with = "double_option")]
    pub annual_fee_description: Option<Option<String>>,
    pub donation_enabled: Option<bool>,
    pub donation_min_amount: Option<i64>,
    pub donation_max_amount: Option<i64>,
    pub donation_presets: Option<Vec<i64>>,
    pub show_donor_list: Option<bool>,
    pub allow_anonymous: Option<bool>,
}

// Distinguishes "field absent" (keep) from "field null" (clear) for the
// annual fee description.
mod double_option {
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Some(Option::<String>::deserialize(deserializer)?))
    }
}

/// Strips markup from free-text settings fields before they are persisted.
/// Script elements are dropped with their contents; any remaining tags are
/// removed, text between them kept.
pub fn strip_html(input: &str) -> String {
    let without_scripts = remove_script_elements(input);

    let mut out = String::with_capacity(without_scripts.len());
    let mut in_tag = false;
    for ch in without_scripts.chars() {
        match ch {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            c if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.trim().to_string()
}

fn remove_script_elements(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = find_ignore_ascii_case(rest, "<script") {
        out.push_str(&rest[..start]);
        match find_ignore_ascii_case(&rest[start..], "</script>") {
            Some(end) => rest = &rest[start + end + "</script>".len()..],
            None => {
                // Unterminated script element: drop the rest.
                return out;
            }
        }
    }
    out.push_str(rest);
    out
}

// The needles are ASCII, so a byte-window comparison is case-correct and the
// returned offset is always a char boundary in the haystack.
fn find_ignore_ascii_case(haystack: &str, needle: &str) -> Option<usize> {
    haystack
        .as_bytes()
        .windows(needle.len())
        .position(|window| window.eq_ignore_ascii_case(needle.as_bytes()))
}
