//! Warranty calculator.
//!
//! The automatic snapshot is derived from the order's processed timestamp and
//! the manufacturer window. Operators can override the result afterwards with
//! [`Engine::record_warranty_decision`](crate::Engine::record_warranty_decision).

use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, Month, OffsetDateTime, PrimitiveDateTime, Time};

use rma_storage::{WarrantyBasis, WarrantyStatus};

/// Manufacturer warranty window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarrantyPolicy {
    #[serde(default = "default_years")]
    pub years: i32,
}

fn default_years() -> i32 {
    1
}

impl Default for WarrantyPolicy {
    fn default() -> Self {
        WarrantyPolicy {
            years: default_years(),
        }
    }
}

/// Warranty state captured on a case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WarrantySnapshot {
    pub status: WarrantyStatus,
    pub basis: WarrantyBasis,
    #[serde(with = "time::serde::rfc3339::option")]
    pub expires_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub checked_at: OffsetDateTime,
}

/// Compute the warranty snapshot for an order processed at `processed_at`.
///
/// Missing or unparsable timestamps give `unknown`/`unknown` with no expiry.
/// `checked_at` is always `now`.
pub fn compute_warranty(
    processed_at: Option<&str>,
    policy: &WarrantyPolicy,
    now: OffsetDateTime,
) -> WarrantySnapshot {
    let expires_at = processed_at
        .and_then(parse_timestamp)
        .and_then(|at| add_years(at, policy.years));

    match expires_at {
        Some(expires_at) => WarrantySnapshot {
            status: if expires_at >= now {
                WarrantyStatus::InWarranty
            } else {
                WarrantyStatus::OutOfWarranty
            },
            basis: WarrantyBasis::Manufacturer,
            expires_at: Some(expires_at),
            checked_at: now,
        },
        None => WarrantySnapshot {
            status: WarrantyStatus::Unknown,
            basis: WarrantyBasis::Unknown,
            expires_at: None,
            checked_at: now,
        },
    }
}

/// Parse an upstream timestamp: RFC 3339, or a bare `YYYY-MM-DD` taken as
/// midnight UTC. Blank or malformed input yields `None`.
pub fn parse_timestamp(raw: &str) -> Option<OffsetDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(at) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Some(at.to_offset(time::UtcOffset::UTC));
    }
    let date = Date::parse(raw, format_description!("[year]-[month]-[day]")).ok()?;
    Some(PrimitiveDateTime::new(date, Time::MIDNIGHT).assume_utc())
}

/// Add whole calendar years. Feb 29 lands on Feb 28 in non-leap years.
pub fn add_years(at: OffsetDateTime, years: i32) -> Option<OffsetDateTime> {
    let target_year = at.year().checked_add(years)?;
    let date = at.date();
    let shifted = match Date::from_calendar_date(target_year, date.month(), date.day()) {
        Ok(d) => d,
        Err(_) if date.month() == Month::February && date.day() == 29 => {
            Date::from_calendar_date(target_year, Month::February, 28).ok()?
        }
        Err(_) => return None,
    };
    Some(at.replace_date(shifted))
}
