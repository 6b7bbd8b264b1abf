//! GS1 barcode parsing for lot/expiry capture.
//!
//! Accepts raw element strings as delivered by a scanner (FNC1 as ASCII GS,
//! optional symbology identifier) and the bracketed human-readable form
//! printed under the symbol. A bare 13-digit JAN is accepted as well.

use chrono::{Months, NaiveDate};
use thiserror::Error;

use crate::constants::{GS1_GROUP_SEPARATOR, GS1_MAX_VARIABLE_LENGTH, MAX_BARCODE_LENGTH};

const SYMBOLOGY_PREFIXES: [&str; 4] = ["]C1", "]d2", "]Q3", "]e0"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BarcodeError {
    #[error("Barcode is empty")]
    Empty,
    #[error("Barcode is too long")]
    TooLong,
    #[error("Barcode has no GTIN (AI 01)")]
    MissingGtin,
    #[error("Unsupported application identifier ({0})")]
    UnsupportedAi(String),
    #[error("Value for AI {0} is truncated")]
    Truncated(String),
    #[error("Value for AI {0} is too long")]
    ValueTooLong(String),
    #[error("GTIN {0} is not numeric")]
    InvalidGtin(String),
    #[error("GTIN {0} has a wrong check digit")]
    InvalidCheckDigit(String),
    #[error("Expiry {0} is not a valid YYMMDD date")]
    InvalidExpiry(String),
    #[error("Malformed bracketed barcode")]
    Malformed,
}

/// Decoded GS1 element string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Gs1Barcode {
    pub gtin: String,
    pub lot_number: Option<String>,
    pub expiry_date: Option<NaiveDate>,
    pub serial: Option<String>,
}

impl Gs1Barcode {
    /// JAN code for unit-level GTINs (indicator digit 0)
    pub fn product_code(&self) -> Option<String> {
        self.gtin.strip_prefix('0').map(str::to_string)
    }
}

pub fn parse(raw: &str) -> Result<Gs1Barcode, BarcodeError> {
    let trimmed = raw.trim_matches(|c: char| c.is_whitespace() || c == GS1_GROUP_SEPARATOR);
    if trimmed.is_empty() {
        return Err(BarcodeError::Empty);
    }
    if trimmed.chars().count() > MAX_BARCODE_LENGTH {
        return Err(BarcodeError::TooLong);
    }

    let body = SYMBOLOGY_PREFIXES
        .iter()
        .find_map(|prefix| trimmed.strip_prefix(prefix))
        .unwrap_or(trimmed);

    if body.len() == 13 && body.chars().all(|c| c.is_ascii_digit()) {
        let gtin = format!("0{body}");
        validate_gtin(&gtin)?;
        return Ok(Gs1Barcode {
            gtin,
            lot_number: None,
            expiry_date: None,
            serial: None,
        });
    }

    let elements = if body.starts_with('(') {
        split_bracketed(body)?
    } else {
        split_raw(body)?
    };

    let mut gtin = None;
    let mut lot_number = None;
    let mut expiry_date = None;
    let mut serial = None;

    for (ai, value) in elements {
        match ai.as_str() {
            "01" => {
                validate_gtin(&value)?;
                gtin = Some(value);
            }
            "17" => expiry_date = Some(parse_expiry(&value)?),
            "10" => lot_number = Some(value),
            "21" => serial = Some(value),
            _ => return Err(BarcodeError::UnsupportedAi(ai)),
        }
    }

    Ok(Gs1Barcode {
        gtin: gtin.ok_or(BarcodeError::MissingGtin)?,
        lot_number,
        expiry_date,
        serial,
    })
}

/// Fixed length for known fixed-width AIs, `None` for variable-length ones
fn fixed_length(ai: &str) -> Result<Option<usize>, BarcodeError> {
    match ai {
        "01" => Ok(Some(14)),
        "17" => Ok(Some(6)),
        "10" | "21" => Ok(None),
        other => Err(BarcodeError::UnsupportedAi(other.to_string())),
    }
}

fn split_raw(body: &str) -> Result<Vec<(String, String)>, BarcodeError> {
    let chars: Vec<char> = body.chars().collect();
    let mut elements = Vec::new();
    let mut pos = 0;

    while pos < chars.len() {
        if chars[pos] == GS1_GROUP_SEPARATOR {
            pos += 1;
            continue;
        }
        if pos + 2 > chars.len() {
            return Err(BarcodeError::Truncated(chars[pos..].iter().collect()));
        }

        let ai: String = chars[pos..pos + 2].iter().collect();
        pos += 2;

        let value: String = match fixed_length(&ai)? {
            Some(len) => {
                if pos + len > chars.len() {
                    return Err(BarcodeError::Truncated(ai));
                }
                let value = chars[pos..pos + len].iter().collect();
                pos += len;
                value
            }
            None => {
                let end = chars[pos..]
                    .iter()
                    .position(|c| *c == GS1_GROUP_SEPARATOR)
                    .map_or(chars.len(), |offset| pos + offset);
                let value: String = chars[pos..end].iter().collect();
                if value.chars().count() > GS1_MAX_VARIABLE_LENGTH {
                    return Err(BarcodeError::ValueTooLong(ai));
                }
                pos = end;
                value
            }
        };

        if value.is_empty() {
            return Err(BarcodeError::Truncated(ai));
        }
        elements.push((ai, value));
    }

    Ok(elements)
}

fn split_bracketed(body: &str) -> Result<Vec<(String, String)>, BarcodeError> {
    let mut elements = Vec::new();
    let mut rest = body;

    while !rest.is_empty() {
        let after_open = rest.strip_prefix('(').ok_or(BarcodeError::Malformed)?;
        let close = after_open.find(')').ok_or(BarcodeError::Malformed)?;
        let ai = after_open[..close].to_string();
        let after_close = &after_open[close + 1..];
        let value_end = after_close.find('(').unwrap_or(after_close.len());
        let value = after_close[..value_end].trim().to_string();
        rest = &after_close[value_end..];

        match fixed_length(&ai)? {
            Some(len) if value.len() != len => return Err(BarcodeError::Truncated(ai)),
            None if value.chars().count() > GS1_MAX_VARIABLE_LENGTH => {
                return Err(BarcodeError::ValueTooLong(ai))
            }
            _ if value.is_empty() => return Err(BarcodeError::Truncated(ai)),
            _ => {}
        }
        elements.push((ai, value));
    }

    Ok(elements)
}

fn validate_gtin(gtin: &str) -> Result<(), BarcodeError> {
    if gtin.len() != 14 || !gtin.chars().all(|c| c.is_ascii_digit()) {
        return Err(BarcodeError::InvalidGtin(gtin.to_string()));
    }
    let digits: Vec<u32> = gtin.chars().filter_map(|c| c.to_digit(10)).collect();
    let (body, check) = digits.split_at(digits.len() - 1);
    if check_digit(body) != check[0] {
        return Err(BarcodeError::InvalidCheckDigit(gtin.to_string()));
    }
    Ok(())
}

/// GS1 mod-10: weights 3,1,3,... from the rightmost data digit
fn check_digit(body: &[u32]) -> u32 {
    let sum: u32 = body
        .iter()
        .rev()
        .enumerate()
        .map(|(i, d)| if i % 2 == 0 { d * 3 } else { *d })
        .sum();
    (10 - sum % 10) % 10
}

/// YYMMDD; day 00 means the last day of the month
fn parse_expiry(value: &str) -> Result<NaiveDate, BarcodeError> {
    let invalid = || BarcodeError::InvalidExpiry(value.to_string());
    if value.len() != 6 || !value.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }

    let year = 2000 + value[0..2].parse::<i32>().map_err(|_| invalid())?;
    let month = value[2..4].parse::<u32>().map_err(|_| invalid())?;
    let day = value[4..6].parse::<u32>().map_err(|_| invalid())?;

    if day == 0 {
        NaiveDate::from_ymd_opt(year, month, 1)
            .and_then(|first| first.checked_add_months(Months::new(1)))
            .and_then(|next| next.pred_opt())
            .ok_or_else(invalid)
    } else {
        NaiveDate::from_ymd_opt(year, month, day).ok_or_else(invalid)
    }
}
