//! EMV merchant-presented QR decoding (BR Code family).
//!
//! Only what is needed to classify and validate a code is decoded here:
//! the top-level TLV records, the merchant account template, the additional
//! data reference and the trailing CRC16 checksum.

use crate::error::InvalidCodeError;
use regex::Regex;
use std::ops::RangeInclusive;
use std::sync::OnceLock;

pub const PAYLOAD_FORMAT_INDICATOR: &str = "000201";

pub const ID_POINT_OF_INITIATION: u8 = 1;
pub const ID_MERCHANT_CATEGORY: u8 = 52;
pub const ID_CURRENCY: u8 = 53;
pub const ID_AMOUNT: u8 = 54;
pub const ID_COUNTRY: u8 = 58;
pub const ID_MERCHANT_NAME: u8 = 59;
pub const ID_MERCHANT_CITY: u8 = 60;
pub const ID_ADDITIONAL_DATA: u8 = 62;
pub const ID_CRC: u8 = 63;

const MERCHANT_ACCOUNT_IDS: RangeInclusive<u8> = 26..=51;

const SUB_ID_GUI: u8 = 0;
const SUB_ID_ROUTING_KEY: u8 = 1;
const SUB_ID_URL: u8 = 25;
const SUB_ID_REFERENCE: u8 = 5;

/// Placeholder reference used by codes that carry no reference.
const EMPTY_REFERENCE: &str = "***";

/// ISO-4217 numeric code to asset code.
const CURRENCY_TABLE: &[(&str, &str)] = &[
    ("986", "BRL"),
    ("840", "USD"),
    ("978", "EUR"),
    ("566", "NGN"),
    ("484", "MXN"),
    ("032", "ARS"),
    ("404", "KES"),
];

pub fn asset_code_for_currency(numeric: &str) -> Option<&'static str> {
    CURRENCY_TABLE
        .iter()
        .find(|(code, _)| *code == numeric)
        .map(|(_, asset)| *asset)
}

static CHECKSUM_PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
static AMOUNT_PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
static CATEGORY_PATTERN: OnceLock<Option<Regex>> = OnceLock::new();

fn pattern_matches(cell: &'static OnceLock<Option<Regex>>, pattern: &str, value: &str) -> bool {
    cell.get_or_init(|| Regex::new(pattern).ok())
        .as_ref()
        .is_some_and(|re| re.is_match(value))
}

pub fn is_valid_amount(raw: &str) -> bool {
    pattern_matches(&AMOUNT_PATTERN, r"^\d{1,10}(\.\d{1,2})?$", raw)
}

pub fn is_valid_category(raw: &str) -> bool {
    pattern_matches(&CATEGORY_PATTERN, r"^\d{4}$", raw)
}

/// CRC-16/CCITT-FALSE (poly 0x1021, init 0xFFFF, no reflection).
pub fn crc16_ccitt(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for byte in data {
        crc ^= (*byte as u16) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ 0x1021
            } else {
                crc << 1
            };
        }
    }
    crc
}

/// Upper-case hex checksum the way it appears in record 63.
pub fn checksum_hex(payload: &str) -> String {
    format!("{:04X}", crc16_ccitt(payload.as_bytes()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlvRecord {
    pub id: u8,
    pub value: String,
}

/// Split a TLV string into records. Lengths count characters, not bytes.
pub fn parse_records(input: &str) -> Result<Vec<TlvRecord>, InvalidCodeError> {
    let chars: Vec<char> = input.chars().collect();
    let mut records = Vec::new();
    let mut pos = 0;

    while pos < chars.len() {
        if pos + 4 > chars.len() {
            return Err(InvalidCodeError::malformed(format!(
                "truncated record header at offset {}",
                pos
            )));
        }
        let id = two_digits(&chars[pos..pos + 2]).ok_or_else(|| {
            InvalidCodeError::malformed(format!("non-numeric record id at offset {}", pos))
        })?;
        let len = two_digits(&chars[pos + 2..pos + 4]).ok_or_else(|| {
            InvalidCodeError::malformed(format!("non-numeric length for record {:02}", id))
        })? as usize;

        let start = pos + 4;
        let end = start + len;
        if end > chars.len() {
            return Err(InvalidCodeError::malformed(format!(
                "record {:02} overruns the payload",
                id
            )));
        }

        records.push(TlvRecord {
            id,
            value: chars[start..end].iter().collect(),
        });
        pos = end;
    }

    Ok(records)
}

fn two_digits(chars: &[char]) -> Option<u8> {
    match chars {
        [a, b] => Some((a.to_digit(10)? * 10 + b.to_digit(10)?) as u8),
        _ => None,
    }
}

fn find(records: &[TlvRecord], id: u8) -> Option<&str> {
    records
        .iter()
        .find(|r| r.id == id)
        .map(|r| r.value.trim())
        .filter(|v| !v.is_empty())
}

/// Contents of a merchant account template (ids 26..=51).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MerchantAccount {
    pub template_id: u8,
    pub gui: Option<String>,
    pub routing_key: Option<String>,
    pub url: Option<String>,
}

/// A structurally valid, checksum-verified payment code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmvPayload {
    records: Vec<TlvRecord>,
}

impl EmvPayload {
    pub fn decode(code: &str) -> Result<Self, InvalidCodeError> {
        let code = code.trim();
        if code.is_empty() {
            return Err(InvalidCodeError::Empty);
        }
        if !code.starts_with(PAYLOAD_FORMAT_INDICATOR) {
            return Err(InvalidCodeError::malformed(
                "missing payload format indicator",
            ));
        }

        let records = parse_records(code)?;

        let checksum = match records.last() {
            Some(last) if last.id == ID_CRC => last.value.as_str(),
            _ => return Err(InvalidCodeError::missing("checksum (63)")),
        };
        if !pattern_matches(&CHECKSUM_PATTERN, r"^[0-9A-Fa-f]{4}$", checksum) {
            return Err(InvalidCodeError::malformed(
                "checksum must be four hex digits",
            ));
        }

        // The checksum covers everything up to and including "6304".
        let covered = &code[..code.len() - checksum.len()];
        let expected = checksum_hex(covered);
        if !expected.eq_ignore_ascii_case(checksum) {
            return Err(InvalidCodeError::ChecksumMismatch {
                expected,
                actual: checksum.to_uppercase(),
            });
        }

        Ok(Self { records })
    }

    pub fn get(&self, id: u8) -> Option<&str> {
        find(&self.records, id)
    }

    pub fn point_of_initiation(&self) -> Option<&str> {
        self.get(ID_POINT_OF_INITIATION)
    }

    /// First merchant account template that carries a routing key or a
    /// lookup URL.
    pub fn merchant_account(&self) -> Result<Option<MerchantAccount>, InvalidCodeError> {
        for record in self
            .records
            .iter()
            .filter(|r| MERCHANT_ACCOUNT_IDS.contains(&r.id))
        {
            let nested = parse_records(&record.value)?;
            let account = MerchantAccount {
                template_id: record.id,
                gui: find(&nested, SUB_ID_GUI).map(str::to_string),
                routing_key: find(&nested, SUB_ID_ROUTING_KEY).map(str::to_string),
                url: find(&nested, SUB_ID_URL).map(str::to_string),
            };
            if account.routing_key.is_some() || account.url.is_some() {
                return Ok(Some(account));
            }
        }
        Ok(None)
    }

    pub fn reference(&self) -> Result<Option<String>, InvalidCodeError> {
        let Some(additional) = self.get(ID_ADDITIONAL_DATA) else {
            return Ok(None);
        };
        let nested = parse_records(additional)?;
        Ok(find(&nested, SUB_ID_REFERENCE)
            .filter(|r| *r != EMPTY_REFERENCE)
            .map(str::to_string))
    }
}
