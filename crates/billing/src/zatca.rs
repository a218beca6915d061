//! Simplified tax invoice data: TLV QR payload, chained invoice hashes,
//! and VAT registration number checks.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{DateTime, SecondsFormat, Utc};
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use tracing::debug;
use uuid::Uuid;

use liyaqa_core::{LiyaqaError, LiyaqaResult};

use crate::invoice::{Invoice, ZatcaData};

const TAG_SELLER: u8 = 1;
const TAG_VAT_NUMBER: u8 = 2;
const TAG_TIMESTAMP: u8 = 3;
const TAG_TOTAL: u8 = 4;
const TAG_VAT_TOTAL: u8 = 5;

/// Encodes one TLV field: tag byte, length byte, UTF-8 value.
pub fn tlv(tag: u8, value: &str) -> LiyaqaResult<Vec<u8>> {
    let bytes = value.as_bytes();
    let len = u8::try_from(bytes.len()).map_err(|_| {
        LiyaqaError::Validation(format!("TLV value for tag {tag} exceeds 255 bytes"))
    })?;
    let mut out = Vec::with_capacity(bytes.len() + 2);
    out.push(tag);
    out.push(len);
    out.extend_from_slice(bytes);
    Ok(out)
}

/// Decodes a TLV byte stream into `(tag, value)` pairs.
pub fn decode_tlv(data: &[u8]) -> LiyaqaResult<Vec<(u8, String)>> {
    let mut fields = Vec::new();
    let mut rest = data;
    while let [tag, len, tail @ ..] = rest {
        let len = *len as usize;
        if tail.len() < len {
            return Err(LiyaqaError::Validation("Truncated TLV payload".into()));
        }
        let value = String::from_utf8(tail[..len].to_vec())
            .map_err(|_| LiyaqaError::Validation("TLV value is not UTF-8".into()))?;
        fields.push((*tag, value));
        rest = &tail[len..];
    }
    if !rest.is_empty() {
        return Err(LiyaqaError::Validation("Truncated TLV payload".into()));
    }
    Ok(fields)
}

/// Base64 QR payload with seller, VAT number, timestamp, total, and VAT.
pub fn qr_code(
    seller_name: &str,
    vat_number: &str,
    timestamp: DateTime<Utc>,
    total: &str,
    vat_total: &str,
) -> LiyaqaResult<String> {
    let mut payload = Vec::new();
    payload.extend(tlv(TAG_SELLER, seller_name)?);
    payload.extend(tlv(TAG_VAT_NUMBER, vat_number)?);
    payload.extend(tlv(
        TAG_TIMESTAMP,
        &timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
    )?);
    payload.extend(tlv(TAG_TOTAL, total)?);
    payload.extend(tlv(TAG_VAT_TOTAL, vat_total)?);
    Ok(STANDARD.encode(payload))
}

/// 15 digits, first and last being `3`.
pub fn is_valid_vat_number(vat_number: &str) -> bool {
    vat_number.len() == 15
        && vat_number.chars().all(|c| c.is_ascii_digit())
        && vat_number.starts_with('3')
        && vat_number.ends_with('3')
}

pub fn hash_base64(input: &str) -> String {
    STANDARD.encode(Sha256::digest(input.as_bytes()))
}

/// Hash every organization's chain starts from.
pub fn initial_hash() -> String {
    hash_base64("0")
}

/// Canonical text an invoice hash is computed over.
pub fn canonical_string(invoice: &Invoice, timestamp: DateTime<Utc>, previous_hash: &str) -> String {
    format!(
        "{}|{}|{}|{}|{}|{}",
        invoice.invoice_number,
        timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
        invoice.subtotal,
        invoice.vat_amount,
        invoice.total,
        previous_hash
    )
}

/// Issues QR codes and maintains the per-organization hash chain.
#[derive(Clone)]
pub struct ZatcaService {
    seller_name: String,
    vat_number: String,
    last_hash: Arc<DashMap<Uuid, String>>,
}

impl ZatcaService {
    pub fn new(seller_name: impl Into<String>, vat_number: impl Into<String>) -> Self {
        Self {
            seller_name: seller_name.into(),
            vat_number: vat_number.into(),
            last_hash: Arc::new(DashMap::new()),
        }
    }

    pub fn vat_number(&self) -> &str {
        &self.vat_number
    }

    /// Builds compliance data for an invoice and advances its
    /// organization's chain.
    pub fn generate(&self, invoice: &Invoice, timestamp: DateTime<Utc>) -> LiyaqaResult<ZatcaData> {
        if !is_valid_vat_number(&self.vat_number) {
            return Err(LiyaqaError::Validation(format!(
                "Invalid VAT registration number: {}",
                self.vat_number
            )));
        }
        let qr = qr_code(
            &self.seller_name,
            &self.vat_number,
            timestamp,
            &invoice.total.to_string(),
            &invoice.vat_amount.to_string(),
        )?;

        let mut chain = self
            .last_hash
            .entry(invoice.organization_id)
            .or_insert_with(initial_hash);
        let previous_hash = chain.value().clone();
        let invoice_hash = hash_base64(&canonical_string(invoice, timestamp, &previous_hash));
        *chain = invoice_hash.clone();
        debug!(invoice_number = %invoice.invoice_number, "Invoice hash chained");

        Ok(ZatcaData {
            qr_code: qr,
            invoice_hash,
            previous_hash,
            timestamp,
        })
    }
}
