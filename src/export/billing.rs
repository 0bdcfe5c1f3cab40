use serde::Serialize;

use crate::models::{BillingLedger, SpecialsSummary};

use super::ExportError;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BillingLineRow {
    pub line_id: String,
    pub service_date: String,
    pub provider_id: String,
    pub code: String,
    pub description: String,
    pub amount_type: String,
    pub amount: String,
    pub page_number: u32,
    pub confidence: u8,
    pub citation_ids: String,
}

/// One row per provider plus a trailing `TOTAL` row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpecialsRow {
    pub provider: String,
    pub charges: String,
    pub payments: String,
    pub adjustments: String,
    pub balance: String,
    pub line_count: usize,
    pub confidence: u8,
    pub flags: String,
    pub citation_ids: String,
}

/// Cents as a plain decimal, e.g. `-1234` → `-12.34`.
pub fn format_cents(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{sign}{}.{:02}", abs / 100, abs % 100)
}

fn optional_cents(cents: Option<i64>) -> String {
    cents.map(format_cents).unwrap_or_default()
}

fn to_csv<R: Serialize>(header: &[&str], rows: impl IntoIterator<Item = R>) -> Result<Vec<u8>, ExportError> {
    let mut writer = ::csv::WriterBuilder::new().has_headers(false).from_writer(Vec::new());
    writer.write_record(header)?;
    for row in rows {
        writer.serialize(&row)?;
    }
    writer.flush()?;
    writer.into_inner().map_err(|e| ExportError::Io(e.into_error()))
}

pub fn billing_lines_csv(ledger: &BillingLedger) -> Result<Vec<u8>, ExportError> {
    let rows = ledger.lines.iter().map(|line| BillingLineRow {
        line_id: line.line_id.clone(),
        service_date: line.service_date.map(|d| d.to_string()).unwrap_or_default(),
        provider_id: line.provider_id.clone().unwrap_or_default(),
        code: line.code.clone().unwrap_or_default(),
        description: line.description.clone(),
        amount_type: line.amount_type.as_str().to_string(),
        amount: format_cents(line.amount_cents),
        page_number: line.page_number,
        confidence: line.confidence,
        citation_ids: line.citation_ids.join("|"),
    });
    to_csv(
        &[
            "line_id",
            "service_date",
            "provider_id",
            "code",
            "description",
            "amount_type",
            "amount",
            "page_number",
            "confidence",
            "citation_ids",
        ],
        rows,
    )
}

pub fn specials_csv(summary: &SpecialsSummary) -> Result<Vec<u8>, ExportError> {
    let join_flags = |flags: &[crate::models::SpecialsFlag]| {
        flags.iter().map(|f| f.as_str()).collect::<Vec<_>>().join("|")
    };
    let providers = summary.by_provider.iter().map(|p| SpecialsRow {
        provider: p.display_name.clone(),
        charges: format_cents(p.totals.charges_cents),
        payments: optional_cents(p.totals.payments_cents),
        adjustments: optional_cents(p.totals.adjustments_cents),
        balance: optional_cents(p.totals.balance_cents),
        line_count: p.line_count,
        confidence: p.confidence,
        flags: join_flags(&p.flags),
        citation_ids: p.citation_ids.join("|"),
    });
    let total = SpecialsRow {
        provider: "TOTAL".into(),
        charges: format_cents(summary.totals.charges_cents),
        payments: optional_cents(summary.totals.payments_cents),
        adjustments: optional_cents(summary.totals.adjustments_cents),
        balance: optional_cents(summary.totals.balance_cents),
        line_count: summary.lines_deduped,
        confidence: summary.confidence,
        flags: join_flags(&summary.flags),
        citation_ids: String::new(),
    };
    to_csv(
        &[
            "provider",
            "charges",
            "payments",
            "adjustments",
            "balance",
            "line_count",
            "confidence",
            "flags",
            "citation_ids",
        ],
        providers.chain(std::iter::once(total)),
    )
}
