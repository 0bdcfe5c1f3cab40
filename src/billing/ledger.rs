use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::ids::IdAllocator;
use crate::models::{AmountType, BillingLedger, BillingLine, Page, PageType};
use crate::pipeline::context::RunContext;
use crate::pipeline::dates::parse_date;
use crate::pipeline::events::billing::find_amounts;
use crate::pipeline::providers::PageProvider;

const MAX_DESCRIPTION_CHARS: usize = 200;
const CODED_CONFIDENCE: u8 = 70;
const UNCODED_CONFIDENCE: u8 = 50;

/// Unclassified pages count as billing when at least this many keywords hit.
const MIN_KEYWORD_HITS: usize = 2;
const BILLING_KEYWORDS: &[&str] = &[
    "total charges",
    "amount due",
    "cpt",
    "hcpcs",
    "revenue code",
    "eob",
    "patient responsibility",
    "insurance",
    "copay",
    "deductible",
    "billed",
    "payment",
    "adjustment",
    "balance",
    "statement",
    "billing",
    "ledger",
];

/// Amount type by line wording, first match wins. Statement totals come
/// first so they never count as charges.
static AMOUNT_TYPES: LazyLock<Vec<(Regex, AmountType)>> = LazyLock::new(|| {
    [
        (r"\btotal\b|\bsubtotal\b", AmountType::Total),
        (r"co[\s-]*pay", AmountType::Copay),
        (r"co[\s-]*insurance", AmountType::Coinsurance),
        (r"deductible", AmountType::Deductible),
        (r"write[\s-]*off", AmountType::Writeoff),
        (r"adjust|contractual", AmountType::Adjustment),
        (r"payment|paid|receipt|remit", AmountType::Payment),
        (
            r"balance|amount\s*(due|owed)|net\s*due|patient\s*(responsibility|portion)",
            AmountType::Balance,
        ),
        (r"charge|billed|\bfee\b", AmountType::Charge),
    ]
    .iter()
    .map(|(p, kind)| (Regex::new(&format!("(?i){p}")).expect("amount type pattern is valid"), *kind))
    .collect()
});

/// HCPCS level II, then CPT, then ICD-10.
static CODES: LazyLock<[Regex; 3]> = LazyLock::new(|| {
    [r"\b[A-V]\d{4}\b", r"\b\d{5}\b", r"\b[A-Z]\d{2}(?:\.\d{1,4})?\b"]
        .map(|p| Regex::new(p).expect("billing code pattern is valid"))
});

pub fn is_billing_text(text: &str) -> bool {
    let lower = text.to_lowercase();
    BILLING_KEYWORDS.iter().filter(|kw| lower.contains(*kw)).count() >= MIN_KEYWORD_HITS
}

pub fn classify_amount(line: &str) -> AmountType {
    AMOUNT_TYPES
        .iter()
        .find(|(re, _)| re.is_match(line))
        .map_or(AmountType::Unknown, |(_, kind)| *kind)
}

/// First billing code in `text`. Five-digit numbers starting 19 or 20 are
/// years, not CPT codes.
pub fn first_code(text: &str) -> Option<String> {
    CODES.iter().find_map(|re| {
        re.find_iter(text)
            .map(|m| m.as_str())
            .find(|code| !(code.len() == 5 && (code.starts_with("19") || code.starts_with("20"))))
            .map(str::to_string)
    })
}

fn is_billing_page(page: &Page) -> bool {
    match page.page_type {
        PageType::Billing => true,
        PageType::Other => is_billing_text(&page.text),
        _ => false,
    }
}

/// Every amount on every billing page, cited and sorted by service date,
/// provider, amount, then page.
pub fn build_billing_ledger(
    pages: &[Page],
    page_providers: &BTreeMap<u32, PageProvider>,
    ctx: &mut RunContext,
) -> BillingLedger {
    let billing: Vec<&Page> = pages.iter().filter(|p| is_billing_page(p)).collect();
    let mut lines = Vec::new();

    for page in &billing {
        let provider_id = page_providers.get(&page.page_number).map(|p| p.provider_id.clone());
        for raw in page.text.lines() {
            let line = raw.trim();
            let amounts = find_amounts(line);
            if amounts.is_empty() {
                continue;
            }

            // Codes are looked for before the first amount so digits of an
            // amount are never read as a code
            let code = first_code(&line[..amounts[0].0]);
            let service_date = parse_date(line);
            let amount_type = classify_amount(line);
            let citation_ids: Vec<String> = ctx.cite(page, line).into_iter().collect();

            for &(_, cents) in amounts.iter().filter(|(_, cents)| *cents != 0) {
                let (amount_type, amount_cents) = match amount_type {
                    AmountType::Unknown if cents < 0 => (AmountType::Payment, -cents),
                    kind => (kind, cents),
                };
                lines.push(BillingLine {
                    line_id: String::new(),
                    provider_id: provider_id.clone(),
                    service_date,
                    description: line.chars().take(MAX_DESCRIPTION_CHARS).collect(),
                    code: code.clone(),
                    amount_cents,
                    amount_type,
                    page_number: page.page_number,
                    citation_ids: citation_ids.clone(),
                    confidence: if code.is_some() { CODED_CONFIDENCE } else { UNCODED_CONFIDENCE },
                });
            }
        }
    }

    lines.sort_by(|a, b| {
        a.service_date
            .cmp(&b.service_date)
            .then_with(|| a.provider_id.cmp(&b.provider_id))
            .then(a.amount_cents.cmp(&b.amount_cents))
            .then(a.page_number.cmp(&b.page_number))
    });
    let mut ids = IdAllocator::new("bl", 4);
    for line in &mut lines {
        line.line_id = ids.next_id();
    }

    tracing::info!(billing_pages = billing.len(), lines = lines.len(), "Built billing ledger");
    BillingLedger {
        billing_pages: billing.len(),
        lines,
    }
}
