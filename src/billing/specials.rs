use std::collections::{BTreeMap, BTreeSet, HashSet};

use chrono::NaiveDate;

use crate::models::{
    AmountType, BillingLedger, BillingLine, Provider, ProviderSpecials, SpecialsCoverage, SpecialsFlag,
    SpecialsSummary, SpecialsTotals,
};

const BASE_CONFIDENCE: u8 = 70;
/// Applied once when the summary carries any flag.
const FLAGGED_PERCENT: u32 = 80;
/// Applied once when duplicate lines were removed.
const DUPLICATES_PERCENT: u32 = 95;
const MAX_DESCRIPTION_KEY_CHARS: usize = 80;
const MAX_PROVIDER_CITATIONS: usize = 5;
const UNRESOLVED_PROVIDER: &str = "Unresolved provider";

/// Same provider, date, code, amount and description means the same line
/// printed on more than one statement.
type DedupKey = (Option<String>, Option<NaiveDate>, Option<String>, i64, String);

fn dedup_key(line: &BillingLine) -> DedupKey {
    (
        line.provider_id.clone(),
        line.service_date,
        line.code.clone(),
        line.amount_cents,
        line.description
            .trim()
            .to_lowercase()
            .chars()
            .take(MAX_DESCRIPTION_KEY_CHARS)
            .collect(),
    )
}

fn scale(confidence: u8, percent: u32) -> u8 {
    (u32::from(confidence) * percent / 100) as u8
}

/// Which buckets appear anywhere in the ledger. Absent buckets stay `None`
/// in every total.
#[derive(Debug, Default, Clone, Copy)]
struct Present {
    payments: bool,
    adjustments: bool,
    balance: bool,
    stated: bool,
}

#[derive(Debug, Default)]
struct Sums {
    charges: i64,
    payments: i64,
    adjustments: i64,
    balance: i64,
    stated: i64,
}

impl Sums {
    fn add(&mut self, line: &BillingLine, present: &mut Present) {
        let cents = line.amount_cents;
        match line.amount_type {
            AmountType::Charge | AmountType::Unknown => self.charges += cents,
            AmountType::Payment | AmountType::Copay | AmountType::Coinsurance => {
                self.payments += cents;
                present.payments = true;
            }
            AmountType::Adjustment | AmountType::Writeoff => {
                self.adjustments += cents;
                present.adjustments = true;
            }
            AmountType::Balance | AmountType::Deductible => {
                self.balance += cents;
                present.balance = true;
            }
            AmountType::Total => {
                self.stated += cents;
                present.stated = true;
            }
        }
    }

    fn totals(&self, present: Present) -> SpecialsTotals {
        SpecialsTotals {
            charges_cents: self.charges,
            payments_cents: present.payments.then_some(self.payments),
            adjustments_cents: present.adjustments.then_some(self.adjustments),
            balance_cents: present.balance.then_some(self.balance),
            stated_totals_cents: present.stated.then_some(self.stated),
        }
    }
}

#[derive(Debug, Default)]
struct Bucket {
    sums: Sums,
    line_count: usize,
    citation_ids: BTreeSet<String>,
}

/// Totals over the ledger after dropping duplicate lines, with a
/// per-provider breakdown. Unresolved lines are grouped last.
pub fn specials_summary(ledger: &BillingLedger, providers: &[Provider]) -> SpecialsSummary {
    if ledger.lines.is_empty() {
        return SpecialsSummary {
            totals: SpecialsTotals::default(),
            by_provider: Vec::new(),
            coverage: SpecialsCoverage {
                billing_pages: ledger.billing_pages,
                ..SpecialsCoverage::default()
            },
            lines_raw: 0,
            lines_deduped: 0,
            confidence: 0,
            flags: vec![SpecialsFlag::NoBillingData],
        };
    }

    let mut seen = HashSet::new();
    let deduped: Vec<&BillingLine> = ledger.lines.iter().filter(|l| seen.insert(dedup_key(l))).collect();

    let mut present = Present::default();
    let mut overall = Sums::default();
    let mut buckets: BTreeMap<Option<&str>, Bucket> = BTreeMap::new();
    for line in &deduped {
        overall.add(line, &mut present);
        let bucket = buckets.entry(line.provider_id.as_deref()).or_default();
        bucket.sums.add(line, &mut present);
        bucket.line_count += 1;
        bucket.citation_ids.extend(line.citation_ids.iter().cloned());
    }

    let mut by_provider: Vec<ProviderSpecials> = buckets
        .into_iter()
        .map(|(provider_id, bucket)| {
            let display_name = match provider_id {
                Some(id) => providers
                    .iter()
                    .find(|p| p.provider_id == id)
                    .map_or_else(|| id.to_string(), |p| p.display_name.clone()),
                None => UNRESOLVED_PROVIDER.to_string(),
            };
            let (confidence, flags) = match provider_id {
                Some(_) => (BASE_CONFIDENCE, Vec::new()),
                None => (
                    scale(BASE_CONFIDENCE, FLAGGED_PERCENT),
                    vec![SpecialsFlag::ProviderUnresolved],
                ),
            };
            ProviderSpecials {
                provider_id: provider_id.map(str::to_string),
                display_name,
                totals: bucket.sums.totals(present),
                line_count: bucket.line_count,
                confidence,
                flags,
                citation_ids: bucket.citation_ids.into_iter().take(MAX_PROVIDER_CITATIONS).collect(),
            }
        })
        .collect();
    by_provider.sort_by_key(|p| p.provider_id.is_none());

    let mut flags = Vec::new();
    if !present.payments {
        flags.push(SpecialsFlag::MissingEobData);
    }
    if !present.adjustments {
        flags.push(SpecialsFlag::PartialBillingOnly);
    }

    let mut confidence = BASE_CONFIDENCE;
    if !flags.is_empty() {
        confidence = scale(confidence, FLAGGED_PERCENT);
    }
    if deduped.len() < ledger.lines.len() {
        confidence = scale(confidence, DUPLICATES_PERCENT);
    }

    let dates = deduped.iter().filter_map(|l| l.service_date);
    let summary = SpecialsSummary {
        totals: overall.totals(present),
        by_provider,
        coverage: SpecialsCoverage {
            earliest_service_date: dates.clone().min(),
            latest_service_date: dates.max(),
            billing_pages: ledger.billing_pages,
        },
        lines_raw: ledger.lines.len(),
        lines_deduped: deduped.len(),
        confidence,
        flags,
    };

    tracing::info!(
        lines_raw = summary.lines_raw,
        lines_deduped = summary.lines_deduped,
        charges_cents = summary.totals.charges_cents,
        providers = summary.by_provider.len(),
        "Computed specials summary"
    );
    summary
}
