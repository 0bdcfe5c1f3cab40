//! Billing statements. Always extracted; whether they are exported is a
//! chronology decision.

use std::sync::LazyLock;

use regex::Regex;

use crate::models::{
    BillingDetails, BillingLineItem, EventDate, EventType, EvidenceTier, FactKind, PageType, SkipReason,
    SkippedEvent,
};
use crate::pipeline::context::RunContext;
use crate::pipeline::dates::{find_service_range, DateLabel};

use super::common::{EventDraft, MAX_FACT_CHARS};
use super::{EventExtractor, ExtractionInput, ExtractionOutput};

pub const BILLING_FACT_CAP: usize = 6;
pub const MAX_LINE_ITEMS: usize = 5;

/// `$1,250.00`, `$80`, `1250.00`, `-$40.00`
static AMOUNT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?P<neg>-)?\$\s*(?P<int>\d{1,3}(?:,\d{3})+|\d+)(?:\.(?P<frac>\d{2}))?|(?P<neg2>-)?\b(?P<int2>\d{1,3}(?:,\d{3})+|\d+)\.(?P<frac2>\d{2})\b",
    )
    .expect("amount pattern is valid")
});

/// Total labels in preference order.
static TOTALS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)\btotal charges\b",
        r"(?i)\btotal (amount|due|billed)\b",
        r"(?i)\btotal\b",
        r"(?i)\b(amount|balance) due\b",
        r"(?i)\bpatient balance\b",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("total pattern is valid"))
    .collect()
});

static LINE_ITEM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?:\d{1,2}/\d{1,2}/\d{2,4}\s+)?(?:cpt\s*:?\s*)?(?P<code>\d{5})(?:-?[a-z0-9]{2})?\s+(?P<desc>.+?)\s+(?P<amount>-?\$?\s?[\d,]+\.\d{2})\s*$",
    )
    .expect("line item pattern is valid")
});

/// Every amount in `text`, in order, as `(byte offset, cents)`.
pub fn find_amounts(text: &str) -> Vec<(usize, i64)> {
    AMOUNT
        .captures_iter(text)
        .filter_map(|caps| {
            let negative = caps.name("neg").or(caps.name("neg2")).is_some();
            let int = caps.name("int").or(caps.name("int2"))?.as_str().replace(',', "");
            let frac = caps.name("frac").or(caps.name("frac2")).map_or("00", |m| m.as_str());
            let dollars: i64 = int.parse().ok()?;
            let cents: i64 = frac.parse().ok()?;
            let value = dollars.checked_mul(100)?.checked_add(cents)?;
            Some((caps.get(0)?.start(), if negative { -value } else { value }))
        })
        .collect()
}

/// Parse every amount in `text`, in order, as integer cents.
pub fn parse_amounts(text: &str) -> Vec<i64> {
    find_amounts(text).into_iter().map(|(_, cents)| cents).collect()
}

/// First labeled total on the page: `(line, cents)`.
pub fn find_total(text: &str) -> Option<(String, i64)> {
    TOTALS.iter().find_map(|re| {
        text.lines()
            .map(str::trim)
            .filter(|line| re.is_match(line))
            .find_map(|line| parse_amounts(line).last().map(|&cents| (line.to_string(), cents)))
    })
}

/// CPT-coded line items: `(line, code, description, cents)`.
pub fn find_line_items(text: &str) -> Vec<(String, String, String, i64)> {
    text.lines()
        .map(str::trim)
        .filter_map(|line| {
            let caps = LINE_ITEM.captures(line)?;
            let cents = *parse_amounts(caps.name("amount")?.as_str()).last()?;
            Some((
                line.to_string(),
                caps.name("code")?.as_str().to_string(),
                caps.name("desc")?.as_str().trim().chars().take(MAX_FACT_CHARS).collect(),
                cents,
            ))
        })
        .take(MAX_LINE_ITEMS)
        .collect()
}

pub struct BillingExtractor;

impl EventExtractor for BillingExtractor {
    fn name(&self) -> &'static str {
        "billing"
    }

    fn page_types(&self) -> &'static [PageType] {
        &[PageType::Billing]
    }

    fn extract(&self, input: &ExtractionInput<'_>, ctx: &mut RunContext, out: &mut ExtractionOutput) {
        for page in input.pages_of_type(self.page_types()) {
            let skip = |reason| SkippedEvent {
                page_numbers: vec![page.page_number],
                page_type: page.page_type,
                intended_type: Some(EventType::Billing),
                reason,
            };

            let mentions = input.dates(page.page_number);
            let statement = mentions.iter().find(|m| m.label == DateLabel::StatementDate);
            let range = find_service_range(&page.text, mentions);
            let services: Vec<_> = mentions.iter().filter(|m| m.label == DateLabel::ServiceDate).collect();

            let service_span = match &range {
                Some(r) => Some((r.start, r.end, r.line.clone())),
                None => {
                    let start = services.iter().map(|m| m.date).min();
                    let end = services.iter().map(|m| m.date).max();
                    start.zip(end).zip(services.first()).map(|((s, e), m)| (s, e, m.line.clone()))
                }
            };

            let (date, date_line) = match (&service_span, statement) {
                (Some((start, end, line)), _) => (
                    EventDate::range(*start, *end, EvidenceTier::Tier1, DateLabel::ServiceDate.as_str()),
                    line.clone(),
                ),
                (None, Some(m)) => (
                    EventDate::single(m.date, EvidenceTier::Tier1, DateLabel::StatementDate.as_str()),
                    m.line.clone(),
                ),
                (None, None) => {
                    out.skipped.push(skip(SkipReason::NoBillingDate));
                    continue;
                }
            };

            let total = find_total(&page.text);
            let items = find_line_items(&page.text);
            if total.is_none() && items.is_empty() {
                out.skipped.push(skip(SkipReason::NoAmounts));
                continue;
            }

            let mut draft = EventDraft::new(EventType::Billing, vec![page.page_number]);
            draft.date = Some(date);
            draft.date_citation = ctx.cite(page, &date_line);
            draft.anchored = total.is_some();

            if let Some((line, _)) = &total {
                draft.add_fact(FactKind::Total, line, page.page_number, input, ctx);
            }
            let mut line_items = Vec::new();
            for (line, code, description, amount_cents) in &items {
                draft.add_fact(FactKind::Charge, line, page.page_number, input, ctx);
                if let Some(citation_id) = ctx.cite(page, line) {
                    line_items.push(BillingLineItem {
                        code: Some(code.clone()),
                        description: description.clone(),
                        amount_cents: *amount_cents,
                        citation_id,
                    });
                }
            }

            draft.billing = Some(BillingDetails {
                statement_date: statement.map(|m| m.date),
                service_start: service_span.as_ref().map(|(s, _, _)| *s),
                service_end: service_span.as_ref().map(|(_, e, _)| *e),
                total_cents: total.map(|(_, cents)| cents),
                line_items,
            });

            out.events.push(draft.finish(input, ctx, BILLING_FACT_CAP));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DateValue;
    use crate::pipeline::events::test_support::{page, run};
    use crate::pipeline_config::RunConfig;
    use chrono::NaiveDate;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn amounts_parse_to_cents() {
        assert_eq!(parse_amounts("Total: $1,250.00"), vec![125_000]);
        assert_eq!(parse_amounts("$80 and 12.34"), vec![8_000, 1_234]);
        assert_eq!(parse_amounts("Adjustment -$40.00"), vec![-4_000]);
        assert!(parse_amounts("CPT 99213").is_empty());
    }

    #[test]
    fn amount_offsets_point_at_the_amount() {
        let line = "99213 Office visit $150.00";
        assert_eq!(find_amounts(line), vec![(19, 15_000)]);
    }

    #[test]
    fn statement_with_range_and_items() {
        let text = "Valley Orthopedics Billing\nStatement Date: 03/15/2024\n\
                    Dates of Service: 03/01/2024 - 03/09/2024\n\
                    99213 Office visit est patient $150.00\n\
                    97110 Therapeutic exercise $75.50\n\
                    Total Charges: $225.50\nAmount Due: $225.50";
        let (out, ctx) = run(vec![page(1, text, PageType::Billing)], RunConfig::default(), &BillingExtractor);
        let event = &out.events[0];
        assert_eq!(event.event_type, EventType::Billing);
        assert_eq!(
            event.date.as_ref().unwrap().value,
            DateValue::Range { start: d(2024, 3, 1), end: d(2024, 3, 9) }
        );
        let billing = event.billing.as_ref().unwrap();
        assert_eq!(billing.statement_date, Some(d(2024, 3, 15)));
        assert_eq!(billing.total_cents, Some(22_550));
        assert_eq!(billing.line_items.len(), 2);
        assert_eq!(billing.line_items[0].code.as_deref(), Some("99213"));
        assert_eq!(billing.line_items[1].amount_cents, 7_550);
        assert!(ctx.citations.get(&billing.line_items[0].citation_id).is_some());
        assert!(!event.strong_cue);
        assert_eq!(event.facts[0].kind, FactKind::Total);
    }

    #[test]
    fn statement_date_used_without_service_dates() {
        let text = "Statement Date: 04/01/2024\nBalance Due: $90.00";
        let (out, _) = run(vec![page(1, text, PageType::Billing)], RunConfig::default(), &BillingExtractor);
        assert_eq!(out.events[0].start_date(), Some(d(2024, 4, 1)));
    }

    #[test]
    fn skip_reasons() {
        let pages = vec![
            page(1, "Itemized statement\nTotal Charges: $500.00", PageType::Billing),
            page(2, "Statement Date: 04/01/2024\nInsurance pending", PageType::Billing),
        ];
        let (out, _) = run(pages, RunConfig::default(), &BillingExtractor);
        let reasons: Vec<SkipReason> = out.skipped.iter().map(|s| s.reason).collect();
        assert_eq!(reasons, vec![SkipReason::NoBillingDate, SkipReason::NoAmounts]);
    }

    #[test]
    fn line_items_capped() {
        let text = (0..8).map(|i| format!("9921{i} Visit {i} $10.00")).collect::<Vec<_>>().join("\n");
        assert_eq!(find_line_items(&text).len(), MAX_LINE_ITEMS);
    }
}
