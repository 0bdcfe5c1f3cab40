use std::collections::BTreeMap;

use chrono::Duration;

use crate::models::{Gap, GapScope, GapSeverity, Provider, RecordRequest, RequestPriority};
use crate::pipeline::events::common::push_unique;

const UNKNOWN_PROVIDER: &str = "Unknown Provider";

/// Records requests per provider. Suggested ranges from provider gaps are
/// merged when they overlap or sit at most one day apart; a merged request
/// is urgent when any of its gaps is high severity.
pub fn build_record_requests(gaps: &[Gap], providers: &[Provider]) -> Vec<RecordRequest> {
    let mut by_provider: BTreeMap<&str, Vec<&Gap>> = BTreeMap::new();
    for gap in gaps.iter().filter(|g| g.scope == GapScope::Provider) {
        if let (Some(provider_id), Some(_)) = (gap.provider_id.as_deref(), gap.suggested_request) {
            by_provider.entry(provider_id).or_default().push(gap);
        }
    }

    let mut requests = Vec::new();
    for (provider_id, mut provider_gaps) in by_provider {
        provider_gaps.sort_by(|a, b| {
            let ra = a.suggested_request.map(|r| (r.from, r.to));
            let rb = b.suggested_request.map(|r| (r.from, r.to));
            ra.cmp(&rb).then(a.gap_id.cmp(&b.gap_id))
        });

        let provider_name = providers
            .iter()
            .find(|p| p.provider_id == provider_id)
            .map_or(UNKNOWN_PROVIDER, |p| p.display_name.as_str());

        let mut current: Option<RecordRequest> = None;
        for gap in provider_gaps {
            let Some(range) = gap.suggested_request else { continue };
            let priority = match gap.severity {
                GapSeverity::High => RequestPriority::Urgent,
                GapSeverity::Medium => RequestPriority::Standard,
            };

            let adjacent = current
                .as_ref()
                .is_some_and(|request| range.from <= request.to + Duration::days(1));
            match current.as_mut() {
                Some(request) if adjacent => {
                    request.to = request.to.max(range.to);
                    if priority == RequestPriority::Urgent {
                        request.priority = RequestPriority::Urgent;
                    }
                    request.gap_ids.push(gap.gap_id.clone());
                    push_unique(&mut request.citation_ids, gap.citations_before.iter().cloned());
                    push_unique(&mut request.citation_ids, gap.citations_after.iter().cloned());
                }
                _ => {
                    let mut citation_ids = gap.citations_before.clone();
                    push_unique(&mut citation_ids, gap.citations_after.iter().cloned());
                    let next = RecordRequest {
                        provider_id: provider_id.to_string(),
                        provider_name: provider_name.to_string(),
                        from: range.from,
                        to: range.to,
                        priority,
                        gap_ids: vec![gap.gap_id.clone()],
                        citation_ids,
                    };
                    requests.extend(current.replace(next));
                }
            }
        }
        requests.extend(current);
    }

    tracing::info!(requests = requests.len(), "Built records requests");
    requests
}
