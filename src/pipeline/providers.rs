//! Provider detection and clustering.
//!
//! Names come from labeled fields (tier 1) and letterhead lines at the top
//! of a page (tier 2). Mentions are normalized and clustered by token-set
//! Jaccard similarity against existing clusters in creation order, so the
//! same input always yields the same provider ids.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use regex::Regex;

use crate::models::{
    CareSetting, Event, EvidenceTier, Page, PageType, Provider, ProviderEvidence, ProviderKind, Warning,
    WarningCode,
};
use crate::pipeline::context::RunContext;

/// Minimum token-set similarity for two mentions to be the same provider.
pub const CLUSTER_THRESHOLD: f64 = 0.6;

const MIN_NAME_CHARS: usize = 3;
const MAX_NAME_CHARS: usize = 120;
const MIN_LETTERHEAD_CHARS: usize = 6;

static LABELED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*(?P<label>facility|clinic|hospital|rendering provider|provider|attending(?:\s+physician)?|physician|radiologist|therapist|treating therapist)\s*:\s*(?P<name>.+)$",
    )
    .expect("provider label pattern is valid")
});

static SIGNED_BY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:electronically\s+)?signed\s+by\s*:?\s*(?P<name>.+)$")
        .expect("signed-by pattern is valid")
});

/// Trailing "on 01/02/2024" or any date / time on a signature line.
static TRAILING_NOISE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\s+(on|at)\s+\d.*$|\s+\d{1,2}[/-]\d{1,2}[/-]\d{2,4}.*$")
        .expect("trailing noise pattern is valid")
});

const FACILITY_KEYWORDS: &[&str] = &[
    "hospital",
    "medical",
    "clinic",
    "center",
    "centre",
    "health",
    "radiology",
    "imaging",
    "therapy",
    "rehabilitation",
    "rehab",
    "orthopedic",
    "chiropractic",
    "urgent care",
    "associates",
    "group",
    "emergency",
];

const CREDENTIAL_SUFFIXES: &[&str] = &[
    "md", "do", "pa", "pa-c", "np", "rn", "dc", "dpt", "pt", "dpm", "llc", "inc", "pc", "pllc", "corp",
];

const SYNONYMS: &[(&str, &str)] = &[
    ("st", "saint"),
    ("ctr", "center"),
    ("hosp", "hospital"),
    ("med", "medical"),
    ("&", "and"),
];

/// A provider name found on a page.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderCandidate {
    pub name: String,
    pub kind: ProviderKind,
    pub tier: EvidenceTier,
    pub page_number: u32,
    /// Full source line, used as the citation snippet
    pub line: String,
}

/// Provider chosen for one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageProvider {
    pub provider_id: String,
    pub tier: EvidenceTier,
}

#[derive(Debug, Default)]
pub struct ProviderResolution {
    pub providers: Vec<Provider>,
    pub page_providers: BTreeMap<u32, PageProvider>,
}

fn has_facility_keyword(name: &str) -> bool {
    let lower = name.to_lowercase();
    FACILITY_KEYWORDS.iter().any(|kw| lower.contains(kw))
}

fn clean_name(raw: &str) -> Option<String> {
    let trimmed = TRAILING_NOISE.replace(raw.trim(), "");
    let name = trimmed.trim().trim_matches(|c: char| c == ',' || c == ';' || c == '-').trim();
    let chars = name.chars().count();
    if (MIN_NAME_CHARS..=MAX_NAME_CHARS).contains(&chars) && name.chars().any(char::is_alphabetic) {
        Some(name.to_string())
    } else {
        None
    }
}

/// Extract every provider candidate on a page, in text order.
pub fn find_candidates(page: &Page) -> Vec<ProviderCandidate> {
    let mut out = Vec::new();
    let lines: Vec<&str> = page.text.lines().collect();

    for line in &lines {
        if let Some(caps) = LABELED.captures(line) {
            let label = caps.name("label").map_or("", |m| m.as_str()).to_lowercase();
            let Some(name) = caps.name("name").and_then(|m| clean_name(m.as_str())) else {
                continue;
            };
            let facility_label = matches!(label.as_str(), "facility" | "clinic" | "hospital");
            let kind = if facility_label || has_facility_keyword(&name) {
                ProviderKind::Facility
            } else {
                ProviderKind::Clinician
            };
            out.push(ProviderCandidate {
                name,
                kind,
                tier: EvidenceTier::Tier1,
                page_number: page.page_number,
                line: line.trim().to_string(),
            });
        } else if let Some(caps) = SIGNED_BY.captures(line) {
            let Some(name) = caps.name("name").and_then(|m| clean_name(m.as_str())) else {
                continue;
            };
            out.push(ProviderCandidate {
                kind: if has_facility_keyword(&name) {
                    ProviderKind::Facility
                } else {
                    ProviderKind::Clinician
                },
                name,
                tier: EvidenceTier::Tier1,
                page_number: page.page_number,
                line: line.trim().to_string(),
            });
        }
    }

    let top = lines.len().div_ceil(5).max(3).min(lines.len());
    for line in &lines[..top] {
        let text = line.trim();
        let chars = text.chars().count();
        if !(MIN_LETTERHEAD_CHARS..=MAX_NAME_CHARS).contains(&chars)
            || text.ends_with('.')
            || text.contains(':')
            || !text.chars().any(|c| c.is_ascii_uppercase())
            || !has_facility_keyword(text)
        {
            continue;
        }
        out.push(ProviderCandidate {
            name: text.to_string(),
            kind: ProviderKind::Facility,
            tier: EvidenceTier::Tier2,
            page_number: page.page_number,
            line: text.to_string(),
        });
    }

    out
}

/// Canonical comparison form of a provider name.
pub fn normalize_name(raw: &str) -> String {
    let lowered = raw.to_lowercase().replace('&', " & ");
    let mut tokens: Vec<String> = lowered
        .split_whitespace()
        .map(|t| {
            t.chars()
                .filter(|c| c.is_alphanumeric() || *c == '-' || *c == '&')
                .collect::<String>()
        })
        .filter(|t| !t.is_empty() && t != "-")
        .collect();

    if tokens.first().is_some_and(|t| t == "dr") && tokens.len() > 1 {
        tokens.remove(0);
    }

    let without_suffixes: Vec<String> = tokens
        .iter()
        .filter(|t| !CREDENTIAL_SUFFIXES.contains(&t.as_str()))
        .cloned()
        .collect();
    if !without_suffixes.is_empty() {
        tokens = without_suffixes;
    }

    tokens
        .into_iter()
        .map(|t| {
            let t = t.replace('-', "");
            SYNONYMS
                .iter()
                .find(|(from, _)| *from == t)
                .map_or(t, |(_, to)| (*to).to_string())
        })
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Token-set Jaccard similarity of two normalized names.
pub fn jaccard(a: &str, b: &str) -> f64 {
    let ta: BTreeSet<&str> = a.split_whitespace().collect();
    let tb: BTreeSet<&str> = b.split_whitespace().collect();
    if ta.is_empty() || tb.is_empty() {
        return 0.0;
    }
    let inter = ta.intersection(&tb).count() as f64;
    let union = ta.union(&tb).count() as f64;
    inter / union
}

fn care_setting_for(name: &str, page_type: Option<PageType>) -> CareSetting {
    let lower = format!(" {} ", name.to_lowercase());
    let has = |kws: &[&str]| kws.iter().any(|kw| lower.contains(kw));

    if has(&["emergency", " er ", " ed "]) {
        CareSetting::Er
    } else if has(&["radiology", "imaging", " mri", "diagnostic"]) {
        CareSetting::Imaging
    } else if has(&["physical therapy", "rehab", " pt ", "physiotherapy"]) {
        CareSetting::Pt
    } else if has(&["hospital", "medical center"]) {
        CareSetting::Hospital
    } else if has(&["family medicine", "primary care", "internal medicine", "family practice"]) {
        CareSetting::Pcp
    } else if has(&["orthopedic", "neurology", "spine", "pain", "surgery", "chiropractic", "neurosurg"]) {
        CareSetting::Specialist
    } else {
        match page_type {
            Some(PageType::ImagingReport) => CareSetting::Imaging,
            Some(PageType::PtNote) => CareSetting::Pt,
            _ => CareSetting::Unknown,
        }
    }
}

struct Cluster {
    provider: Provider,
    normalized: String,
}

/// Detect, cluster and cite providers across all pages.
pub fn resolve_providers(pages: &[Page], ctx: &mut RunContext) -> ProviderResolution {
    let mut clusters: Vec<Cluster> = Vec::new();
    let mut page_best: BTreeMap<u32, (ProviderKind, EvidenceTier, usize, String)> = BTreeMap::new();
    let mut mentions = 0usize;

    for page in pages {
        for (order, candidate) in find_candidates(page).into_iter().enumerate() {
            let normalized = normalize_name(&candidate.name);
            if normalized.is_empty() {
                continue;
            }
            let Some(citation_id) = ctx.cite(page, &candidate.line) else {
                continue;
            };
            mentions += 1;

            let mut best: Option<(usize, f64)> = None;
            for (idx, cluster) in clusters.iter().enumerate() {
                let score = jaccard(&normalized, &cluster.normalized);
                if score >= CLUSTER_THRESHOLD && best.map_or(true, |(_, s)| score > s) {
                    best = Some((idx, score));
                }
            }

            let idx = match best {
                Some((idx, _)) => idx,
                None => {
                    let provider_id = ctx.provider_ids.next_id();
                    tracing::debug!(provider_id = %provider_id, name = %candidate.name, "New provider cluster");
                    clusters.push(Cluster {
                        provider: Provider {
                            provider_id,
                            display_name: candidate.name.clone(),
                            normalized_name: normalized.clone(),
                            kind: candidate.kind,
                            care_setting: care_setting_for(&candidate.name, Some(page.page_type)),
                            first_seen: None,
                            last_seen: None,
                            event_count: 0,
                            evidence: Vec::new(),
                        },
                        normalized,
                    });
                    clusters.len() - 1
                }
            };

            let cluster = &mut clusters[idx];
            cluster.provider.evidence.push(ProviderEvidence {
                page_number: page.page_number,
                citation_id,
                tier: candidate.tier,
            });

            // Facility beats clinician, then tier 1 beats tier 2, then text order
            let rank = (candidate.kind, candidate.tier, order);
            let better = page_best
                .get(&page.page_number)
                .map_or(true, |(k, t, o, _)| rank < (*k, *t, *o));
            if better {
                page_best.insert(
                    page.page_number,
                    (candidate.kind, candidate.tier, order, cluster.provider.provider_id.clone()),
                );
            }
        }
    }

    if clusters.is_empty() {
        ctx.warn(Warning::new(
            WarningCode::NoProvidersDetected,
            "No provider names could be detected on any page",
        ));
    }

    let page_providers = page_best
        .into_iter()
        .map(|(page, (_, tier, _, provider_id))| (page, PageProvider { provider_id, tier }))
        .collect();

    let providers: Vec<Provider> = clusters.into_iter().map(|c| c.provider).collect();
    tracing::info!(mentions, providers = providers.len(), "Resolved providers");

    ProviderResolution {
        providers,
        page_providers,
    }
}

/// Fill first/last seen dates and event counts from the final event list.
pub fn apply_event_stats(providers: &mut [Provider], events: &[Event]) {
    for provider in providers.iter_mut() {
        let linked: Vec<&Event> = events
            .iter()
            .filter(|e| e.provider_id.as_deref() == Some(provider.provider_id.as_str()))
            .collect();
        provider.event_count = linked.len() as u32;
        provider.first_seen = linked.iter().filter_map(|e| e.start_date()).min();
        provider.last_seen = linked.iter().filter_map(|e| e.end_date()).max();
    }
}
