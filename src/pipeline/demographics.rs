//! Patient demographics as stated in the records.
//!
//! Each field is voted on across every line of every page. Narrative
//! mentions ("45 year old male") outweigh header fields ("Sex: M") for sex;
//! age is the median of every stated age. Full dates of birth only.

use std::sync::LazyLock;

use regex::Regex;

use crate::models::{Page, PatientDemographics, Sex};
use crate::pipeline::context::RunContext;
use crate::pipeline::dates::parse_date;

const NARRATIVE_WEIGHT: u32 = 10;
const HEADER_WEIGHT: u32 = 5;
const FIELD_WEIGHT: u32 = 1;
const MAX_SEX_CONFIDENCE: u32 = 95;
const SPLIT_SEX_CONFIDENCE: u8 = 50;
const MAX_AGE: u32 = 120;

fn pattern(p: &str) -> Regex {
    Regex::new(p).expect("demographics pattern is valid")
}

static NAME: LazyLock<Regex> =
    LazyLock::new(|| pattern(r"(?i)\bpatient\s*name\s*:\s*(?P<v>[a-z][a-z ,.'-]{3,48})"));

/// Another header label following the name on the same line.
static NAME_TAIL: LazyLock<Regex> = LazyLock::new(|| {
    pattern(r"(?i)\s+(?:dob|d\.o\.b|date\s+of\s+birth|mrn|sex|gender|age|acct|account)\b.*$")
});

static MRN: LazyLock<Regex> = LazyLock::new(|| {
    pattern(r"(?i)\b(?:mrn|medical\s+record\s+(?:number|no\.?|#))\s*[:#]?\s*(?P<v>[a-z0-9-]*\d[a-z0-9-]*)")
});

static NARRATIVE: LazyLock<Regex> = LazyLock::new(|| {
    pattern(r"(?i)\b(?P<age>\d{1,3})\s*-?\s*(?:years?[- ]old|yo|y/o)\s*-?\s*(?P<sex>female|male|woman|man|f|m)\b")
});

static SEX_HEADER: LazyLock<Regex> =
    LazyLock::new(|| pattern(r"(?i)\b(?:sex|gender)\s*:\s*(?P<v>female|male|f|m)\b"));

static AGE_HEADER: LazyLock<Regex> = LazyLock::new(|| pattern(r"(?i)\bage\s*:\s*(?P<v>\d{1,3})\b"));

static DOB: LazyLock<Regex> =
    LazyLock::new(|| pattern(r"(?i)\b(?:dob|d\.o\.b\.?|date\s+of\s+birth)\s*:?\s*(?P<v>.+)$"));

/// One mention of a value and where it was seen.
#[derive(Debug)]
struct Vote<T> {
    value: T,
    weight: u32,
    page: usize,
    line: String,
}

#[derive(Debug, Default)]
struct Ballots {
    names: Vec<Vote<String>>,
    mrns: Vec<Vote<String>>,
    sexes: Vec<Vote<Sex>>,
    ages: Vec<Vote<u32>>,
    dobs: Vec<Vote<chrono::NaiveDate>>,
}

fn parse_sex(word: &str) -> Option<Sex> {
    match word.to_lowercase().as_str() {
        "male" | "man" | "m" => Some(Sex::Male),
        "female" | "woman" | "f" => Some(Sex::Female),
        _ => None,
    }
}

fn clean_name(raw: &str) -> Option<String> {
    let name = NAME_TAIL.replace(raw, "");
    let name = name.trim().trim_end_matches([',', '.', '-']).trim();
    (name.len() >= 4).then(|| name.split_whitespace().collect::<Vec<_>>().join(" "))
}

fn vote<T>(value: T, weight: u32, page: usize, line: &str) -> Vote<T> {
    Vote {
        value,
        weight,
        page,
        line: line.to_string(),
    }
}

impl Ballots {
    fn read_line(&mut self, page: usize, line: &str) {
        if let Some(name) = NAME.captures(line).and_then(|c| clean_name(&c["v"])) {
            self.names.push(vote(name, FIELD_WEIGHT, page, line));
        }
        if let Some(c) = MRN.captures(line) {
            self.mrns.push(vote(c["v"].to_uppercase(), FIELD_WEIGHT, page, line));
        }
        for c in NARRATIVE.captures_iter(line) {
            if let Some(sex) = parse_sex(&c["sex"]) {
                self.sexes.push(vote(sex, NARRATIVE_WEIGHT, page, line));
            }
            if let Ok(age) = c["age"].parse() {
                self.ages.push(vote(age, FIELD_WEIGHT, page, line));
            }
        }
        if let Some(sex) = SEX_HEADER.captures(line).and_then(|c| parse_sex(&c["v"])) {
            self.sexes.push(vote(sex, HEADER_WEIGHT, page, line));
        }
        if let Some(age) = AGE_HEADER.captures(line).and_then(|c| c["v"].parse().ok()) {
            self.ages.push(vote(age, FIELD_WEIGHT, page, line));
        }
        if let Some(dob) = DOB.captures(line).and_then(|c| parse_date(&c["v"])) {
            self.dobs.push(vote(dob, FIELD_WEIGHT, page, line));
        }
    }

    fn is_empty(&self) -> bool {
        self.names.is_empty()
            && self.mrns.is_empty()
            && self.sexes.is_empty()
            && self.ages.is_empty()
            && self.dobs.is_empty()
    }
}

/// Summed weight per distinct value, in first-seen order. The vote kept for
/// each value is its first mention.
fn tally<T: PartialEq>(votes: &[Vote<T>]) -> Vec<(&Vote<T>, u32)> {
    let mut out: Vec<(&Vote<T>, u32)> = Vec::new();
    for vote in votes {
        match out.iter().position(|(first, _)| first.value == vote.value) {
            Some(i) => out[i].1 += vote.weight,
            None => out.push((vote, vote.weight)),
        }
    }
    out
}

/// Heaviest value; ties go to the value seen first.
fn leader<T: PartialEq>(votes: &[Vote<T>]) -> Option<&Vote<T>> {
    let mut best: Option<(&Vote<T>, u32)> = None;
    for (vote, weight) in tally(votes) {
        if best.map_or(true, |(_, w)| weight > w) {
            best = Some((vote, weight));
        }
    }
    best.map(|(vote, _)| vote)
}

fn resolve_sex(votes: &[Vote<Sex>]) -> Option<(&Vote<Sex>, Sex, u8)> {
    let mut tallied = tally(votes);
    // Stable, so equal weights keep first-seen order
    tallied.sort_by(|a, b| b.1.cmp(&a.1));
    let (&(top, top_weight), rest) = tallied.split_first()?;
    if rest.first().is_some_and(|(_, w)| *w == top_weight) {
        return Some((top, Sex::Uncertain, SPLIT_SEX_CONFIDENCE));
    }
    let total: u32 = tallied.iter().map(|(_, w)| w).sum();
    let share = (top_weight * 100 / total).min(MAX_SEX_CONFIDENCE);
    Some((top, top.value, share as u8))
}

/// Lower median of the plausible ages and the first mention of that age.
fn resolve_age(votes: &[Vote<u32>]) -> Option<&Vote<u32>> {
    let mut ages: Vec<u32> = votes.iter().map(|v| v.value).filter(|a| *a <= MAX_AGE).collect();
    if ages.is_empty() {
        return None;
    }
    ages.sort_unstable();
    let median = ages[(ages.len() - 1) / 2];
    votes.iter().find(|v| v.value == median)
}

/// Name, MRN, sex, age and date of birth, each cited to its first
/// supporting line. `None` when the records state none of them.
pub fn extract_demographics(pages: &[Page], ctx: &mut RunContext) -> Option<PatientDemographics> {
    let mut ballots = Ballots::default();
    for (index, page) in pages.iter().enumerate() {
        for line in page.text.lines() {
            ballots.read_line(index, line.trim());
        }
    }
    if ballots.is_empty() {
        return None;
    }

    let mut evidence: Vec<(usize, &str)> = Vec::new();
    let mut out = PatientDemographics::default();

    if let Some(v) = leader(&ballots.names) {
        out.name = Some(v.value.clone());
        evidence.push((v.page, v.line.as_str()));
    }
    if let Some(v) = leader(&ballots.mrns) {
        out.mrn = Some(v.value.clone());
        evidence.push((v.page, v.line.as_str()));
    }
    if let Some((v, sex, confidence)) = resolve_sex(&ballots.sexes) {
        out.sex = Some(sex);
        out.sex_confidence = confidence;
        evidence.push((v.page, v.line.as_str()));
    }
    if let Some(v) = resolve_age(&ballots.ages) {
        out.age = Some(v.value);
        evidence.push((v.page, v.line.as_str()));
    }
    if let Some(v) = leader(&ballots.dobs) {
        out.dob = Some(v.value);
        evidence.push((v.page, v.line.as_str()));
    }

    for (page, line) in evidence {
        if let Some(id) = ctx.cite(&pages[page], line) {
            if !out.citation_ids.contains(&id) {
                out.citation_ids.push(id);
            }
        }
    }

    tracing::info!(
        name = out.name.is_some(),
        mrn = out.mrn.is_some(),
        sex = ?out.sex,
        age = ?out.age,
        dob = out.dob.is_some(),
        "Extracted patient demographics"
    );
    Some(out)
}
