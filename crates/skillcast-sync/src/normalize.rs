//! Raw posting to canonical posting.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use scraper::Html;
use skillcast_adapters::RegionLookup;
use skillcast_core::{
    content_fingerprint, parse_posted_date, CanonicalPosting, Granularity, PipelineConfig,
    PipelineError, RawPosting, Seniority, WorkArrangement,
};

const MINOR_WORDS: &[&str] = &["a", "an", "and", "at", "for", "in", "of", "on", "or", "the", "to", "with"];

const HYBRID_MARKERS: &[&str] = &[
    "hybrid",
    "partially remote",
    "flexible work",
    "flexible location",
    "flexible working",
];
const REMOTE_MARKERS: &[&str] = &[
    "remote",
    "work from home",
    "wfh",
    "work from anywhere",
    "fully remote",
    "remotely",
];

pub struct Normalizer {
    granularity: Granularity,
    boilerplate: Vec<String>,
    regions: Arc<dyn RegionLookup>,
    as_of: DateTime<Utc>,
}

impl Normalizer {
    /// `as_of` anchors relative timestamps such as "2 days ago".
    pub fn new(config: &PipelineConfig, regions: Arc<dyn RegionLookup>, as_of: DateTime<Utc>) -> Self {
        Self {
            granularity: config.granularity,
            boilerplate: config
                .normalize
                .boilerplate_phrases
                .iter()
                .map(|p| p.to_lowercase())
                .collect(),
            regions,
            as_of,
        }
    }

    pub fn normalize(&self, raw: &RawPosting) -> Result<CanonicalPosting, PipelineError> {
        let malformed = |reason: String| PipelineError::malformed(&raw.source_id, &raw.source_native_id, reason);

        let raw_title = non_empty(raw.title.as_deref()).ok_or_else(|| malformed("missing title".into()))?;
        let raw_body = non_empty(raw.body.as_deref()).ok_or_else(|| malformed("missing body".into()))?;
        let posted_text =
            non_empty(raw.posted_at.as_deref()).ok_or_else(|| malformed("missing posted timestamp".into()))?;
        let posted_on = parse_posted_date(posted_text, self.as_of)
            .ok_or_else(|| malformed(format!("unparseable posted timestamp `{posted_text}`")))?;

        let title = normalize_title(&strip_markup(raw_title));
        if title.is_empty() {
            return Err(malformed("title is empty after cleanup".into()));
        }
        let body = self.clean_body(raw_body);
        if body.is_empty() {
            return Err(malformed("body is empty after cleanup".into()));
        }

        let location = raw.location.as_deref().unwrap_or_default();
        let region = self.regions.resolve(location);
        let period = self.granularity.bucket(posted_on);
        let fingerprint = content_fingerprint(&title, &body, &region, period);

        Ok(CanonicalPosting {
            source: raw.source_ref(),
            seniority: detect_seniority(&title),
            work_arrangement: detect_work_arrangement(&format!("{location}\n{title}\n{body}")),
            title,
            body,
            region,
            posted_on,
            period,
            salary: raw.salary.clone(),
            fingerprint,
        })
    }

    fn clean_body(&self, body: &str) -> String {
        strip_markup(body)
            .lines()
            .map(collapse_whitespace)
            .filter(|line| !line.is_empty())
            .filter(|line| {
                let lower = line.to_lowercase();
                !self.boilerplate.iter().any(|phrase| lower.contains(phrase.as_str()))
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

const BLOCK_CLOSERS: &[&str] = &[
    "</p>", "</div>", "</li>", "</tr>", "</h1>", "</h2>", "</h3>", "</h4>", "</h5>", "</h6>", "<br>", "<br/>",
    "<br />",
];

/// Visible text of an HTML fragment, one line per block element. Plain text
/// passes through untouched.
fn strip_markup(text: &str) -> String {
    if !text.contains('<') && !text.contains('&') {
        return text.to_string();
    }
    let lower = text.to_ascii_lowercase();
    let mut marked = String::with_capacity(text.len() + 16);
    let mut last = 0;
    for (idx, _) in lower.match_indices('<') {
        if let Some(tag) = BLOCK_CLOSERS.iter().find(|t| lower[idx..].starts_with(**t)) {
            let end = idx + tag.len();
            marked.push_str(&text[last..end]);
            marked.push('\n');
            last = end;
        }
    }
    marked.push_str(&text[last..]);

    Html::parse_fragment(&marked).root_element().text().collect()
}

fn cut_at<'a>(title: &'a str, separator: &str) -> &'a str {
    let lower = title.to_lowercase();
    match lower.find(separator) {
        Some(idx) if idx > 0 && title.is_char_boundary(idx) => &title[..idx],
        _ => title,
    }
}

/// Drop trailing " at Company" / " - Location" noise and normalize casing.
pub fn normalize_title(title: &str) -> String {
    let collapsed = collapse_whitespace(title);
    let mut core = collapsed.as_str();
    for separator in [" at ", " - ", " | ", " @ "] {
        core = cut_at(core, separator);
    }
    core.trim()
        .split(' ')
        .enumerate()
        .map(|(i, word)| case_word(word, i == 0))
        .collect::<Vec<_>>()
        .join(" ")
}

fn case_word(word: &str, first: bool) -> String {
    let letters = word.chars().filter(|c| c.is_alphabetic()).collect::<Vec<_>>();
    let all_upper = !letters.is_empty() && letters.iter().all(|c| c.is_uppercase());
    let all_lower = letters.iter().all(|c| c.is_lowercase());
    if all_upper && letters.len() <= 4 {
        return word.to_string();
    }
    if !all_upper && !all_lower {
        // Mixed case such as "DevOps" or "iOS" is deliberate.
        return word.to_string();
    }
    let lower = word.to_lowercase();
    if !first && MINOR_WORDS.contains(&lower.as_str()) {
        return lower;
    }
    let mut chars = lower.chars();
    match chars.next() {
        Some(c) => c.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn words(text: &str) -> String {
    let lower = text
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '%' { c } else { ' ' })
        .collect::<String>();
    format!(" {} ", collapse_whitespace(&lower))
}

fn has_phrase(padded: &str, phrase: &str) -> bool {
    padded.contains(&format!(" {phrase} "))
}

pub fn detect_seniority(title: &str) -> Seniority {
    let padded = words(title);
    let any = |phrases: &[&str]| phrases.iter().any(|p| has_phrase(&padded, p));
    if any(&["chief", "cto", "cio", "ceo", "vp", "vice president", "director", "head of"]) {
        Seniority::Executive
    } else if any(&["senior", "sr", "lead", "principal", "staff", "architect"]) {
        Seniority::Senior
    } else if any(&["junior", "jr", "entry level", "entry", "intern", "internship", "graduate", "trainee", "associate"]) {
        Seniority::EntryLevel
    } else {
        Seniority::MidLevel
    }
}

/// Hybrid markers are checked first because they usually mention "remote" too.
pub fn detect_work_arrangement(text: &str) -> WorkArrangement {
    let padded = words(text);
    if HYBRID_MARKERS.iter().any(|p| has_phrase(&padded, p)) {
        WorkArrangement::Hybrid
    } else if REMOTE_MARKERS.iter().any(|p| has_phrase(&padded, p)) || has_phrase(&padded, "100% remote") {
        WorkArrangement::Remote
    } else {
        WorkArrangement::OnSite
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};
    use skillcast_adapters::TableRegionLookup;
    use skillcast_core::RegionCode;

    fn normalizer() -> Normalizer {
        Normalizer::new(
            &PipelineConfig::default(),
            Arc::new(TableRegionLookup::new()),
            Utc.with_ymd_and_hms(2026, 3, 12, 9, 0, 0).unwrap(),
        )
    }

    fn raw(source: &str, id: &str) -> RawPosting {
        RawPosting {
            source_id: source.into(),
            source_native_id: id.into(),
            title: Some("Data Engineer".into()),
            body: Some("Build batch pipelines with Spark and SQL.".into()),
            location: Some("Austin, TX".into()),
            posted_at: Some("2026-03-10".into()),
            salary: None,
        }
    }

    #[test]
    fn identical_postings_from_two_sources_share_a_fingerprint() {
        let n = normalizer();
        let a = n.normalize(&raw("board-a", "1")).unwrap();
        let mut other = raw("board-b", "x-9");
        other.posted_at = Some("March 12, 2026".into());
        let b = n.normalize(&other).unwrap();
        assert_eq!(a.period, b.period);
        assert_eq!(a.fingerprint, b.fingerprint);
        assert_ne!(a.source, b.source);
        assert_eq!(a.region, RegionCode::new("US-TX"));
    }

    #[test]
    fn missing_required_fields_are_malformed() {
        let n = normalizer();
        let mut no_title = raw("a", "1");
        no_title.title = Some("   ".into());
        assert!(matches!(n.normalize(&no_title), Err(PipelineError::MalformedInput { reason, .. }) if reason == "missing title"));

        let mut bad_date = raw("a", "2");
        bad_date.posted_at = Some("whenever".into());
        assert!(matches!(n.normalize(&bad_date), Err(PipelineError::MalformedInput { .. })));

        let mut no_date = raw("a", "3");
        no_date.posted_at = None;
        assert!(n.normalize(&no_date).is_err());
    }

    #[test]
    fn markup_and_boilerplate_are_stripped() {
        let n = normalizer();
        let mut html = raw("a", "1");
        html.body = Some(
            "<div><p>We use <b>Rust</b> &amp; Kafka.</p><p>Apply now!</p><p>We are an Equal Opportunity Employer.</p></div>"
                .into(),
        );
        let posting = n.normalize(&html).unwrap();
        assert_eq!(posting.body, "We use Rust & Kafka.");
        assert!(!posting.body.to_lowercase().contains("apply now"));
        assert!(!posting.body.contains('<'));
    }

    #[test]
    fn relative_dates_and_unknown_locations() {
        let n = normalizer();
        let mut p = raw("a", "1");
        p.posted_at = Some("2 days ago".into());
        p.location = Some("Somewhere unknown".into());
        let posting = n.normalize(&p).unwrap();
        assert_eq!(posting.posted_on, NaiveDate::from_ymd_opt(2026, 3, 10).unwrap());
        assert!(!posting.region.is_resolved());
    }

    #[test]
    fn titles_are_trimmed_and_cased() {
        assert_eq!(normalize_title("senior data engineer at Acme Corp"), "Senior Data Engineer");
        assert_eq!(normalize_title("SENIOR SOFTWARE ENGINEER - Remote"), "Senior Software Engineer");
        assert_eq!(normalize_title("AWS DevOps engineer"), "AWS DevOps Engineer");
        assert_eq!(normalize_title("head of   product"), "Head of Product");
    }

    #[test]
    fn seniority_and_arrangement() {
        assert_eq!(detect_seniority("Sr. Backend Engineer"), Seniority::Senior);
        assert_eq!(detect_seniority("VP of Engineering"), Seniority::Executive);
        assert_eq!(detect_seniority("Junior Analyst"), Seniority::EntryLevel);
        assert_eq!(detect_seniority("Data Engineer"), Seniority::MidLevel);
        assert_eq!(detect_work_arrangement("Hybrid, remote 2 days a week"), WorkArrangement::Hybrid);
        assert_eq!(detect_work_arrangement("This is a fully remote role"), WorkArrangement::Remote);
        assert_eq!(detect_work_arrangement("Office in Austin"), WorkArrangement::OnSite);
    }
}
