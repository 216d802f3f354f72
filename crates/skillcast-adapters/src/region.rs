//! Location string to region code resolution.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use skillcast_core::RegionCode;
use tracing::debug;

use crate::AdapterError;

pub trait RegionLookup: Send + Sync {
    /// Never fails: unknown locations resolve to [`RegionCode::unresolved`].
    fn resolve(&self, location: &str) -> RegionCode;
}

const US_STATES: &[(&str, &str)] = &[
    ("AL", "alabama"),
    ("AK", "alaska"),
    ("AZ", "arizona"),
    ("AR", "arkansas"),
    ("CA", "california"),
    ("CO", "colorado"),
    ("CT", "connecticut"),
    ("DE", "delaware"),
    ("FL", "florida"),
    ("GA", "georgia"),
    ("HI", "hawaii"),
    ("ID", "idaho"),
    ("IL", "illinois"),
    ("IN", "indiana"),
    ("IA", "iowa"),
    ("KS", "kansas"),
    ("KY", "kentucky"),
    ("LA", "louisiana"),
    ("ME", "maine"),
    ("MD", "maryland"),
    ("MA", "massachusetts"),
    ("MI", "michigan"),
    ("MN", "minnesota"),
    ("MS", "mississippi"),
    ("MO", "missouri"),
    ("MT", "montana"),
    ("NE", "nebraska"),
    ("NV", "nevada"),
    ("NH", "new hampshire"),
    ("NJ", "new jersey"),
    ("NM", "new mexico"),
    ("NY", "new york"),
    ("NC", "north carolina"),
    ("ND", "north dakota"),
    ("OH", "ohio"),
    ("OK", "oklahoma"),
    ("OR", "oregon"),
    ("PA", "pennsylvania"),
    ("RI", "rhode island"),
    ("SC", "south carolina"),
    ("SD", "south dakota"),
    ("TN", "tennessee"),
    ("TX", "texas"),
    ("UT", "utah"),
    ("VT", "vermont"),
    ("VA", "virginia"),
    ("WA", "washington"),
    ("WV", "west virginia"),
    ("WI", "wisconsin"),
    ("WY", "wyoming"),
    ("DC", "district of columbia"),
];

const COUNTRIES: &[(&str, &str)] = &[
    ("united states", "US"),
    ("united states of america", "US"),
    ("usa", "US"),
    ("us", "US"),
    ("united kingdom", "GB"),
    ("uk", "GB"),
    ("england", "GB"),
    ("scotland", "GB"),
    ("canada", "CA"),
    ("australia", "AU"),
    ("germany", "DE"),
    ("france", "FR"),
    ("india", "IN"),
    ("japan", "JP"),
    ("china", "CN"),
    ("brazil", "BR"),
    ("netherlands", "NL"),
    ("ireland", "IE"),
    ("spain", "ES"),
    ("italy", "IT"),
    ("singapore", "SG"),
    ("sweden", "SE"),
    ("poland", "PL"),
    ("portugal", "PT"),
    ("switzerland", "CH"),
    ("mexico", "MX"),
];

const REMOTE_MARKERS: &[&str] = &["remote", "anywhere", "worldwide", "work from home"];

#[derive(Debug, Default, Deserialize)]
struct AliasFile {
    #[serde(default)]
    aliases: BTreeMap<String, String>,
}

/// Table-driven lookup: US states, common countries, remote markers, and
/// optional operator-supplied aliases (`"bay area": US-CA`).
#[derive(Debug, Clone, Default)]
pub struct TableRegionLookup {
    aliases: BTreeMap<String, RegionCode>,
}

impl TableRegionLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_alias(mut self, location: &str, code: &str) -> Self {
        self.aliases
            .insert(location.trim().to_lowercase(), RegionCode::new(code));
        self
    }

    /// Load aliases from a YAML file with a top-level `aliases` map.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, AdapterError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| AdapterError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let file: AliasFile = serde_yaml::from_str(&text).map_err(|e| AdapterError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Ok(file
            .aliases
            .iter()
            .fold(Self::new(), |lookup, (loc, code)| lookup.with_alias(loc, code)))
    }
}

fn clean_location(location: &str) -> String {
    let mut s = location.trim();
    if let Some(rest) = strip_prefix_ci(s, "greater ") {
        s = rest.trim_start();
    }
    for suffix in [" metropolitan area", " metro area", " area"] {
        if let Some(rest) = strip_suffix_ci(s, suffix) {
            s = rest.trim_end();
            break;
        }
    }
    s.to_string()
}

fn strip_prefix_ci<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let head = s.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix).then(|| &s[prefix.len()..])
}

fn strip_suffix_ci<'a>(s: &'a str, suffix: &str) -> Option<&'a str> {
    let split = s.len().checked_sub(suffix.len())?;
    let tail = s.get(split..)?;
    tail.eq_ignore_ascii_case(suffix).then(|| &s[..split])
}

fn state_by_abbrev(token: &str) -> Option<&'static str> {
    let token = token.replace('.', "");
    US_STATES
        .iter()
        .find(|(abbr, _)| *abbr == token)
        .map(|(abbr, _)| *abbr)
}

fn state_by_name(part: &str) -> Option<&'static str> {
    US_STATES
        .iter()
        .find(|(_, name)| name.eq_ignore_ascii_case(part))
        .map(|(abbr, _)| *abbr)
}

fn country_by_name(part: &str) -> Option<&'static str> {
    COUNTRIES
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(part))
        .map(|(_, code)| *code)
}

fn mentions_remote(lower: &str) -> bool {
    let words = lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>();
    let padded = format!(" {} ", words.join(" "));
    REMOTE_MARKERS.iter().any(|m| padded.contains(&format!(" {m} ")))
}

impl RegionLookup for TableRegionLookup {
    fn resolve(&self, location: &str) -> RegionCode {
        let raw = location.trim().to_lowercase();
        if let Some(code) = self.aliases.get(&raw) {
            return code.clone();
        }
        let cleaned = clean_location(location);
        let lower = cleaned.to_lowercase();
        if lower.is_empty() || matches!(lower.as_str(), "n/a" | "unknown" | "-") {
            return RegionCode::unresolved();
        }
        if let Some(code) = self.aliases.get(&lower) {
            return code.clone();
        }
        if mentions_remote(&lower) {
            return RegionCode::new("REMOTE");
        }

        let parts = cleaned
            .split([',', ';', '|'])
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>();

        // Uppercase two-letter state codes ("Austin, TX 78701"); case matters
        // so that "in" or "or" inside a city name is not taken for a state.
        for part in &parts {
            for token in part.split(|c: char| c.is_whitespace() || c.is_ascii_digit()) {
                if token.len() >= 2 && token.chars().all(|c| c.is_ascii_uppercase() || c == '.') {
                    if let Some(abbr) = state_by_abbrev(token) {
                        return RegionCode::new(format!("US-{abbr}"));
                    }
                }
            }
        }
        for part in &parts {
            if let Some(abbr) = state_by_name(part) {
                return RegionCode::new(format!("US-{abbr}"));
            }
        }
        for part in parts.iter().rev() {
            if let Some(code) = country_by_name(part) {
                return RegionCode::new(code);
            }
        }
        for part in &parts {
            if let Some(code) = self.aliases.get(&part.to_lowercase()) {
                return code.clone();
            }
        }

        debug!(location, "location did not resolve to a region");
        RegionCode::unresolved()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolve(s: &str) -> String {
        TableRegionLookup::new().resolve(s).as_str().to_string()
    }

    #[test]
    fn resolves_states_countries_and_remote() {
        assert_eq!(resolve("Austin, TX"), "US-TX");
        assert_eq!(resolve("Washington, D.C."), "US-DC");
        assert_eq!(resolve("Greater Boston Area, Massachusetts"), "US-MA");
        assert_eq!(resolve("Seattle, Washington, United States"), "US-WA");
        assert_eq!(resolve("Berlin, Germany"), "DE");
        assert_eq!(resolve("London, UK"), "GB");
        assert_eq!(resolve("Remote (US)"), "REMOTE");
        assert_eq!(resolve("Work from home"), "REMOTE");
    }

    #[test]
    fn unknown_locations_fall_back_to_unresolved() {
        assert_eq!(resolve(""), RegionCode::UNRESOLVED);
        assert_eq!(resolve("N/A"), RegionCode::UNRESOLVED);
        assert_eq!(resolve("Atlantis"), RegionCode::UNRESOLVED);
        assert_eq!(resolve("Brno, Indigo Valley"), RegionCode::UNRESOLVED);
    }

    #[test]
    fn aliases_take_precedence() {
        let lookup = TableRegionLookup::new()
            .with_alias("Bay Area", "us-ca")
            .with_alias("remote - emea", "EMEA");
        assert_eq!(lookup.resolve("Bay Area").as_str(), "US-CA");
        assert_eq!(lookup.resolve("Remote - EMEA").as_str(), "EMEA");
    }

    #[test]
    fn aliases_load_from_yaml() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("regions.yaml");
        std::fs::write(&path, "aliases:\n  nyc: US-NY\n  sf: US-CA\n").unwrap();
        let lookup = TableRegionLookup::from_yaml_file(&path).unwrap();
        assert_eq!(lookup.resolve("NYC").as_str(), "US-NY");
        assert_eq!(lookup.resolve("SF, hybrid").as_str(), "US-CA");
    }
}
