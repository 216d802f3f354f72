// Checked-in fixtures under fixtures/ stay loadable by the adapters.

use std::path::PathBuf;

use chrono::NaiveDate;
use skillcast_adapters::{
    collect_window, load_pipeline_config, JsonFilePostingSource, RegionLookup, TableRegionLookup, TimeWindow,
    VocabularyProvider, YamlVocabularyProvider,
};
use skillcast_core::{Granularity, TagKind};

fn fixtures() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../fixtures")
}

#[tokio::test]
async fn posting_exports_map_every_field_spelling() {
    let sources = JsonFilePostingSource::open_dir(fixtures().join("postings")).unwrap();
    let ids = sources.iter().map(|s| s.path().file_stem().unwrap().to_string_lossy().into_owned()).collect::<Vec<_>>();
    assert_eq!(ids, vec!["boardalpha", "boardbeta"]);

    let window = TimeWindow::new(
        NaiveDate::from_ymd_opt(2026, 10, 1).unwrap(),
        NaiveDate::from_ymd_opt(2026, 10, 19).unwrap(),
    );
    let alpha = collect_window(&sources[0], &window, 2).await.unwrap();
    assert_eq!(alpha.len(), 4);
    assert!(alpha.iter().all(|p| p.source_id == "boardalpha"));
    let salary = alpha[0].salary.as_ref().unwrap();
    assert_eq!(salary.currency.as_deref(), Some("USD"));

    let beta = collect_window(&sources[1], &window, 10).await.unwrap();
    assert_eq!(beta.len(), 3);
    assert_eq!(beta[0].source_native_id, "77");
    assert_eq!(beta[0].title.as_deref(), Some("Data Engineer II"));
    assert_eq!(beta[1].salary.as_ref().and_then(|s| s.currency.as_deref()), Some("GBP"));
    // unreadable dates pass through for the normalizer to reject
    assert_eq!(beta[2].posted_at.as_deref(), Some("not a date"));
}

#[test]
fn vocabulary_fixture_declares_skills_and_roles() {
    let vocab = YamlVocabularyProvider::new(fixtures().join("vocabulary.yaml")).snapshot().unwrap();
    assert!(vocab.version.starts_with("2026.10+"));
    let go = vocab.canonicalize("golang").unwrap();
    assert_eq!(go.name, "Go");
    assert_eq!(go.kind, TagKind::Skill);
    assert_eq!(vocab.canonicalize("programmer").unwrap().kind, TagKind::Role);
}

#[test]
fn region_aliases_fixture_overrides_the_table() {
    let lookup = TableRegionLookup::from_yaml_file(fixtures().join("regions.yaml")).unwrap();
    assert_eq!(lookup.resolve("Bay Area").as_str(), "US-CA");
    assert_eq!(lookup.resolve("NYC").as_str(), "US-NY");
    assert_eq!(lookup.resolve("Austin, TX").as_str(), "US-TX");
}

#[test]
fn workspace_config_parses() {
    let config = load_pipeline_config(fixtures().join("../skillcast.yaml")).unwrap();
    assert_eq!(config.granularity, Granularity::IsoWeek);
    assert_eq!(config.insight.limit, Some(10));
    assert_eq!(config.workers.pool_size, None);
}
