use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use skillcast_core::{
    Forecast, GrowthScore, InsightConfig, Recommendation, RecommendationItem, RegionCode,
    SeriesKey, Vocabulary,
};
use tracing::debug;

/// Ranks tags a user does not have by projected growth.
#[derive(Debug, Clone, Default)]
pub struct InsightEngine {
    config: InsightConfig,
}

#[derive(Debug, Default)]
struct TagTotals {
    latest: u64,
    projected: f64,
    low_confidence: bool,
    keys: Vec<SeriesKey>,
}

impl InsightEngine {
    pub fn new(config: InsightConfig) -> Self {
        Self { config }
    }

    /// `region` restricts the forecasts considered; without it a tag's
    /// forecasts are summed across regions. User skills match canonical names
    /// and, when a vocabulary is given, any synonym.
    pub fn recommend<S: AsRef<str>>(
        &self,
        skills: &[S],
        region: Option<&RegionCode>,
        forecasts: &[Forecast],
        vocabulary: Option<&Vocabulary>,
    ) -> Recommendation {
        let declared = skills
            .iter()
            .map(|s| s.as_ref().trim().to_string())
            .filter(|s| !s.is_empty())
            .collect::<BTreeSet<_>>();
        let owned = declared
            .iter()
            .map(|s| {
                vocabulary
                    .and_then(|v| v.canonicalize(s))
                    .map(|e| e.name.to_lowercase())
                    .unwrap_or_else(|| s.to_lowercase())
            })
            .collect::<BTreeSet<_>>();

        // Key order, not input order, drives the sums.
        let by_key = forecasts
            .iter()
            .filter(|f| region.map_or(true, |r| &f.key.region == r))
            .filter(|f| !owned.contains(&f.key.tag.to_lowercase()))
            .filter_map(|f| f.horizon_end().map(|end| (&f.key, (f, end.estimate))))
            .collect::<BTreeMap<_, _>>();

        let mut totals: BTreeMap<&str, TagTotals> = BTreeMap::new();
        for (key, (forecast, projected)) in by_key {
            let t = totals.entry(key.tag.as_str()).or_default();
            t.latest += forecast.latest_observed;
            t.projected += projected;
            t.low_confidence |= forecast.is_low_confidence();
            t.keys.push(key.clone());
        }

        let mut items = totals
            .into_iter()
            .map(|(tag, t)| RecommendationItem {
                tag: tag.to_string(),
                growth: if t.latest == 0 {
                    GrowthScore::Unranked
                } else {
                    GrowthScore::Ranked((t.projected - t.latest as f64) / t.latest as f64)
                },
                projected: t.projected,
                latest_observed: t.latest,
                low_confidence: t.low_confidence,
                forecasts: t.keys,
            })
            .collect::<Vec<_>>();
        items.sort_by(rank_order);
        if let Some(limit) = self.config.limit {
            let ranked = items
                .iter()
                .take_while(|i| matches!(i.growth, GrowthScore::Ranked(_)))
                .count();
            if ranked > limit {
                items.drain(limit..ranked);
                debug!(limit, dropped = ranked - limit, "ranked recommendations capped");
            }
        }

        Recommendation {
            skills: declared,
            region: region.cloned(),
            items,
        }
    }
}

fn rank_order(a: &RecommendationItem, b: &RecommendationItem) -> Ordering {
    let by_growth = match (a.growth, b.growth) {
        (GrowthScore::Ranked(x), GrowthScore::Ranked(y)) => y.total_cmp(&x),
        (GrowthScore::Ranked(_), GrowthScore::Unranked) => Ordering::Less,
        (GrowthScore::Unranked, GrowthScore::Ranked(_)) => Ordering::Greater,
        (GrowthScore::Unranked, GrowthScore::Unranked) => Ordering::Equal,
    };
    by_growth
        .then_with(|| b.projected.total_cmp(&a.projected))
        .then_with(|| a.tag.cmp(&b.tag))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};
    use skillcast_core::{
        ForecastModel, ForecastPoint, ForecastQuality, Granularity, Period,
    };

    fn forecast(tag: &str, region: &str, latest: u64, end: f64) -> Forecast {
        let period = Period(NaiveDate::from_ymd_opt(2026, 3, 2).unwrap());
        Forecast {
            key: SeriesKey::new(tag, RegionCode::new(region), Granularity::IsoWeek),
            generated_at: Utc.with_ymd_and_hms(2026, 3, 9, 0, 0, 0).unwrap(),
            history_through: period,
            latest_observed: latest,
            model: ForecastModel::HoltLinear,
            quality: ForecastQuality::Normal,
            noise_ratio: 0.1,
            points: vec![ForecastPoint {
                period: Granularity::IsoWeek.advance(period, 4),
                estimate: end,
                lower: end * 0.8,
                upper: end * 1.2,
            }],
        }
    }

    fn tags(r: &Recommendation) -> Vec<&str> {
        r.items.iter().map(|i| i.tag.as_str()).collect()
    }

    #[test]
    fn ranks_by_growth_and_excludes_owned_skills() {
        let forecasts = vec![
            forecast("SQL", "US-CA", 10, 11.0),
            forecast("Rust", "US-CA", 10, 18.0),
            forecast("Python", "US-CA", 10, 30.0),
        ];
        let r = InsightEngine::default().recommend(&["Python"], None, &forecasts, None);
        assert_eq!(tags(&r), vec!["Rust", "SQL"]);
        assert_eq!(r.items[0].growth, GrowthScore::Ranked(0.8));
    }

    #[test]
    fn zero_history_is_unranked_and_last() {
        let forecasts = vec![
            forecast("Zig", "US-CA", 0, 3.0),
            forecast("Go", "US-CA", 0, 7.0),
            forecast("Java", "US-CA", 20, 19.0),
        ];
        let r = InsightEngine::default().recommend::<&str>(&[], None, &forecasts, None);
        assert_eq!(tags(&r), vec!["Java", "Go", "Zig"]);
        assert_eq!(r.items[2].growth, GrowthScore::Unranked);
    }

    #[test]
    fn limit_caps_ranked_items_but_keeps_unranked() {
        let forecasts = vec![
            forecast("Zig", "US-CA", 0, 3.0),
            forecast("Java", "US-CA", 20, 19.0),
            forecast("Rust", "US-CA", 10, 18.0),
            forecast("SQL", "US-CA", 10, 11.0),
        ];
        let engine = InsightEngine::new(InsightConfig { limit: Some(2) });
        let r = engine.recommend::<&str>(&[], None, &forecasts, None);
        assert_eq!(tags(&r), vec!["Rust", "SQL", "Zig"]);
        assert_eq!(r.items[2].growth, GrowthScore::Unranked);

        let wide = InsightEngine::new(InsightConfig { limit: Some(10) });
        assert_eq!(wide.recommend::<&str>(&[], None, &forecasts, None).items.len(), 4);
    }

    #[test]
    fn growth_ties_prefer_larger_projection() {
        let forecasts = vec![
            forecast("Kafka", "US-CA", 10, 15.0),
            forecast("Spark", "US-CA", 100, 150.0),
        ];
        let r = InsightEngine::default().recommend::<&str>(&[], None, &forecasts, None);
        assert_eq!(tags(&r), vec!["Spark", "Kafka"]);
    }

    #[test]
    fn regions_filter_or_sum() {
        let forecasts = vec![
            forecast("Rust", "US-CA", 10, 12.0),
            forecast("Rust", "DE", 10, 30.0),
            forecast("Go", "US-CA", 10, 15.0),
        ];
        let ca = RegionCode::new("US-CA");
        let r = InsightEngine::default().recommend::<&str>(&[], Some(&ca), &forecasts, None);
        assert_eq!(tags(&r), vec!["Go", "Rust"]);
        assert_eq!(r.region, Some(ca));

        let all = InsightEngine::default().recommend::<&str>(&[], None, &forecasts, None);
        assert_eq!(tags(&all), vec!["Rust", "Go"]);
        assert_eq!(all.items[0].latest_observed, 20);
        assert_eq!(all.items[0].forecasts.len(), 2);
    }

    #[test]
    fn synonyms_count_as_owned_and_output_is_reproducible() {
        let vocab = Vocabulary::builtin();
        let forecasts = vec![
            forecast("Kubernetes", "US-CA", 10, 20.0),
            forecast("Docker", "US-CA", 10, 12.0),
        ];
        let engine = InsightEngine::new(InsightConfig { limit: None });
        let a = engine.recommend(&["k8s"], None, &forecasts, Some(&vocab));
        let mut reversed = forecasts.clone();
        reversed.reverse();
        let b = engine.recommend(&["k8s"], None, &reversed, Some(&vocab));
        assert_eq!(tags(&a), vec!["Docker"]);
        assert_eq!(a, b);
    }
}
