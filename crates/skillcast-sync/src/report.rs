//! Run summaries and parquet snapshots under `<reports>/<run_id>/`.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow_array::{BooleanArray, Float64Array, RecordBatch, StringArray, UInt32Array, UInt64Array};
use arrow_schema::{DataType, Field as ArrowField, Schema};
use parquet::arrow::ArrowWriter;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use skillcast_core::{DemandSeries, Forecast, ForecastModel, ForecastQuality, PostingCluster};

use crate::pipeline::{BatchReport, ForecastRunReport};

pub const RUN_SUMMARY: &str = "run_summary.json";
pub const MANIFEST: &str = "manifest.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParquetManifest {
    pub schema_version: u32,
    pub files: Vec<ParquetManifestFile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParquetManifestFile {
    pub name: String,
    pub path: String,
    pub sha256: String,
    pub bytes: u64,
}

pub fn write_batch_report(reports_root: &Path, batch: &BatchReport, series: &[DemandSeries]) -> Result<PathBuf> {
    let run_dir = run_dir(reports_root, &batch.run_id.to_string())?;
    write_json(&run_dir.join(RUN_SUMMARY), &serde_json::json!({ "kind": "aggregate", "batch": batch }))?;

    let series_path = run_dir.join("demand_series.parquet");
    let clusters_path = run_dir.join("clusters.parquet");
    write_series_parquet(&series_path, series)?;
    write_clusters_parquet(&clusters_path, &batch.clusters)?;
    write_manifest(
        &run_dir,
        &[("demand_series", &series_path), ("clusters", &clusters_path)],
    )?;
    Ok(run_dir)
}

pub fn write_forecast_report(reports_root: &Path, run: &ForecastRunReport, forecasts: &[Forecast]) -> Result<PathBuf> {
    let run_dir = run_dir(reports_root, &run.run_id.to_string())?;
    write_json(&run_dir.join(RUN_SUMMARY), &serde_json::json!({ "kind": "forecast", "run": run }))?;

    let forecasts_path = run_dir.join("forecasts.parquet");
    write_forecasts_parquet(&forecasts_path, forecasts)?;
    write_manifest(&run_dir, &[("forecasts", &forecasts_path)])?;
    Ok(run_dir)
}

/// Read back a manifest and confirm every listed file still hashes the same.
pub fn verify_manifest(run_dir: &Path) -> Result<ParquetManifest> {
    let path = run_dir.join(MANIFEST);
    let manifest: ParquetManifest = serde_json::from_str(
        &fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?,
    )
    .with_context(|| format!("parsing {}", path.display()))?;
    for file in &manifest.files {
        let entry = manifest_entry(&file.name, run_dir, &run_dir.join(&file.path))?;
        anyhow::ensure!(entry.sha256 == file.sha256, "checksum mismatch for {}", file.path);
    }
    Ok(manifest)
}

fn run_dir(reports_root: &Path, run_id: &str) -> Result<PathBuf> {
    let dir = reports_root.join(run_id);
    fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
    Ok(dir)
}

fn write_json(path: &Path, value: &serde_json::Value) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value).context("serializing run summary")?;
    fs::write(path, bytes).with_context(|| format!("writing {}", path.display()))
}

fn write_manifest(run_dir: &Path, files: &[(&str, &PathBuf)]) -> Result<()> {
    let manifest = ParquetManifest {
        schema_version: 1,
        files: files
            .iter()
            .map(|(name, path)| manifest_entry(name, run_dir, path))
            .collect::<Result<Vec<_>>>()?,
    };
    let path = run_dir.join(MANIFEST);
    let bytes = serde_json::to_vec_pretty(&manifest).context("serializing parquet manifest")?;
    fs::write(&path, bytes).with_context(|| format!("writing {}", path.display()))
}

fn write_parquet(path: &Path, batch: RecordBatch) -> Result<()> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer = ArrowWriter::try_new(file, batch.schema(), None)
        .with_context(|| format!("opening parquet writer {}", path.display()))?;
    writer
        .write(&batch)
        .with_context(|| format!("writing record batch {}", path.display()))?;
    writer
        .close()
        .with_context(|| format!("closing parquet writer {}", path.display()))?;
    Ok(())
}

fn write_series_parquet(path: &Path, series: &[DemandSeries]) -> Result<()> {
    let rows = series
        .iter()
        .flat_map(|s| s.points.iter().map(move |p| (s, p)))
        .collect::<Vec<_>>();
    let schema = Arc::new(Schema::new(vec![
        ArrowField::new("tag", DataType::Utf8, false),
        ArrowField::new("region", DataType::Utf8, false),
        ArrowField::new("granularity", DataType::Utf8, false),
        ArrowField::new("period", DataType::Utf8, false),
        ArrowField::new("count", DataType::UInt64, false),
        ArrowField::new("finalized", DataType::Boolean, false),
    ]));
    let tags = StringArray::from(rows.iter().map(|(s, _)| s.key.tag.as_str()).collect::<Vec<_>>());
    let regions = StringArray::from(rows.iter().map(|(s, _)| s.key.region.as_str()).collect::<Vec<_>>());
    let granularities = StringArray::from(
        rows.iter()
            .map(|(s, _)| s.key.granularity.as_str())
            .collect::<Vec<_>>(),
    );
    let periods = StringArray::from(
        rows.iter()
            .map(|(s, p)| s.key.granularity.label(p.period))
            .collect::<Vec<_>>(),
    );
    let counts = UInt64Array::from(rows.iter().map(|(_, p)| p.count).collect::<Vec<_>>());
    let finalized = BooleanArray::from(
        rows.iter()
            .map(|(s, p)| s.finalized_through.is_some_and(|f| p.period <= f))
            .collect::<Vec<_>>(),
    );
    let batch = RecordBatch::try_new(
        schema,
        vec![
            Arc::new(tags),
            Arc::new(regions),
            Arc::new(granularities),
            Arc::new(periods),
            Arc::new(counts),
            Arc::new(finalized),
        ],
    )
    .context("building demand_series record batch")?;
    write_parquet(path, batch)
}

fn write_clusters_parquet(path: &Path, clusters: &[PostingCluster]) -> Result<()> {
    let rows = clusters
        .iter()
        .flat_map(|c| c.members.iter().enumerate().map(move |(i, m)| (c, i, m)))
        .collect::<Vec<_>>();
    let schema = Arc::new(Schema::new(vec![
        ArrowField::new("cluster_id", DataType::Utf8, false),
        ArrowField::new("member", DataType::Utf8, false),
        ArrowField::new("representative", DataType::Boolean, false),
        ArrowField::new("cluster_region", DataType::Utf8, false),
        ArrowField::new("member_region", DataType::Utf8, false),
        ArrowField::new("period", DataType::Utf8, false),
        ArrowField::new("title", DataType::Utf8, false),
        ArrowField::new("tags", DataType::Utf8, false),
        ArrowField::new("tag_count", DataType::UInt32, false),
    ]));
    let ids = StringArray::from(rows.iter().map(|(c, _, _)| c.id.to_string()).collect::<Vec<_>>());
    let members = StringArray::from(
        rows.iter()
            .map(|(_, _, m)| m.posting.source.to_string())
            .collect::<Vec<_>>(),
    );
    let representative = BooleanArray::from(
        rows.iter()
            .map(|(c, i, _)| *i == c.representative)
            .collect::<Vec<_>>(),
    );
    let cluster_regions = StringArray::from(rows.iter().map(|(c, _, _)| c.region.as_str()).collect::<Vec<_>>());
    let member_regions = StringArray::from(
        rows.iter()
            .map(|(_, _, m)| m.posting.region.as_str())
            .collect::<Vec<_>>(),
    );
    let periods = StringArray::from(
        rows.iter()
            .map(|(_, _, m)| m.posting.period.to_string())
            .collect::<Vec<_>>(),
    );
    let titles = StringArray::from(rows.iter().map(|(_, _, m)| m.posting.title.as_str()).collect::<Vec<_>>());
    let tags = StringArray::from(
        rows.iter()
            .map(|(_, _, m)| m.tags.iter().map(|t| t.name.as_str()).collect::<Vec<_>>().join(","))
            .collect::<Vec<_>>(),
    );
    let tag_counts = UInt32Array::from(rows.iter().map(|(_, _, m)| m.tags.len() as u32).collect::<Vec<_>>());
    let batch = RecordBatch::try_new(
        schema,
        vec![
            Arc::new(ids),
            Arc::new(members),
            Arc::new(representative),
            Arc::new(cluster_regions),
            Arc::new(member_regions),
            Arc::new(periods),
            Arc::new(titles),
            Arc::new(tags),
            Arc::new(tag_counts),
        ],
    )
    .context("building clusters record batch")?;
    write_parquet(path, batch)
}

fn model_label(model: ForecastModel) -> &'static str {
    match model {
        ForecastModel::HoltLinear => "holt_linear",
        ForecastModel::HoltWintersAdditive => "holt_winters_additive",
    }
}

fn write_forecasts_parquet(path: &Path, forecasts: &[Forecast]) -> Result<()> {
    let rows = forecasts
        .iter()
        .flat_map(|f| f.points.iter().enumerate().map(move |(h, p)| (f, h, p)))
        .collect::<Vec<_>>();
    let schema = Arc::new(Schema::new(vec![
        ArrowField::new("tag", DataType::Utf8, false),
        ArrowField::new("region", DataType::Utf8, false),
        ArrowField::new("period", DataType::Utf8, false),
        ArrowField::new("step", DataType::UInt32, false),
        ArrowField::new("estimate", DataType::Float64, false),
        ArrowField::new("lower", DataType::Float64, false),
        ArrowField::new("upper", DataType::Float64, false),
        ArrowField::new("model", DataType::Utf8, false),
        ArrowField::new("low_confidence", DataType::Boolean, false),
    ]));
    let tags = StringArray::from(rows.iter().map(|(f, _, _)| f.key.tag.as_str()).collect::<Vec<_>>());
    let regions = StringArray::from(rows.iter().map(|(f, _, _)| f.key.region.as_str()).collect::<Vec<_>>());
    let periods = StringArray::from(
        rows.iter()
            .map(|(f, _, p)| f.key.granularity.label(p.period))
            .collect::<Vec<_>>(),
    );
    let steps = UInt32Array::from(rows.iter().map(|(_, h, _)| *h as u32 + 1).collect::<Vec<_>>());
    let estimates = Float64Array::from(rows.iter().map(|(_, _, p)| p.estimate).collect::<Vec<_>>());
    let lowers = Float64Array::from(rows.iter().map(|(_, _, p)| p.lower).collect::<Vec<_>>());
    let uppers = Float64Array::from(rows.iter().map(|(_, _, p)| p.upper).collect::<Vec<_>>());
    let models = StringArray::from(rows.iter().map(|(f, _, _)| model_label(f.model)).collect::<Vec<_>>());
    let low_confidence = BooleanArray::from(
        rows.iter()
            .map(|(f, _, _)| f.quality == ForecastQuality::LowConfidence)
            .collect::<Vec<_>>(),
    );
    let batch = RecordBatch::try_new(
        schema,
        vec![
            Arc::new(tags),
            Arc::new(regions),
            Arc::new(periods),
            Arc::new(steps),
            Arc::new(estimates),
            Arc::new(lowers),
            Arc::new(uppers),
            Arc::new(models),
            Arc::new(low_confidence),
        ],
    )
    .context("building forecasts record batch")?;
    write_parquet(path, batch)
}

fn manifest_entry(name: &str, run_dir: &Path, path: &Path) -> Result<ParquetManifestFile> {
    let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let sha256 = hex::encode(Sha256::digest(&bytes));
    let rel = path.strip_prefix(run_dir).unwrap_or(path).display().to_string();
    Ok(ParquetManifestFile {
        name: name.to_string(),
        path: rel,
        sha256,
        bytes: bytes.len() as u64,
    })
}
