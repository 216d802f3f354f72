use chrono::{DateTime, Utc};
use skillcast_core::{
    DemandSeries, Forecast, ForecastConfig, ForecastModel, ForecastPoint, ForecastQuality,
    PipelineError,
};
use tracing::debug;

use crate::smoothing::{best_fit, holt_grid, holt_winters_grid, Fitted, Smoother};

/// Projects one demand series forward with widening prediction intervals.
#[derive(Debug, Clone)]
pub struct Forecaster {
    config: ForecastConfig,
}

impl Forecaster {
    pub fn new(config: ForecastConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ForecastConfig {
        &self.config
    }

    pub fn forecast(&self, series: &DemandSeries, generated_at: DateTime<Utc>) -> Result<Forecast, PipelineError> {
        let need = self.config.min_history.max(2);
        let have = series.points.len();
        let (Some(history_through), Some(latest_observed)) = (series.last_period(), series.latest_count()) else {
            return Err(PipelineError::InsufficientHistory {
                key: series.key.clone(),
                have,
                need,
            });
        };
        if have < need {
            return Err(PipelineError::InsufficientHistory {
                key: series.key.clone(),
                have,
                need,
            });
        }

        let data = series.counts();
        let season = self
            .config
            .season_length
            .unwrap_or_else(|| series.key.granularity.default_season_length());

        let seasonal = if season >= 2 && data.len() >= 2 * season {
            best_fit(holt_winters_grid(season), &data)
                .map(|(m, f)| (ForecastModel::HoltWintersAdditive, f, psi_table(&m, self.config.horizon)))
        } else {
            None
        };
        let (model, fitted, psi) = match seasonal {
            Some(found) => found,
            None => best_fit(holt_grid(), &data)
                .map(|(m, f)| (ForecastModel::HoltLinear, f, psi_table(&m, self.config.horizon)))
                .ok_or_else(|| PipelineError::InsufficientHistory {
                    key: series.key.clone(),
                    have,
                    need,
                })?,
        };

        let (mean, std) = mean_std(&data);
        let residual_std = fitted.residual_std();
        let noise_ratio = if mean > 0.0 { residual_std / mean } else { 0.0 };
        let quality = if noise_ratio > self.config.cv_ceiling {
            ForecastQuality::LowConfidence
        } else {
            ForecastQuality::Normal
        };
        let sigma = match quality {
            ForecastQuality::LowConfidence => residual_std.max(std),
            ForecastQuality::Normal => residual_std,
        };

        let points = self.project(&fitted, &psi, sigma, series, history_through);
        debug!(
            key = %series.key,
            ?model,
            ?quality,
            noise_ratio,
            "forecast fitted"
        );
        Ok(Forecast {
            key: series.key.clone(),
            generated_at,
            history_through,
            latest_observed,
            model,
            quality,
            noise_ratio,
            points,
        })
    }

    fn project(
        &self,
        fitted: &Fitted,
        psi: &[f64],
        sigma: f64,
        series: &DemandSeries,
        history_through: skillcast_core::Period,
    ) -> Vec<ForecastPoint> {
        let granularity = series.key.granularity;
        let z = self.config.z_score.abs();
        let mut spread = 1.0;
        let mut previous_width = 0.0_f64;
        let mut points = Vec::with_capacity(self.config.horizon);
        for step in 1..=self.config.horizon {
            if step > 1 {
                spread += psi[step - 2].powi(2);
            }
            let raw = fitted.predict(step);
            let half_width = z * sigma * spread.sqrt();
            let estimate = raw.max(0.0);
            let lower = (raw - half_width).max(0.0);
            let mut upper = (raw + half_width).max(0.0);
            if upper - lower < previous_width {
                upper = lower + previous_width;
            }
            previous_width = upper - lower;
            points.push(ForecastPoint {
                period: granularity.advance(history_through, step as u32),
                estimate,
                lower,
                upper,
            });
        }
        points
    }
}

/// psi_1 .. psi_{horizon-1}.
fn psi_table(model: &impl Smoother, horizon: usize) -> Vec<f64> {
    (1..horizon.max(1)).map(|j| model.psi(j)).collect()
}

fn mean_std(data: &[f64]) -> (f64, f64) {
    if data.is_empty() {
        return (0.0, 0.0);
    }
    let n = data.len() as f64;
    let mean = data.iter().sum::<f64>() / n;
    let var = data.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
    (mean, var.sqrt())
}
