//! Exponential smoothing models used by the forecaster.

/// State left behind after running a model over a history.
#[derive(Debug, Clone, PartialEq)]
pub struct Fitted {
    pub level: f64,
    pub trend: f64,
    /// Seasonal offsets indexed by `t % season`; empty for non-seasonal models.
    pub seasonals: Vec<f64>,
    /// One-step-ahead errors over the part of the history the model predicted.
    pub residuals: Vec<f64>,
    /// Length of the fitted history.
    pub len: usize,
}

impl Fitted {
    pub fn sse(&self) -> f64 {
        self.residuals.iter().map(|e| e * e).sum()
    }

    pub fn residual_std(&self) -> f64 {
        if self.residuals.is_empty() {
            return 0.0;
        }
        (self.sse() / self.residuals.len() as f64).sqrt()
    }

    /// Point forecast `steps` periods past the end of the history (`steps >= 1`).
    pub fn predict(&self, steps: usize) -> f64 {
        let seasonal = if self.seasonals.is_empty() {
            0.0
        } else {
            self.seasonals[(self.len + steps - 1) % self.seasonals.len()]
        };
        self.level + steps as f64 * self.trend + seasonal
    }
}

pub trait Smoother {
    fn fit(&self, data: &[f64]) -> Fitted;

    /// Weight of the j-th step's innovation in a later forecast error; drives
    /// how quickly prediction intervals widen.
    fn psi(&self, j: usize) -> f64;

    /// Minimum history length the model can be fitted on.
    fn min_len(&self) -> usize;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HoltLinear {
    pub alpha: f64,
    pub beta: f64,
}

impl Smoother for HoltLinear {
    fn fit(&self, data: &[f64]) -> Fitted {
        let mut level = data.first().copied().unwrap_or(0.0);
        let mut trend = match data {
            [a, b, ..] => b - a,
            _ => 0.0,
        };
        let mut residuals = Vec::with_capacity(data.len().saturating_sub(1));
        for &y in data.iter().skip(1) {
            let forecast = level + trend;
            residuals.push(y - forecast);
            let next_level = self.alpha * y + (1.0 - self.alpha) * forecast;
            trend = self.beta * (next_level - level) + (1.0 - self.beta) * trend;
            level = next_level;
        }
        Fitted {
            level,
            trend,
            seasonals: Vec::new(),
            residuals,
            len: data.len(),
        }
    }

    fn psi(&self, j: usize) -> f64 {
        self.alpha * (1.0 + j as f64 * self.beta)
    }

    fn min_len(&self) -> usize {
        2
    }
}

/// Additive Holt-Winters. Needs two full seasons to initialize level, trend
/// and the seasonal offsets.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HoltWinters {
    pub alpha: f64,
    pub beta: f64,
    pub gamma: f64,
    pub season: usize,
}

impl Smoother for HoltWinters {
    fn fit(&self, data: &[f64]) -> Fitted {
        let m = self.season.max(1);
        let mean = |xs: &[f64]| xs.iter().sum::<f64>() / xs.len().max(1) as f64;
        let first = &data[..m.min(data.len())];
        let second = data.get(m..(2 * m).min(data.len())).unwrap_or(&[]);

        let mut level = mean(first);
        let mut trend = if second.is_empty() {
            0.0
        } else {
            (mean(second) - mean(first)) / m as f64
        };
        let mut seasonals = first.iter().map(|y| y - level).collect::<Vec<_>>();
        seasonals.resize(m, 0.0);

        let mut residuals = Vec::with_capacity(data.len().saturating_sub(m));
        for (t, &y) in data.iter().enumerate().skip(m) {
            let s = seasonals[t % m];
            let forecast = level + trend + s;
            residuals.push(y - forecast);
            let next_level = self.alpha * (y - s) + (1.0 - self.alpha) * (level + trend);
            trend = self.beta * (next_level - level) + (1.0 - self.beta) * trend;
            seasonals[t % m] = self.gamma * (y - next_level) + (1.0 - self.gamma) * s;
            level = next_level;
        }
        Fitted {
            level,
            trend,
            seasonals,
            residuals,
            len: data.len(),
        }
    }

    fn psi(&self, j: usize) -> f64 {
        let seasonal = if self.season > 0 && j % self.season == 0 {
            self.gamma
        } else {
            0.0
        };
        self.alpha * (1.0 + j as f64 * self.beta) + seasonal
    }

    fn min_len(&self) -> usize {
        2 * self.season
    }
}

pub const ALPHA_GRID: &[f64] = &[0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9];
pub const BETA_GRID: &[f64] = &[0.01, 0.05, 0.1, 0.2, 0.3, 0.5];
pub const GAMMA_GRID: &[f64] = &[0.05, 0.1, 0.2, 0.3, 0.5];

/// Pick the candidate with the smallest one-step SSE. Earlier candidates win
/// exact ties, so the choice only depends on the data.
pub fn best_fit<M: Smoother + Copy>(candidates: impl IntoIterator<Item = M>, data: &[f64]) -> Option<(M, Fitted)> {
    let mut best: Option<(M, Fitted, f64)> = None;
    for model in candidates {
        if data.len() < model.min_len() {
            continue;
        }
        let fitted = model.fit(data);
        let sse = fitted.sse();
        if !sse.is_finite() {
            continue;
        }
        if best.as_ref().map_or(true, |(_, _, b)| sse < *b) {
            best = Some((model, fitted, sse));
        }
    }
    best.map(|(m, f, _)| (m, f))
}

pub fn holt_grid() -> impl Iterator<Item = HoltLinear> {
    ALPHA_GRID
        .iter()
        .flat_map(|&alpha| BETA_GRID.iter().map(move |&beta| HoltLinear { alpha, beta }))
}

pub fn holt_winters_grid(season: usize) -> impl Iterator<Item = HoltWinters> {
    ALPHA_GRID.iter().flat_map(move |&alpha| {
        BETA_GRID.iter().flat_map(move |&beta| {
            GAMMA_GRID.iter().map(move |&gamma| HoltWinters {
                alpha,
                beta,
                gamma,
                season,
            })
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn holt_tracks_a_clean_trend_exactly() {
        let data = (0..10).map(|t| 5.0 + 3.0 * t as f64).collect::<Vec<_>>();
        let fitted = HoltLinear { alpha: 0.5, beta: 0.1 }.fit(&data);
        assert!(fitted.sse() < 1e-9);
        assert!((fitted.predict(2) - 38.0).abs() < 1e-9);
    }

    #[test]
    fn holt_winters_repeats_a_clean_season() {
        let pattern = [1.0, 5.0, 9.0, 5.0];
        let data = (0..12).map(|t| 10.0 + pattern[t % 4]).collect::<Vec<_>>();
        let fitted = HoltWinters {
            alpha: 0.3,
            beta: 0.1,
            gamma: 0.2,
            season: 4,
        }
        .fit(&data);
        assert!(fitted.sse() < 1e-9);
        for step in 1..=4 {
            assert!((fitted.predict(step) - data[(12 + step - 1) % 4]).abs() < 1e-9);
        }
    }

    #[test]
    fn grid_search_is_deterministic() {
        let data = [4.0, 7.0, 5.0, 9.0, 8.0, 12.0, 10.0, 14.0];
        let (a, _) = best_fit(holt_grid(), &data).unwrap();
        let (b, _) = best_fit(holt_grid(), &data).unwrap();
        assert_eq!(a, b);
        assert!(best_fit(holt_winters_grid(4), &data[..7]).is_none());
    }
}
