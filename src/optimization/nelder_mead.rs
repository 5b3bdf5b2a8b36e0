//! Multi-start Nelder-Mead simplex over the 6 pose parameters.
//!
//! Each restart builds a regular simplex around its start vertex (separate
//! edge lengths for the translation and rotation blocks) and evolves it by
//! reflection, expansion, contraction and shrink until the spread of the
//! vertex scores falls below the tolerance or the iteration budget is spent.
//! The first restart starts from the given initial guess; the others start
//! from uniformly jittered copies of it.

use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::optimization::pose::CorrectionMode;
use crate::optimization::{
    Objective, OptimizationError, PoseParams, N_PARAMS, ROTATION_BOUND, TRANSLATION_BOUND,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NelderMeadConfig {
    /// Independent restarts; the first one is not jittered.
    pub restarts: usize,
    pub max_iterations: usize,
    /// Convergence threshold on the spread of the vertex scores, with mean and
    /// variance both normalized by `n + 1`.
    pub tolerance: f64,
    /// Reflection coefficient.
    pub alpha: f64,
    /// Contraction coefficient.
    pub beta: f64,
    /// Expansion coefficient.
    pub gamma: f64,
    /// Shrink coefficient.
    pub sigma: f64,
    /// Simplex edge length for the translation block, in mm.
    pub translation_step: f64,
    /// Simplex edge length for the rotation block, in radians.
    pub rotation_step: f64,
    pub correction_mode: CorrectionMode,
    /// Seed for the restart jitter. `None` draws from OS entropy.
    pub random_seed: Option<u64>,
    /// Runs the restarts on the rayon thread pool.
    pub parallel: bool,
}

impl Default for NelderMeadConfig {
    fn default() -> Self {
        NelderMeadConfig {
            restarts: N_PARAMS,
            max_iterations: 500,
            tolerance: 1e-6,
            alpha: 1.0,
            beta: 0.5,
            gamma: 2.0,
            sigma: 0.5,
            translation_step: 0.5,
            rotation_step: 0.05f64.to_radians(),
            correction_mode: CorrectionMode::TranslationOnly,
            random_seed: None,
            parallel: false,
        }
    }
}

/// Outcome of a single restart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestartSummary {
    pub start: PoseParams,
    pub params: PoseParams,
    pub score: f64,
    pub iterations: usize,
    pub converged: bool,
}

/// Best correction found over all restarts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoseCorrection {
    pub params: PoseParams,
    pub score: f64,
    /// Score of the initial guess, for comparison.
    pub initial_score: f64,
    pub restarts: Vec<RestartSummary>,
}

#[derive(Debug, Clone, Default)]
pub struct NelderMead {
    config: NelderMeadConfig,
}

impl NelderMead {
    pub fn new(config: NelderMeadConfig) -> Self {
        NelderMead { config }
    }

    pub fn config(&self) -> &NelderMeadConfig {
        &self.config
    }

    /// Minimizes `objective` starting from `initial`.
    ///
    /// Always returns the best vertex found; a search that makes no progress
    /// shows up as a result close to `initial` with a high score.
    pub fn minimize<O>(
        &self,
        objective: &O,
        initial: &PoseParams,
    ) -> Result<PoseCorrection, OptimizationError>
    where
        O: Objective + Sync,
    {
        let initial_score = objective.evaluate(initial)?;
        let restarts = self.config.restarts.max(1);

        let summaries: Vec<RestartSummary> = if self.config.parallel {
            (0..restarts)
                .into_par_iter()
                .map(|m| self.run_restart(objective, initial, m))
                .collect::<Result<_, _>>()?
        } else {
            (0..restarts)
                .map(|m| self.run_restart(objective, initial, m))
                .collect::<Result<_, _>>()?
        };

        let best = summaries
            .iter()
            .min_by(|a, b| a.score.total_cmp(&b.score))
            .map(|s| (s.params, s.score))
            .unwrap_or((*initial, initial_score));

        info!(
            "Nelder-Mead finished: score {:.6e} (initial {:.6e}) over {} restarts",
            best.1, initial_score, restarts
        );

        Ok(PoseCorrection {
            params: best.0,
            score: best.1,
            initial_score,
            restarts: summaries,
        })
    }

    fn start_vertex(&self, initial: &PoseParams, restart: usize) -> PoseParams {
        if restart == 0 {
            return *initial;
        }
        let mut rng = match self.config.random_seed {
            Some(seed) => StdRng::seed_from_u64(restart_seed(seed, restart)),
            None => StdRng::from_os_rng(),
        };
        let mut start = *initial;
        for (k, value) in start.iter_mut().enumerate() {
            let half_range = if k < 3 {
                TRANSLATION_BOUND / 2.0
            } else {
                ROTATION_BOUND / 2.0
            };
            *value += (2.0 * rng.random::<f64>() - 1.0) * half_range;
        }
        start
    }

    fn run_restart<O>(
        &self,
        objective: &O,
        initial: &PoseParams,
        restart: usize,
    ) -> Result<RestartSummary, OptimizationError>
    where
        O: Objective,
    {
        let NelderMeadConfig {
            alpha,
            beta,
            gamma,
            sigma,
            ..
        } = self.config;
        let start = self.start_vertex(initial, restart);
        let mut simplex = initial_simplex(
            &start,
            self.config.translation_step,
            self.config.rotation_step,
        );
        let mut scores = simplex
            .iter()
            .map(|vertex| objective.evaluate(vertex))
            .collect::<Result<Vec<_>, _>>()?;

        let mut iterations = 0;
        let mut converged = false;

        while iterations < self.config.max_iterations {
            iterations += 1;

            let mut order: Vec<usize> = (0..simplex.len()).collect();
            order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));
            let best = order[0];
            let second_worst = order[N_PARAMS - 1];
            let worst = order[N_PARAMS];

            let centroid = simplex
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != worst)
                .fold(PoseParams::zeros(), |acc, (_, vertex)| acc + vertex)
                / N_PARAMS as f64;

            let reflected = centroid * (1.0 + alpha) - simplex[worst] * alpha;
            let reflected_score = objective.evaluate(&reflected)?;

            if reflected_score < scores[best] {
                let expanded = centroid + (reflected - centroid) * gamma;
                let expanded_score = objective.evaluate(&expanded)?;
                if expanded_score < reflected_score {
                    simplex[worst] = expanded;
                    scores[worst] = expanded_score;
                } else {
                    simplex[worst] = reflected;
                    scores[worst] = reflected_score;
                }
            } else if reflected_score < scores[second_worst] {
                simplex[worst] = reflected;
                scores[worst] = reflected_score;
            } else {
                if reflected_score < scores[worst] {
                    simplex[worst] = reflected;
                    scores[worst] = reflected_score;
                }

                let contracted = simplex[worst] * beta + centroid * (1.0 - beta);
                let contracted_score = objective.evaluate(&contracted)?;

                if contracted_score < scores[worst] {
                    simplex[worst] = contracted;
                    scores[worst] = contracted_score;
                } else {
                    let anchor = simplex[best];
                    for (vertex, score) in simplex.iter_mut().zip(scores.iter_mut()) {
                        *vertex = anchor + (*vertex - anchor) * sigma;
                        *score = objective.evaluate(vertex)?;
                    }
                }
            }

            if simplex_spread(&scores) < self.config.tolerance {
                converged = true;
                break;
            }
        }

        let (best, score) = scores
            .iter()
            .enumerate()
            .min_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, s)| (simplex[i], *s))
            .unwrap_or((start, f64::INFINITY));

        if converged {
            debug!(
                "restart {restart}: converged after {iterations} iterations, score {score:.6e}"
            );
        } else {
            warn!(
                "restart {restart}: no convergence within {} iterations, score {score:.6e}",
                self.config.max_iterations
            );
        }

        Ok(RestartSummary {
            start,
            params: best,
            score,
            iterations,
            converged,
        })
    }
}

/// Per-restart seed. Neighbouring user seeds must not share restart streams.
fn restart_seed(seed: u64, restart: usize) -> u64 {
    seed ^ (restart as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

/// Spread of the vertex scores used as the stopping criterion.
///
/// Both the mean and the variance are normalized by `n + 1`, so the value
/// only drops below the tolerance once the scores themselves approach zero;
/// a plateau of equal non-zero scores keeps iterating.
fn simplex_spread(scores: &[f64]) -> f64 {
    let denominator = scores.len() as f64 + 1.0;
    let mean = scores.iter().sum::<f64>() / denominator;
    let sum_squares: f64 = scores.iter().map(|x| (x - mean).powi(2)).sum();
    (sum_squares / denominator).sqrt()
}

/// Regular simplex of `N + 1` vertices with `start` as the first vertex.
///
/// Vertex `i + 1` offsets every parameter by `d1` except parameter `i`,
/// which is offset by `d2`, where for edge length `step`
/// `d1 = step·(√(N+1) − 1)/(N√2)` and `d2 = step·(√(N+1) + N − 1)/(N√2)`.
/// The translation and rotation blocks use their own edge lengths.
fn initial_simplex(
    start: &PoseParams,
    translation_step: f64,
    rotation_step: f64,
) -> Vec<PoseParams> {
    let n = N_PARAMS as f64;
    let offsets = |step: f64| {
        let d1 = step * ((n + 1.0).sqrt() - 1.0) / (n * 2f64.sqrt());
        let d2 = step * ((n + 1.0).sqrt() + n - 1.0) / (n * 2f64.sqrt());
        (d1, d2)
    };
    let (dt1, dt2) = offsets(translation_step);
    let (dr1, dr2) = offsets(rotation_step);

    let mut simplex = Vec::with_capacity(N_PARAMS + 1);
    simplex.push(*start);
    for i in 0..N_PARAMS {
        let mut vertex = *start;
        for j in 0..N_PARAMS {
            let (d1, d2) = if j < 3 { (dt1, dt2) } else { (dr1, dr2) };
            vertex[j] += if i == j { d2 } else { d1 };
        }
        simplex.push(vertex);
    }
    simplex
}
