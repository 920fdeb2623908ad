//! Two-way ANOVA over the capacity × disruption-duration factorial design.
//!
//! Treated as a boundary collaborator: this module owns the numeric
//! internals (sum-of-squares decomposition, F statistics via the
//! regularized incomplete beta function, and an approximated post-hoc
//! comparison), but callers only need the input/output shapes below.

use std::collections::BTreeMap;
use std::f64::consts::PI;

use crate::error::PreconditionError;

/// One completed replica's response value and its two factor levels.
#[derive(Debug, Clone)]
pub struct AnovaInputRow {
    pub capacity_level: String,
    pub disruption_level: String,
    pub response: f64,
}

/// Classifies a capacity (metric tons) into the factorial design's two
/// levels: `<= 450` is the status-quo level, otherwise proposed.
pub fn capacity_level(capacity_tm: f64) -> &'static str {
    if capacity_tm <= 450.0 {
        "Status Quo"
    } else {
        "Propuesta"
    }
}

/// Classifies a disruption's maximum duration (days) into the factorial
/// design's three levels.
pub fn disruption_level(disruption_max_days: f64) -> &'static str {
    if disruption_max_days <= 7.0 {
        "Corta"
    } else if disruption_max_days <= 14.0 {
        "Media"
    } else {
        "Larga"
    }
}

/// One row of the ANOVA source table.
#[derive(Debug, Clone, serde::Serialize)]
pub struct AnovaTableRow {
    pub source: String,
    pub sum_sq: f64,
    pub df: f64,
    pub mean_sq: f64,
    pub f_stat: Option<f64>,
    pub p_value: Option<f64>,
}

/// Mean and 95% confidence interval for one factor-level or cell group.
#[derive(Debug, Clone, serde::Serialize)]
pub struct GroupMean {
    pub label: String,
    pub n: usize,
    pub mean: f64,
    pub ci_lower: f64,
    pub ci_upper: f64,
}

/// One pairwise post-hoc comparison.
#[derive(Debug, Clone, serde::Serialize)]
pub struct TukeyComparison {
    pub group_a: String,
    pub group_b: String,
    pub mean_diff: f64,
    pub ci_lower: f64,
    pub ci_upper: f64,
    /// Bonferroni-adjusted p-value. An approximation of true Tukey HSD,
    /// which requires the studentized range distribution; see `DESIGN.md`.
    pub p_value_adj: f64,
    pub reject_null: bool,
}

/// Complete two-way ANOVA result.
#[derive(Debug, Clone, serde::Serialize)]
pub struct AnovaResult {
    pub table: Vec<AnovaTableRow>,
    pub eta_squared_capacity: f64,
    pub eta_squared_disruption: f64,
    pub eta_squared_interaction: f64,
    pub main_effect_capacity: f64,
    pub main_effect_disruption: f64,
    pub interaction_effect: f64,
    pub r_squared_adj: f64,
    pub cell_means: Vec<GroupMean>,
    pub capacity_means: Vec<GroupMean>,
    pub disruption_means: Vec<GroupMean>,
    pub tukey_capacity: Vec<TukeyComparison>,
    pub tukey_disruption: Vec<TukeyComparison>,
}

/// Runs the two-way ANOVA. Requires a complete, balanced factorial design
/// (every combination of the two factors present, with the same replicate
/// count in every cell) and at least 2 levels of each factor — matching the
/// preconditions the HTTP boundary must enforce before exposing this
/// routine.
pub fn two_way_anova(rows: &[AnovaInputRow]) -> Result<AnovaResult, PreconditionError> {
    if rows.len() < 4 {
        return Err(PreconditionError {
            message: format!(
                "at least 4 completed replicas are required for ANOVA, found {}",
                rows.len()
            ),
        });
    }

    let mut levels_a: Vec<String> = rows.iter().map(|r| r.capacity_level.clone()).collect();
    levels_a.sort();
    levels_a.dedup();
    let mut levels_b: Vec<String> = rows.iter().map(|r| r.disruption_level.clone()).collect();
    levels_b.sort();
    levels_b.dedup();

    if levels_a.len() < 2 {
        return Err(PreconditionError {
            message: format!(
                "at least 2 capacity levels are required for ANOVA, found {}",
                levels_a.len()
            ),
        });
    }
    if levels_b.len() < 2 {
        return Err(PreconditionError {
            message: format!(
                "at least 2 disruption-duration levels are required for ANOVA, found {}",
                levels_b.len()
            ),
        });
    }

    let mut cells: BTreeMap<(String, String), Vec<f64>> = BTreeMap::new();
    for row in rows {
        cells
            .entry((row.capacity_level.clone(), row.disruption_level.clone()))
            .or_default()
            .push(row.response);
    }

    if cells.len() != levels_a.len() * levels_b.len() {
        return Err(PreconditionError {
            message: "the factorial design is incomplete: at least one capacity/disruption \
                      combination has no completed replicas"
                .to_string(),
        });
    }
    let cell_n = cells.values().next().unwrap().len();
    if cells.values().any(|v| v.len() != cell_n) {
        return Err(PreconditionError {
            message: "ANOVA requires a balanced design: every cell must have the same number \
                      of completed replicas"
                .to_string(),
        });
    }

    let a = levels_a.len();
    let b = levels_b.len();
    let n = cell_n;
    let total_n = (a * b * n) as f64;

    let grand_mean = rows.iter().map(|r| r.response).sum::<f64>() / rows.len() as f64;

    let row_means: BTreeMap<&str, f64> = levels_a
        .iter()
        .map(|level| {
            let vals: Vec<f64> = rows
                .iter()
                .filter(|r| &r.capacity_level == level)
                .map(|r| r.response)
                .collect();
            (level.as_str(), vals.iter().sum::<f64>() / vals.len() as f64)
        })
        .collect();
    let col_means: BTreeMap<&str, f64> = levels_b
        .iter()
        .map(|level| {
            let vals: Vec<f64> = rows
                .iter()
                .filter(|r| &r.disruption_level == level)
                .map(|r| r.response)
                .collect();
            (level.as_str(), vals.iter().sum::<f64>() / vals.len() as f64)
        })
        .collect();
    let cell_means: BTreeMap<(&str, &str), f64> = cells
        .iter()
        .map(|((ka, kb), v)| ((ka.as_str(), kb.as_str()), v.iter().sum::<f64>() / v.len() as f64))
        .collect();

    let ss_total: f64 = rows.iter().map(|r| (r.response - grand_mean).powi(2)).sum();
    let ss_a: f64 = (b * n) as f64 * row_means.values().map(|m| (m - grand_mean).powi(2)).sum::<f64>();
    let ss_b: f64 = (a * n) as f64 * col_means.values().map(|m| (m - grand_mean).powi(2)).sum::<f64>();
    let ss_ab: f64 = n as f64
        * cell_means
            .iter()
            .map(|((ka, kb), m)| {
                let ra = row_means[ka];
                let cb = col_means[kb];
                (m - ra - cb + grand_mean).powi(2)
            })
            .sum::<f64>();
    let ss_within = (ss_total - ss_a - ss_b - ss_ab).max(0.0);

    let df_a = (a - 1) as f64;
    let df_b = (b - 1) as f64;
    let df_ab = ((a - 1) * (b - 1)) as f64;
    let df_within = (a * b * (n - 1)) as f64;
    let df_total = total_n - 1.0;

    let ms_a = ss_a / df_a;
    let ms_b = ss_b / df_b;
    let ms_ab = ss_ab / df_ab;
    let ms_within = if df_within > 0.0 { ss_within / df_within } else { 0.0 };

    let (f_a, p_a) = f_test(ms_a, ms_within, df_a, df_within);
    let (f_b, p_b) = f_test(ms_b, ms_within, df_b, df_within);
    let (f_ab, p_ab) = f_test(ms_ab, ms_within, df_ab, df_within);

    let table = vec![
        AnovaTableRow {
            source: "capacity".to_string(),
            sum_sq: ss_a,
            df: df_a,
            mean_sq: ms_a,
            f_stat: f_a,
            p_value: p_a,
        },
        AnovaTableRow {
            source: "disruption".to_string(),
            sum_sq: ss_b,
            df: df_b,
            mean_sq: ms_b,
            f_stat: f_b,
            p_value: p_b,
        },
        AnovaTableRow {
            source: "capacity:disruption".to_string(),
            sum_sq: ss_ab,
            df: df_ab,
            mean_sq: ms_ab,
            f_stat: f_ab,
            p_value: p_ab,
        },
        AnovaTableRow {
            source: "residual".to_string(),
            sum_sq: ss_within,
            df: df_within,
            mean_sq: ms_within,
            f_stat: None,
            p_value: None,
        },
        AnovaTableRow {
            source: "total".to_string(),
            sum_sq: ss_total,
            df: df_total,
            mean_sq: f64::NAN,
            f_stat: None,
            p_value: None,
        },
    ];

    let r_squared = 1.0 - ss_within / ss_total;
    let predictors = df_a + df_b + df_ab;
    let r_squared_adj = 1.0 - (1.0 - r_squared) * df_total / (total_n - predictors - 1.0);

    let main_effect_capacity = extremes(row_means.values().copied());
    let main_effect_disruption = extremes(col_means.values().copied());
    let interaction_effect = sample_std(&cell_means.values().copied().collect::<Vec<_>>());

    let group_means = |groups: &BTreeMap<&str, f64>, sizes: &BTreeMap<&str, usize>| -> Vec<GroupMean> {
        groups
            .iter()
            .map(|(label, mean)| {
                let n = sizes[label];
                let se = (ms_within / n as f64).sqrt();
                let t_crit = t_ppf(df_within, 0.05);
                GroupMean {
                    label: label.to_string(),
                    n,
                    mean: *mean,
                    ci_lower: mean - t_crit * se,
                    ci_upper: mean + t_crit * se,
                }
            })
            .collect()
    };
    let a_sizes: BTreeMap<&str, usize> = levels_a.iter().map(|l| (l.as_str(), b * n)).collect();
    let b_sizes: BTreeMap<&str, usize> = levels_b.iter().map(|l| (l.as_str(), a * n)).collect();
    let capacity_means = group_means(&row_means, &a_sizes);
    let disruption_means = group_means(&col_means, &b_sizes);

    let cell_means_out: Vec<GroupMean> = cell_means
        .iter()
        .map(|((ka, kb), mean)| {
            let se = (ms_within / n as f64).sqrt();
            let t_crit = t_ppf(df_within, 0.05);
            GroupMean {
                label: format!("{ka} / {kb}"),
                n,
                mean: *mean,
                ci_lower: mean - t_crit * se,
                ci_upper: mean + t_crit * se,
            }
        })
        .collect();

    let tukey_capacity = pairwise_tukey(&row_means, &a_sizes, ms_within, df_within);
    let tukey_disruption = pairwise_tukey(&col_means, &b_sizes, ms_within, df_within);

    Ok(AnovaResult {
        table,
        eta_squared_capacity: ss_a / ss_total,
        eta_squared_disruption: ss_b / ss_total,
        eta_squared_interaction: ss_ab / ss_total,
        main_effect_capacity,
        main_effect_disruption,
        interaction_effect,
        r_squared_adj,
        cell_means: cell_means_out,
        capacity_means,
        disruption_means,
        tukey_capacity,
        tukey_disruption,
    })
}

fn extremes(values: impl Iterator<Item = f64>) -> f64 {
    let (min, max) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(min, max), v| {
        (min.min(v), max.max(v))
    });
    max - min
}

fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}

fn pairwise_tukey(
    means: &BTreeMap<&str, f64>,
    sizes: &BTreeMap<&str, usize>,
    ms_within: f64,
    df_within: f64,
) -> Vec<TukeyComparison> {
    let labels: Vec<&str> = means.keys().copied().collect();
    let num_pairs = labels.len() * (labels.len().saturating_sub(1)) / 2;
    if num_pairs == 0 {
        return Vec::new();
    }
    let alpha_adj = (0.05 / num_pairs as f64).min(1.0);
    let t_crit = t_ppf(df_within, alpha_adj);

    let mut out = Vec::with_capacity(num_pairs);
    for i in 0..labels.len() {
        for j in (i + 1)..labels.len() {
            let (la, lb) = (labels[i], labels[j]);
            let mean_diff = means[la] - means[lb];
            let se = (ms_within * (1.0 / sizes[la] as f64 + 1.0 / sizes[lb] as f64)).sqrt();
            let t_stat = if se > 0.0 { mean_diff / se } else { 0.0 };
            let p_raw = t_cdf_two_tailed(t_stat.abs(), df_within);
            let p_adj = (p_raw * num_pairs as f64).min(1.0);
            out.push(TukeyComparison {
                group_a: la.to_string(),
                group_b: lb.to_string(),
                mean_diff,
                ci_lower: mean_diff - t_crit * se,
                ci_upper: mean_diff + t_crit * se,
                p_value_adj: p_adj,
                reject_null: p_adj < 0.05,
            });
        }
    }
    out
}

fn f_test(ms_effect: f64, ms_within: f64, df_effect: f64, df_within: f64) -> (Option<f64>, Option<f64>) {
    if df_effect <= 0.0 || df_within <= 0.0 || ms_within <= 0.0 {
        return (None, None);
    }
    let f_stat = ms_effect / ms_within;
    let x = df_effect * f_stat / (df_effect * f_stat + df_within);
    let p = 1.0 - regularized_incomplete_beta(df_effect / 2.0, df_within / 2.0, x);
    (Some(f_stat), Some(p.clamp(0.0, 1.0)))
}

/// Two-tailed Student's t p-value via the regularized incomplete beta
/// function: `P(|T| > t) = I_x(df/2, 1/2)` where `x = df / (df + t^2)`.
fn t_cdf_two_tailed(t: f64, df: f64) -> f64 {
    if df <= 0.0 {
        return 1.0;
    }
    let x = df / (df + t * t);
    regularized_incomplete_beta(df / 2.0, 0.5, x).clamp(0.0, 1.0)
}

/// Inverse of [`t_cdf_two_tailed`] by bisection: the critical value `t`
/// such that `P(|T| > t) = alpha`.
fn t_ppf(df: f64, alpha: f64) -> f64 {
    if df <= 0.0 {
        return 0.0;
    }
    let mut lo = 0.0_f64;
    let mut hi = 100.0_f64;
    for _ in 0..100 {
        let mid = (lo + hi) / 2.0;
        if t_cdf_two_tailed(mid, df) > alpha {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    (lo + hi) / 2.0
}

/// Regularized incomplete beta function `I_x(a, b)`, evaluated via its
/// continued-fraction expansion (Numerical Recipes formulation).
fn regularized_incomplete_beta(a: f64, b: f64, x: f64) -> f64 {
    if x <= 0.0 {
        return 0.0;
    }
    if x >= 1.0 {
        return 1.0;
    }
    let bt = (ln_gamma(a + b) - ln_gamma(a) - ln_gamma(b) + a * x.ln() + b * (1.0 - x).ln()).exp();
    if x < (a + 1.0) / (a + b + 2.0) {
        bt * beta_continued_fraction(a, b, x) / a
    } else {
        1.0 - bt * beta_continued_fraction(b, a, 1.0 - x) / b
    }
}

fn beta_continued_fraction(a: f64, b: f64, x: f64) -> f64 {
    const MAX_ITER: u32 = 200;
    const EPS: f64 = 1e-12;
    const TINY: f64 = 1e-30;

    let qab = a + b;
    let qap = a + 1.0;
    let qam = a - 1.0;

    let mut c = 1.0_f64;
    let mut d = 1.0 - qab * x / qap;
    if d.abs() < TINY {
        d = TINY;
    }
    d = 1.0 / d;
    let mut h = d;

    for m in 1..=MAX_ITER {
        let mf = m as f64;
        let m2 = 2.0 * mf;

        let aa = mf * (b - mf) * x / ((qam + m2) * (a + m2));
        d = 1.0 + aa * d;
        if d.abs() < TINY {
            d = TINY;
        }
        c = 1.0 + aa / c;
        if c.abs() < TINY {
            c = TINY;
        }
        d = 1.0 / d;
        h *= d * c;

        let aa = -(a + mf) * (qab + mf) * x / ((a + m2) * (qap + m2));
        d = 1.0 + aa * d;
        if d.abs() < TINY {
            d = TINY;
        }
        c = 1.0 + aa / c;
        if c.abs() < TINY {
            c = TINY;
        }
        d = 1.0 / d;
        let del = d * c;
        h *= del;

        if (del - 1.0).abs() < EPS {
            break;
        }
    }
    h
}

/// Lanczos approximation of the natural log of the gamma function.
fn ln_gamma(x: f64) -> f64 {
    const COEFFS: [f64; 9] = [
        0.99999999999980993,
        676.5203681218851,
        -1259.1392167224028,
        771.32342877765313,
        -176.61502916214059,
        12.507343278686905,
        -0.13857109526572012,
        9.9843695780195716e-6,
        1.5056327351493116e-7,
    ];
    const G: f64 = 7.0;

    if x < 0.5 {
        // Reflection formula.
        (PI / (PI * x).sin()).ln() - ln_gamma(1.0 - x)
    } else {
        let x = x - 1.0;
        let mut a = COEFFS[0];
        let t = x + G + 0.5;
        for (i, coeff) in COEFFS.iter().enumerate().skip(1) {
            a += coeff / (x + i as f64);
        }
        0.5 * (2.0 * PI).ln() + (x + 0.5) * t.ln() - t + a.ln()
    }
}
