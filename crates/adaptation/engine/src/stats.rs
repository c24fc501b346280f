//! Small numeric toolkit: descriptive statistics, least squares, and a
//! pooled-variance two-sample t-test.

/// Cap for statistics that would otherwise diverge on zero variance.
pub const MAX_STATISTIC: f64 = 1e6;

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population variance.
pub fn variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64
}

/// Unbiased (n - 1) sample variance.
pub fn sample_variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64
}

pub fn std_dev(values: &[f64]) -> f64 {
    variance(values).sqrt()
}

/// Least-squares line over `(index, value)`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
}

impl LinearFit {
    pub fn at(&self, x: f64) -> f64 {
        self.intercept + self.slope * x
    }

    /// Root-mean-square residual of the fit over `values`.
    pub fn rmse(&self, values: &[f64]) -> f64 {
        if values.is_empty() {
            return 0.0;
        }
        let sse: f64 = values
            .iter()
            .enumerate()
            .map(|(i, v)| (v - self.at(i as f64)).powi(2))
            .sum();
        (sse / values.len() as f64).sqrt()
    }
}

pub fn linear_fit(values: &[f64]) -> LinearFit {
    let n = values.len();
    if n < 2 {
        return LinearFit {
            slope: 0.0,
            intercept: mean(values),
        };
    }
    let x_mean = (n - 1) as f64 / 2.0;
    let y_mean = mean(values);
    let (mut sxx, mut sxy) = (0.0, 0.0);
    for (i, y) in values.iter().enumerate() {
        let dx = i as f64 - x_mean;
        sxx += dx * dx;
        sxy += dx * (y - y_mean);
    }
    let slope = sxy / sxx;
    LinearFit {
        slope,
        intercept: y_mean - slope * x_mean,
    }
}

/// Pearson correlation between index and value; 0 for a flat series.
pub fn index_correlation(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let x_mean = (n - 1) as f64 / 2.0;
    let y_mean = mean(values);
    let (mut sxx, mut syy, mut sxy) = (0.0, 0.0, 0.0);
    for (i, y) in values.iter().enumerate() {
        let dx = i as f64 - x_mean;
        let dy = y - y_mean;
        sxx += dx * dx;
        syy += dy * dy;
        sxy += dx * dy;
    }
    if syy <= f64::EPSILON {
        return 0.0;
    }
    (sxy / (sxx * syy).sqrt()).clamp(-1.0, 1.0)
}

/// Trailing moving average; the first points average what is available.
pub fn moving_average(values: &[f64], window: usize) -> Vec<f64> {
    let window = window.max(1);
    let mut out = Vec::with_capacity(values.len());
    let mut running = 0.0;
    for (i, v) in values.iter().enumerate() {
        running += v;
        if i >= window {
            running -= values[i - window];
        }
        out.push(running / (i + 1).min(window) as f64);
    }
    out
}

/// Mean of second differences.
pub fn mean_second_difference(values: &[f64]) -> f64 {
    if values.len() < 3 {
        return 0.0;
    }
    let diffs: Vec<f64> = values
        .windows(3)
        .map(|w| w[2] - 2.0 * w[1] + w[0])
        .collect();
    mean(&diffs)
}

/// Outcome of a two-sample test of `current` against `baseline`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TwoSampleTest {
    pub t_statistic: f64,
    pub degrees_of_freedom: f64,
    /// Two-sided p-value.
    pub p_value: f64,
    /// Cohen's d: mean difference over the pooled standard deviation.
    pub effect_size: f64,
}

/// Student's t-test with pooled variance. `None` when either side has fewer
/// than two samples.
pub fn pooled_t_test(baseline: &[f64], current: &[f64], epsilon: f64) -> Option<TwoSampleTest> {
    let (na, nb) = (baseline.len(), current.len());
    if na < 2 || nb < 2 {
        return None;
    }
    let df = (na + nb - 2) as f64;
    let pooled_var = ((na - 1) as f64 * sample_variance(baseline)
        + (nb - 1) as f64 * sample_variance(current))
        / df;
    let pooled_sd = pooled_var.sqrt();
    let diff = mean(current) - mean(baseline);

    if pooled_sd < epsilon {
        // Degenerate spread: identical samples on each side.
        let (t, p, d) = if diff.abs() < epsilon {
            (0.0, 1.0, 0.0)
        } else {
            (diff.signum() * MAX_STATISTIC, 0.0, diff.signum() * MAX_STATISTIC)
        };
        return Some(TwoSampleTest {
            t_statistic: t,
            degrees_of_freedom: df,
            p_value: p,
            effect_size: d,
        });
    }

    let se = pooled_sd * (1.0 / na as f64 + 1.0 / nb as f64).sqrt();
    let t = (diff / se).clamp(-MAX_STATISTIC, MAX_STATISTIC);
    Some(TwoSampleTest {
        t_statistic: t,
        degrees_of_freedom: df,
        p_value: student_t_two_sided(t, df),
        effect_size: (diff / pooled_sd).clamp(-MAX_STATISTIC, MAX_STATISTIC),
    })
}

/// Two-sided tail probability of Student's t: `I_{df/(df+t²)}(df/2, 1/2)`.
pub fn student_t_two_sided(t: f64, df: f64) -> f64 {
    if !t.is_finite() {
        return 0.0;
    }
    if df <= 0.0 {
        return 1.0;
    }
    let x = df / (df + t * t);
    regularized_incomplete_beta(df / 2.0, 0.5, x).clamp(0.0, 1.0)
}

/// Natural log of the gamma function (Lanczos, g = 7).
pub fn ln_gamma(x: f64) -> f64 {
    const G: f64 = 7.0;
    const COEF: [f64; 9] = [
        0.999_999_999_999_809_9,
        676.520_368_121_885_1,
        -1_259.139_216_722_402_8,
        771.323_428_777_653_1,
        -176.615_029_162_140_6,
        12.507_343_278_686_905,
        -0.138_571_095_265_720_12,
        9.984_369_578_019_572e-6,
        1.505_632_735_149_311_6e-7,
    ];
    if x < 0.5 {
        let pi = std::f64::consts::PI;
        return (pi / (pi * x).sin()).ln() - ln_gamma(1.0 - x);
    }
    let x = x - 1.0;
    let mut a = COEF[0];
    let t = x + G + 0.5;
    for (i, c) in COEF.iter().enumerate().skip(1) {
        a += c / (x + i as f64);
    }
    0.5 * (2.0 * std::f64::consts::PI).ln() + (x + 0.5) * t.ln() - t + a.ln()
}

/// Regularized incomplete beta `I_x(a, b)`.
pub fn regularized_incomplete_beta(a: f64, b: f64, x: f64) -> f64 {
    if x <= 0.0 {
        return 0.0;
    }
    if x >= 1.0 {
        return 1.0;
    }
    let ln_front = ln_gamma(a + b) - ln_gamma(a) - ln_gamma(b) + a * x.ln() + b * (1.0 - x).ln();
    let front = ln_front.exp();
    if x < (a + 1.0) / (a + b + 2.0) {
        front * beta_continued_fraction(a, b, x) / a
    } else {
        1.0 - front * beta_continued_fraction(b, a, 1.0 - x) / b
    }
}

/// Modified Lentz evaluation of the incomplete beta continued fraction.
fn beta_continued_fraction(a: f64, b: f64, x: f64) -> f64 {
    const MAX_ITERATIONS: usize = 300;
    const TOLERANCE: f64 = 3e-14;
    const TINY: f64 = 1e-300;

    let qab = a + b;
    let qap = a + 1.0;
    let qam = a - 1.0;
    let mut c = 1.0;
    let mut d = 1.0 - qab * x / qap;
    if d.abs() < TINY {
        d = TINY;
    }
    d = 1.0 / d;
    let mut h = d;

    for m in 1..=MAX_ITERATIONS {
        let m = m as f64;
        let m2 = 2.0 * m;

        let aa = m * (b - m) * x / ((qam + m2) * (a + m2));
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

        let aa = -(a + m) * (qab + m) * x / ((a + m2) * (qap + m2));
        d = 1.0 + aa * d;
        if d.abs() < TINY {
            d = TINY;
        }
        c = 1.0 + aa / c;
        if c.abs() < TINY {
            c = TINY;
        }
        d = 1.0 / d;
        let delta = d * c;
        h *= delta;
        if (delta - 1.0).abs() < TOLERANCE {
            break;
        }
    }
    h
}
