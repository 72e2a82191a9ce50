//! Ordinary least squares: the linear baseline model and the coefficient
//! summary used for hyperparameter impact analysis.

use ndarray::{Array1, Array2, Axis};

use crate::domain::error::AlphalabError;
use crate::domain::stats::normal_cdf;

/// Relative size below which a Cholesky pivot counts as zero.
const PIVOT_EPS: f64 = 1e-10;
const Z_95: f64 = 1.959_963_984_540_054;

#[derive(Debug, Clone, PartialEq)]
pub struct LinearRegression {
    pub intercept: f64,
    pub coefficients: Array1<f64>,
}

fn design_matrix(rows: &[Vec<f64>], width: usize) -> Result<Array2<f64>, AlphalabError> {
    if rows.iter().any(|r| r.len() != width) {
        return Err(AlphalabError::model("ragged feature rows"));
    }
    let flat: Vec<f64> = rows.iter().flatten().copied().collect();
    Array2::from_shape_vec((rows.len(), width), flat)
        .map_err(|e| AlphalabError::model(e.to_string()))
}

impl LinearRegression {
    /// Fit `y = b0 + X b` on centered data. Constant columns get weight 0.
    pub fn fit(rows: &[Vec<f64>], targets: &[f64]) -> Result<Self, AlphalabError> {
        let n = rows.len();
        if n == 0 {
            return Err(AlphalabError::model("cannot fit regression on empty data"));
        }
        if n != targets.len() {
            return Err(AlphalabError::model(format!(
                "{} rows but {} targets",
                n,
                targets.len()
            )));
        }
        let x = design_matrix(rows, rows[0].len())?;
        let y = Array1::from_vec(targets.to_vec());

        let x_mean = x
            .mean_axis(Axis(0))
            .ok_or_else(|| AlphalabError::model("cannot fit regression on empty data"))?;
        let y_mean = y.sum() / n as f64;

        let active: Vec<usize> = (0..x.ncols())
            .filter(|&j| x.column(j).iter().any(|v| (v - x_mean[j]).abs() > 1e-12))
            .collect();
        let xc = &x.select(Axis(1), &active) - &x_mean.select(Axis(0), &active);
        let yc = &y - y_mean;

        let xt = xc.t();
        let xtx = xt.dot(&xc);
        let xty = xt.dot(&yc);
        let beta = solve_normal_equations(&xtx, &xty)?;

        let mut coefficients = Array1::zeros(x.ncols());
        for (a, &j) in active.iter().enumerate() {
            coefficients[j] = beta[a];
        }
        let intercept = y_mean - coefficients.dot(&x_mean);

        Ok(Self {
            intercept,
            coefficients,
        })
    }

    pub fn predict_one(&self, row: &[f64]) -> f64 {
        self.intercept
            + self
                .coefficients
                .iter()
                .zip(row)
                .map(|(c, x)| c * x)
                .sum::<f64>()
    }

    pub fn predict(&self, rows: &[Vec<f64>]) -> Vec<f64> {
        match design_matrix(rows, self.coefficients.len()) {
            Ok(x) => (x.dot(&self.coefficients) + self.intercept).to_vec(),
            Err(_) => rows.iter().map(|r| self.predict_one(r)).collect(),
        }
    }
}

/// Solve `A x = b` for symmetric positive semi-definite `A`, adding a small
/// ridge when `A` is singular (collinear dummies).
fn solve_normal_equations(
    xtx: &Array2<f64>,
    xty: &Array1<f64>,
) -> Result<Array1<f64>, AlphalabError> {
    if let Some(l) = cholesky(xtx) {
        return Ok(cholesky_solve(&l, xty));
    }
    let scale = xtx.diag().iter().copied().fold(0.0, f64::max).max(1.0);
    let mut ridged = xtx.clone();
    ridged.diag_mut().mapv_inplace(|d| d + scale * 1e-8);
    let l = cholesky(&ridged).ok_or_else(|| AlphalabError::model("singular design matrix"))?;
    Ok(cholesky_solve(&l, xty))
}

/// Lower triangular `L` with `A = L L'`, or `None` when `A` is not
/// positive definite.
fn cholesky(a: &Array2<f64>) -> Option<Array2<f64>> {
    let n = a.nrows();
    let mut l = Array2::<f64>::zeros((n, n));
    for i in 0..n {
        for j in 0..=i {
            let sum: f64 = (0..j).map(|k| l[[i, k]] * l[[j, k]]).sum();
            if i == j {
                let diag = a[[i, i]] - sum;
                if diag <= PIVOT_EPS * a[[i, i]].abs().max(1.0) {
                    return None;
                }
                l[[i, j]] = diag.sqrt();
            } else {
                l[[i, j]] = (a[[i, j]] - sum) / l[[j, j]];
            }
        }
    }
    Some(l)
}

fn cholesky_solve(l: &Array2<f64>, b: &Array1<f64>) -> Array1<f64> {
    let n = l.nrows();
    // forward: L z = b
    let mut z = Array1::<f64>::zeros(n);
    for i in 0..n {
        let sum: f64 = (0..i).map(|j| l[[i, j]] * z[j]).sum();
        z[i] = (b[i] - sum) / l[[i, i]];
    }
    // backward: L' x = z
    let mut x = Array1::<f64>::zeros(n);
    for i in (0..n).rev() {
        let sum: f64 = (i + 1..n).map(|j| l[[j, i]] * x[j]).sum();
        x[i] = (z[i] - sum) / l[[i, i]];
    }
    x
}

#[derive(Debug, Clone, PartialEq)]
pub struct OlsCoefficient {
    pub variable: String,
    pub coef: f64,
    pub std_err: f64,
    pub t: f64,
    pub p_value: f64,
    pub ci_low: f64,
    pub ci_high: f64,
}

/// OLS with a constant term and classical standard errors.
///
/// The first entry is the intercept, named `const`. P-values and the 95 %
/// interval use the normal approximation.
pub fn ols_summary(
    rows: &[Vec<f64>],
    targets: &[f64],
    names: &[String],
) -> Result<Vec<OlsCoefficient>, AlphalabError> {
    let n = rows.len();
    let p = names.len() + 1;
    if n != targets.len() || rows.iter().any(|r| r.len() + 1 != p) {
        return Err(AlphalabError::model("design matrix does not match names"));
    }
    if n <= p {
        return Err(AlphalabError::InsufficientData {
            what: "OLS summary".into(),
            have: n,
            need: p + 1,
        });
    }

    let mut design = Array2::<f64>::ones((n, p));
    for (i, row) in rows.iter().enumerate() {
        for (j, &v) in row.iter().enumerate() {
            design[[i, j + 1]] = v;
        }
    }
    let y = Array1::from_vec(targets.to_vec());

    let xt = design.t();
    let xtx = xt.dot(&design);
    let l = cholesky(&xtx).ok_or_else(|| AlphalabError::model("singular design matrix"))?;
    let beta = cholesky_solve(&l, &xt.dot(&y));

    // diagonal of (X'X)^-1, one unit vector at a time
    let inv_diag: Vec<f64> = (0..p)
        .map(|a| {
            let mut unit = Array1::<f64>::zeros(p);
            unit[a] = 1.0;
            cholesky_solve(&l, &unit)[a]
        })
        .collect();

    let residuals = &y - &design.dot(&beta);
    let sigma2 = residuals.dot(&residuals) / (n - p) as f64;

    let variables = std::iter::once("const".to_string()).chain(names.iter().cloned());
    Ok(variables
        .enumerate()
        .map(|(a, variable)| {
            let coef = beta[a];
            let std_err = (sigma2 * inv_diag[a]).max(0.0).sqrt();
            let t = if std_err > 0.0 { coef / std_err } else { f64::NAN };
            let p_value = if t.is_finite() {
                2.0 * (1.0 - normal_cdf(t.abs()))
            } else {
                f64::NAN
            };
            OlsCoefficient {
                variable,
                coef,
                std_err,
                t,
                p_value,
                ci_low: coef - Z_95 * std_err,
                ci_high: coef + Z_95 * std_err,
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn recovers_exact_linear_relationship() {
        let rows: Vec<Vec<f64>> = (0..20)
            .map(|i| vec![i as f64, ((i * 7) % 5) as f64])
            .collect();
        let targets: Vec<f64> = rows.iter().map(|r| 1.5 + 2.0 * r[0] - 0.5 * r[1]).collect();

        let model = LinearRegression::fit(&rows, &targets).unwrap();
        assert_abs_diff_eq!(model.intercept, 1.5, epsilon = 1e-9);
        assert_abs_diff_eq!(model.coefficients[0], 2.0, epsilon = 1e-9);
        assert_abs_diff_eq!(model.coefficients[1], -0.5, epsilon = 1e-9);
        assert_abs_diff_eq!(model.predict_one(&[10.0, 2.0]), 20.5, epsilon = 1e-9);
    }

    #[test]
    fn constant_column_gets_zero_weight() {
        let rows: Vec<Vec<f64>> = (0..10).map(|i| vec![i as f64, 3.0]).collect();
        let targets: Vec<f64> = (0..10).map(|i| i as f64 * 2.0).collect();
        let model = LinearRegression::fit(&rows, &targets).unwrap();
        assert_eq!(model.coefficients[1], 0.0);
        assert_abs_diff_eq!(model.coefficients[0], 2.0, epsilon = 1e-9);
    }

    #[test]
    fn collinear_columns_still_fit() {
        let rows: Vec<Vec<f64>> = (0..10).map(|i| vec![i as f64, 2.0 * i as f64]).collect();
        let targets: Vec<f64> = (0..10).map(|i| 1.0 + i as f64).collect();
        let model = LinearRegression::fit(&rows, &targets).unwrap();
        let preds = model.predict(&rows);
        for (p, t) in preds.iter().zip(&targets) {
            assert_abs_diff_eq!(*p, *t, epsilon = 1e-4);
        }
    }

    #[test]
    fn rejects_empty_and_mismatched() {
        assert!(LinearRegression::fit(&[], &[]).is_err());
        assert!(LinearRegression::fit(&[vec![1.0]], &[1.0, 2.0]).is_err());
    }

    #[test]
    fn ols_summary_reports_significance() {
        let rows: Vec<Vec<f64>> = (0..50)
            .map(|i| vec![i as f64, ((i * 13) % 7) as f64])
            .collect();
        // second regressor carries only deterministic noise-like variation
        let targets: Vec<f64> = rows
            .iter()
            .enumerate()
            .map(|(i, r)| 3.0 * r[0] + if i % 2 == 0 { 0.5 } else { -0.5 })
            .collect();
        let names = vec!["x".to_string(), "z".to_string()];
        let summary = ols_summary(&rows, &targets, &names).unwrap();

        assert_eq!(summary.len(), 3);
        assert_eq!(summary[0].variable, "const");
        let x = &summary[1];
        assert_abs_diff_eq!(x.coef, 3.0, epsilon = 0.05);
        assert!(x.p_value < 1e-6);
        assert!(x.ci_low < x.coef && x.coef < x.ci_high);
    }

    #[test]
    fn ols_standard_error_matches_closed_form() {
        let xs: Vec<f64> = (0..30).map(|i| i as f64).collect();
        let rows: Vec<Vec<f64>> = xs.iter().map(|&x| vec![x]).collect();
        let targets: Vec<f64> = xs
            .iter()
            .enumerate()
            .map(|(i, &x)| 2.0 + 0.5 * x + [0.3, -0.1, -0.2][i % 3])
            .collect();
        let summary = ols_summary(&rows, &targets, &["x".to_string()]).unwrap();

        let n = xs.len() as f64;
        let x_mean = xs.iter().sum::<f64>() / n;
        let sxx: f64 = xs.iter().map(|x| (x - x_mean).powi(2)).sum();
        let rss: f64 = targets
            .iter()
            .zip(&xs)
            .map(|(y, x)| (y - summary[0].coef - summary[1].coef * x).powi(2))
            .sum();
        let expected = (rss / (n - 2.0) / sxx).sqrt();
        assert_abs_diff_eq!(summary[1].std_err, expected, epsilon = 1e-9);
    }

    #[test]
    fn ols_summary_rejects_collinear_design() {
        let rows: Vec<Vec<f64>> = (0..10).map(|i| vec![i as f64, 2.0 * i as f64]).collect();
        let targets: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let names = vec!["a".to_string(), "b".to_string()];
        assert!(matches!(
            ols_summary(&rows, &targets, &names),
            Err(AlphalabError::Model { .. })
        ));
    }

    #[test]
    fn ols_summary_needs_degrees_of_freedom() {
        let rows = vec![vec![1.0], vec![2.0]];
        let err = ols_summary(&rows, &[1.0, 2.0], &["x".to_string()]);
        assert!(matches!(err, Err(AlphalabError::InsufficientData { .. })));
    }
}
