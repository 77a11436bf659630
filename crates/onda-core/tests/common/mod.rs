//! Signal measurements shared by the integration and property tests.

/// Least-squares fit of `a*sin(w n) + b*cos(w n)`; returns (amplitude, residual rms).
pub fn fit_tone(signal: &[f32], w: f64) -> (f64, f64) {
    let (mut ss, mut cc, mut sc, mut ys, mut yc) = (0.0, 0.0, 0.0, 0.0, 0.0);
    for (n, &y) in signal.iter().enumerate() {
        let (s, c) = (w * n as f64).sin_cos();
        let y = f64::from(y);
        ss += s * s;
        cc += c * c;
        sc += s * c;
        ys += y * s;
        yc += y * c;
    }
    let det = ss * cc - sc * sc;
    let a = (ys * cc - yc * sc) / det;
    let b = (yc * ss - ys * sc) / det;
    let residual: f64 = signal
        .iter()
        .enumerate()
        .map(|(n, &y)| {
            let (s, c) = (w * n as f64).sin_cos();
            (f64::from(y) - a * s - b * c).powi(2)
        })
        .sum();
    ((a * a + b * b).sqrt(), (residual / signal.len() as f64).sqrt())
}
