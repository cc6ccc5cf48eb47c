#[cfg(feature = "visualise")]
pub fn plot_noise_fit(
    diag: &todfilter_core::whitening::WhitenDiagnostics,
    out_file: &std::path::Path,
    fname: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    use plotters::prelude::*;

    let positive = |xs: &[f64]| -> (f64, f64) {
        xs.iter()
            .copied()
            .filter(|v| *v > 0.0 && v.is_finite())
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)))
    };
    let (f_lo, f_hi) = positive(&diag.fit_freqs);
    let (m_lo, m_hi) = {
        let (a, b) = positive(&diag.fit_magnitudes);
        let (c, d) = positive(&diag.model_magnitudes);
        (a.min(c), b.max(d))
    };
    if !(f_lo < f_hi && m_lo <= m_hi) {
        return Err("nothing positive to plot".into());
    }

    let root = BitMapBackend::new(out_file, (1200, 900)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(format!("Noise fit of `{}`", fname), ("sans-serif", 24))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(70)
        .build_cartesian_2d((f_lo..f_hi).log_scale(), (m_lo * 0.9..m_hi * 1.1).log_scale())?;

    chart
        .configure_mesh()
        .x_desc("Frequency (Hz)")
        .y_desc("|X(f)|")
        .x_label_formatter(&|x| format!("{:.2e}", x))
        .y_label_formatter(&|y| format!("{:.2e}", y))
        .draw()?;

    let observed = diag
        .fit_freqs
        .iter()
        .zip(&diag.fit_magnitudes)
        .filter(|(f, m)| **f > 0.0 && **m > 0.0);
    chart
        .draw_series(
            observed.map(|(&f, &m)| Circle::new((f, m), 2, ShapeStyle::from(&BLUE).filled())),
        )?
        .label("Observed")
        .legend(|(x, y)| Circle::new((x + 10, y), 4, ShapeStyle::from(&BLUE).filled()));

    chart
        .draw_series(LineSeries::new(
            diag.fit_freqs
                .iter()
                .zip(&diag.model_magnitudes)
                .filter(|(f, m)| **f > 0.0 && **m > 0.0)
                .map(|(&f, &m)| (f, m)),
            &RED,
        ))?
        .label("sqrt(a + b/f)")
        .legend(|(x, y)| PathElement::new([(x, y), (x + 20, y)], RED));

    chart.configure_series_labels().border_style(BLACK).draw()?;
    root.present()?;

    Ok(())
}
