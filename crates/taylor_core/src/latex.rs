//! LaTeX rendering of a Taylor polynomial around `x0`.

/// Coefficients with a smaller magnitude are left out of the rendered polynomial.
pub const COEFFICIENT_EPSILON: f64 = 1e-15;

const SCIENTIFIC_ABOVE: f64 = 1e6;
const SCIENTIFIC_BELOW: f64 = 1e-6;

/// Renders `y=a_0+a_1(x-x0)+a_2(x-x0)^{2}...`, or `y=0` if every term is
/// negligible. Unit magnitudes are left implicit on non-constant terms.
pub fn format_latex(coefficients: &[f64], x0: f64) -> String {
    let center = format_number(x0);
    let mut latex = String::from("y=");
    let mut empty = true;

    for (k, &a) in coefficients.iter().enumerate() {
        if a.abs() < COEFFICIENT_EPSILON {
            continue;
        }
        if a < 0.0 {
            latex.push('-');
        } else if !empty {
            latex.push('+');
        }
        let magnitude = format_number(a.abs());
        if k == 0 || magnitude != "1" {
            latex.push_str(&magnitude);
        }
        match k {
            0 => {}
            1 => latex.push_str(&format!("(x-{center})")),
            _ => latex.push_str(&format!("(x-{center})^{{{k}}}")),
        }
        empty = false;
    }

    if empty {
        latex.push('0');
    }
    latex
}

/// Fixed notation with up to six decimals, or `m\cdot10^{e}` outside
/// `[1e-6, 1e6)`.
pub fn format_number(value: f64) -> String {
    if value == 0.0 {
        return "0".to_string();
    }
    if !value.is_finite() {
        return value.to_string();
    }
    let magnitude = value.abs();
    if magnitude >= SCIENTIFIC_ABOVE || magnitude < SCIENTIFIC_BELOW {
        let formatted = format!("{value:.6e}");
        if let Some((mantissa, exponent)) = formatted.split_once('e') {
            return format!("{}\\cdot10^{{{exponent}}}", trim_fraction(mantissa));
        }
        return formatted;
    }
    trim_fraction(&format!("{value:.6}")).to_string()
}

/// Drops trailing zeros of a fraction, and the point if nothing is left.
fn trim_fraction(text: &str) -> &str {
    if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.')
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn square_at_origin() {
        assert_eq!(format_latex(&[0.0, 0.0, 1.0], 0.0), "y=(x-0)^{2}");
    }

    #[test]
    fn exp_series() {
        let c = [1.0, 1.0, 0.5, 1.0 / 6.0];
        assert_eq!(
            format_latex(&c, 0.0),
            "y=1+(x-0)+0.5(x-0)^{2}+0.166667(x-0)^{3}"
        );
    }

    #[test]
    fn signs_and_negligible_terms() {
        assert_eq!(format_latex(&[-2.0, 1e-16, -0.25], 1.0), "y=-2-0.25(x-1)^{2}");
        assert_eq!(format_latex(&[0.0, 3.0], 2.5), "y=3(x-2.5)");
        assert_eq!(format_latex(&[1e-16, -1e-17], 0.0), "y=0");
        assert_eq!(format_latex(&[], 0.0), "y=0");
    }

    #[test]
    fn negative_expansion_point_is_written_verbatim() {
        assert_eq!(format_latex(&[0.0, 2.0], -0.5), "y=2(x--0.5)");
    }

    #[test]
    fn numbers() {
        assert_eq!(format_number(0.0), "0");
        assert_eq!(format_number(-0.0), "0");
        assert_eq!(format_number(2.5e-8), "2.5\\cdot10^{-8}");
        assert_eq!(format_number(1234567.0), "1.234567\\cdot10^{6}");
        assert_eq!(format_number(1e6), "1\\cdot10^{6}");
        assert_eq!(format_number(-0.125), "-0.125");
        assert_eq!(format_number(42.0), "42");
        assert_eq!(format_number(1.0 / 3.0), "0.333333");
        assert_eq!(format_number(0.000001), "0.000001");
    }

    #[test]
    fn formatting_is_deterministic() {
        let c = [0.1, -3.25e-9, 7e8, 0.5];
        assert_eq!(format_latex(&c, -1.25), format_latex(&c, -1.25));
    }
}
