/// Normalize a free-text achievement field into [0,1].
///
/// Accepts `"a/b"` fractions, decimals (`"0.6"`), and whole percentages
/// (`"60"`; anything above 1 is read as a percentage). Everything that does
/// not parse resolves to 0.
pub fn parse_ratio(text: &str) -> f64 {
    let t = text.trim();
    if t.is_empty() || t == "0" || t == "0.0" || t.eq_ignore_ascii_case("nan") {
        return 0.0;
    }

    let value = match t.split_once('/') {
        Some((num, den)) => {
            let (Some(num), Some(den)) = (parse_finite(num), parse_finite(den)) else {
                return 0.0;
            };
            if den == 0.0 {
                return 0.0;
            }
            num / den
        }
        None => {
            let Some(v) = parse_finite(t) else {
                return 0.0;
            };
            if v > 1.0 {
                v / 100.0
            } else {
                v
            }
        }
    };

    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

pub fn parse_ratio_opt(text: Option<&str>) -> f64 {
    text.map(parse_ratio).unwrap_or(0.0)
}

fn parse_finite(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12
    }

    #[test]
    fn fraction_decimal_and_percentage_forms_agree() {
        assert!(close(parse_ratio("3/5"), 0.6));
        assert!(close(parse_ratio("0.6"), 0.6));
        assert!(close(parse_ratio("60"), 0.6));
        assert!(close(parse_ratio(" 1.5 / 3 "), 0.5));
    }

    #[test]
    fn degenerate_inputs_resolve_to_zero() {
        for s in ["", "   ", "0", "0.0", "nan", "NaN", "abc", "5/0", "3/5/7", "/", "1/", "inf", "60%"] {
            assert_eq!(parse_ratio(s), 0.0, "input {:?}", s);
        }
        assert_eq!(parse_ratio_opt(None), 0.0);
    }

    #[test]
    fn out_of_range_values_clamp() {
        assert_eq!(parse_ratio("7/5"), 1.0);
        assert_eq!(parse_ratio("150"), 1.0);
        assert_eq!(parse_ratio("-3/5"), 0.0);
        assert_eq!(parse_ratio("-0.4"), 0.0);
        assert_eq!(parse_ratio("1"), 1.0);
        assert_eq!(parse_ratio("100"), 1.0);
    }

    proptest! {
        #[test]
        fn fractions_stay_in_unit_interval(a in -1_000i64..1_000, b in -1_000i64..1_000) {
            prop_assume!(b != 0);
            let r = parse_ratio(&format!("{}/{}", a, b));
            prop_assert!((0.0..=1.0).contains(&r));
        }

        #[test]
        fn arbitrary_text_never_leaves_unit_interval(s in ".{0,24}") {
            let r = parse_ratio(&s);
            prop_assert!((0.0..=1.0).contains(&r));
        }
    }
}
