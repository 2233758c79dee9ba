//! Decimal rounding for gauge outputs.
//!
//! Rounding works on the shortest decimal text of a float rather than on its
//! binary value. `1.005` is stored as `1.00499999999999989...`, so rounding
//! the binary value would give `1.00`; rounding the text `1.005` gives the
//! `1.01` a person reading the gauge would expect. Halves go away from zero.

/// Round `value` to `digits` fraction digits, halves away from zero.
pub fn round_half_away(value: f64, digits: u32) -> f64 {
    if !value.is_finite() {
        return value;
    }

    // Display for f64 is the shortest round-trip text and never uses exponents.
    let text = format!("{}", value.abs());
    let (int_part, frac_part) = match text.split_once('.') {
        Some((i, f)) => (i, f),
        None => return value,
    };

    let digits = digits as usize;
    if frac_part.len() <= digits {
        return value;
    }

    let mut kept: Vec<u8> = int_part
        .bytes()
        .chain(frac_part.bytes().take(digits))
        .map(|b| b - b'0')
        .collect();

    if frac_part.as_bytes()[digits] >= b'5' {
        let mut i = kept.len();
        loop {
            if i == 0 {
                kept.insert(0, 1);
                break;
            }
            i -= 1;
            if kept[i] == 9 {
                kept[i] = 0;
            } else {
                kept[i] += 1;
                break;
            }
        }
    }

    let split = kept.len() - digits;
    let mut rounded = String::with_capacity(kept.len() + 2);
    if value.is_sign_negative() {
        rounded.push('-');
    }
    rounded.extend(kept[..split].iter().map(|d| char::from(b'0' + d)));
    if digits > 0 {
        rounded.push('.');
        rounded.extend(kept[split..].iter().map(|d| char::from(b'0' + d)));
    }

    match rounded.parse::<f64>() {
        // no "-0.00" on the wire
        Ok(v) if v == 0.0 => 0.0,
        Ok(v) => v,
        Err(_) => value,
    }
}

/// Rounded value rendered with exactly `digits` fraction digits.
pub fn format_rounded(value: f64, digits: u32) -> String {
    format!("{:.*}", digits as usize, round_half_away(value, digits))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rounds_down_below_half() {
        assert_eq!(round_half_away(1.2345, 2), 1.23);
        assert_eq!(format_rounded(1.2345, 2), "1.23");
    }

    #[test]
    fn test_decimal_halves_round_up() {
        assert_eq!(round_half_away(1.005, 2), 1.01);
        assert_eq!(round_half_away(1.015, 2), 1.02);
        assert_eq!(round_half_away(2.675, 2), 2.68);
        assert_eq!(format_rounded(1.005, 2), "1.01");
        assert_eq!(format_rounded(1.015, 2), "1.02");
    }

    #[test]
    fn test_halves_go_away_from_zero() {
        assert_eq!(round_half_away(-1.005, 2), -1.01);
        assert_eq!(round_half_away(0.5, 0), 1.0);
        assert_eq!(round_half_away(-0.5, 0), -1.0);
    }

    #[test]
    fn test_carry_propagates() {
        assert_eq!(round_half_away(9.995, 2), 10.0);
        assert_eq!(format_rounded(9.995, 2), "10.00");
        assert_eq!(round_half_away(0.999, 1), 1.0);
    }

    #[test]
    fn test_subtraction_noise_is_cleaned() {
        let delta = 3.3 - 1.1;
        assert_ne!(delta, 2.2);
        assert_eq!(format_rounded(delta, 2), "2.20");
    }

    #[test]
    fn test_short_values_untouched() {
        assert_eq!(round_half_away(2.5, 2), 2.5);
        assert_eq!(format_rounded(2.0, 2), "2.00");
        assert_eq!(format_rounded(-0.001, 2), "0.00");
        assert!(round_half_away(f64::NAN, 2).is_nan());
    }
}
