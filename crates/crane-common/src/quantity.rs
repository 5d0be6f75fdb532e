//! Kubernetes resource quantity parsing
//!
//! Quantities are `<signed number><suffix>` where the suffix is a binary SI
//! unit (`Ki`..`Ei`), a decimal SI unit (`n`, `u`, `m`, `k`, `M`..`E`) or a
//! decimal exponent (`e3`, `E-2`). Values are computed exactly in integer
//! arithmetic and rounded up, like `resource.Quantity.MilliValue()`.

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

use crate::{Error, Result};

/// A quantity split into `mantissa * 10^exp10 * 1024^exp1024`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Parsed {
    mantissa: i128,
    exp10: i32,
    exp1024: u32,
}

/// Value of a quantity in milli-units (e.g. `250m` CPU is 250), rounded up
pub fn milli_value(quantity: &Quantity) -> Result<i64> {
    scaled_value(&quantity.0, 3)
}

/// Value of a quantity in base units (e.g. `1Ki` is 1024), rounded up
pub fn value(quantity: &Quantity) -> Result<i64> {
    scaled_value(&quantity.0, 0)
}

/// Value multiplied by `10^scale`, rounded toward positive infinity
fn scaled_value(raw: &str, scale: i32) -> Result<i64> {
    let parsed = parse(raw)?;
    let overflow = || Error::quantity(raw, "value out of range");

    let mut numerator = parsed.mantissa;
    let binary = 1024_i128.checked_pow(parsed.exp1024).ok_or_else(overflow)?;
    numerator = numerator.checked_mul(binary).ok_or_else(overflow)?;

    let exp = parsed.exp10.saturating_add(scale);
    let result = if exp >= 0 {
        let factor = 10_i128.checked_pow(exp as u32).ok_or_else(overflow)?;
        numerator.checked_mul(factor).ok_or_else(overflow)?
    } else {
        match 10_i128.checked_pow(exp.unsigned_abs()) {
            Some(divisor) => ceil_div(numerator, divisor),
            // Divisor beyond i128: any non-zero positive value rounds up to 1
            None => i128::from(numerator > 0),
        }
    };

    i64::try_from(result).map_err(|_| overflow())
}

fn ceil_div(n: i128, d: i128) -> i128 {
    let q = n / d;
    if n % d != 0 && n > 0 {
        q + 1
    } else {
        q
    }
}

fn parse(raw: &str) -> Result<Parsed> {
    let s = raw.trim();
    if s.is_empty() {
        return Err(Error::quantity(raw, "empty quantity"));
    }

    let number_end = s
        .char_indices()
        .find(|&(i, c)| !(c.is_ascii_digit() || c == '.' || ((c == '+' || c == '-') && i == 0)))
        .map(|(i, _)| i)
        .unwrap_or(s.len());
    let (number, suffix) = s.split_at(number_end);

    let (negative, digits) = match number.as_bytes().first() {
        Some(b'-') => (true, &number[1..]),
        Some(b'+') => (false, &number[1..]),
        _ => (false, number),
    };
    let (whole, frac) = digits.split_once('.').unwrap_or((digits, ""));
    if whole.is_empty() && frac.is_empty() {
        return Err(Error::quantity(raw, "missing numeric value"));
    }
    if frac.contains('.') {
        return Err(Error::quantity(raw, "more than one decimal point"));
    }

    let mut mantissa: i128 = 0;
    for c in whole.chars().chain(frac.chars()) {
        let digit = i128::from(c.to_digit(10).unwrap_or_default());
        mantissa = mantissa
            .checked_mul(10)
            .and_then(|m| m.checked_add(digit))
            .ok_or_else(|| Error::quantity(raw, "too many digits"))?;
    }
    if negative {
        mantissa = -mantissa;
    }
    let frac_len = i32::try_from(frac.len()).map_err(|_| Error::quantity(raw, "too many digits"))?;

    let (exp10, exp1024) = parse_suffix(raw, suffix)?;
    Ok(Parsed {
        mantissa,
        exp10: exp10.saturating_sub(frac_len),
        exp1024,
    })
}

fn parse_suffix(raw: &str, suffix: &str) -> Result<(i32, u32)> {
    let parsed = match suffix {
        "" => (0, 0),
        "Ki" => (0, 1),
        "Mi" => (0, 2),
        "Gi" => (0, 3),
        "Ti" => (0, 4),
        "Pi" => (0, 5),
        "Ei" => (0, 6),
        "n" => (-9, 0),
        "u" => (-6, 0),
        "m" => (-3, 0),
        "k" => (3, 0),
        "M" => (6, 0),
        "G" => (9, 0),
        "T" => (12, 0),
        "P" => (15, 0),
        "E" => (18, 0),
        _ => {
            let exponent = suffix
                .strip_prefix('e')
                .or_else(|| suffix.strip_prefix('E'))
                .ok_or_else(|| Error::quantity(raw, format!("unknown suffix '{}'", suffix)))?;
            let exponent: i32 = exponent
                .parse()
                .map_err(|_| Error::quantity(raw, format!("invalid exponent '{}'", suffix)))?;
            (exponent, 0)
        }
    };
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(s: &str) -> Quantity {
        Quantity(s.to_string())
    }

    #[test]
    fn cpu_quantities_in_millis() {
        assert_eq!(milli_value(&q("250m")).unwrap(), 250);
        assert_eq!(milli_value(&q("1")).unwrap(), 1000);
        assert_eq!(milli_value(&q("0.1")).unwrap(), 100);
        assert_eq!(milli_value(&q("1.5")).unwrap(), 1500);
        assert_eq!(milli_value(&q("2k")).unwrap(), 2_000_000);
    }

    #[test]
    fn sub_milli_values_round_up() {
        assert_eq!(milli_value(&q("1u")).unwrap(), 1);
        assert_eq!(milli_value(&q("1500u")).unwrap(), 2);
        assert_eq!(milli_value(&q("100n")).unwrap(), 1);
        assert_eq!(milli_value(&q("0")).unwrap(), 0);
    }

    #[test]
    fn memory_quantities_in_bytes() {
        assert_eq!(value(&q("128974848")).unwrap(), 128_974_848);
        assert_eq!(value(&q("129M")).unwrap(), 129_000_000);
        assert_eq!(value(&q("123Mi")).unwrap(), 128_974_848);
        assert_eq!(value(&q("1Gi")).unwrap(), 1_073_741_824);
        assert_eq!(value(&q("1.5Gi")).unwrap(), 1_610_612_736);
        assert_eq!(value(&q("100m")).unwrap(), 1);
    }

    #[test]
    fn exponent_notation() {
        assert_eq!(value(&q("1e3")).unwrap(), 1000);
        assert_eq!(value(&q("12E6")).unwrap(), 12_000_000);
        assert_eq!(milli_value(&q("5e-3")).unwrap(), 5);
    }

    #[test]
    fn signs_are_accepted() {
        assert_eq!(value(&q("+5")).unwrap(), 5);
        assert_eq!(value(&q("-5")).unwrap(), -5);
        assert_eq!(milli_value(&q("-1500u")).unwrap(), -1);
    }

    #[test]
    fn garbage_is_rejected() {
        for bad in ["", "abc", "1Qi", "1.2.3", "m", "1e", "1ex"] {
            let err = value(&q(bad)).unwrap_err();
            assert!(matches!(err, Error::Quantity { .. }), "{bad}: {err:?}");
        }
    }

    #[test]
    fn overflow_is_an_error() {
        assert!(value(&q("1000E")).is_err());
        assert!(value(&q("1e400")).is_err());
    }

    #[test]
    fn tiny_exponent_rounds_up_to_one() {
        assert_eq!(value(&q("1e-400")).unwrap(), 1);
    }
}
