/// Values below this are rendered verbatim.
const HUMANIZE_THRESHOLD: u64 = 10_000;
const UNIT: f64 = 1_000.0;
const SUFFIXES: [&str; 6] = ["k", "M", "G", "T", "P", "E"];

/// Renders a counter in a compact form for narrow table cells.
///
/// Values below 10,000 are printed as-is. Larger values are divided by 1000
/// until the quotient drops below 1000 and printed rounded to one fractional
/// digit with a unit suffix, e.g. `10500` becomes `10.5k` and `10960` becomes
/// `11.0k`. The suffix is picked before rounding, so `999999` is `1000.0k`.
pub fn humanize(value: u64) -> String {
    if value < HUMANIZE_THRESHOLD {
        return value.to_string();
    }

    let mut scaled = value as f64;
    for suffix in SUFFIXES {
        scaled /= UNIT;
        if scaled < UNIT {
            return format!("{:.1}{}", scaled, suffix);
        }
    }
    // u64::MAX is about 18.4E, so the loop always returns.
    format!("{:.1}E", scaled)
}

#[cfg(test)]
mod tests {
    use super::humanize;
    use rstest::rstest;

    #[rstest]
    #[case(0, "0")]
    #[case(999, "999")]
    #[case(9_999, "9999")]
    #[case(10_000, "10.0k")]
    #[case(10_500, "10.5k")]
    #[case(999_900, "999.9k")]
    #[case(999_999, "1000.0k")]
    #[case(10_960, "11.0k")]
    #[case(1_299_999, "1.3M")]
    #[case(1_000_000, "1.0M")]
    #[case(1_250_000, "1.2M")]
    #[case(1_000_000_000, "1.0G")]
    #[case(1_000_000_000_000, "1.0T")]
    #[case(1_000_000_000_000_000, "1.0P")]
    #[case(1_000_000_000_000_000_000, "1.0E")]
    #[case(u64::MAX, "18.4E")]
    fn humanize_renders_compact_counts(#[case] input: u64, #[case] expected: &str) {
        assert_eq!(humanize(input), expected);
    }
}
