//! Required Minimum Distribution lookup (spec.md §4.7, scenario S5).
//!
//! IRS Uniform Lifetime Table divisors, indexed by age at year end. The
//! table starts at the spec's RMD trigger age of 72; ages below that
//! never reach the lookup because the RMD handler gates on
//! `age_in_years(dob, dec_31) >= RMD_START_AGE` first.

pub const RMD_START_AGE: i32 = 72;

const TABLE: &[(i32, f64)] = &[
    (72, 27.4),
    (73, 26.5),
    (74, 25.5),
    (75, 24.6),
    (76, 23.7),
    (77, 22.9),
    (78, 22.0),
    (79, 21.1),
    (80, 20.2),
    (81, 19.4),
    (82, 18.5),
    (83, 17.7),
    (84, 16.8),
    (85, 16.0),
    (86, 15.2),
    (87, 14.4),
    (88, 13.7),
    (89, 12.9),
    (90, 12.2),
    (91, 11.5),
    (92, 10.8),
    (93, 10.1),
    (94, 9.5),
    (95, 8.9),
    (96, 8.4),
    (97, 7.8),
    (98, 7.3),
    (99, 6.8),
    (100, 6.4),
    (101, 6.0),
    (102, 5.6),
    (103, 5.2),
    (104, 4.9),
    (105, 4.6),
    (106, 4.3),
    (107, 4.1),
    (108, 3.9),
    (109, 3.7),
    (110, 3.5),
    (111, 3.4),
    (112, 3.3),
    (113, 3.1),
    (114, 3.0),
    (115, 2.9),
];

/// Divisor for `age`, clamped to the last tabulated entry for ages beyond
/// the table (the IRS table flattens out near 2.0 at the oldest ages; we
/// keep the last published value rather than extrapolate).
#[must_use]
pub fn divisor_for_age(age: i32) -> Option<f64> {
    if age < RMD_START_AGE {
        return None;
    }
    match TABLE.iter().find(|(a, _)| *a == age) {
        Some((_, d)) => Some(*d),
        None => TABLE.last().map(|(_, d)| *d),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn divisor_at_start_age_matches_table() {
        assert_eq!(divisor_for_age(72), Some(27.4));
    }

    #[test]
    fn divisor_below_start_age_is_none() {
        assert_eq!(divisor_for_age(71), None);
    }

    #[test]
    fn divisor_beyond_table_clamps_to_last_entry() {
        assert_eq!(divisor_for_age(130), divisor_for_age(115));
    }
}
