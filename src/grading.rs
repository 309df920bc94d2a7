/// Breakpoints used for imported grades. Inclusive lower bounds, checked top-down.
const IMPORT_LETTER_TABLE: [(f64, &str); 12] = [
    (97.0, "A+"),
    (93.0, "A"),
    (90.0, "A-"),
    (87.0, "B+"),
    (83.0, "B"),
    (80.0, "B-"),
    (77.0, "C+"),
    (73.0, "C"),
    (70.0, "C-"),
    (67.0, "D+"),
    (63.0, "D"),
    (60.0, "D-"),
];

/// Breakpoints used when a teacher records a single grade by hand.
const MANUAL_LETTER_TABLE: [(f64, &str); 4] = [(90.0, "A"), (80.0, "B"), (70.0, "C"), (60.0, "D")];

fn letter_from(table: &[(f64, &'static str)], percentage: f64) -> &'static str {
    table
        .iter()
        .find(|(floor, _)| percentage >= *floor)
        .map(|(_, letter)| *letter)
        .unwrap_or("F")
}

/// Letter grade for a CSV-imported row (+/- table).
pub fn import_letter_grade(percentage: f64) -> &'static str {
    letter_from(&IMPORT_LETTER_TABLE, percentage)
}

/// Letter grade for a manually entered row (A/B/C/D/F only).
///
/// This intentionally disagrees with `import_letter_grade` at the +/- boundaries;
/// both tables are in use and have not been reconciled.
pub fn manual_letter_grade(percentage: f64) -> &'static str {
    letter_from(&MANUAL_LETTER_TABLE, percentage)
}

/// Every letter either table can produce, best first.
pub fn letters_best_first() -> impl Iterator<Item = &'static str> {
    IMPORT_LETTER_TABLE
        .iter()
        .map(|(_, letter)| *letter)
        .chain(std::iter::once("F"))
}

/// Half-up rounding to an integer (0.5 rounds toward +inf, also for negatives).
pub fn round_half_up(x: f64) -> f64 {
    (x + 0.5).floor()
}

/// Whole-number percentage stored on imported grades. Zero when `max_points <= 0`.
pub fn import_percentage(points: f64, max_points: f64) -> f64 {
    if max_points > 0.0 {
        round_half_up(points / max_points * 100.0)
    } else {
        0.0
    }
}

/// Unrounded percentage for manual entry; `None` when `max_points <= 0`.
pub fn raw_percentage(points: f64, max_points: f64) -> Option<f64> {
    if max_points > 0.0 {
        Some(points / max_points * 100.0)
    } else {
        None
    }
}

/// Two-decimal rounding applied to manually entered percentages.
pub fn round_2_decimals(x: f64) -> f64 {
    round_half_up(x * 100.0) / 100.0
}

/// One-decimal rounding used for report averages.
pub fn round_1_decimal(x: f64) -> f64 {
    round_half_up(x * 10.0) / 10.0
}

/// Four-point scale used by the reports: 90/80/70/60 floors, 0 below 60.
pub fn grade_points(percentage: f64) -> f64 {
    [(90.0, 4.0), (80.0, 3.0), (70.0, 2.0), (60.0, 1.0)]
        .iter()
        .find(|(floor, _)| percentage >= *floor)
        .map(|(_, points)| *points)
        .unwrap_or(0.0)
}

/// Grades at or above this percentage count as passing.
pub const PASSING_PERCENTAGE: f64 = 60.0;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn import_table_walks_every_band() {
        let cases = [
            (100.0, "A+"),
            (97.0, "A+"),
            (96.0, "A"),
            (93.0, "A"),
            (90.0, "A-"),
            (89.0, "B+"),
            (83.0, "B"),
            (80.0, "B-"),
            (77.0, "C+"),
            (73.0, "C"),
            (70.0, "C-"),
            (67.0, "D+"),
            (63.0, "D"),
            (60.0, "D-"),
            (59.0, "F"),
            (0.0, "F"),
        ];
        for (pct, want) in cases {
            assert_eq!(import_letter_grade(pct), want, "percentage {pct}");
        }
    }

    #[test]
    fn manual_table_has_no_plus_minus() {
        assert_eq!(manual_letter_grade(97.0), "A");
        assert_eq!(manual_letter_grade(89.99), "B");
        assert_eq!(manual_letter_grade(60.0), "D");
        assert_eq!(manual_letter_grade(59.5), "F");
    }

    #[test]
    fn import_percentage_rounds_half_up_and_guards_zero_max() {
        assert_eq!(import_percentage(1.0, 8.0), 13.0);
        assert_eq!(import_percentage(1.0, 3.0), 33.0);
        assert_eq!(import_percentage(2.0, 3.0), 67.0);
        assert_eq!(import_percentage(10.0, 0.0), 0.0);
        assert_eq!(import_percentage(10.0, -5.0), 0.0);
    }

    #[test]
    fn manual_percentage_keeps_two_decimals() {
        let pct = raw_percentage(2.0, 3.0).expect("positive max");
        assert_eq!(round_2_decimals(pct), 66.67);
        assert_eq!(raw_percentage(1.0, 0.0), None);
    }

    #[test]
    fn grade_points_use_ten_point_bands() {
        assert_eq!(grade_points(100.0), 4.0);
        assert_eq!(grade_points(89.99), 3.0);
        assert_eq!(grade_points(70.0), 2.0);
        assert_eq!(grade_points(60.0), 1.0);
        assert_eq!(grade_points(59.9), 0.0);
        assert_eq!(round_1_decimal(86.66), 86.7);
    }
}
