//! Date extraction: Western and Japanese-era date shapes, normalized to
//! a canonical `YYYY/MM/DD`.

use chrono::{Datelike, Duration, NaiveDate};
use ryoshu_core::RecognizedText;

use crate::extract::{re, Candidate, Layout};
use crate::tables;
use crate::text::to_halfwidth;

re!(re_western_full, r"(\d{4})[/\-.](\d{1,2})[/\-.](\d{1,2})");
re!(re_kanji_full, r"(\d{4})年(\d{1,2})月(\d{1,2})日");
re!(re_era_full, r"(令和|平成|昭和|大正)(元|\d{1,2})年(\d{1,2})月(\d{1,2})日");
re!(re_era_abbrev, r"\b([RHST])(\d{1,2})[./\-](\d{1,2})[./\-](\d{1,2})");
re!(re_month_day_kanji, r"(\d{1,2})月(\d{1,2})日");
re!(re_month_day_slash, r"(?:^|[^\d/])(\d{1,2})/(\d{1,2})(?:[^\d/]|$)");

/// Which shape matched; determines the pattern confidence boost.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DateShape {
    FullYmd,
    FullEra,
    AbbrevEra,
    MonthDayOnly,
}

impl DateShape {
    fn boost(self) -> f32 {
        match self {
            DateShape::FullYmd => tables::DATE_BOOST_FULL_YMD,
            DateShape::FullEra => tables::DATE_BOOST_FULL_ERA,
            DateShape::AbbrevEra => tables::DATE_BOOST_ABBREV_ERA,
            DateShape::MonthDayOnly => 0.0,
        }
    }
}

fn era_year(s: &str) -> Option<i32> {
    if s == "元" {
        return Some(1);
    }
    s.parse().ok()
}

/// Try each date shape in priority order against one span of text.
/// Returns the parsed calendar date and the shape that matched, or `None`
/// if nothing matched or the match fails calendar validation.
pub(crate) fn match_date(raw: &str, today: NaiveDate) -> Option<(NaiveDate, DateShape)> {
    let s = to_halfwidth(raw);

    let parsed = if let Some(c) = re_era_full().captures(&s) {
        let start = tables::ERA_STARTS.iter().find(|(n, _)| *n == &c[1])?.1;
        let year = start + era_year(&c[2])? - 1;
        NaiveDate::from_ymd_opt(year, c[3].parse().ok()?, c[4].parse().ok()?)
            .map(|d| (d, DateShape::FullEra))
    } else if let Some(c) = re_era_abbrev().captures(&s) {
        let letter = c[1].chars().next()?;
        let start = tables::ERA_ABBREVIATIONS.iter().find(|(l, _)| *l == letter)?.1;
        let year = start + c[2].parse::<i32>().ok()? - 1;
        NaiveDate::from_ymd_opt(year, c[3].parse().ok()?, c[4].parse().ok()?)
            .map(|d| (d, DateShape::AbbrevEra))
    } else if let Some(c) = re_kanji_full().captures(&s) {
        NaiveDate::from_ymd_opt(c[1].parse().ok()?, c[2].parse().ok()?, c[3].parse().ok()?)
            .map(|d| (d, DateShape::FullYmd))
    } else if let Some(c) = re_western_full().captures(&s) {
        NaiveDate::from_ymd_opt(c[1].parse().ok()?, c[2].parse().ok()?, c[3].parse().ok()?)
            .map(|d| (d, DateShape::FullYmd))
    } else if let Some(c) = re_month_day_kanji().captures(&s) {
        NaiveDate::from_ymd_opt(today.year(), c[1].parse().ok()?, c[2].parse().ok()?)
            .map(|d| (d, DateShape::MonthDayOnly))
    } else if let Some(c) = re_month_day_slash().captures(&s) {
        NaiveDate::from_ymd_opt(today.year(), c[1].parse().ok()?, c[2].parse().ok()?)
            .map(|d| (d, DateShape::MonthDayOnly))
    } else {
        None
    };

    parsed.filter(|(d, _)| in_valid_range(*d, today))
}

/// Accepted window: 1900-01-01 through one year past the current date.
/// Out-of-range matches are discarded, not kept at low confidence.
pub(crate) fn in_valid_range(date: NaiveDate, today: NaiveDate) -> bool {
    let min = NaiveDate::from_ymd_opt(1900, 1, 1).expect("static date");
    let max = today + Duration::days(366);
    date >= min && date <= max
}

pub(crate) fn format_canonical(date: NaiveDate) -> String {
    date.format("%Y/%m/%d").to_string()
}

pub(crate) fn candidates(
    texts: &[RecognizedText],
    layout: &Layout,
    today: NaiveDate,
) -> Vec<Candidate> {
    let mut pool = Vec::new();
    for t in texts {
        let Some((date, shape)) = match_date(&t.text, today) else { continue };

        let mut score = t.confidence + shape.boost();
        let years_away = (date.year() - today.year()).abs();
        if years_away <= 5 {
            score += tables::DATE_BOOST_RECENT;
        } else if years_away > 20 {
            score += tables::DATE_PENALTY_DISTANT;
        }
        if layout.vertical_ratio(&t.bounding_box) <= tables::DATE_UPPER_REGION_RATIO {
            score += tables::DATE_BOOST_UPPER_REGION;
        }

        pool.push(Candidate::new(format_canonical(date), score, Some(t.bounding_box)));
    }
    pool
}

#[cfg(test)]
mod tests {
    use super::*;
    use ryoshu_core::Rect;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    fn shape_of(s: &str) -> Option<(String, DateShape)> {
        match_date(s, today()).map(|(d, sh)| (format_canonical(d), sh))
    }

    #[test]
    fn era_dates_convert_to_western() {
        assert_eq!(shape_of("令和6年1月15日"), Some(("2024/01/15".into(), DateShape::FullEra)));
        assert_eq!(shape_of("平成31年4月30日"), Some(("2019/04/30".into(), DateShape::FullEra)));
        assert_eq!(shape_of("昭和60年3月5日"), Some(("1985/03/05".into(), DateShape::FullEra)));
    }

    #[test]
    fn era_first_year_as_gannen() {
        assert_eq!(shape_of("令和元年5月1日"), Some(("2019/05/01".into(), DateShape::FullEra)));
    }

    #[test]
    fn abbreviated_era_letters() {
        assert_eq!(shape_of("R6.1.15"), Some(("2024/01/15".into(), DateShape::AbbrevEra)));
        assert_eq!(shape_of("H31/4/30"), Some(("2019/04/30".into(), DateShape::AbbrevEra)));
    }

    #[test]
    fn western_and_kanji_forms() {
        assert_eq!(shape_of("2024-01-25"), Some(("2024/01/25".into(), DateShape::FullYmd)));
        assert_eq!(shape_of("2024.1.5"), Some(("2024/01/05".into(), DateShape::FullYmd)));
        assert_eq!(shape_of("2024年1月15日"), Some(("2024/01/15".into(), DateShape::FullYmd)));
    }

    #[test]
    fn month_day_only_assumes_current_year() {
        assert_eq!(shape_of("1月15日"), Some(("2024/01/15".into(), DateShape::MonthDayOnly)));
        assert_eq!(shape_of("発行 3/7 "), Some(("2024/03/07".into(), DateShape::MonthDayOnly)));
    }

    #[test]
    fn full_width_digits_accepted() {
        assert_eq!(shape_of("令和６年１月１５日"), Some(("2024/01/15".into(), DateShape::FullEra)));
    }

    #[test]
    fn invalid_calendar_dates_discarded() {
        assert_eq!(shape_of("2024/2/30"), None);
        assert_eq!(shape_of("令和6年13月1日"), None);
    }

    #[test]
    fn out_of_range_dates_discarded() {
        assert_eq!(shape_of("1899/12/31"), None);
        assert_eq!(shape_of("2031/01/01"), None);
        // One year ahead is still allowed.
        assert!(shape_of("2025/05/01").is_some());
    }

    #[test]
    fn recent_dates_outrank_distant_ones() {
        let texts = vec![
            RecognizedText::new("1950/01/01", 0.8, Rect::new(0.0, 0.0, 100.0, 20.0)),
            RecognizedText::new("2024/01/15", 0.8, Rect::new(0.0, 0.0, 100.0, 20.0)),
        ];
        let layout = Layout::of(&texts);
        let pool = candidates(&texts, &layout, today());
        let recent = pool.iter().find(|c| c.value == "2024/01/15").unwrap();
        let distant = pool.iter().find(|c| c.value == "1950/01/01").unwrap();
        assert!(recent.score > distant.score);
    }
}
