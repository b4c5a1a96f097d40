//! Heuristic context extraction
//!
//! Not NLP: an ordered table of rules runs over the lowercased utterance.
//! Rule order is the priority order; a destination claimed by an earlier
//! table entry is not overridden by a later one within the same call.

use chrono::{Duration, NaiveDate, Utc};
use regex::Regex;
use std::sync::LazyLock;

use crate::context::{ContextDelta, TripContext};

type RuleFn = fn(&str, &TripContext, NaiveDate, &mut ContextDelta);

/// One named extraction rule
struct ExtractionRule {
    name: &'static str,
    apply: RuleFn,
}

/// Rule table, in priority order
static RULES: &[ExtractionRule] = &[
    ExtractionRule {
        name: "destination",
        apply: apply_destination,
    },
    ExtractionRule {
        name: "trip-length",
        apply: apply_trip_length,
    },
    ExtractionRule {
        name: "party-size",
        apply: apply_party_size,
    },
    ExtractionRule {
        name: "preferences",
        apply: apply_preferences,
    },
];

/// Known destination keywords, lowercase, mapped to their display form.
/// Korean spellings come first so mixed-script utterances keep the
/// user's own wording.
const DESTINATIONS: &[(&str, &str)] = &[
    ("서울", "서울"),
    ("seoul", "Seoul"),
    ("부산", "부산"),
    ("busan", "Busan"),
    ("제주", "제주"),
    ("jeju", "Jeju"),
    ("경주", "경주"),
    ("gyeongju", "Gyeongju"),
    ("강릉", "강릉"),
    ("gangneung", "Gangneung"),
    ("도쿄", "도쿄"),
    ("tokyo", "Tokyo"),
    ("오사카", "오사카"),
    ("osaka", "Osaka"),
    ("다낭", "다낭"),
    ("da nang", "Da Nang"),
    ("danang", "Da Nang"),
    ("방콕", "방콕"),
    ("bangkok", "Bangkok"),
    ("paris", "Paris"),
    ("london", "London"),
    ("rome", "Rome"),
];

/// Preference keywords mapped to canonical tags
const PREFERENCES: &[(&str, &str)] = &[
    ("sightseeing", "sightseeing"),
    ("관광", "sightseeing"),
    ("relax", "relaxation"),
    ("휴양", "relaxation"),
    ("힐링", "relaxation"),
    ("food", "food"),
    ("맛집", "food"),
    ("experience", "experience"),
    ("체험", "experience"),
    ("activity", "experience"),
    ("액티비티", "experience"),
    ("shopping", "shopping"),
    ("쇼핑", "shopping"),
];

// "3박4일" / "3박"
static LENGTH_KR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)\s*박(?:\s*(\d+)\s*일)?").expect("valid regex"));
// "2 nights 3 days" / "2 nights"
static LENGTH_EN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+)\s*nights?(?:\s*(?:and|,)?\s*(\d+)\s*days?)?").expect("valid regex")
});

static ADULT_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:adults?|성인)\s*:?\s*(\d+)").expect("valid regex"));
static ADULT_NUM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)\s*(?:adults?|성인)").expect("valid regex"));
static CHILD_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:children|child|kids?|아동|어린이)\s*:?\s*(\d+)").expect("valid regex"));
static CHILD_NUM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)\s*(?:children|child|kids?|아동|어린이)").expect("valid regex"));
static INFANT_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:infants?|유아)\s*:?\s*(\d+)").expect("valid regex"));
static INFANT_NUM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)\s*(?:infants?|유아)").expect("valid regex"));

/// Extract trip facts from an utterance, against today's date
pub fn extract(utterance: &str, context: &TripContext) -> ContextDelta {
    extract_on(utterance, context, Utc::now().date_naive())
}

/// Extract trip facts with an explicit "today", for date-exact tests
pub fn extract_on(utterance: &str, context: &TripContext, today: NaiveDate) -> ContextDelta {
    let lowered = utterance.to_lowercase();
    let mut delta = ContextDelta::default();
    for rule in RULES {
        (rule.apply)(&lowered, context, today, &mut delta);
        tracing::trace!(rule = rule.name, "extraction rule applied");
    }
    delta
}

fn apply_destination(text: &str, _context: &TripContext, _today: NaiveDate, delta: &mut ContextDelta) {
    // table order decides ties; first match wins for this call
    for (keyword, display) in DESTINATIONS {
        if text.contains(keyword) {
            delta.destination = Some((*display).to_string());
            return;
        }
    }
}

/// Longest trip length the extractor accepts; larger counts are treated
/// as noise and leave the delta untouched
const MAX_TRIP_DAYS: i64 = 365;

fn apply_trip_length(text: &str, context: &TripContext, today: NaiveDate, delta: &mut ContextDelta) {
    let captures = LENGTH_KR.captures(text).or_else(|| LENGTH_EN.captures(text));
    let Some(captures) = captures else {
        return;
    };
    let Some(nights) = captures.get(1).and_then(|m| m.as_str().parse::<i64>().ok()) else {
        return;
    };
    let days = match captures.get(2).and_then(|m| m.as_str().parse::<i64>().ok()) {
        Some(days) => days,
        None => match nights.checked_add(1) {
            Some(days) => days,
            None => return,
        },
    };
    if days < 1 || days > MAX_TRIP_DAYS {
        return;
    }

    let start = context.start_date.unwrap_or(today);
    let Some(end) = start.checked_add_signed(Duration::days(days - 1)) else {
        return;
    };
    delta.start_date = Some(start);
    delta.end_date = Some(end);
}

fn apply_party_size(text: &str, _context: &TripContext, _today: NaiveDate, delta: &mut ContextDelta) {
    delta.adults = captured_count(text, &ADULT_LABEL, &ADULT_NUM);
    delta.children = captured_count(text, &CHILD_LABEL, &CHILD_NUM);
    delta.infants = captured_count(text, &INFANT_LABEL, &INFANT_NUM);
}

/// The label-first form is tried before the number-first form so that
/// "adults 2 children 1" reads each count next to its own label.
fn captured_count(text: &str, label_first: &Regex, number_first: &Regex) -> Option<u32> {
    label_first
        .captures(text)
        .or_else(|| number_first.captures(text))
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

fn apply_preferences(text: &str, context: &TripContext, _today: NaiveDate, delta: &mut ContextDelta) {
    for (keyword, tag) in PREFERENCES {
        if text.contains(keyword)
            && !context.preferences.iter().any(|t| t == tag)
            && !delta.preferences.iter().any(|t| t == tag)
        {
            delta.preferences.push((*tag).to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_destination_and_length() {
        let today = date(2026, 8, 25);
        let delta = extract_on(
            "I want to go to Busan for 2 nights 3 days",
            &TripContext::default(),
            today,
        );

        assert_eq!(delta.destination.as_deref(), Some("Busan"));
        assert_eq!(delta.start_date, Some(today));
        assert_eq!(delta.end_date, Some(date(2026, 8, 27)));
    }

    #[test]
    fn test_party_counts_leave_existing_preferences() {
        let context = TripContext {
            preferences: vec!["sightseeing".to_string()],
            ..Default::default()
        };
        let delta = extract_on("adults 2 children 1", &context, date(2026, 8, 25));

        assert_eq!(delta.adults, Some(2));
        assert_eq!(delta.children, Some(1));
        assert_eq!(delta.infants, None);
        assert!(delta.preferences.is_empty());

        let mut merged = context.clone();
        merged.merge(delta);
        assert_eq!(merged.preferences, vec!["sightseeing"]);
        assert_eq!(merged.party.adults, 2);
        assert_eq!(merged.party.children, 1);
    }

    #[test]
    fn test_korean_utterance() {
        let today = date(2026, 8, 25);
        let delta = extract_on("서울 여행 3박4일 성인2", &TripContext::default(), today);

        assert_eq!(delta.destination.as_deref(), Some("서울"));
        assert_eq!(delta.start_date, Some(today));
        // 4-day span
        assert_eq!(delta.end_date, Some(date(2026, 8, 28)));
        assert_eq!(delta.adults, Some(2));
    }

    #[test]
    fn test_first_destination_in_table_wins() {
        let delta = extract_on(
            "should we do seoul or busan?",
            &TripContext::default(),
            date(2026, 8, 25),
        );
        assert_eq!(delta.destination.as_deref(), Some("Seoul"));
    }

    #[test]
    fn test_existing_start_date_is_kept() {
        let context = TripContext {
            start_date: Some(date(2026, 10, 1)),
            ..Default::default()
        };
        let delta = extract_on("2박3일 정도 생각하고 있어요", &context, date(2026, 8, 25));

        assert_eq!(delta.start_date, Some(date(2026, 10, 1)));
        assert_eq!(delta.end_date, Some(date(2026, 10, 3)));
    }

    #[test]
    fn test_nights_only_implies_days() {
        let today = date(2026, 8, 25);
        let delta = extract_on("thinking about 2 nights", &TripContext::default(), today);
        assert_eq!(delta.end_date, Some(date(2026, 8, 27)));
    }

    #[test]
    fn test_number_first_party_form() {
        let delta = extract_on("2 adults and 1 infant", &TripContext::default(), date(2026, 8, 25));
        assert_eq!(delta.adults, Some(2));
        assert_eq!(delta.infants, Some(1));
    }

    #[test]
    fn test_preferences_matched_and_deduplicated() {
        let delta = extract_on(
            "we like sightseeing and good food, mostly food",
            &TripContext::default(),
            date(2026, 8, 25),
        );
        assert_eq!(delta.preferences, vec!["sightseeing", "food"]);
    }

    #[test]
    fn test_known_preference_not_repeated() {
        let context = TripContext {
            preferences: vec!["food".to_string()],
            ..Default::default()
        };
        let delta = extract_on("more food please", &context, date(2026, 8, 25));
        assert!(delta.preferences.is_empty());
    }

    #[test]
    fn test_absurd_night_counts_are_ignored() {
        let today = date(2026, 8, 25);

        // i64::MAX nights would overflow the implied day count
        let delta = extract_on("9223372036854775807박", &TripContext::default(), today);
        assert!(delta.start_date.is_none());
        assert!(delta.end_date.is_none());

        // far beyond any representable date
        let delta = extract_on(
            "100000000 nights in busan",
            &TripContext::default(),
            today,
        );
        assert!(delta.start_date.is_none());
        assert!(delta.end_date.is_none());
        // the other rules still run
        assert_eq!(delta.destination.as_deref(), Some("Busan"));

        // just over the accepted bound is dropped, the bound itself is kept
        let delta = extract_on("366 nights", &TripContext::default(), today);
        assert!(delta.end_date.is_none());
        let delta = extract_on("364 nights", &TripContext::default(), today);
        assert!(delta.end_date.is_some());
    }

    #[test]
    fn test_no_match_is_empty_delta() {
        let delta = extract_on("hello there!", &TripContext::default(), date(2026, 8, 25));
        assert!(delta.is_empty());
    }
}
