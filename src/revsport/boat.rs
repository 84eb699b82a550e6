//! Boat label grammar and register-page parsing.
//!
//! Boat labels are free text that encodes type, classification, weight,
//! nickname and sweep capability by convention, e.g.
//! `"2X RACER - Swift double/pair 70 KG (Ian Krix)"`. There is no formal
//! grammar upstream; parsing is an ordered sequence of independent
//! extraction rules over the immutable label, each returning an optional
//! match. Malformed labels degrade to sentinel/empty values; the parser
//! never fails.

use super::types::{Boat, BoatCategory, BoatType, Classification};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::sync::LazyLock;
use tracing::debug;

// Label rules - compiled once
static TYPE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*([1248])x(/[+-])?(?:\s+|$)").unwrap());
static RACER_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)racer").unwrap());
static RT_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\brt\b").unwrap());
static WEIGHT_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)(\d+)\s*kg\b").unwrap());
static PAREN_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\(([^)]*)\)").unwrap());
static TINNIE_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\btinnie\b").unwrap());
static HP_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\b\d+\s*hp\b").unwrap());
static TINNIE_PREFIX_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*tinnie\b[\s:-]*").unwrap());
// Leading class-word segment up to a dash delimiter ("RACER - ", "CLUB - ")
static PREFIX_SEGMENT_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z/+ ]*-\s*").unwrap());
static DAMAGE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)damaged|out of service|unavailable").unwrap());
static WS_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

// Register page selectors - compiled once
static CARD_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.boat-card, li.boat-card, div.asset-card").unwrap());
static NAME_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".boat-name, h5, h4").unwrap());
static CALENDAR_LINK_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href*='calendar'], a[href*='bookings']").unwrap());
static DANGER_BADGE_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".badge-danger, .badge-warning, .text-danger").unwrap());
static ID_QUERY_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[?&](?:assetId|boatId|id)=(\d+)").unwrap());
static ID_PATH_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/(?:calendar|boats|bookings)/(\d+)").unwrap());

/// Structured attributes extracted from one boat label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedLabel {
    pub category: BoatCategory,
    pub boat_type: BoatType,
    pub classification: Option<Classification>,
    pub weight_kg: Option<u32>,
    pub nickname: String,
    pub sweep_capable: bool,
    pub display_name: String,
}

/// Parses a raw boat label into structured attributes.
///
/// Pure: no I/O, no hidden state; parsing the same label twice yields
/// identical output. Unicode content passes through unmodified.
pub fn parse_label(label: &str) -> ParsedLabel {
    if label.trim().is_empty() {
        return ParsedLabel {
            category: BoatCategory::Rowing,
            boat_type: BoatType::Unknown,
            classification: None,
            weight_kg: None,
            nickname: String::new(),
            sweep_capable: false,
            display_name: String::new(),
        };
    }

    let category = detect_category(label);
    let weight_kg = extract_weight(label);
    let nickname = extract_nickname(label);

    match category {
        BoatCategory::Rowing => {
            let (boat_type, sweep_capable) = extract_type(label);
            ParsedLabel {
                category,
                boat_type,
                classification: Some(extract_classification(label)),
                weight_kg,
                nickname,
                sweep_capable,
                display_name: rowing_display_name(label),
            }
        }
        BoatCategory::Tinnie => ParsedLabel {
            category,
            boat_type: BoatType::Unknown,
            classification: None,
            weight_kg,
            nickname,
            sweep_capable: false,
            display_name: tinnie_display_name(label),
        },
    }
}

/// Damage signal: label keywords, or a danger badge in the surrounding
/// markup (supplied by the caller, since it lives outside the label).
pub fn is_damaged(label: &str, has_danger_badge: bool) -> bool {
    has_danger_badge || DAMAGE_REGEX.is_match(label)
}

fn detect_category(label: &str) -> BoatCategory {
    if TINNIE_REGEX.is_match(label) || HP_REGEX.is_match(label) {
        BoatCategory::Tinnie
    } else {
        BoatCategory::Rowing
    }
}

fn extract_type(label: &str) -> (BoatType, bool) {
    let Some(caps) = TYPE_REGEX.captures(label) else {
        return (BoatType::Unknown, false);
    };
    let boat_type = match &caps[1] {
        "1" => BoatType::Single,
        "2" => BoatType::Double,
        "4" => BoatType::Quad,
        _ => BoatType::Eight,
    };
    (boat_type, caps.get(2).is_some())
}

/// Racer-detection takes precedence over RT-detection, which takes
/// precedence over the Training default.
fn extract_classification(label: &str) -> Classification {
    if RACER_REGEX.is_match(label) {
        Classification::Racer
    } else if RT_REGEX.is_match(label) {
        Classification::RaceTraining
    } else {
        Classification::Training
    }
}

/// First (leftmost) `<digits> KG` token wins when several exist.
fn extract_weight(label: &str) -> Option<u32> {
    WEIGHT_REGEX
        .captures(label)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// The *last* parenthesized group is the nickname; earlier groups are
/// other annotations and are discarded.
fn extract_nickname(label: &str) -> String {
    PAREN_REGEX
        .captures_iter(label)
        .last()
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default()
}

/// Strips the encoding tokens from a rowing label, leaving the name.
///
/// Only the *first* parenthesized group is removed here, while nickname
/// extraction uses the *last* - an asymmetry carried over from how boats
/// were originally catalogued. Downstream consumers depend on it.
fn rowing_display_name(label: &str) -> String {
    // The dash-delimited prefix segment ("RACER - ", "CLUB - ") only
    // exists after a type token; without one the label is left alone.
    let mut s = match TYPE_REGEX.find(label) {
        Some(m) => PREFIX_SEGMENT_REGEX
            .replace(&label[m.end()..], "")
            .into_owned(),
        None => label.to_string(),
    };
    s = RACER_REGEX.replace(&s, "").into_owned();
    s = RT_REGEX.replace(&s, "").into_owned();
    s = WEIGHT_REGEX.replace(&s, "").into_owned();
    s = PAREN_REGEX.replace(&s, "").into_owned();
    finish_display_name(&s, label)
}

fn tinnie_display_name(label: &str) -> String {
    let mut s = TINNIE_PREFIX_REGEX.replace(label, "").into_owned();
    s = HP_REGEX.replace(&s, "").into_owned();
    s = PAREN_REGEX.replace(&s, "").into_owned();
    finish_display_name(&s, label)
}

/// Collapses whitespace runs; an empty result falls back to the raw
/// label so a display name is never empty for a non-empty input.
fn finish_display_name(stripped: &str, raw: &str) -> String {
    let collapsed = WS_REGEX.replace_all(stripped, " ").trim().to_string();
    if collapsed.is_empty() {
        raw.trim().to_string()
    } else {
        collapsed
    }
}

/// Parses the boat register page into boats.
///
/// Cards whose calendar link yields no external id are dropped (never
/// given a synthetic id); that is not counted as a failure.
pub fn parse_register_page(html: &str) -> Vec<Boat> {
    let document = Html::parse_document(html);
    let mut boats = Vec::new();

    for card in document.select(&CARD_SELECTOR) {
        let label = card
            .select(&NAME_SELECTOR)
            .next()
            .map(|el| el.text().collect::<String>().trim().to_string())
            .unwrap_or_default();

        let Some(external_id) = extract_external_id(&card) else {
            debug!(label = %label, "Skipping boat card with no extractable id");
            continue;
        };

        let has_danger_badge = card.select(&DANGER_BADGE_SELECTOR).next().is_some();
        let parsed = parse_label(&label);

        boats.push(Boat {
            external_id,
            is_damaged: is_damaged(&label, has_danger_badge),
            raw_label: label,
            category: parsed.category,
            boat_type: parsed.boat_type,
            classification: parsed.classification,
            weight_kg: parsed.weight_kg,
            nickname: parsed.nickname,
            sweep_capable: parsed.sweep_capable,
            display_name: parsed.display_name,
        });
    }

    boats
}

/// Extracts the upstream boat id from a card.
///
/// Tries, in order: an id-like query parameter on the calendar link, a
/// numeric path segment on the link, then a `data-asset-id` attribute on
/// the card itself.
fn extract_external_id(card: &ElementRef) -> Option<String> {
    for link in card.select(&CALENDAR_LINK_SELECTOR) {
        if let Some(href) = link.value().attr("href") {
            if let Some(caps) = ID_QUERY_REGEX.captures(href) {
                return Some(caps[1].to_string());
            }
            if let Some(caps) = ID_PATH_REGEX.captures(href) {
                return Some(caps[1].to_string());
            }
        }
    }

    card.value()
        .attr("data-asset-id")
        .filter(|id| !id.is_empty())
        .map(|id| id.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_label() {
        let parsed = parse_label("2X RACER - Swift double/pair 70 KG (Ian Krix)");
        assert_eq!(parsed.category, BoatCategory::Rowing);
        assert_eq!(parsed.boat_type, BoatType::Double);
        assert_eq!(parsed.classification, Some(Classification::Racer));
        assert_eq!(parsed.weight_kg, Some(70));
        assert_eq!(parsed.nickname, "Ian Krix");
        assert!(!parsed.sweep_capable);
        assert_eq!(parsed.display_name, "Swift double/pair");
    }

    #[test]
    fn test_no_weight_no_nickname_defaults_to_training() {
        let parsed = parse_label("2X CLUB - Training Boat");
        assert_eq!(parsed.boat_type, BoatType::Double);
        assert_eq!(parsed.classification, Some(Classification::Training));
        assert_eq!(parsed.weight_kg, None);
        assert_eq!(parsed.nickname, "");
        assert_eq!(parsed.display_name, "Training Boat");
    }

    #[test]
    fn test_missing_type_token_is_unknown_sentinel() {
        let parsed = parse_label("Old wooden shell");
        assert_eq!(parsed.boat_type, BoatType::Unknown);
        assert_eq!(parsed.classification, Some(Classification::Training));
        assert_eq!(parsed.display_name, "Old wooden shell");
    }

    #[test]
    fn test_sweep_suffix_variants() {
        let plus = parse_label("4X/+ RT Quad 52KG");
        assert_eq!(plus.boat_type, BoatType::Quad);
        assert!(plus.sweep_capable);
        assert_eq!(plus.classification, Some(Classification::RaceTraining));

        let minus = parse_label("8x/- Eights shell");
        assert_eq!(minus.boat_type, BoatType::Eight);
        assert!(minus.sweep_capable);

        let none = parse_label("1X Scull");
        assert_eq!(none.boat_type, BoatType::Single);
        assert!(!none.sweep_capable);
    }

    #[test]
    fn test_weight_spacing_and_case_variants() {
        assert_eq!(parse_label("1X Shell 70 KG").weight_kg, Some(70));
        assert_eq!(parse_label("1X Shell 70KG").weight_kg, Some(70));
        assert_eq!(parse_label("1X Shell 70 kg").weight_kg, Some(70));
        assert_eq!(parse_label("1X Shell").weight_kg, None);
    }

    #[test]
    fn test_first_weight_wins() {
        let parsed = parse_label("2X Shell 70 KG refit 85KG");
        assert_eq!(parsed.weight_kg, Some(70));
    }

    #[test]
    fn test_classification_precedence_racer_over_rt() {
        let parsed = parse_label("2X RACER RT Shell");
        assert_eq!(parsed.classification, Some(Classification::Racer));
    }

    #[test]
    fn test_single_paren_group_is_nickname_and_stripped() {
        let parsed = parse_label("1X Shell (Beryl)");
        assert_eq!(parsed.nickname, "Beryl");
        assert_eq!(parsed.display_name, "Shell");
    }

    #[test]
    fn test_paren_asymmetry_last_is_nickname_first_is_stripped() {
        // Nickname takes the LAST group; display stripping removes only
        // the FIRST. Existing behavior, locked here on purpose.
        let parsed = parse_label("2X Shell (refitted 2019) 70KG (Beryl)");
        assert_eq!(parsed.nickname, "Beryl");
        assert_eq!(parsed.display_name, "Shell (Beryl)");
    }

    #[test]
    fn test_tinnie_by_keyword() {
        let parsed = parse_label("Tinnie 15HP (Rescue One)");
        assert_eq!(parsed.category, BoatCategory::Tinnie);
        assert_eq!(parsed.boat_type, BoatType::Unknown);
        assert_eq!(parsed.classification, None);
        assert_eq!(parsed.nickname, "Rescue One");
        assert!(!parsed.sweep_capable);
    }

    #[test]
    fn test_tinnie_by_horsepower_pattern() {
        let parsed = parse_label("Support boat 25 HP");
        assert_eq!(parsed.category, BoatCategory::Tinnie);
        assert_eq!(parsed.display_name, "Support boat");
    }

    #[test]
    fn test_tinnie_display_falls_back_to_raw_label() {
        // Everything strippable - display name must not end up empty
        let parsed = parse_label("Tinnie 15HP");
        assert_eq!(parsed.display_name, "Tinnie 15HP");
    }

    #[test]
    fn test_empty_label_yields_all_empty() {
        let parsed = parse_label("");
        assert_eq!(parsed.boat_type, BoatType::Unknown);
        assert_eq!(parsed.classification, None);
        assert_eq!(parsed.weight_kg, None);
        assert_eq!(parsed.nickname, "");
        assert_eq!(parsed.display_name, "");
        assert!(!parsed.sweep_capable);
    }

    #[test]
    fn test_unicode_passes_through() {
        let parsed = parse_label("2X RACER - Würfel 70 KG (Zoë Müller)");
        assert_eq!(parsed.nickname, "Zoë Müller");
        assert_eq!(parsed.display_name, "Würfel");
    }

    #[test]
    fn test_idempotent() {
        let label = "2X RACER - Swift double/pair 70 KG (Ian Krix)";
        assert_eq!(parse_label(label), parse_label(label));
    }

    #[test]
    fn test_damage_keywords_and_badge() {
        assert!(is_damaged("1X Shell (DAMAGED)", false));
        assert!(is_damaged("1X Shell - out of service", false));
        assert!(is_damaged("1X Shell currently Unavailable", false));
        assert!(is_damaged("1X Shell", true));
        assert!(!is_damaged("1X Shell", false));
    }

    const REGISTER_HTML: &str = r#"
        <html><body>
        <div class="boat-card">
            <h5 class="boat-name">2X RACER - Swift double/pair 70 KG (Ian Krix)</h5>
            <a href="/registers/boats/calendar?assetId=1042">View calendar</a>
        </div>
        <div class="boat-card">
            <h5 class="boat-name">1X Shell (Beryl)</h5>
            <span class="badge badge-danger">Out of service</span>
            <a href="/registers/boats/calendar/77">View calendar</a>
        </div>
        <div class="boat-card" data-asset-id="901">
            <h5 class="boat-name">Tinnie 15HP (Rescue One)</h5>
            <a href="/registers/boats/help">Help</a>
        </div>
        <div class="boat-card">
            <h5 class="boat-name">4X No calendar link here</h5>
        </div>
        </body></html>
    "#;

    #[test]
    fn test_register_page_extracts_ids_by_strategy() {
        let boats = parse_register_page(REGISTER_HTML);
        assert_eq!(boats.len(), 3);
        assert_eq!(boats[0].external_id, "1042");
        assert_eq!(boats[1].external_id, "77");
        assert_eq!(boats[2].external_id, "901");
    }

    #[test]
    fn test_register_page_badge_sets_damage() {
        let boats = parse_register_page(REGISTER_HTML);
        assert!(!boats[0].is_damaged);
        assert!(boats[1].is_damaged);
    }

    #[test]
    fn test_register_page_drops_cards_without_id() {
        let boats = parse_register_page(REGISTER_HTML);
        assert!(boats.iter().all(|b| !b.raw_label.contains("No calendar")));
    }

    #[test]
    fn test_register_page_preserves_order() {
        let boats = parse_register_page(REGISTER_HTML);
        let ids: Vec<&str> = boats.iter().map(|b| b.external_id.as_str()).collect();
        assert_eq!(ids, vec!["1042", "77", "901"]);
    }
}
