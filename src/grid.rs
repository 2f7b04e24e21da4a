//! Booking-grid HTML parser.
//!
//! GolfBox renders two distinct grid structures depending on club and client:
//! a legacy table grid (rows are tee times, columns are tees) and a tile grid
//! (one element per tee time carrying a state class). Both are reduced to the
//! same shape: a map from `HH:MM` to a capacity label like `"2 spots
//! available"`, which [`seats_from_label`] parses back to an integer.
//!
//! Parsing is pure and deterministic. Zero tee times on a recognized layout
//! means "no availability", never an error; the caller cannot distinguish a
//! closed course from a fully booked one.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use html_scraper::{ElementRef, Html, Selector};
use regex::Regex;
use tracing::debug;

use crate::prefs::parse_hhmm;

/// Fallback seats per tee time when the grid does not encode capacity.
pub const DEFAULT_TEE_CAPACITY: u32 = 4;

static TIME_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b\d{1,2}:\d{2}\b").unwrap());
static ISO_TIME_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"T(\d{2})(\d{2})").unwrap());
static LABEL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*(\d+)\s+spot").unwrap());
static DIGITS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").unwrap());

static TABLE_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("table").unwrap());
static THEAD_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("thead").unwrap());
static TBODY_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tbody").unwrap());
static ROW_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr").unwrap());
static CELL_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("th, td").unwrap());
static LINK_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a, button").unwrap());
static TILE_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.hour, .booking-slot, .time-slot").unwrap());
static TIME_CHILD_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse(".time").unwrap());
static FLIGHT_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse(".time-players").unwrap());
static ITEM_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse(".item").unwrap());
static IMG_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("img").unwrap());
static GREENFEE_IMG_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("img[src*='bookinggrid/greenfee']").unwrap());
static NAME_CELL_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse(".fw-bold").unwrap());

const AVAILABLE_KEYWORDS: &[&str] = &["ledig", "available", "free", "bookable", "open", "åpen"];
const UNAVAILABLE_KEYWORDS: &[&str] = &["partfree", "partial", "full", "occupied", "taken"];
const BOOK_LINK_KEYWORDS: &[&str] = &["book", "bestill", "reserver", "reserve"];

/// Parses booking grids with a configured per-tee capacity.
#[derive(Debug, Clone, Copy)]
pub struct GridParser {
    tee_capacity: u32,
}

impl GridParser {
    pub fn new(tee_capacity: u32) -> Self {
        Self {
            tee_capacity: tee_capacity.max(1),
        }
    }

    /// Parse a grid page into `HH:MM -> ["N spots available"]`.
    ///
    /// The table layout is attempted first; the tile layout is only consulted
    /// when the table pass finds nothing. When the same tee time appears on
    /// several tees, the reported seats are the maximum observed for that
    /// time, not the sum.
    pub fn parse(&self, html: &str) -> BTreeMap<String, Vec<String>> {
        let doc = Html::parse_document(html);

        let mut seats = self.parse_table_grid(&doc);
        if seats.is_empty() {
            seats = self.parse_tile_grid(&doc);
        }

        seats
            .into_iter()
            .filter(|(_, n)| *n > 0)
            .map(|(hhmm, n)| (hhmm, vec![spots_label(n)]))
            .collect()
    }

    // ── Table layout ────────────────────────────────────────────────────

    fn parse_table_grid(&self, doc: &Html) -> BTreeMap<String, u32> {
        let Some(table) = doc.select(&TABLE_SEL).next() else {
            return BTreeMap::new();
        };

        let header_labels: Vec<String> = table
            .select(&THEAD_SEL)
            .next()
            .map(|thead| {
                thead
                    .select(&CELL_SEL)
                    .enumerate()
                    .map(|(i, cell)| {
                        let text = collapsed_text(cell);
                        if text.is_empty() { format!("Tee {i}") } else { text }
                    })
                    .collect()
            })
            .unwrap_or_default();

        let mut seats: BTreeMap<String, u32> = BTreeMap::new();
        let mut open_tees: Vec<String> = Vec::new();

        let rows: Vec<ElementRef> = match table.select(&TBODY_SEL).next() {
            Some(tbody) => tbody.select(&ROW_SEL).collect(),
            None => table.select(&ROW_SEL).collect(),
        };

        for row in rows {
            let cells: Vec<ElementRef> = row.select(&CELL_SEL).collect();
            if cells.is_empty() {
                continue;
            }

            let time_label = extract_time(&collapsed_text(cells[0]))
                .or_else(|| extract_time(&collapsed_text(row)));
            let Some(time_label) = time_label else {
                continue;
            };

            for (col_idx, cell) in cells.iter().enumerate().skip(1) {
                if !is_available_cell(*cell) {
                    continue;
                }
                // One available cell is one bookable unit at this time.
                *seats.entry(time_label.clone()).or_insert(0) += 1;

                let tee = header_labels
                    .get(col_idx)
                    .cloned()
                    .unwrap_or_else(|| format!("Tee {col_idx}"));
                open_tees.push(format!("{time_label}/{tee}"));
            }
        }

        if !seats.is_empty() {
            debug!(times = seats.len(), tees = ?open_tees, "parsed table grid");
        }
        seats
    }

    // ── Tile layout ─────────────────────────────────────────────────────

    fn parse_tile_grid(&self, doc: &Html) -> BTreeMap<String, u32> {
        let mut seats: BTreeMap<String, u32> = BTreeMap::new();

        for tile in doc.select(&TILE_SEL) {
            let classes = class_string(tile);

            // Tournament blocks and already-started times are never bookable.
            if classes.contains("tournament") || classes.contains("expired") {
                continue;
            }

            // Grouped tiles without a time child are blocked groupings.
            if tile.value().attr("data-grouping").is_some()
                && tile.select(&TIME_CHILD_SEL).next().is_none()
            {
                continue;
            }

            let Some(time_label) = tile_time(tile) else {
                continue;
            };

            let available = self.tile_availability(tile, &classes);
            if available > 0 {
                let entry = seats.entry(time_label).or_insert(0);
                *entry = (*entry).max(available);
            }
        }

        if !seats.is_empty() {
            debug!(times = seats.len(), "parsed tile grid");
        }
        seats
    }

    fn tile_availability(&self, tile: ElementRef, classes: &str) -> u32 {
        let flight = tile.select(&FLIGHT_SEL).next();
        let item = tile.select(&ITEM_SEL).next();

        let (booked, player_rows) = match flight {
            Some(flight) => booked_from_player_rows(flight),
            None => (booked_from_icons(tile, item), 0),
        };

        let capacity = read_capacity_attr(Some(tile))
            .or_else(|| read_capacity_attr(flight))
            .or_else(|| read_capacity_attr(item))
            .unwrap_or_else(|| {
                if player_rows > booked {
                    player_rows
                } else {
                    self.tee_capacity
                }
            });

        let onclick = tile.value().attr("onclick").unwrap_or_default();
        let clickable = onclick.contains("click_gbDefault");

        if classes.contains("portalclosed") {
            0
        } else if classes.contains("blocking21") && classes.contains("hour") {
            // Standard slot: only count it when the grid marks it bookable.
            match item {
                Some(item) => {
                    let booked_icons = item.select(&IMG_SEL).count() as u32;
                    let item_text = collapsed_text(item);
                    if clickable && booked_icons == 0 && item_text.is_empty() {
                        capacity
                    } else if booked_icons > 0 {
                        capacity.saturating_sub(booked_icons)
                    } else {
                        0
                    }
                }
                None => {
                    if clickable {
                        capacity
                    } else {
                        0
                    }
                }
            }
        } else if classes.contains("full") {
            0
        } else if classes.contains("free") && booked == 0 {
            capacity
        } else if classes.contains("partfree") {
            capacity.saturating_sub(booked)
        } else {
            0
        }
    }
}

impl Default for GridParser {
    fn default() -> Self {
        Self::new(DEFAULT_TEE_CAPACITY)
    }
}

/// Render the capacity label for `n` seats.
pub fn spots_label(n: u32) -> String {
    if n == 1 {
        "1 spot available".to_string()
    } else {
        format!("{n} spots available")
    }
}

/// Parse a capacity label back to a seat count. Unrecognized labels are 0.
pub fn seats_from_label(label: &str) -> u32 {
    LABEL_RE
        .captures(label)
        .and_then(|caps| caps[1].parse().ok())
        .unwrap_or(0)
}

/// Total seats across a time entry's labels.
pub fn seats_from_labels(labels: &[String]) -> u32 {
    labels.iter().map(|label| seats_from_label(label)).sum()
}

// ── helpers ─────────────────────────────────────────────────────────────

fn collapsed_text(el: ElementRef) -> String {
    el.text()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn class_string(el: ElementRef) -> String {
    el.value().attr("class").unwrap_or_default().to_lowercase()
}

/// First `HH:MM` in `text`, normalized to zero-padded form.
fn extract_time(text: &str) -> Option<String> {
    let raw = TIME_RE.find(text)?.as_str();
    let minutes = parse_hhmm(raw)?;
    Some(format!("{:02}:{:02}", minutes / 60, minutes % 60))
}

fn tile_time(tile: ElementRef) -> Option<String> {
    if let Some(time_div) = tile.select(&TIME_CHILD_SEL).next()
        && let Some(time) = extract_time(&collapsed_text(time_div))
    {
        return Some(time);
    }
    if let Some(time) = extract_time(&collapsed_text(tile)) {
        return Some(time);
    }
    // Embedded booking-start token in the click handler, e.g. ...20250815T2030...
    let onclick = tile.value().attr("onclick")?;
    let caps = ISO_TIME_RE.captures(onclick)?;
    extract_time(&format!("{}:{}", &caps[1], &caps[2]))
}

fn is_available_cell(cell: ElementRef) -> bool {
    let classes = class_string(cell);
    let text = collapsed_text(cell).to_lowercase();

    if UNAVAILABLE_KEYWORDS.iter().any(|k| classes.contains(k) || text.contains(k)) {
        return false;
    }
    if AVAILABLE_KEYWORDS.iter().any(|k| classes.contains(k) || text.contains(k)) {
        return true;
    }
    cell.select(&LINK_SEL).any(|link| {
        let link_text = collapsed_text(link).to_lowercase();
        BOOK_LINK_KEYWORDS.iter().any(|k| link_text.contains(k))
    })
}

/// Booked players and total player rows in a desktop-style flight block.
fn booked_from_player_rows(flight: ElementRef) -> (u32, u32) {
    let mut rows = 0u32;
    let mut booked = 0u32;

    for child in flight.children() {
        let Some(row) = ElementRef::wrap(child) else {
            continue;
        };
        let has_row_classes = ["d-flex", "align-items-center", "row", "flex-nowrap"]
            .iter()
            .all(|required| row.value().classes().any(|c| c.eq_ignore_ascii_case(required)));
        if !has_row_classes {
            continue;
        }
        rows += 1;
        let named = row
            .select(&NAME_CELL_SEL)
            .any(|cell| !collapsed_text(cell).is_empty());
        if named {
            booked += 1;
        }
    }

    (booked, rows)
}

/// Booked players counted from per-player icons (mobile/classic layout).
fn booked_from_icons(tile: ElementRef, item: Option<ElementRef>) -> u32 {
    let from_item = item
        .map(|item| item.select(&IMG_SEL).count() as u32)
        .unwrap_or(0);
    if from_item > 0 {
        return from_item;
    }
    tile.select(&GREENFEE_IMG_SEL).count() as u32
}

/// Explicit capacity from `data-capacity`/`data-slots` style attributes.
fn read_capacity_attr(el: Option<ElementRef>) -> Option<u32> {
    let el = el?;
    for key in ["data-capacity", "data-slots", "data_capacity", "data_slots"] {
        if let Some(value) = el.value().attr(key)
            && let Some(m) = DIGITS_RE.find(value)
            && let Ok(n) = m.as_str().parse::<u32>()
            && n > 0
        {
            return Some(n);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_round_trip() {
        assert_eq!(spots_label(1), "1 spot available");
        assert_eq!(spots_label(3), "3 spots available");
        assert_eq!(seats_from_label(&spots_label(1)), 1);
        assert_eq!(seats_from_label(&spots_label(4)), 4);
        assert_eq!(seats_from_label("Tee 2"), 0);
        assert_eq!(seats_from_label(""), 0);
    }

    #[test]
    fn time_extraction_zero_pads() {
        assert_eq!(extract_time("kl 7:30 ledig").as_deref(), Some("07:30"));
        assert_eq!(extract_time("12:00").as_deref(), Some("12:00"));
        assert_eq!(extract_time("no time here"), None);
    }

    #[test]
    fn empty_document_parses_to_nothing() {
        let parser = GridParser::default();
        assert!(parser.parse("<html><body></body></html>").is_empty());
    }

    #[test]
    fn table_grid_counts_available_cells() {
        let parser = GridParser::default();
        let html = r#"
            <table>
              <thead><tr><th>Tid</th><th>Tee 1</th><th>Tee 2</th></tr></thead>
              <tbody>
                <tr><td>08:00</td><td class="ledig"></td><td class="ledig"></td></tr>
                <tr><td>08:10</td><td class="full"></td><td class="ledig"></td></tr>
                <tr><td>08:20</td><td class="full"></td><td class="occupied"></td></tr>
              </tbody>
            </table>
        "#;
        let parsed = parser.parse(html);
        assert_eq!(parsed["08:00"], vec!["2 spots available"]);
        assert_eq!(parsed["08:10"], vec!["1 spot available"]);
        assert!(!parsed.contains_key("08:20"));
    }

    #[test]
    fn table_cell_with_booking_link_is_available() {
        let parser = GridParser::default();
        let html = r##"
            <table><tbody>
              <tr><td>09:00</td><td><a href="#">Bestill</a></td></tr>
            </tbody></table>
        "##;
        let parsed = parser.parse(html);
        assert_eq!(parsed["09:00"], vec!["1 spot available"]);
    }

    #[test]
    fn partfree_text_never_counts_as_available() {
        let parser = GridParser::default();
        let html = r#"
            <table><tbody>
              <tr><td>09:00</td><td class="partfree ledig"></td></tr>
            </tbody></table>
        "#;
        assert!(parser.parse(html).is_empty());
    }

    #[test]
    fn tile_states_map_to_seat_counts() {
        let parser = GridParser::default();
        let html = r#"
            <div class="hour free"><div class="time">09:00</div></div>
            <div class="hour partfree">
              <div class="time">09:30</div>
              <div class="item"><img src="a.png"><img src="b.png"></div>
            </div>
            <div class="hour full"><div class="time">10:00</div></div>
            <div class="hour expired"><div class="time">10:30</div></div>
        "#;
        let parsed = parser.parse(html);
        assert_eq!(parsed["09:00"], vec!["4 spots available"]);
        assert_eq!(parsed["09:30"], vec!["2 spots available"]);
        assert!(!parsed.contains_key("10:00"));
        assert!(!parsed.contains_key("10:30"));
    }

    #[test]
    fn explicit_capacity_attr_wins() {
        let parser = GridParser::default();
        let html = r#"
            <div class="hour partfree" data-capacity="3">
              <div class="time">11:00</div>
              <div class="item"><img src="a.png"></div>
            </div>
        "#;
        let parsed = parser.parse(html);
        assert_eq!(parsed["11:00"], vec!["2 spots available"]);
    }

    #[test]
    fn duplicate_times_report_maximum_seats() {
        let parser = GridParser::default();
        let html = r#"
            <div class="hour partfree">
              <div class="time">09:00</div>
              <div class="item"><img src="a.png"><img src="b.png"><img src="c.png"></div>
            </div>
            <div class="hour free"><div class="time">09:00</div></div>
        "#;
        let parsed = parser.parse(html);
        assert_eq!(parsed["09:00"], vec!["4 spots available"]);
    }

    #[test]
    fn standard_slot_requires_click_handler() {
        let parser = GridParser::default();
        let html = r#"
            <div class="hour blocking21" onclick="click_gbDefault('20250815T120000')"></div>
            <div class="hour blocking21"></div>
        "#;
        let parsed = parser.parse(html);
        // Time comes from the click handler token; the unclickable twin
        // contributes nothing.
        assert_eq!(parsed["12:00"], vec!["4 spots available"]);
        assert_eq!(parsed.len(), 1);
    }

    #[test]
    fn reparsing_is_deterministic() {
        let parser = GridParser::default();
        let html = r#"
            <div class="hour free"><div class="time">09:00</div></div>
            <div class="hour partfree">
              <div class="time">09:30</div>
              <div class="item"><img src="a.png"></div>
            </div>
        "#;
        assert_eq!(parser.parse(html), parser.parse(html));
    }
}
