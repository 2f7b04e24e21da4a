//! Grid parser coverage over realistic page fixtures for both layouts.

use teewatch::grid::{GridParser, seats_from_label, seats_from_labels};

const TABLE_GRID_ALL_FULL: &str = r#"
<html><body>
<table class="bookinggrid">
  <thead>
    <tr><th>Tid</th><th>Tee 1</th><th>Tee 10</th></tr>
  </thead>
  <tbody>
    <tr><td>08:00</td><td class="full">Opptatt</td><td class="full">Opptatt</td></tr>
    <tr><td>08:10</td><td class="occupied"></td><td class="taken"></td></tr>
    <tr><td>08:20</td><td class="full"></td><td class="partfree"></td></tr>
  </tbody>
</table>
</body></html>
"#;

const TABLE_GRID_MIXED: &str = r#"
<html><body>
<table>
  <thead>
    <tr><th>Tid</th><th>Tee 1</th><th>Tee 10</th><th>Tee 19</th></tr>
  </thead>
  <tbody>
    <tr><td>08:00</td><td class="ledig">Ledig</td><td class="full"></td><td class="ledig"></td></tr>
    <tr><td>09:30</td><td class="full"></td><td><a href="/book">Bestill tid</a></td><td class="full"></td></tr>
    <tr><td></td><td class="ledig"></td><td></td><td></td></tr>
    <tr><td>10:15</td><td class="partfree ledig"></td><td class="full"></td><td class="full"></td></tr>
  </tbody>
</table>
</body></html>
"#;

const TILE_GRID_MIXED: &str = r#"
<html><body>
<div class="grid">
  <div class="hour free" data-grouping="a">
    <div class="time">09:00</div>
  </div>
  <div class="hour partfree" data-grouping="a">
    <div class="time">09:30</div>
    <div class="item">
      <img src="/img/bookinggrid/player1.png">
      <img src="/img/bookinggrid/player2.png">
    </div>
  </div>
  <div class="hour full" data-grouping="a">
    <div class="time">10:00</div>
  </div>
  <div class="hour expired" data-grouping="a">
    <div class="time">10:30</div>
  </div>
  <div class="hour tournament" data-grouping="a">
    <div class="time">11:00</div>
  </div>
  <div class="hour portalclosed" data-grouping="a">
    <div class="time">11:30</div>
  </div>
</div>
</body></html>
"#;

const TILE_GRID_GOLFBOX_STANDARD: &str = r#"
<html><body>
<div class="blocking21 hour" onclick="click_gbDefault('20250815T120000');">
  <div class="time">12:00</div>
  <div class="item"></div>
</div>
<div class="blocking21 hour" onclick="click_gbDefault('20250815T121000');">
  <div class="time">12:10</div>
  <div class="item">
    <img src="/icons/p.png">
  </div>
</div>
<div class="blocking21 hour">
  <div class="time">12:20</div>
  <div class="item"></div>
</div>
</body></html>
"#;

const TILE_GRID_FLIGHT_ROWS: &str = r#"
<html><body>
<div class="hour partfree">
  <div class="time">10:00</div>
  <div class="time-players">
    <div class="d-flex align-items-center row flex-nowrap"><span class="fw-bold">Ola Nordmann</span></div>
    <div class="d-flex align-items-center row flex-nowrap"><span class="fw-bold">Kari Nordmann</span></div>
    <div class="d-flex align-items-center row flex-nowrap"><span class="fw-bold"></span></div>
    <div class="d-flex align-items-center row flex-nowrap"><span class="fw-bold"></span></div>
  </div>
</div>
</body></html>
"#;

#[test]
fn fully_booked_table_grid_has_no_availability() {
    let parser = GridParser::default();
    let parsed = parser.parse(TABLE_GRID_ALL_FULL);
    assert!(parsed.is_empty(), "full grid should produce nothing: {parsed:?}");
}

#[test]
fn mixed_table_grid_counts_open_tees_per_time() {
    let parser = GridParser::default();
    let parsed = parser.parse(TABLE_GRID_MIXED);

    // Two open tees at 08:00, one bookable link at 09:30. The row without a
    // time label is dropped, and the partfree cell at 10:15 is excluded.
    assert_eq!(parsed["08:00"], vec!["2 spots available"]);
    assert_eq!(parsed["09:30"], vec!["1 spot available"]);
    assert_eq!(parsed.len(), 2);
}

#[test]
fn tile_grid_maps_states_to_seats() {
    let parser = GridParser::default();
    let parsed = parser.parse(TILE_GRID_MIXED);

    assert_eq!(parsed["09:00"], vec!["4 spots available"]);
    assert_eq!(parsed["09:30"], vec!["2 spots available"]);
    assert!(!parsed.contains_key("10:00"), "full tile leaked through");
    assert!(!parsed.contains_key("10:30"), "expired tile leaked through");
    assert!(!parsed.contains_key("11:00"), "tournament tile leaked through");
    assert!(!parsed.contains_key("11:30"), "portalclosed tile leaked through");
    assert_eq!(parsed.len(), 2);
}

#[test]
fn standard_slots_use_click_handler_and_booked_icons() {
    let parser = GridParser::default();
    let parsed = parser.parse(TILE_GRID_GOLFBOX_STANDARD);

    // Clickable and empty: full capacity. One booked icon: capacity - 1.
    // Unclickable: conservatively unavailable.
    assert_eq!(parsed["12:00"], vec!["4 spots available"]);
    assert_eq!(parsed["12:10"], vec!["3 spots available"]);
    assert!(!parsed.contains_key("12:20"));
}

#[test]
fn flight_rows_count_named_players_and_capacity() {
    let parser = GridParser::default();
    let parsed = parser.parse(TILE_GRID_FLIGHT_ROWS);

    // Four player rows, two with names: 4 - 2 = 2 seats.
    assert_eq!(parsed["10:00"], vec!["2 spots available"]);
}

#[test]
fn configured_capacity_applies_to_free_tiles() {
    let parser = GridParser::new(3);
    let parsed = parser.parse(TILE_GRID_MIXED);
    assert_eq!(parsed["09:00"], vec!["3 spots available"]);
    // partfree still subtracts booked icons from the configured capacity
    assert_eq!(parsed["09:30"], vec!["1 spot available"]);
}

#[test]
fn reparsing_rendered_grids_is_stable() {
    let parser = GridParser::default();
    for html in [
        TABLE_GRID_ALL_FULL,
        TABLE_GRID_MIXED,
        TILE_GRID_MIXED,
        TILE_GRID_GOLFBOX_STANDARD,
        TILE_GRID_FLIGHT_ROWS,
    ] {
        assert_eq!(parser.parse(html), parser.parse(html));
    }
}

#[test]
fn parsed_labels_round_trip_to_seat_counts() {
    let parser = GridParser::default();
    let parsed = parser.parse(TILE_GRID_MIXED);
    let seats: Vec<u32> = parsed.values().map(|labels| seats_from_labels(labels)).collect();
    assert_eq!(seats, vec![4, 2]);
    for labels in parsed.values() {
        for label in labels {
            assert!(seats_from_label(label) > 0);
        }
    }
}
