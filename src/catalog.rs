//! Static registry of monitored golf clubs.
//!
//! Each club carries the opaque GolfBox identifiers needed to materialize a
//! booking-grid URL for a given date. The catalog is loaded once at startup
//! and shared read-only across services.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;

/// A single club entry. Immutable after startup.
#[derive(Debug, Clone)]
pub struct Club {
    /// Stable key used in preferences and persisted observations.
    pub key: &'static str,
    pub display_name: &'static str,
    /// GolfBox resource GUID (brace-wrapped in URLs).
    pub resource_id: &'static str,
    /// GolfBox club GUID (bare in URLs).
    pub club_id: &'static str,
    /// First bookable tee time, as a compact `hhmmss` string.
    pub default_open_time: &'static str,
    /// Approximate course location (lat, lng).
    pub location: Option<(f64, f64)>,
}

impl Club {
    /// Compose the booking-grid URL for `date`.
    ///
    /// `start` overrides the club's default open time and must be a compact
    /// `hhmmss` string. The output format is consumed verbatim by GolfBox,
    /// including the brace-wrapped resource GUID, so it is built as a plain
    /// string rather than going through percent-encoding.
    pub fn url_for_date(&self, date: NaiveDate, start: Option<&str>) -> String {
        let start = start.unwrap_or(self.default_open_time);
        format!(
            "https://www.golfbox.no/site/my_golfbox/ressources/booking/grid.asp?\
             Ressource_GUID={{{resource}}}&Club_GUID={club}&Booking_Start={date}T{start}",
            resource = self.resource_id,
            club = self.club_id,
            date = date.format("%Y%m%d"),
        )
    }
}

static BOOKING_START_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"((?:Booking_Start|SelectedDate)=)\d{8}(T\d{6})").unwrap());
static PLAIN_DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"((?:date|dato|resdate|selectedDate)=)\d{4}-\d{2}-\d{2}").unwrap()
});

/// Rewrite the date component of an already-materialized grid URL.
///
/// `Booking_Start`/`SelectedDate` keep their `T`-suffixed time portion; plain
/// `date`/`dato`/`resdate`/`selectedDate` params are set to `YYYY-MM-DD`.
/// Everything else in the URL is preserved byte for byte, which allows
/// day-stepping within a cycle without re-deriving the whole URL.
pub fn rewrite_date(url: &str, date: NaiveDate) -> String {
    let compact = date.format("%Y%m%d").to_string();
    let dashed = date.format("%Y-%m-%d").to_string();

    let rewritten = BOOKING_START_RE.replace_all(url, |caps: &regex::Captures| {
        format!("{}{}{}", &caps[1], compact, &caps[2])
    });
    PLAIN_DATE_RE
        .replace_all(&rewritten, |caps: &regex::Captures| {
            format!("{}{}", &caps[1], dashed)
        })
        .into_owned()
}

/// Read-only map of club key to [`Club`].
#[derive(Debug)]
pub struct Catalog {
    clubs: BTreeMap<&'static str, Club>,
}

/// Clubs monitored when no user has expressed a preference.
const DEFAULT_CLUB_KEYS: &[&str] = &["oslo_golfklubb", "miklagard_gk", "haga_gk", "grini_gk"];

impl Catalog {
    /// The compiled-in club registry.
    pub fn builtin() -> Self {
        let clubs = BUILTIN_CLUBS
            .iter()
            .map(|club| (club.key, club.clone()))
            .collect();
        Self { clubs }
    }

    /// Exact lookup by stable key.
    pub fn lookup(&self, key: &str) -> Option<&Club> {
        self.clubs.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.clubs.contains_key(key)
    }

    /// Flexible lookup: exact key, then case-insensitive display name, then
    /// substring match. Keys are held in a sorted map so the substring pass is
    /// deterministic (first match in key order wins).
    pub fn find(&self, name: &str) -> Option<&Club> {
        let needle = name.trim().to_lowercase();
        if needle.is_empty() {
            return None;
        }

        if let Some(club) = self.clubs.get(needle.as_str()) {
            return Some(club);
        }

        if let Some(club) = self
            .clubs
            .values()
            .find(|club| club.display_name.to_lowercase() == needle)
        {
            return Some(club);
        }

        self.clubs.values().find(|club| {
            let display = club.display_name.to_lowercase();
            display.contains(&needle) || club.key.contains(&needle) || needle.contains(&display)
        })
    }

    /// All clubs in key order.
    pub fn iter(&self) -> impl Iterator<Item = &Club> {
        self.clubs.values()
    }

    pub fn len(&self) -> usize {
        self.clubs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clubs.is_empty()
    }

    /// Fallback monitored set used when no user preferences exist.
    pub fn default_club_keys() -> &'static [&'static str] {
        DEFAULT_CLUB_KEYS
    }
}

static BUILTIN_CLUBS: &[Club] = &[
    Club {
        key: "oslo_golfklubb",
        display_name: "Oslo Golfklubb",
        resource_id: "8034D31E-F798-4EA4-8475-D9F869AA217F",
        club_id: "5C6BDC3C-3D0A-43D0-B4A7-DCC2E9F8B454",
        default_open_time: "073000",
        location: Some((59.9493, 10.6343)),
    },
    Club {
        key: "haga_gk",
        display_name: "Haga GK",
        resource_id: "E95F6988-C683-43F8-919C-7F835DBFAF27",
        club_id: "E0105CD4-744F-4323-9B70-426E833E2EE6",
        default_open_time: "073000",
        location: Some((59.2839, 11.1097)),
    },
    Club {
        key: "grini_gk",
        display_name: "Grini GK",
        resource_id: "1BEE50FC-669C-4383-A47E-5354F7AC08EC",
        club_id: "EE00C492-7F02-4C2C-851B-8CDDC89181DB",
        default_open_time: "070000",
        location: Some((60.2167, 10.4167)),
    },
    Club {
        key: "baerum_gk",
        display_name: "Bærum GK",
        resource_id: "8BA75266-8EF6-49CA-BD9E-30468D3FF6DC",
        club_id: "340DE8DC-D776-475E-AB12-32C742E70B49",
        default_open_time: "060000",
        location: Some((59.8939, 10.5236)),
    },
    Club {
        key: "miklagard_gk",
        display_name: "Miklagard GK",
        resource_id: "76FDC7B8-EB17-4C65-94DB-5A3BF156FC45",
        club_id: "E26F8BF9-1D66-4A2A-A6EA-65763E379DA9",
        default_open_time: "070000",
        location: Some((59.9695, 11.0358)),
    },
    Club {
        key: "hauger_gk",
        display_name: "Hauger GK",
        resource_id: "9AB90FB6-5954-4BF9-BEC9-FC50867CC324",
        club_id: "FEE57961-2559-4E30-BDB6-7C9B8367CA5F",
        default_open_time: "070000",
        location: Some((59.2675, 10.4078)),
    },
    Club {
        key: "drobak_bk",
        display_name: "Drøbak BK",
        resource_id: "A2804229-985A-484F-A19F-BDDBA6FB2A55",
        club_id: "608E1A63-A10E-4C54-B3C8-D53FA9A087F4",
        default_open_time: "000000",
        location: Some((59.6597, 10.6306)),
    },
    Club {
        key: "onsoy_gk",
        display_name: "Onsøy GK",
        resource_id: "884D570B-7F66-4ECD-88E2-215E3B386422",
        club_id: "A85DA1E0-B469-4702-BDBC-4E8972EC50A9",
        default_open_time: "070000",
        location: Some((59.2181, 10.9298)),
    },
    Club {
        key: "tyrifjord_gk",
        display_name: "Tyrifjord GK",
        resource_id: "4F6C5CA4-0E11-4982-9CED-FC75A608B8BD",
        club_id: "31F8375C-430B-461C-A98E-D3659A8CD836",
        default_open_time: "070000",
        location: Some((59.9667, 9.9833)),
    },
    Club {
        key: "oppegard_gk",
        display_name: "Oppegård GK",
        resource_id: "4B1D1E06-B945-4F97-8955-37BF3DC261F2",
        club_id: "10FD393E-4608-4CCA-825D-E41245EFA260",
        default_open_time: "070000",
        location: Some((59.7833, 10.7833)),
    },
    Club {
        key: "asker_golfklubb",
        display_name: "Asker Golfklubb",
        resource_id: "6DDA6B72-66C5-4A9A-BF6C-FDBE08599317",
        club_id: "38219782-908C-4602-87D5-282049EB5A09",
        default_open_time: "070000",
        location: Some((59.8378, 10.4358)),
    },
    Club {
        key: "askim_golfklubb",
        display_name: "Askim Golfklubb",
        resource_id: "858D7A9B-9E24-471D-928E-AAE156DC82B0",
        club_id: "D61B48DA-B190-4A8D-AB88-EC820EE03536",
        default_open_time: "070000",
        location: Some((59.5833, 11.1667)),
    },
];

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn url_materialization_is_bit_compatible() {
        let catalog = Catalog::builtin();
        let club = catalog.lookup("oslo_golfklubb").unwrap();
        let url = club.url_for_date(date(2025, 8, 15), None);
        assert_eq!(
            url,
            "https://www.golfbox.no/site/my_golfbox/ressources/booking/grid.asp?\
             Ressource_GUID={8034D31E-F798-4EA4-8475-D9F869AA217F}&\
             Club_GUID=5C6BDC3C-3D0A-43D0-B4A7-DCC2E9F8B454&\
             Booking_Start=20250815T073000"
        );
    }

    #[test]
    fn url_honors_explicit_start_time() {
        let catalog = Catalog::builtin();
        let club = catalog.lookup("grini_gk").unwrap();
        let url = club.url_for_date(date(2025, 8, 15), Some("120000"));
        assert!(url.ends_with("Booking_Start=20250815T120000"));
    }

    #[test]
    fn rewrite_preserves_time_portion() {
        let catalog = Catalog::builtin();
        let club = catalog.lookup("baerum_gk").unwrap();
        let url = club.url_for_date(date(2025, 8, 15), None);
        let rewritten = rewrite_date(&url, date(2025, 8, 17));
        assert!(rewritten.ends_with("Booking_Start=20250817T060000"));
        // Only the date changed.
        assert_eq!(
            url.replace("20250815", "20250817"),
            rewritten,
        );
    }

    #[test]
    fn rewrite_handles_plain_date_params() {
        let url = "https://example.com/grid?resdate=2025-08-15&selectedDate=2025-08-15";
        let rewritten = rewrite_date(url, date(2025, 9, 1));
        assert_eq!(
            rewritten,
            "https://example.com/grid?resdate=2025-09-01&selectedDate=2025-09-01"
        );
    }

    #[test]
    fn rewrite_leaves_unrelated_urls_alone() {
        let url = "https://example.com/grid?foo=bar";
        assert_eq!(rewrite_date(url, date(2025, 9, 1)), url);
    }

    #[test]
    fn find_prefers_exact_key() {
        let catalog = Catalog::builtin();
        assert_eq!(catalog.find("haga_gk").unwrap().key, "haga_gk");
    }

    #[test]
    fn find_matches_display_name_case_insensitively() {
        let catalog = Catalog::builtin();
        assert_eq!(catalog.find("oslo golfklubb").unwrap().key, "oslo_golfklubb");
    }

    #[test]
    fn find_substring_is_deterministic() {
        let catalog = Catalog::builtin();
        // Both asker_golfklubb and askim_golfklubb contain "ask"; key order
        // makes asker_golfklubb the stable winner.
        assert_eq!(catalog.find("ask").unwrap().key, "asker_golfklubb");
    }

    #[test]
    fn find_rejects_unknown_names() {
        let catalog = Catalog::builtin();
        assert!(catalog.find("st andrews").is_none());
        assert!(catalog.find("").is_none());
    }
}
