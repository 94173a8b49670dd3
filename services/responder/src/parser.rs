// Free-text command parser.
//
// Deterministic, priority-ordered token extraction over a lowercased copy
// of the message body with whitespace runs collapsed.  Each successful
// match records its fields on the command record and consumes the matched
// tokens, so later passes only see what is left.
//
// Priority is the user-visible contract:
//   1. explicit action keywords (`metar`, `whereis`, `dapnet`, ...)
//   2. bare-form targets (zip, ICAO, IATA, grid, lat/lon, city;country,
//      OSM category, satellite name)
//   3. modifiers in any position (dates, daytime windows, units, language,
//      top-N, `unicode`, `full`)
// A bare three-letter token that matches an IATA code is consumed by the
// IATA scan even when an `osm` keyword follows later in the priority list;
// users disambiguate with the explicit keyword.  ICAO/IATA membership is
// checked against the airport index so locator squares like `jo41` fall
// through to the grid scan instead of being mistaken for airports.

use std::collections::HashSet;
use std::sync::LazyLock;

use chrono::{DateTime, Datelike, Utc, Weekday};
use regex::Regex;

use crate::command::{Action, Command, DateOffset, Daytime, Target, Units};

/// Everything the parser needs besides the message text.  All lookups are
/// injected so parsing is a pure function (and tests are deterministic).
pub struct ParserContext<'a> {
    pub sender: &'a str,
    pub now: DateTime<Utc>,
    pub default_force_unicode: bool,
    /// Lowercased, dash-joined satellite names from the reference cache.
    pub satellite_names: &'a HashSet<String>,
    /// Lowercased ICAO codes from the airport index.
    pub icao_codes: &'a HashSet<String>,
    /// Lowercased IATA codes from the airport index.
    pub iata_codes: &'a HashSet<String>,
    /// Configured OSM category allow-list (lowercase).
    pub osm_categories: &'a [String],
}

const LANGUAGES: &[&str] = &[
    "af", "ar", "bg", "cs", "da", "de", "el", "en", "es", "fi", "fr", "he", "hr", "hu", "it",
    "ja", "ko", "nl", "no", "pl", "pt", "ro", "ru", "se", "sk", "sl", "sr", "sv", "tr", "uk",
    "zh",
];

const MODES: &[&str] = &["fm", "c4fm", "dstar", "d-star", "ysf", "dmr", "tetra", "atv"];

/// Tokens consumed by the modifier pass; bare-target scans must never eat
/// these.
const RESERVED: &[&str] = &[
    "today", "tomorrow", "monday", "tuesday", "wednesday", "thursday", "friday", "saturday",
    "sunday", "mon", "tue", "wed", "thu", "fri", "sat", "sun", "morn", "morning", "day",
    "daytime", "noon", "eve", "evening", "nite", "night", "tonite", "tonight", "mtr", "metric",
    "imp", "imperial", "unicode", "full", "lang", "lng", "top2", "top3", "top4", "top5",
];

// ---------------------------------------------------------------------------
// Working token buffer
// ---------------------------------------------------------------------------

/// The working copy: lowercased tokens plus the original-case text, with
/// consumed tokens blanked out.
struct Tokens {
    lower: Vec<Option<String>>,
    original: Vec<String>,
}

impl Tokens {
    fn new(body: &str) -> Self {
        let original: Vec<String> = body.split_whitespace().map(str::to_owned).collect();
        let lower = original
            .iter()
            .map(|t| Some(t.to_lowercase()))
            .collect();
        Tokens { lower, original }
    }

    fn len(&self) -> usize {
        self.lower.len()
    }

    fn get(&self, i: usize) -> Option<&str> {
        self.lower.get(i).and_then(|t| t.as_deref())
    }

    fn take(&mut self, i: usize) -> String {
        self.lower[i].take().unwrap_or_default()
    }

    /// Index of the first live token equal to any of `words`.
    fn find(&self, words: &[&str]) -> Option<usize> {
        (0..self.len()).find(|&i| {
            self.get(i)
                .map(|t| words.contains(&t))
                .unwrap_or(false)
        })
    }

    /// Original-case text of every live token from `i` onward, joined.
    fn tail_original(&self, i: usize) -> String {
        let mut parts = Vec::new();
        for j in i..self.len() {
            if self.lower[j].is_some() {
                parts.push(self.original[j].clone());
            }
        }
        parts.join(" ")
    }

    fn consume_from(&mut self, i: usize) {
        for j in i..self.len() {
            self.lower[j] = None;
        }
    }

    fn any_left(&self) -> bool {
        self.lower.iter().any(|t| t.is_some())
    }
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

/// Parse one message body into a command record.  Never fails: an
/// unintelligible body yields `Action::Unknown`.
pub fn parse(body: &str, message_id: Option<String>, ctx: &ParserContext) -> Command {
    let mut tokens = Tokens::new(body);
    let mut cmd = Command {
        action: Action::Unknown,
        target: Target::UserPosition,
        date_offset: DateOffset::Today,
        daytime: Daytime::Full,
        units: Units::default_for_callsign(ctx.sender),
        language: "en".to_owned(),
        top_n: 1,
        force_unicode: ctx.default_force_unicode,
        message_id,
    };
    let mut action_found = false;
    let mut target_found = false;
    let mut date_explicit = false;
    let mut full_flag = false;
    let mut modifier_found = false;

    scan_keywords(&mut tokens, &mut cmd, &mut action_found, &mut target_found);
    scan_modifiers(
        &mut tokens,
        &mut cmd,
        ctx,
        &mut date_explicit,
        &mut full_flag,
        &mut modifier_found,
    );
    if !target_found {
        scan_bare_targets(&mut tokens, &mut cmd, &mut action_found, &mut target_found, ctx);
    }

    // Resolution rules.
    if cmd.action == Action::Metar && full_flag {
        cmd.action = Action::MetarTafFull;
    }
    if !action_found {
        // A recognized target or modifier defaults the duty to weather;
        // leftovers we could not place at all mean the intent is unknown.
        if target_found || (modifier_found && !tokens.any_left()) {
            cmd.action = Action::Wx;
        } else {
            cmd.action = Action::Unknown;
        }
    }
    cmd
}

/// Priority 1: explicit action keywords, in the documented order.
fn scan_keywords(
    tokens: &mut Tokens,
    cmd: &mut Command,
    action_found: &mut bool,
    target_found: &mut bool,
) {
    // (keywords, handler) pairs are tried in order; the first hit wins.
    if let Some(i) = tokens.find(&["dapnethp"]) {
        take_dapnet(tokens, cmd, i, Action::DapnetHighPri, action_found, target_found);
        return;
    }
    if let Some(i) = tokens.find(&["dapnet"]) {
        take_dapnet(tokens, cmd, i, Action::Dapnet, action_found, target_found);
        return;
    }
    if let Some(i) = tokens.find(&["posmsg", "posrpt"]) {
        tokens.take(i);
        if let Some(j) = next_live(tokens, i) {
            let addr = tokens.get(j).unwrap_or_default().to_owned();
            if addr.contains('@') {
                tokens.take(j);
                cmd.target = Target::Email(addr);
                cmd.action = Action::PosMsg;
                *action_found = true;
                *target_found = true;
            }
        }
        return;
    }
    if let Some(i) = tokens.find(&["sonde"]) {
        tokens.take(i);
        if let Some(j) = next_live(tokens, i) {
            // Sonde serials run longer than callsigns (`S1234567`).
            if is_serial(tokens.get(j).unwrap_or_default()) {
                let call = tokens.take(j);
                cmd.target = Target::OtherCallsign(call.to_uppercase());
                cmd.action = Action::Sonde;
                *action_found = true;
                *target_found = true;
            }
        }
        return;
    }
    for (kw, action) in [
        ("satpass", Action::SatPass),
        ("vispass", Action::VisPass),
        ("satfreq", Action::SatFreq),
    ] {
        if let Some(i) = tokens.find(&[kw]) {
            tokens.take(i);
            if let Some(name) = take_satellite_name(tokens, i) {
                cmd.target = Target::Satellite(name);
                cmd.action = action;
                *action_found = true;
                *target_found = true;
            }
            return;
        }
    }
    if let Some(i) = tokens.find(&["cwop"]) {
        tokens.take(i);
        cmd.action = Action::Cwop;
        *action_found = true;
        cmd.target = Target::Cwop(None);
        if let Some(j) = next_live(tokens, i) {
            if is_cwop_id(tokens.get(j).unwrap_or_default()) {
                let id = tokens.take(j);
                cmd.target = Target::Cwop(Some(id.to_uppercase()));
                *target_found = true;
            }
        }
        return;
    }
    for (kw, action) in [("metar", Action::Metar), ("taf", Action::Taf)] {
        if let Some(i) = tokens.find(&[kw]) {
            tokens.take(i);
            cmd.action = action;
            *action_found = true;
            return;
        }
    }
    for (kw, mk) in [
        ("icao", Target::Icao as fn(String) -> Target),
        ("iata", Target::Iata as fn(String) -> Target),
    ] {
        if let Some(i) = tokens.find(&[kw]) {
            tokens.take(i);
            if let Some(j) = next_live(tokens, i) {
                let code = tokens.take(j).to_uppercase();
                cmd.target = mk(code);
                cmd.action = Action::Metar;
                *action_found = true;
                *target_found = true;
            }
            return;
        }
    }
    if let Some(i) = tokens.find(&["whereis"]) {
        tokens.take(i);
        if let Some(j) = next_live(tokens, i) {
            if is_callsign(tokens.get(j).unwrap_or_default()) {
                let call = tokens.take(j);
                cmd.target = Target::OtherCallsign(call.to_uppercase());
                cmd.action = Action::WhereIs;
                *action_found = true;
                *target_found = true;
            }
        }
        return;
    }
    if let Some(i) = tokens.find(&["whereami"]) {
        tokens.take(i);
        cmd.action = Action::WhereAmI;
        cmd.target = Target::UserPosition;
        *action_found = true;
        *target_found = true;
        return;
    }
    if let Some(i) = tokens.find(&["riseset"]) {
        tokens.take(i);
        cmd.action = Action::RiseSet;
        *action_found = true;
        return;
    }
    if let Some(i) = tokens.find(&["repeater"]) {
        tokens.take(i);
        cmd.action = Action::Repeater;
        *action_found = true;
        let mut band = None;
        let mut mode = None;
        // Band and mode may follow in either order.
        for _ in 0..2 {
            if let Some(j) = next_live(tokens, i) {
                let t = tokens.get(j).unwrap_or_default().to_owned();
                if band.is_none() && is_band(&t) {
                    band = Some(tokens.take(j));
                } else if mode.is_none() && MODES.contains(&t.as_str()) {
                    mode = Some(normalize_mode(&tokens.take(j)));
                } else {
                    break;
                }
            }
        }
        cmd.target = Target::RepeaterFilter { band, mode };
        *target_found = true;
        return;
    }
    if let Some(i) = tokens.find(&["osm"]) {
        tokens.take(i);
        if let Some(j) = next_live(tokens, i) {
            let phrase = tokens.take(j);
            cmd.target = Target::OsmPhrase(phrase);
            cmd.action = Action::OsmCategory;
            *action_found = true;
            *target_found = true;
        }
        return;
    }
    if let Some(i) = tokens.find(&["fortuneteller", "magic8ball", "magic8", "m8b"]) {
        tokens.take(i);
        cmd.action = Action::Fortune;
        *action_found = true;
        return;
    }
    if let Some(i) = tokens.find(&["help", "info"]) {
        tokens.take(i);
        cmd.action = Action::Help;
        *action_found = true;
        return;
    }
    if let Some(i) = tokens.find(&["grid", "mh"]) {
        tokens.take(i);
        if let Some(j) = next_live(tokens, i) {
            if is_grid(tokens.get(j).unwrap_or_default()) {
                let g = tokens.take(j);
                cmd.target = Target::Grid(g);
                *target_found = true;
            }
        }
        return;
    }
    if let Some(i) = tokens.find(&["zip"]) {
        tokens.take(i);
        if let Some(j) = next_live(tokens, i) {
            let t = tokens.get(j).unwrap_or_default().to_owned();
            if let Some(target) = parse_zip(&t) {
                tokens.take(j);
                cmd.target = target;
                *target_found = true;
            }
        }
        return;
    }
    if let Some(i) = tokens.find(&["wx"]) {
        tokens.take(i);
        cmd.action = Action::Wx;
        *action_found = true;
    }
}

fn take_dapnet(
    tokens: &mut Tokens,
    cmd: &mut Command,
    i: usize,
    action: Action,
    action_found: &mut bool,
    target_found: &mut bool,
) {
    tokens.take(i);
    if let Some(j) = next_live(tokens, i) {
        let user = tokens.take(j);
        let text = tokens.tail_original(j + 1);
        tokens.consume_from(j + 1);
        if !text.is_empty() {
            cmd.target = Target::DapnetUser { user, text };
            cmd.action = action;
            *action_found = true;
            *target_found = true;
        }
    }
}

/// Priority 2: bare-form targets over whatever tokens survived.
fn scan_bare_targets(
    tokens: &mut Tokens,
    cmd: &mut Command,
    action_found: &mut bool,
    target_found: &mut bool,
    ctx: &ParserContext,
) {
    // city;country spans tokens; handle it before single-token scans so a
    // multi-word city is not cannibalized.
    if let Some(target) = take_city_country(tokens) {
        cmd.target = target;
        *target_found = true;
        return;
    }
    for i in 0..tokens.len() {
        let Some(t) = tokens.get(i).map(str::to_owned) else {
            continue;
        };
        if RESERVED.contains(&t.as_str()) {
            continue;
        }
        if let Some(target) = parse_zip(&t) {
            tokens.take(i);
            cmd.target = target;
            *target_found = true;
            return;
        }
        if t.len() == 4 && ctx.icao_codes.contains(&t) {
            tokens.take(i);
            cmd.target = Target::Icao(t.to_uppercase());
            if !*action_found {
                cmd.action = Action::Metar;
                *action_found = true;
            }
            *target_found = true;
            return;
        }
        if t.len() == 3 && ctx.iata_codes.contains(&t) {
            tokens.take(i);
            cmd.target = Target::Iata(t.to_uppercase());
            if !*action_found {
                cmd.action = Action::Metar;
                *action_found = true;
            }
            *target_found = true;
            return;
        }
        if is_grid(&t) {
            tokens.take(i);
            cmd.target = Target::Grid(t);
            *target_found = true;
            return;
        }
        if let Some((lat, lon)) = parse_latlon(&t) {
            tokens.take(i);
            cmd.target = Target::LatLon(lat, lon);
            *target_found = true;
            return;
        }
        if ctx.osm_categories.iter().any(|c| c == &t) {
            tokens.take(i);
            cmd.target = Target::OsmPhrase(t);
            if !*action_found {
                cmd.action = Action::OsmCategory;
                *action_found = true;
            }
            *target_found = true;
            return;
        }
        if let Some(name) = match_satellite(tokens, i, ctx) {
            cmd.target = Target::Satellite(name);
            if !*action_found {
                cmd.action = Action::SatPass;
                *action_found = true;
            }
            *target_found = true;
            return;
        }
    }
}

/// Priority 3: modifiers, any position, all of them.
fn scan_modifiers(
    tokens: &mut Tokens,
    cmd: &mut Command,
    ctx: &ParserContext,
    date_explicit: &mut bool,
    full_flag: &mut bool,
    modifier_found: &mut bool,
) {
    let mut i = 0;
    while i < tokens.len() {
        let Some(t) = tokens.get(i).map(str::to_owned) else {
            i += 1;
            continue;
        };
        let mut hit = true;
        match t.as_str() {
            "today" => {
                cmd.date_offset = DateOffset::Today;
                *date_explicit = true;
            }
            "tomorrow" => {
                cmd.date_offset = DateOffset::Days(1);
                *date_explicit = true;
            }
            "morn" | "morning" => cmd.daytime = Daytime::Morning,
            "day" | "daytime" | "noon" => cmd.daytime = Daytime::Day,
            "eve" | "evening" => cmd.daytime = Daytime::Evening,
            "nite" | "night" => cmd.daytime = Daytime::Night,
            "tonite" | "tonight" => {
                cmd.daytime = Daytime::Night;
                if !*date_explicit {
                    cmd.date_offset = DateOffset::Today;
                }
            }
            "mtr" | "metric" => cmd.units = Units::Metric,
            "imp" | "imperial" => cmd.units = Units::Imperial,
            "unicode" => cmd.force_unicode = true,
            "full" => {
                *full_flag = true;
                cmd.daytime = Daytime::Full;
            }
            "lang" | "lng" => {
                tokens.take(i);
                if let Some(j) = next_live(tokens, i) {
                    let code = tokens.take(j);
                    if LANGUAGES.contains(&code.as_str()) {
                        cmd.language = code;
                    }
                    // Unknown codes fall back to `en` silently.
                }
                *modifier_found = true;
                i += 1;
                continue;
            }
            _ => {
                if let Some(n) = t.strip_suffix('h').and_then(|n| n.parse::<u8>().ok()) {
                    if (1..=47).contains(&n) && t.len() <= 3 {
                        cmd.date_offset = DateOffset::Hours(n);
                        *date_explicit = true;
                    } else {
                        hit = false;
                    }
                } else if let Some(n) = t.strip_suffix('d').and_then(|n| n.parse::<u8>().ok()) {
                    if (1..=7).contains(&n) && t.len() <= 2 {
                        cmd.date_offset = DateOffset::Days(n);
                        *date_explicit = true;
                    } else {
                        hit = false;
                    }
                } else if let Some(n) = t.strip_prefix("top").and_then(|n| n.parse::<u8>().ok()) {
                    if (2..=5).contains(&n) {
                        cmd.top_n = n;
                    } else {
                        hit = false;
                    }
                } else if let Some(days) = weekday_offset(&t, ctx.now) {
                    cmd.date_offset = DateOffset::Days(days);
                    *date_explicit = true;
                } else {
                    hit = false;
                }
            }
        }
        if hit {
            tokens.take(i);
            *modifier_found = true;
        }
        i += 1;
    }
}

// ---------------------------------------------------------------------------
// Token classifiers
// ---------------------------------------------------------------------------

static CALLSIGN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d?[a-z]{1,2}\d{1,4}[a-z]{1,4}(-\d{1,2})?$").unwrap());
static SERIAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9][a-z0-9-]{2,9}$").unwrap());
static GRID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-r]{2}\d{2}([a-x]{2})?$").unwrap());
static CWOP_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[a-z]{0,2}\d{3,6}$").unwrap());
static BAND_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d{1,4}(cm|mm|m)$").unwrap());
static LATLON_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(-?\d{1,3}(?:\.\d+)?)/(-?\d{1,3}(?:\.\d+)?)$").unwrap()
});

fn next_live(tokens: &Tokens, from: usize) -> Option<usize> {
    (from..tokens.len()).find(|&j| tokens.get(j).is_some())
}

/// Consume the next live token as a satellite name (keyword form; names
/// with spaces arrive pre-joined with a dash).
fn take_satellite_name(tokens: &mut Tokens, from: usize) -> Option<String> {
    let j = next_live(tokens, from)?;
    let name = tokens.take(j);
    Some(canonical_satellite(&name))
}

fn is_callsign(t: &str) -> bool {
    CALLSIGN_RE.is_match(t)
}

fn is_serial(t: &str) -> bool {
    SERIAL_RE.is_match(t)
}

fn is_grid(t: &str) -> bool {
    GRID_RE.is_match(t)
}

fn is_cwop_id(t: &str) -> bool {
    CWOP_RE.is_match(t)
}

fn is_band(t: &str) -> bool {
    BAND_RE.is_match(t)
}

fn normalize_mode(mode: &str) -> String {
    match mode {
        "ysf" => "c4fm".to_owned(),
        "d-star" => "dstar".to_owned(),
        m => m.to_owned(),
    }
}

fn parse_zip(t: &str) -> Option<Target> {
    let (code, country) = match t.split_once(';') {
        Some((c, cc)) => (c, Some(cc)),
        None => (t, None),
    };
    if code.len() == 5 && code.chars().all(|c| c.is_ascii_digit()) {
        let country = match country {
            Some(cc) if cc.len() == 2 => Some(cc.to_uppercase()),
            Some(_) => return None,
            // A zip without a country is a US zip.
            None => Some("US".to_owned()),
        };
        return Some(Target::Zip {
            code: code.to_owned(),
            country,
        });
    }
    None
}

fn parse_latlon(t: &str) -> Option<(f64, f64)> {
    let caps = LATLON_RE.captures(t)?;
    let lat: f64 = caps[1].parse().ok()?;
    let lon: f64 = caps[2].parse().ok()?;
    ((-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lon)).then_some((lat, lon))
}

/// Try to match a satellite name at `i`, joining up to one following token
/// with a dash (names with spaces are stored dash-joined).
fn match_satellite(tokens: &mut Tokens, i: usize, ctx: &ParserContext) -> Option<String> {
    let t = tokens.get(i)?.to_owned();
    let canon = canonical_satellite(&t);
    if ctx.satellite_names.contains(&canon) {
        tokens.take(i);
        return Some(canon);
    }
    if let Some(j) = next_live(tokens, i + 1) {
        let joined = format!("{t}-{}", tokens.get(j)?);
        if ctx.satellite_names.contains(&joined) {
            tokens.take(i);
            tokens.take(j);
            return Some(joined);
        }
    }
    None
}

/// `iss` and `zarya` name the same body.
fn canonical_satellite(name: &str) -> String {
    match name {
        "zarya" | "iss" => "iss".to_owned(),
        n => n.replace(' ', "-"),
    }
}

/// Days ahead to the named weekday; the same weekday as today means next
/// week, never zero.
fn weekday_offset(t: &str, now: DateTime<Utc>) -> Option<u8> {
    let wd = match t {
        "monday" | "mon" => Weekday::Mon,
        "tuesday" | "tue" => Weekday::Tue,
        "wednesday" | "wed" => Weekday::Wed,
        "thursday" | "thu" => Weekday::Thu,
        "friday" | "fri" => Weekday::Fri,
        "saturday" | "sat" => Weekday::Sat,
        "sunday" | "sun" => Weekday::Sun,
        _ => return None,
    };
    let today = now.weekday().num_days_from_monday() as i16;
    let wanted = wd.num_days_from_monday() as i16;
    let mut diff = (wanted - today).rem_euclid(7);
    if diff == 0 {
        diff = 7;
    }
    Some(diff as u8)
}

/// `city;country`, `city,state;country`, with multi-word cities.
fn take_city_country(tokens: &mut Tokens) -> Option<Target> {
    let i = (0..tokens.len()).find(|&i| {
        tokens
            .get(i)
            .map(|t| t.contains(';') && !t.starts_with(';'))
            .unwrap_or(false)
    })?;
    let t = tokens.get(i)?.to_owned();
    let (left, country) = t.split_once(';')?;
    if country.len() != 2 || !country.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    let (city_tail, state) = match left.split_once(',') {
        Some((c, s)) => (c.to_owned(), Some(s.to_owned())),
        None => (left.to_owned(), None),
    };

    // Preceding live alphabetic tokens belong to the city name.
    let mut words = Vec::new();
    let mut j = i;
    while j > 0 {
        match tokens.get(j - 1) {
            Some(w)
                if w.chars().all(|c| c.is_ascii_alphabetic() || c == '.' || c == '-')
                    && !RESERVED.contains(&w) =>
            {
                j -= 1;
            }
            _ => break,
        }
    }
    for k in j..i {
        if tokens.get(k).is_some() {
            words.push(tokens.take(k));
        }
    }
    tokens.take(i);
    words.push(city_tail);

    Some(Target::CityCountry {
        city: words.join(" "),
        state,
        country: country.to_uppercase(),
    })
}

// ---------------------------------------------------------------------------
// Canonical rendering (round-trip support)
// ---------------------------------------------------------------------------

/// Render a command back into a canonical command string.  Re-parsing the
/// result yields an equivalent record; the integration suite leans on this
/// law.
pub fn canonical_string(cmd: &Command) -> String {
    let mut parts: Vec<String> = Vec::new();
    match &cmd.action {
        Action::Wx => parts.push("wx".into()),
        Action::Metar => parts.push("metar".into()),
        Action::Taf => parts.push("taf".into()),
        Action::MetarTafFull => {
            parts.push("metar".into());
            parts.push("full".into());
        }
        Action::Cwop => parts.push("cwop".into()),
        Action::WhereIs => parts.push("whereis".into()),
        Action::WhereAmI => parts.push("whereami".into()),
        Action::RiseSet => parts.push("riseset".into()),
        Action::SatPass => parts.push("satpass".into()),
        Action::VisPass => parts.push("vispass".into()),
        Action::SatFreq => parts.push("satfreq".into()),
        Action::Repeater => parts.push("repeater".into()),
        Action::OsmCategory => parts.push("osm".into()),
        Action::Dapnet => parts.push("dapnet".into()),
        Action::DapnetHighPri => parts.push("dapnethp".into()),
        Action::PosMsg => parts.push("posmsg".into()),
        Action::Fortune => parts.push("m8b".into()),
        Action::Sonde => parts.push("sonde".into()),
        Action::Help => parts.push("help".into()),
        Action::Unknown => {}
    }
    match &cmd.target {
        Target::UserPosition => {}
        Target::DapnetUser { user, text } => {
            // The pager text swallows everything after it, so the
            // canonical form carries no trailing modifiers.
            parts.push(user.clone());
            parts.push(text.clone());
            return parts.join(" ");
        }
        Target::OtherCallsign(c) => parts.push(c.to_lowercase()),
        Target::LatLon(la, lo) => parts.push(format!("{la}/{lo}")),
        Target::Grid(g) => parts.push(g.clone()),
        Target::Zip { code, country } => match country.as_deref() {
            Some("US") | None => parts.push(format!("zip {code}")),
            Some(cc) => parts.push(format!("zip {code};{}", cc.to_lowercase())),
        },
        Target::CityCountry {
            city,
            state,
            country,
        } => match state {
            Some(s) => parts.push(format!("{city},{s};{}", country.to_lowercase())),
            None => parts.push(format!("{city};{}", country.to_lowercase())),
        },
        Target::Icao(c) => parts.push(format!("icao {}", c.to_lowercase())),
        Target::Iata(c) => parts.push(format!("iata {}", c.to_lowercase())),
        Target::Satellite(s) => parts.push(s.clone()),
        Target::Cwop(Some(id)) => parts.push(id.to_lowercase()),
        Target::Cwop(None) => {}
        Target::OsmPhrase(p) => parts.push(p.clone()),
        Target::Email(e) => parts.push(e.clone()),
        Target::RepeaterFilter { band, mode } => {
            if let Some(b) = band {
                parts.push(b.clone());
            }
            if let Some(m) = mode {
                parts.push(m.clone());
            }
        }
    }
    match cmd.date_offset {
        DateOffset::Today => {}
        DateOffset::Days(n) => parts.push(format!("{n}d")),
        DateOffset::Hours(n) => parts.push(format!("{n}h")),
    }
    match cmd.daytime {
        Daytime::Full => {}
        Daytime::Morning => parts.push("morn".into()),
        Daytime::Day => parts.push("day".into()),
        Daytime::Evening => parts.push("eve".into()),
        Daytime::Night => parts.push("night".into()),
    }
    match cmd.units {
        Units::Metric => parts.push("mtr".into()),
        Units::Imperial => parts.push("imp".into()),
    }
    if cmd.language != "en" {
        parts.push(format!("lang {}", cmd.language));
    }
    if cmd.top_n > 1 {
        parts.push(format!("top{}", cmd.top_n));
    }
    if cmd.force_unicode {
        parts.push("unicode".into());
    }
    parts.join(" ")
}
