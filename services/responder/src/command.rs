// Structured command record produced by the parser.
//
// The free-text grammar collapses into exactly one `Action` plus a struct
// of modifiers.  Keeping the carrier typed (instead of the loose key/value
// bag the protocol grew up with) makes the dispatcher exhaustive: adding an
// action without handling it is a compile error.

use serde::Serialize;

/// The primary duty requested by the sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Action {
    Wx,
    Metar,
    Taf,
    MetarTafFull,
    Cwop,
    WhereIs,
    WhereAmI,
    RiseSet,
    SatPass,
    VisPass,
    SatFreq,
    Repeater,
    OsmCategory,
    Dapnet,
    DapnetHighPri,
    PosMsg,
    Fortune,
    Sonde,
    Help,
    Unknown,
}

/// Symbolic target reference.  Coordinate resolution happens in the
/// dispatcher; the parser only records what the sender pointed at.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Target {
    /// The sender's own last known position.
    UserPosition,
    OtherCallsign(String),
    LatLon(f64, f64),
    Grid(String),
    Zip {
        code: String,
        country: Option<String>,
    },
    CityCountry {
        city: String,
        state: Option<String>,
        country: String,
    },
    Icao(String),
    Iata(String),
    Satellite(String),
    Cwop(Option<String>),
    OsmPhrase(String),
    Email(String),
    DapnetUser {
        user: String,
        text: String,
    },
    RepeaterFilter {
        band: Option<String>,
        mode: Option<String>,
    },
}

/// Date window, relative to "now" in the sender's request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DateOffset {
    Today,
    /// 1..=7 whole days ahead.
    Days(u8),
    /// 1..=47 hours ahead.
    Hours(u8),
}

/// Daytime window within the chosen date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Daytime {
    Full,
    Morning,
    Day,
    Evening,
    Night,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Units {
    Metric,
    Imperial,
}

impl Units {
    /// Imperial for stations in the three non-metric countries, metric
    /// everywhere else.  Country is inferred from the callsign prefix.
    pub fn default_for_callsign(callsign: &str) -> Units {
        match country_from_callsign(callsign) {
            Some("US") | Some("LR") | Some("MM") => Units::Imperial,
            _ => Units::Metric,
        }
    }
}

/// ITU prefix to ISO country, for the handful of prefixes the unit default
/// cares about.  Everything unrecognized maps to metric anyway.
pub fn country_from_callsign(callsign: &str) -> Option<&'static str> {
    let c = callsign.to_ascii_uppercase();
    let c = c.split('-').next().unwrap_or("");
    // Liberia and Myanmar have two-character prefixes; check those first.
    for p in ["A8", "D5", "EL", "5L", "5M", "6Z"] {
        if c.starts_with(p) {
            return Some("LR");
        }
    }
    for p in ["XY", "XZ"] {
        if c.starts_with(p) {
            return Some("MM");
        }
    }
    match c.chars().next()? {
        'K' | 'W' | 'N' => Some("US"),
        'A' => {
            // AA..AL is the US block; AM.. belongs elsewhere.
            match c.chars().nth(1)? {
                'A'..='L' => Some("US"),
                _ => None,
            }
        }
        _ => None,
    }
}

/// A fully parsed request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Command {
    pub action: Action,
    pub target: Target,
    pub date_offset: DateOffset,
    pub daytime: Daytime,
    pub units: Units,
    /// ISO-639-1-ish code; unknown codes have already been folded to `en`.
    pub language: String,
    /// 1..=5 results for list-style answers.
    pub top_n: u8,
    pub force_unicode: bool,
    /// Carried through from the inbound frame for ack bookkeeping.
    pub message_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn us_prefixes_default_to_imperial() {
        for call in ["KD7ABC", "W1AW", "N0CALL-5", "AB1CDE"] {
            assert_eq!(Units::default_for_callsign(call), Units::Imperial, "{call}");
        }
    }

    #[test]
    fn liberia_and_myanmar_default_to_imperial() {
        assert_eq!(Units::default_for_callsign("EL2BG"), Units::Imperial);
        assert_eq!(Units::default_for_callsign("XY1AA"), Units::Imperial);
        assert_eq!(Units::default_for_callsign("5L7X"), Units::Imperial);
    }

    #[test]
    fn everyone_else_is_metric() {
        for call in ["DF1JSL-8", "G4ABC", "VK2XYZ", "JA1AAA"] {
            assert_eq!(Units::default_for_callsign(call), Units::Metric, "{call}");
        }
    }

    #[test]
    fn ssid_is_ignored_for_country_lookup() {
        assert_eq!(country_from_callsign("W1AW-15"), Some("US"));
    }
}
