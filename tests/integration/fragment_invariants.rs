//! Property-style suites for the parser round-trip law, the fragment
//! ceiling, and the 7-bit output guarantee.

use std::collections::HashSet;

use chrono::{TimeZone, Utc};
use responder::command::{Action, Command, DateOffset, Daytime, Target, Units};
use responder::fragment::fragment;
use responder::parser::{self, ParserContext};
use responder::response::{Line, Response};

fn sets() -> (HashSet<String>, HashSet<String>, HashSet<String>, Vec<String>) {
    let sats = ["iss", "ao-91", "so-50"].iter().map(|s| s.to_string()).collect();
    let icao = ["eddf", "ksfo"].iter().map(|s| s.to_string()).collect();
    let iata = ["sfo", "fra", "pub"].iter().map(|s| s.to_string()).collect();
    let osm = vec!["pub".to_owned(), "supermarket".to_owned()];
    (sats, icao, iata, osm)
}

fn base_command(action: Action, target: Target) -> Command {
    Command {
        action,
        target,
        date_offset: DateOffset::Today,
        daytime: Daytime::Full,
        units: Units::Metric,
        language: "en".to_owned(),
        top_n: 1,
        force_unicode: false,
        message_id: None,
    }
}

// ---------------------------------------------------------------------------
// Round-trip law
// ---------------------------------------------------------------------------

/// Re-parsing the canonical string of a command yields an equivalent
/// command, across the action/target matrix and all modifier axes.
#[test]
fn canonical_round_trip_across_the_grammar() {
    let (sats, icao, iata, osm) = sets();
    let ctx = ParserContext {
        sender: "DF1JSL-8",
        now: Utc.with_ymd_and_hms(2021, 1, 15, 12, 0, 0).unwrap(),
        default_force_unicode: false,
        satellite_names: &sats,
        icao_codes: &icao,
        iata_codes: &iata,
        osm_categories: &osm,
    };

    let commands = vec![
        base_command(Action::Wx, Target::UserPosition),
        base_command(
            Action::Wx,
            Target::Zip {
                code: "94043".to_owned(),
                country: Some("US".to_owned()),
            },
        ),
        base_command(
            Action::Wx,
            Target::Zip {
                code: "37603".to_owned(),
                country: Some("DE".to_owned()),
            },
        ),
        base_command(
            Action::Wx,
            Target::CityCountry {
                city: "holzminden".to_owned(),
                state: None,
                country: "DE".to_owned(),
            },
        ),
        base_command(Action::Wx, Target::LatLon(51.84, 9.45)),
        base_command(Action::Wx, Target::Grid("jo41rt".to_owned())),
        base_command(Action::Metar, Target::Icao("EDDF".to_owned())),
        base_command(Action::Metar, Target::Iata("SFO".to_owned())),
        base_command(Action::MetarTafFull, Target::UserPosition),
        base_command(Action::Taf, Target::UserPosition),
        base_command(Action::Cwop, Target::Cwop(Some("EW1234".to_owned()))),
        base_command(Action::Cwop, Target::Cwop(None)),
        base_command(
            Action::WhereIs,
            Target::OtherCallsign("DF1JSL-8".to_owned()),
        ),
        base_command(Action::WhereAmI, Target::UserPosition),
        base_command(Action::RiseSet, Target::UserPosition),
        base_command(Action::SatPass, Target::Satellite("iss".to_owned())),
        base_command(Action::VisPass, Target::Satellite("ao-91".to_owned())),
        base_command(Action::SatFreq, Target::Satellite("so-50".to_owned())),
        base_command(
            Action::Repeater,
            Target::RepeaterFilter {
                band: Some("70cm".to_owned()),
                mode: Some("c4fm".to_owned()),
            },
        ),
        base_command(
            Action::Repeater,
            Target::RepeaterFilter {
                band: None,
                mode: None,
            },
        ),
        base_command(Action::OsmCategory, Target::OsmPhrase("pub".to_owned())),
        base_command(
            Action::Dapnet,
            Target::DapnetUser {
                user: "df1jsl".to_owned(),
                text: "Greetings from the bot".to_owned(),
            },
        ),
        base_command(Action::PosMsg, Target::Email("op@example.org".to_owned())),
        base_command(Action::Sonde, Target::OtherCallsign("S1234567".to_owned())),
        base_command(Action::Fortune, Target::UserPosition),
        base_command(Action::Help, Target::UserPosition),
    ];

    for mut cmd in commands {
        // Exercise the modifier axes on top of each action where the
        // grammar allows them (the pager text swallows trailing tokens).
        let free_text_target = matches!(cmd.target, Target::DapnetUser { .. });
        if !free_text_target {
            cmd.date_offset = DateOffset::Days(3);
            cmd.daytime = Daytime::Evening;
            cmd.units = Units::Imperial;
            cmd.language = "de".to_owned();
            cmd.top_n = 3;
            cmd.force_unicode = true;
        }
        let canonical = parser::canonical_string(&cmd);
        let reparsed = parser::parse(&canonical, None, &ctx);
        assert_eq!(reparsed, cmd, "canonical: {canonical:?}");
    }
}

#[test]
fn hour_offsets_round_trip() {
    let (sats, icao, iata, osm) = sets();
    let ctx = ParserContext {
        sender: "DF1JSL-8",
        now: Utc.with_ymd_and_hms(2021, 1, 15, 12, 0, 0).unwrap(),
        default_force_unicode: false,
        satellite_names: &sats,
        icao_codes: &icao,
        iata_codes: &iata,
        osm_categories: &osm,
    };
    for hours in [1u8, 12, 47] {
        let mut cmd = base_command(Action::Wx, Target::UserPosition);
        cmd.date_offset = DateOffset::Hours(hours);
        let reparsed = parser::parse(&parser::canonical_string(&cmd), None, &ctx);
        assert_eq!(reparsed.date_offset, DateOffset::Hours(hours));
    }
}

// ---------------------------------------------------------------------------
// Fragment ceiling and 7-bit output
// ---------------------------------------------------------------------------

fn synthetic_responses() -> Vec<Response> {
    let mut out = Vec::new();

    out.push(Response::plain("short"));

    // Long prose with diacritics.
    out.push(Response::plain(
        "Überwiegend bewölkt mit gelegentlichen Schneeschauern über dem \
         Weserbergland, Höchsttemperaturen um −2°C, schwacher Wind aus West",
    ));

    // Many atoms of varied width.
    let mut atoms = Line::new();
    for i in 0..30 {
        atoms = atoms.atom(format!("k{i}:{}", "v".repeat(i % 11)));
    }
    let mut r = Response::new();
    r.push(atoms);
    out.push(r);

    // One monster token.
    let mut r = Response::new();
    r.push(Line::new().atom("x".repeat(200)));
    out.push(r);

    // Mixed lines like a real weather answer.
    let mut r = Response::new();
    r.push(
        Line::new()
            .atom("16-Jan-21")
            .atom("Holzminden;DE")
            .text("Bedeckt")
            .atom("morn:-3c")
            .atom("day:-1c")
            .atom("eve:-2c")
            .atom("nite:-2c"),
    );
    r.push(
        Line::new()
            .atom("sunrise/set 08:23/16:53")
            .atom("clouds:97%")
            .atom("uvi:0.4")
            .atom("1021hPa")
            .atom("hum:86%")
            .atom("dewpt:-4c")
            .atom("wndspd:3.4m/s")
            .atom("wnddeg:251"),
    );
    out.push(r);

    out
}

#[test]
fn every_fragment_respects_the_ceiling() {
    for response in synthetic_responses() {
        for unicode in [false, true] {
            for frag in fragment(&response, unicode) {
                assert!(
                    frag.len() <= ab_protocol::PAYLOAD_MAX,
                    "{} bytes: {frag:?}",
                    frag.len()
                );
            }
        }
    }
}

#[test]
fn ascii_mode_emits_printable_ascii_only() {
    for response in synthetic_responses() {
        for frag in fragment(&response, false) {
            assert!(
                frag.bytes().all(|b| (0x20..=0x7e).contains(&b)),
                "non-ascii byte in {frag:?}"
            );
        }
    }
}

#[test]
fn atoms_survive_fragmentation_whole() {
    let mut r = Response::new();
    let mut line = Line::new();
    let atoms: Vec<String> = (0..24).map(|i| format!("Dst{i} {}km", i * 7)).collect();
    for a in &atoms {
        line = line.atom(a.clone());
    }
    r.push(line);
    let frags = fragment(&r, false);
    for atom in &atoms {
        assert_eq!(
            frags.iter().filter(|f| f.contains(atom.as_str())).count(),
            1,
            "{atom} torn or lost"
        );
    }
}

// ---------------------------------------------------------------------------
// Wire format round trips
// ---------------------------------------------------------------------------

#[test]
fn rendered_messages_reparse() {
    let line = ab_protocol::render_message("BOT", "DF1JSL-8", "no match for your query", Some("0a1"), None);
    let frame = ab_protocol::parse_line(&line).unwrap();
    assert_eq!(frame.source, "BOT");
    assert_eq!(frame.addressee, "DF1JSL-8");
    assert_eq!(frame.body, "no match for your query");
    assert_eq!(frame.message_id.as_deref(), Some("0a1"));
}

#[test]
fn rendered_reply_ack_reparses() {
    let line = ab_protocol::render_message("BOT", "W1AW", "ok", Some("0a2"), Some("AB"));
    let frame = ab_protocol::parse_line(&line).unwrap();
    assert!(frame.uses_reply_ack);
    assert_eq!(frame.acks_message_id.as_deref(), Some("AB"));
}
