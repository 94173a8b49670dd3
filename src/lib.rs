// aprs-bot: Workspace umbrella crate.
//
// The daemon lives in services/responder; the wire protocol and geodesic
// helpers live under crates/.  This crate only anchors the end-to-end
// integration suites in tests/integration/.
