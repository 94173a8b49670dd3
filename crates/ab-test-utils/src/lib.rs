// ab-test-utils: Shared test utilities for the responder suite.
//
// Provides a scripted APRS-IS server over plain TCP for integration tests
// of the session, scheduler and end-to-end request pipeline.

pub mod mock_aprs_server;

pub use mock_aprs_server::MockAprsServer;
