//! Integration tests for harmony-dropbox
//!
//! Uses wiremock to simulate the Dropbox API v2 and verifies end-to-end
//! behavior of authentication, schema negotiation, change enumeration,
//! record and file transfer, and cancellation.


mod test_auth;
mod test_cancellation;
mod test_changes;
mod test_files;
mod test_schema;
