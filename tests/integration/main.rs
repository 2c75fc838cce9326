//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that exercises one part of the service
//! against mock collaborators. All tests run on the host with no radio.

mod dispatcher_tests;
mod service_tests;
mod supervisor_tests;
