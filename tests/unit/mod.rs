//! Configuration tests against the public API.

mod config_parsing;
mod config_validation;
