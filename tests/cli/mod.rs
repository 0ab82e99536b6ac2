/// End-to-end tests that run the keel binary.
///
/// None of them reach a database: they cover argument parsing, config
/// loading and the checks made before connecting.
pub mod error_handling;
pub mod help;
