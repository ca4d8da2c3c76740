pub mod support;

mod api_tests;
mod config_tests;
