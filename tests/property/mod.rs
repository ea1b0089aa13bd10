//! Property-based tests for contract checking and batch ordering

mod fanout_properties;
