//! End-to-end tests: provider → engine → sinks and persistence.

mod mock_provider;
mod pipeline;
