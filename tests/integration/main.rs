//! Integration tests for Sitesift
//!
//! Every test runs a real session against wiremock servers (or an in-process
//! rendering engine) and writes its output into a temporary directory.

mod crawl_tests;
