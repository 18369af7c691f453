//! Integration tests: full sessions against a mock table.

mod mock_table;
mod reconcile_flow;
mod session_flow;
