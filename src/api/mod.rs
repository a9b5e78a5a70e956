//! HTTP adapter for the spreadsheet host.

pub mod doc;
pub mod handlers;
pub mod routes;
pub mod state;
