pub mod analyze;
pub mod config;
pub mod diagnostic;
pub mod fetch;
pub mod file_cache;
pub mod lsp;
pub mod output;
pub mod parse;
pub mod pointer;
pub mod position;
pub mod scan;
pub mod schema;
pub mod services;
