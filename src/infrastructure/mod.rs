pub mod cache;
pub mod parser_adapter;
pub mod parsers;
