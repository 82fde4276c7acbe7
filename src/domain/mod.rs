pub mod column;
pub mod error;
pub mod labeler;
pub mod models;
pub mod normalizer;
pub mod ports;
pub mod report;
