pub mod analyze;
pub mod diff;
pub mod dump;
pub mod export;
pub mod parser;
