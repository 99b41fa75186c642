pub mod assign;
pub mod config;
pub mod record;
pub mod schedule;
pub mod site;
pub mod track;
