//! CLI Commands

pub mod compose;
pub mod login;
pub mod run;
