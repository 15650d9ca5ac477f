pub mod catalog;
pub mod config;
pub mod repository;
pub mod source_list;
pub mod version;
pub mod watch;
