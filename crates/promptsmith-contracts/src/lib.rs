pub mod config;
pub mod document;
pub mod form;
pub mod stores;
