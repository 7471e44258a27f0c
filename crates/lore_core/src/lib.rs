pub mod batch;
pub mod chunking;
pub mod config;
pub mod corpus;
pub mod db;
pub mod domain;
pub mod error;
pub mod select;
pub mod validate;
