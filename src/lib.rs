//! Core library for songlist-playlist: PKCE login plus the pasted-list
//! playlist builder.
pub mod api;
pub mod auth;
pub mod builder;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod session;
pub mod storage;
