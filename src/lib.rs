//! Codex - a small personal blog
//!
//! Admin-authored posts with tags and comments, private messages from
//! guests, and view analytics filled in by a daily batch job.

pub mod api;
pub mod config;
pub mod db;
pub mod jobs;
pub mod models;
pub mod services;
pub mod theme;
pub mod web;
