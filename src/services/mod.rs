// src/services/mod.rs
pub mod inbox_cache;
pub mod inbox_widget;
pub mod notification_api;
pub mod presentation;
pub mod push_listener;
