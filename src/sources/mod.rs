// src/sources/mod.rs
//! Source adapters. Each owns a provider connector and turns raw records
//! into events; network access goes through the connector/session traits.
pub mod chat;
pub mod code_review;
pub mod mail;

pub use chat::ChatObserver;
pub use code_review::CodeReviewObserver;
pub use mail::MailObserver;
