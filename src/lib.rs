//! catalog-cms-sync - Mirrors e-commerce catalog entities into headless CMS platforms
//!
//! Catalog changes become per-kind sync jobs that are pushed to Contentful,
//! Sanity, Storyblok, Strapi and Payload through rate-limited adapters. A bulk
//! reconciler re-syncs whole entity kinds with retry and backoff.

pub mod adapters;
pub mod catalog;
pub mod config;
pub mod error;
pub mod events;
pub mod models;
pub mod otel;
pub mod processor;
pub mod queue;
pub mod reconciler;
pub mod server;
pub mod sync;
