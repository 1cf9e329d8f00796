//! HTTP trigger surface for the permission synchronization engine.

pub mod app;
