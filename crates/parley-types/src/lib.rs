//! Shared wire types for the Parley server and its clients.
//!
//! `models` holds the projected (response-shaped) views of stored records,
//! `api` the REST request/response bodies and `events` the gateway protocol.

pub mod api;
pub mod events;
pub mod models;
