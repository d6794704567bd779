//! Realtime delivery: per-chat fan-out of gateway events to connected
//! WebSocket clients. Best effort only; a client that lags or disconnects
//! misses events until its next full fetch.

pub mod connection;
pub mod dispatcher;
