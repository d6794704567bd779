//! Client half of parley: the synchronizer that mirrors server state from
//! gateway events, the typing debouncer, and thin REST and WebSocket
//! clients.

pub mod api;
pub mod error;
pub mod gateway;
pub mod sync;
pub mod typing;

pub use api::ApiClient;
pub use error::ClientError;
pub use gateway::GatewayClient;
pub use sync::ChatSync;
pub use typing::{TypingDebouncer, TypingSignal};
