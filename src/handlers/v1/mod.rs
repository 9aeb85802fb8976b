//! Versioned API handlers.

mod chat;
mod configs;
mod sessions;
mod ws;

pub use chat::{chat, stop_chat, stream_chat};
pub use configs::{
    create_config, delete_config, get_config, list_configs, provider_catalog, update_config,
};
pub use sessions::{
    create_session, delete_session, get_messages, get_session, list_sessions, update_session,
};
pub use ws::session_ws;
