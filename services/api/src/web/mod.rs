pub mod chat;
pub mod dialog;
pub mod protocol;
pub mod rest;
pub mod state;

// Re-export the REST handlers to make them easily accessible
// to the binary that will build the web server router.
pub use rest::{chat_message_handler, user_export_handler, user_statistics_handler, ApiDoc};
