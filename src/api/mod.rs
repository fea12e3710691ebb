pub mod chat;
pub mod chat_stream;
pub mod health;
