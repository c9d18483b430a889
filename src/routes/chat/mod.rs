mod handler;

pub use handler::chat_token;
