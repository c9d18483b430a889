pub mod chat;
pub mod common;
pub mod friend;
pub mod group;
pub mod notification;
pub mod user;
