mod handler;
mod model;

pub use handler::{accept_request, incoming_requests, outgoing_requests, send_request};
pub use model::FriendRequest;
