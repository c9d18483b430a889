mod handler;
mod model;

pub use handler::{
    block_user, get_me, list_friends, login, register, unblock_user, update_preferences,
    update_profile,
};
pub use model::{User, UserSummary};
