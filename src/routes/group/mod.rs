mod handler;
mod model;

pub use handler::{
    create_group, deactivate_group, find_by_id, get_group_members, join_group, leave_group,
    my_groups, remove_group_member, search_groups, set_member_role, update_group,
};
pub use model::{Group, GroupInfo};
