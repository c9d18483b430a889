use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::role::{Capability, GroupRole};

/// 群组成员名单中的一条记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupMember {
    pub user_id: String,
    pub role: GroupRole,
    pub joined_at: DateTime<Utc>,
}

/// 加入被拒的原因，区分重复加入与满员
#[derive(Debug, PartialEq, Eq)]
pub enum JoinDenial {
    AlreadyMember,
    Full,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MembershipError {
    #[error("{0}")]
    PermissionDenied(&'static str),
    #[error("member not found in roster")]
    NotFound,
    #[error("user is not a member")]
    NotMember,
    #[error("{0}")]
    InvariantViolation(&'static str),
}

/// 群组成员名单。所有操作都在内存中进行，调用方负责持久化。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Roster(pub Vec<GroupMember>);

impl Roster {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &GroupMember> {
        self.0.iter()
    }

    pub fn is_member(&self, user_id: &str) -> bool {
        self.0.iter().any(|m| m.user_id == user_id)
    }

    pub fn role_of(&self, user_id: &str) -> Option<GroupRole> {
        self.0.iter().find(|m| m.user_id == user_id).map(|m| m.role)
    }

    /// 未满且不是成员时才允许加入。纯谓词，无副作用。
    pub fn can_join(&self, user_id: &str, max_members: i32) -> bool {
        self.join_denial(user_id, max_members).is_none()
    }

    /// 不能加入时给出具体原因，重复加入优先于满员
    pub fn join_denial(&self, user_id: &str, max_members: i32) -> Option<JoinDenial> {
        if self.is_member(user_id) {
            Some(JoinDenial::AlreadyMember)
        } else if self.0.len() as i32 >= max_members {
            Some(JoinDenial::Full)
        } else {
            None
        }
    }

    /// 加入成功返回true；已是成员或已满时不做任何修改，返回false。
    /// 创建者的初始admin记录也走这里（空名单必然通过容量检查）。
    pub fn add_member(&mut self, user_id: &str, role: GroupRole, max_members: i32) -> bool {
        if !self.can_join(user_id, max_members) {
            return false;
        }
        self.0.push(GroupMember {
            user_id: user_id.to_string(),
            role,
            joined_at: Utc::now(),
        });
        true
    }

    /// 无条件移除，不做权限检查。调用方必须先行校验（创建者保护等）。
    pub fn remove_member(&mut self, user_id: &str) {
        self.0.retain(|m| m.user_id != user_id);
    }

    /// 修改成员角色。失败时名单保持不变。
    pub fn change_role(
        &mut self,
        creator_id: &str,
        actor_id: &str,
        target_id: &str,
        new_role: GroupRole,
    ) -> Result<(), MembershipError> {
        self.authorize_member_action(creator_id, actor_id, target_id)?;

        if new_role == GroupRole::Admin && actor_id != creator_id {
            return Err(MembershipError::PermissionDenied(
                "only the creator may promote members to admin",
            ));
        }

        let member = self
            .0
            .iter_mut()
            .find(|m| m.user_id == target_id)
            .ok_or(MembershipError::NotFound)?;
        member.role = new_role;
        Ok(())
    }

    /// 带权限检查的移除。
    pub fn remove_member_authorized(
        &mut self,
        creator_id: &str,
        actor_id: &str,
        target_id: &str,
    ) -> Result<(), MembershipError> {
        self.authorize_member_action(creator_id, actor_id, target_id)?;
        self.remove_member(target_id);
        Ok(())
    }

    /// 主动退出。创建者不能退出，只能解散群组。
    pub fn leave(&mut self, creator_id: &str, user_id: &str) -> Result<(), MembershipError> {
        if user_id == creator_id {
            return Err(MembershipError::InvariantViolation(
                "the creator cannot leave the group; deactivate it instead",
            ));
        }
        if !self.is_member(user_id) {
            return Err(MembershipError::NotMember);
        }
        self.remove_member(user_id);
        Ok(())
    }

    // changeRole 和 removeMemberAuthorized 共用的权限门：
    // 操作者必须具备成员管理能力；目标必须在名单中；创建者不可被触碰；
    // 目标是admin时只有创建者可以操作。
    fn authorize_member_action(
        &self,
        creator_id: &str,
        actor_id: &str,
        target_id: &str,
    ) -> Result<(), MembershipError> {
        let actor_role = self
            .role_of(actor_id)
            .ok_or(MembershipError::PermissionDenied("actor is not a member"))?;
        if !actor_role.can(Capability::ManageMembers) {
            return Err(MembershipError::PermissionDenied(
                "actor may not manage members",
            ));
        }

        let target_role = self.role_of(target_id).ok_or(MembershipError::NotFound)?;

        if target_id == creator_id {
            return Err(MembershipError::InvariantViolation(
                "the creator's membership is immutable",
            ));
        }

        if target_role == GroupRole::Admin && actor_id != creator_id {
            return Err(MembershipError::PermissionDenied(
                "only the creator may manage an admin",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 建一个带创建者的名单，相当于建群时的初始状态
    fn roster_with_creator(creator: &str, max_members: i32) -> Roster {
        let mut roster = Roster::new();
        assert!(roster.add_member(creator, GroupRole::Admin, max_members));
        roster
    }

    #[test]
    fn creator_is_admin_from_creation() {
        let roster = roster_with_creator("u1", 10);
        assert!(roster.is_member("u1"));
        assert_eq!(roster.role_of("u1"), Some(GroupRole::Admin));
    }

    #[test]
    fn capacity_is_enforced_per_call() {
        let mut roster = roster_with_creator("u1", 2);
        assert!(roster.add_member("u2", GroupRole::Member, 2));
        assert_eq!(roster.len(), 2);

        // 已满，拒绝且名单不变
        assert!(!roster.add_member("u3", GroupRole::Member, 2));
        assert_eq!(roster.len(), 2);
        assert!(!roster.is_member("u3"));
    }

    #[test]
    fn duplicate_join_is_rejected() {
        let mut roster = roster_with_creator("u1", 10);
        assert!(roster.add_member("u2", GroupRole::Member, 10));
        assert!(!roster.add_member("u2", GroupRole::Member, 10));
        assert_eq!(roster.len(), 2);
    }

    #[test]
    fn join_denial_distinguishes_duplicate_from_full() {
        let mut roster = roster_with_creator("u1", 2);
        roster.add_member("u2", GroupRole::Member, 2);

        assert_eq!(roster.join_denial("u2", 2), Some(JoinDenial::AlreadyMember));
        assert_eq!(roster.join_denial("u3", 2), Some(JoinDenial::Full));
        assert_eq!(roster.join_denial("u3", 3), None);
    }

    #[test]
    fn leave_applied_to_current_roster_keeps_other_members() {
        // leave 只能作用于最新名单：在 u3 退出前 u2 加入，
        // 退出后 u2 的成员资格必须原样保留
        let mut roster = roster_with_creator("u1", 10);
        roster.add_member("u3", GroupRole::Member, 10);
        roster.add_member("u2", GroupRole::Member, 10);

        roster.leave("u1", "u3").unwrap();
        assert!(roster.is_member("u2"));
        assert!(!roster.is_member("u3"));
        assert_eq!(roster.len(), 2);
    }

    #[test]
    fn membership_tracks_add_and_remove() {
        let mut roster = roster_with_creator("u1", 10);
        assert!(!roster.is_member("u2"));
        roster.add_member("u2", GroupRole::Member, 10);
        assert!(roster.is_member("u2"));
        roster.remove_member("u2");
        assert!(!roster.is_member("u2"));
    }

    #[test]
    fn leave_twice_yields_not_member() {
        let mut roster = roster_with_creator("u1", 10);
        roster.add_member("u2", GroupRole::Member, 10);

        assert_eq!(roster.leave("u1", "u2"), Ok(()));
        assert_eq!(roster.leave("u1", "u2"), Err(MembershipError::NotMember));
    }

    #[test]
    fn creator_cannot_leave() {
        let mut roster = roster_with_creator("u1", 10);
        let err = roster.leave("u1", "u1").unwrap_err();
        assert!(matches!(err, MembershipError::InvariantViolation(_)));
        assert!(roster.is_member("u1"));
    }

    #[test]
    fn change_role_rejects_creator_target_for_every_role() {
        let mut roster = roster_with_creator("u1", 10);

        // 包括重设同一角色也要拒绝
        for role in [GroupRole::Member, GroupRole::Moderator, GroupRole::Admin] {
            let err = roster.change_role("u1", "u1", "u1", role).unwrap_err();
            assert!(matches!(err, MembershipError::InvariantViolation(_)));
        }
        assert_eq!(roster.role_of("u1"), Some(GroupRole::Admin));
    }

    #[test]
    fn creator_cannot_be_removed() {
        let mut roster = roster_with_creator("u1", 10);
        roster.add_member("u2", GroupRole::Member, 10);
        roster.change_role("u1", "u1", "u2", GroupRole::Admin).unwrap();

        // 即使操作者是另一个admin，创建者也不可移除
        let err = roster.remove_member_authorized("u1", "u2", "u1").unwrap_err();
        assert!(matches!(err, MembershipError::InvariantViolation(_)));
        assert!(roster.is_member("u1"));
    }

    #[test]
    fn non_member_actor_fails_at_the_gate() {
        let mut roster = roster_with_creator("u1", 10);
        roster.add_member("u2", GroupRole::Member, 10);
        roster.change_role("u1", "u1", "u2", GroupRole::Admin).unwrap();

        // u3 根本不是成员：在能力门处失败，而不是"目标是admin"处
        let err = roster
            .change_role("u1", "u3", "u2", GroupRole::Member)
            .unwrap_err();
        assert_eq!(
            err,
            MembershipError::PermissionDenied("actor is not a member")
        );
    }

    #[test]
    fn plain_member_cannot_manage() {
        let mut roster = roster_with_creator("u1", 10);
        roster.add_member("u2", GroupRole::Member, 10);
        roster.add_member("u3", GroupRole::Member, 10);

        let err = roster
            .change_role("u1", "u3", "u2", GroupRole::Moderator)
            .unwrap_err();
        assert_eq!(
            err,
            MembershipError::PermissionDenied("actor may not manage members")
        );
    }

    #[test]
    fn only_creator_may_touch_admins() {
        let mut roster = roster_with_creator("u1", 10);
        roster.add_member("u2", GroupRole::Member, 10);
        roster.add_member("u3", GroupRole::Member, 10);
        roster.change_role("u1", "u1", "u2", GroupRole::Admin).unwrap();
        roster.change_role("u1", "u1", "u3", GroupRole::Admin).unwrap();

        // u3 是admin但不是创建者，不能降级另一个admin
        let err = roster
            .change_role("u1", "u3", "u2", GroupRole::Member)
            .unwrap_err();
        assert_eq!(
            err,
            MembershipError::PermissionDenied("only the creator may manage an admin")
        );

        // 创建者可以
        roster.change_role("u1", "u1", "u2", GroupRole::Member).unwrap();
        assert_eq!(roster.role_of("u2"), Some(GroupRole::Member));
    }

    #[test]
    fn only_creator_may_promote_to_admin() {
        let mut roster = roster_with_creator("u1", 10);
        roster.add_member("u2", GroupRole::Member, 10);
        roster.add_member("u3", GroupRole::Member, 10);
        roster.change_role("u1", "u1", "u2", GroupRole::Admin).unwrap();

        let err = roster
            .change_role("u1", "u2", "u3", GroupRole::Admin)
            .unwrap_err();
        assert!(matches!(err, MembershipError::PermissionDenied(_)));
        assert_eq!(roster.role_of("u3"), Some(GroupRole::Member));
    }

    #[test]
    fn moderator_manages_plain_members() {
        let mut roster = roster_with_creator("u1", 10);
        roster.add_member("u2", GroupRole::Member, 10);
        roster.add_member("u3", GroupRole::Member, 10);
        roster.change_role("u1", "u1", "u2", GroupRole::Moderator).unwrap();

        roster.remove_member_authorized("u1", "u2", "u3").unwrap();
        assert!(!roster.is_member("u3"));
    }

    #[test]
    fn change_role_to_missing_target_is_not_found() {
        let mut roster = roster_with_creator("u1", 10);
        let err = roster
            .change_role("u1", "u1", "ghost", GroupRole::Moderator)
            .unwrap_err();
        assert_eq!(err, MembershipError::NotFound);
    }

    #[test]
    fn creator_survives_arbitrary_member_churn() {
        let mut roster = roster_with_creator("u1", 50);
        for i in 0..20 {
            roster.add_member(&format!("m{}", i), GroupRole::Member, 50);
        }
        for i in 0..10 {
            roster.leave("u1", &format!("m{}", i)).unwrap();
        }
        roster.change_role("u1", "u1", "m15", GroupRole::Admin).unwrap();
        roster.remove_member_authorized("u1", "m15", "m16").unwrap();

        assert_eq!(roster.role_of("u1"), Some(GroupRole::Admin));
        assert!(roster.len() as i32 <= 50);
    }
}
