use serde::{Deserialize, Serialize};

/// 群组成员角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupRole {
    Member,
    Moderator,
    Admin,
}

impl Default for GroupRole {
    fn default() -> Self {
        Self::Member
    }
}

/// 角色能力。ManageAdmins 不绑定在角色上，只有创建者持有。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    ManageMembers,
    ManageSettings,
    ManageAdmins,
}

impl GroupRole {
    pub fn capabilities(&self) -> &'static [Capability] {
        match self {
            GroupRole::Member => &[],
            GroupRole::Moderator => &[Capability::ManageMembers],
            GroupRole::Admin => &[Capability::ManageMembers, Capability::ManageSettings],
        }
    }

    pub fn can(&self, cap: Capability) -> bool {
        self.capabilities().contains(&cap)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GroupRole::Member => "member",
            GroupRole::Moderator => "moderator",
            GroupRole::Admin => "admin",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "member" => Some(GroupRole::Member),
            "moderator" => Some(GroupRole::Moderator),
            "admin" => Some(GroupRole::Admin),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn member_has_no_capabilities() {
        assert!(!GroupRole::Member.can(Capability::ManageMembers));
        assert!(!GroupRole::Member.can(Capability::ManageSettings));
        assert!(!GroupRole::Member.can(Capability::ManageAdmins));
    }

    #[test]
    fn moderator_manages_members_only() {
        assert!(GroupRole::Moderator.can(Capability::ManageMembers));
        assert!(!GroupRole::Moderator.can(Capability::ManageSettings));
        assert!(!GroupRole::Moderator.can(Capability::ManageAdmins));
    }

    #[test]
    fn admin_manages_members_and_settings_but_not_admins() {
        assert!(GroupRole::Admin.can(Capability::ManageMembers));
        assert!(GroupRole::Admin.can(Capability::ManageSettings));
        // 管理其他管理员是创建者的专属权限，不属于任何角色
        assert!(!GroupRole::Admin.can(Capability::ManageAdmins));
    }

    #[test]
    fn role_parse_roundtrip() {
        for role in [GroupRole::Member, GroupRole::Moderator, GroupRole::Admin] {
            assert_eq!(GroupRole::parse(role.as_str()), Some(role));
        }
        assert_eq!(GroupRole::parse("owner"), None);
    }
}
