use thiserror::Error;

/// 好友关系校验所需的账号边集合视图
#[derive(Debug, Clone)]
pub struct SocialEdges {
    pub user_id: String,
    pub friend_ids: Vec<String>,
    pub blocked_ids: Vec<String>,
}

impl SocialEdges {
    pub fn is_friend(&self, other: &str) -> bool {
        self.friend_ids.iter().any(|id| id == other)
    }

    pub fn has_blocked(&self, other: &str) -> bool {
        self.blocked_ids.iter().any(|id| id == other)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FriendshipError {
    #[error("operation cannot target yourself")]
    SelfReferential,
    #[error("a block exists between these users")]
    BlockRelationship,
    #[error("users are already friends")]
    AlreadyFriends,
    #[error("a friend request already exists between these users")]
    DuplicateRequest,
    #[error("friend request already accepted")]
    AlreadyAccepted,
    #[error("only the recipient may accept this request")]
    NotRecipient,
    #[error("user is already blocked")]
    AlreadyBlocked,
    #[error("user is not blocked")]
    NotBlocked,
}

fn blocked_either_way(a: &SocialEdges, b: &SocialEdges) -> bool {
    a.has_blocked(&b.user_id) || b.has_blocked(&a.user_id)
}

/// 发送好友请求的前置校验。`request_exists` 表示任意方向、任意状态下
/// 是否已有这对用户的请求记录。
pub fn ensure_can_send(
    sender: &SocialEdges,
    recipient: &SocialEdges,
    request_exists: bool,
) -> Result<(), FriendshipError> {
    if sender.user_id == recipient.user_id {
        return Err(FriendshipError::SelfReferential);
    }
    if blocked_either_way(sender, recipient) {
        return Err(FriendshipError::BlockRelationship);
    }
    if recipient.is_friend(&sender.user_id) {
        return Err(FriendshipError::AlreadyFriends);
    }
    if request_exists {
        return Err(FriendshipError::DuplicateRequest);
    }
    Ok(())
}

/// 接受好友请求的前置校验。拉黑可能晚于请求创建，所以这里重新检查。
pub fn ensure_can_accept(
    recipient_id: &str,
    actor_id: &str,
    already_accepted: bool,
    sender: &SocialEdges,
    recipient: &SocialEdges,
) -> Result<(), FriendshipError> {
    if actor_id != recipient_id {
        return Err(FriendshipError::NotRecipient);
    }
    if already_accepted {
        return Err(FriendshipError::AlreadyAccepted);
    }
    if blocked_either_way(sender, recipient) {
        return Err(FriendshipError::BlockRelationship);
    }
    Ok(())
}

pub fn ensure_can_block(actor: &SocialEdges, target_id: &str) -> Result<(), FriendshipError> {
    if actor.user_id == target_id {
        return Err(FriendshipError::SelfReferential);
    }
    if actor.has_blocked(target_id) {
        return Err(FriendshipError::AlreadyBlocked);
    }
    Ok(())
}

pub fn ensure_can_unblock(actor: &SocialEdges, target_id: &str) -> Result<(), FriendshipError> {
    if !actor.has_blocked(target_id) {
        return Err(FriendshipError::NotBlocked);
    }
    Ok(())
}

/// 拉黑的边变更：目标进入拉黑名单，双向好友关系同时拆除。
/// 调用方把两侧结果原样持久化。
pub fn apply_block(actor: &mut SocialEdges, target: &mut SocialEdges) {
    actor.blocked_ids.push(target.user_id.clone());
    actor.friend_ids.retain(|id| id != &target.user_id);
    target.friend_ids.retain(|id| id != &actor.user_id);
}

/// 解除拉黑只移除拉黑边，不恢复好友关系
pub fn apply_unblock(actor: &mut SocialEdges, target_id: &str) {
    actor.blocked_ids.retain(|id| id != target_id);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edges(id: &str) -> SocialEdges {
        SocialEdges {
            user_id: id.to_string(),
            friend_ids: vec![],
            blocked_ids: vec![],
        }
    }

    #[test]
    fn send_to_self_is_rejected() {
        let a = edges("a");
        assert_eq!(
            ensure_can_send(&a, &a.clone(), false),
            Err(FriendshipError::SelfReferential)
        );
    }

    #[test]
    fn send_is_rejected_when_either_side_blocks() {
        let mut a = edges("a");
        let b = edges("b");
        a.blocked_ids.push("b".into());
        assert_eq!(
            ensure_can_send(&a, &b, false),
            Err(FriendshipError::BlockRelationship)
        );

        // 反方向拉黑同样拒绝
        let a = edges("a");
        let mut b = edges("b");
        b.blocked_ids.push("a".into());
        assert_eq!(
            ensure_can_send(&a, &b, false),
            Err(FriendshipError::BlockRelationship)
        );
    }

    #[test]
    fn send_is_rejected_when_already_friends() {
        let a = edges("a");
        let mut b = edges("b");
        b.friend_ids.push("a".into());
        assert_eq!(
            ensure_can_send(&a, &b, false),
            Err(FriendshipError::AlreadyFriends)
        );
    }

    #[test]
    fn duplicate_request_is_rejected_regardless_of_direction() {
        // send(A,B) 之后紧接着 send(B,A)：存在性检查覆盖两个方向，
        // 第二次调用必须以 DuplicateRequest 失败
        let a = edges("a");
        let b = edges("b");
        assert_eq!(ensure_can_send(&a, &b, false), Ok(()));
        assert_eq!(
            ensure_can_send(&b, &a, true),
            Err(FriendshipError::DuplicateRequest)
        );
    }

    #[test]
    fn accept_by_third_party_is_rejected() {
        let a = edges("a");
        let b = edges("b");
        assert_eq!(
            ensure_can_accept("b", "c", false, &a, &b),
            Err(FriendshipError::NotRecipient)
        );
        // 发送者自己也不能接受
        assert_eq!(
            ensure_can_accept("b", "a", false, &a, &b),
            Err(FriendshipError::NotRecipient)
        );
    }

    #[test]
    fn accept_rejected_when_block_postdates_request() {
        let mut a = edges("a");
        let b = edges("b");
        a.blocked_ids.push("b".into());
        assert_eq!(
            ensure_can_accept("b", "b", false, &a, &b),
            Err(FriendshipError::BlockRelationship)
        );
    }

    #[test]
    fn accept_twice_is_rejected() {
        // 请求只有 pending/accepted 两个状态，没有 reject/cancel 路径
        let a = edges("a");
        let b = edges("b");
        assert_eq!(ensure_can_accept("b", "b", false, &a, &b), Ok(()));
        assert_eq!(
            ensure_can_accept("b", "b", true, &a, &b),
            Err(FriendshipError::AlreadyAccepted)
        );
    }

    #[test]
    fn block_precondition_checks() {
        let mut a = edges("a");
        assert_eq!(
            ensure_can_block(&a, "a"),
            Err(FriendshipError::SelfReferential)
        );
        assert_eq!(ensure_can_block(&a, "b"), Ok(()));
        a.blocked_ids.push("b".into());
        assert_eq!(
            ensure_can_block(&a, "b"),
            Err(FriendshipError::AlreadyBlocked)
        );
    }

    #[test]
    fn block_severs_friendship_in_both_directions() {
        let mut a = edges("a");
        let mut b = edges("b");
        a.friend_ids.push("b".into());
        b.friend_ids.push("a".into());

        ensure_can_block(&a, "b").unwrap();
        apply_block(&mut a, &mut b);

        assert!(a.has_blocked("b"));
        assert!(!a.is_friend("b"));
        assert!(!b.is_friend("a"));
    }

    #[test]
    fn unblock_does_not_restore_friendship() {
        let mut a = edges("a");
        let mut b = edges("b");
        a.friend_ids.push("b".into());
        b.friend_ids.push("a".into());
        apply_block(&mut a, &mut b);

        apply_unblock(&mut a, "b");

        assert!(!a.has_blocked("b"));
        assert!(!a.is_friend("b"));
        assert!(!b.is_friend("a"));
    }

    #[test]
    fn unblock_requires_existing_block() {
        let mut a = edges("a");
        assert_eq!(
            ensure_can_unblock(&a, "b"),
            Err(FriendshipError::NotBlocked)
        );
        a.blocked_ids.push("b".into());
        assert_eq!(ensure_can_unblock(&a, "b"), Ok(()));
    }
}
