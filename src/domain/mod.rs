// 纯业务规则，不依赖数据库和HTTP层

pub mod friendship;
pub mod membership;
pub mod role;
