pub mod chatroom;
pub mod dispatch;
pub mod plan;
pub mod session;
pub mod verdict;
