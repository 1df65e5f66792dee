//! NETCONF RPC messages and replies.

pub mod message;

mod hello;
mod reply;

pub use hello::PeerHello;
pub use message::{BASE_1_0, BASE_1_1, Datastore, DefaultOperation, Rpc};
pub use reply::{
    CommitReply, EditConfigReply, GetConfigReply, GetReply, RpcError, RpcErrors, RpcReply,
};
