pub mod rpc_message;
pub mod status_message;
