//! Service implementations: in-process action tables and remote HTTP services.

pub mod local;
pub mod remote;

pub use local::{ActionCall, ActionHandler, ActionTable, HandlerResult, LocalService};
pub use remote::RemoteService;
