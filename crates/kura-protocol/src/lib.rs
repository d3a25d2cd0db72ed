pub mod channel;
pub mod content;
pub mod jsonrpc;
pub mod message;

pub use channel::{pair, CatalogEndpoint, ChannelError, Endpoint, IngestEndpoint};
pub use content::{Action, ActionSpec, Content, ContentKind, ContentSource, Platform, Tombstone};
pub use jsonrpc::{EnvelopeError, JsonRpcError, JsonRpcRequest, JsonRpcResponse};
pub use message::{CatalogUpdate, IngestNotice};
