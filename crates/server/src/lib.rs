pub mod client;
pub mod dispatch;
pub mod error;
pub mod http;
pub mod ledger;
pub mod router;
pub mod ws;

pub use client::{WsClient, WsResult};
pub use dispatch::{Dispatcher, OperationOutcome};
pub use error::ServerError;
pub use http::{HttpState, http_router, run_http};
pub use ledger::{PendingRequest, RequestLedger};
pub use router::{ClientRequest, FrameRouter, RouterViolation};
pub use ws::{Server, ShutdownHandle};
