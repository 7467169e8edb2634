// Outbound callbacks: HMAC-signed webhook fan-out with retries and a
// per-attempt delivery log.

pub mod dispatcher;
pub mod repository;

pub use dispatcher::{CallbackDispatcher, OutboundCallback};
pub use repository::{CallbackDelivery, CallbackDeliveryRepository};
