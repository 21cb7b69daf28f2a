//! Price Feed Adapters
//!
//! Everything needed to talk to the upstream price feed:
//!
//! - **Messages**: Wire types for subscribe requests and price updates
//! - **Codec**: JSON decoding with field validation
//! - **Reconnect**: Capped exponential backoff
//! - **WebSocket**: `tokio-tungstenite` transport
//! - **Client**: Connection manager tying it all together

pub mod client;
pub mod codec;
pub mod messages;
pub mod reconnect;
pub mod websocket;

pub use client::{ClientConfig, ClientError, PriceFeedClient};
pub use codec::{CodecError, JsonCodec};
pub use messages::{PriceUpdateMessage, SubscribeRequest};
pub use reconnect::{ReconnectConfig, ReconnectPolicy};
pub use websocket::{WebSocketConnection, WebSocketConnector};
