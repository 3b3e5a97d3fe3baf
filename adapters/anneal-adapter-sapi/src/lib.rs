//! SAPI transport for the anneal client runtime
//!
//! This crate connects [`anneal_client`] to annealing services that speak
//! the SAPI REST protocol.
//!
//! # Endpoints
//!
//! | Operation | Request |
//! |-----------|---------|
//! | Submit batch | `POST problems/` with a JSON array of problems |
//! | Poll status | `GET problems/?id=a,b,c` |
//! | Fetch answer | `GET problems/{id}/` |
//! | Cancel | `DELETE problems/` with a JSON array of ids |
//! | List solvers | `GET solvers/remote/` |
//! | Get solver | `GET solvers/remote/{id}/` |
//!
//! # Authentication
//!
//! The token from the [`ConnectionConfig`](anneal_client::ConnectionConfig)
//! is sent in the `X-Auth-Token` header of every request. The CLI reads it
//! from `ANNEAL_API_TOKEN`:
//!
//! ```bash
//! export ANNEAL_API_ENDPOINT="https://cloud.example.com/sapi/v2"
//! export ANNEAL_API_TOKEN="your-token"
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use anneal_adapter_sapi::SapiTransport;
//! use anneal_client::{Client, ClientConfig, ConnectionConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let connection = ConnectionConfig::new("https://cloud.example.com/sapi/v2")
//!         .with_token(std::env::var("ANNEAL_API_TOKEN")?);
//!     let client = Client::new(Arc::new(SapiTransport::new(&connection)?), ClientConfig::default())?;
//!
//!     for solver in client.get_solvers(false).await? {
//!         println!("{} ({})", solver.id, solver.status);
//!     }
//!     client.close().await;
//!     Ok(())
//! }
//! ```

mod api;
mod error;
mod transport;

pub use error::{SapiError, SapiResult};
pub use transport::SapiTransport;
