//! Service layer: the server handle, its execution domain, and the bridge
//! that carries calls into it.
//!
//! [`Server`] is the API the hosting application uses. Each run owns a
//! dedicated thread (see [`domain`]) that serves all traffic; other
//! threads reach it only through [`bridge`].

mod bridge;
mod domain;
mod server;

pub use server::{Server, ServerHandle};
