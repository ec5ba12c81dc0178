//! Wire types shared by the storefront sync core and its connectors.
//!
//! Everything here is plain data: ids, money, the order and cart records exchanged with the REST
//! services, and the push-message schema delivered over the order channels. Decoding a push frame
//! validates it against that schema, so nothing downstream ever sees a partially-formed event.

pub mod cart;
pub mod error;
pub mod id;
pub mod money;
pub mod order;
pub mod push;
pub mod request;

pub use cart::*;
pub use error::*;
pub use id::*;
pub use money::*;
pub use order::*;
pub use push::*;
pub use request::*;

pub use chrono;
