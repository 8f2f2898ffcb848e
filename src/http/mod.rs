//! Usage: HTTP layer (replayable requests, authenticated client, response decoding).

pub mod client;
pub mod request;
pub mod response;
