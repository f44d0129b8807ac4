pub mod health;
pub mod provider;
pub mod sse;
pub mod timer;
pub mod ws;
