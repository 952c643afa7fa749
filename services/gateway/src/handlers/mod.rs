pub mod health;
pub mod measurements;
pub mod stream;
pub mod ws;
