//! Inbound packet handlers and the periodic tick.

mod ack;
mod exchange;
mod hello;
mod tick;
mod update;
