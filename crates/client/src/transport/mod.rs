pub mod memory;

// Re-export the Transport trait from protocol
pub use tickshift_protocol::Transport;
