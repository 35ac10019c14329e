pub mod conflict;

pub use conflict::{is_port_open, PortConflict, ProcessInfo};
