pub mod layout;
pub mod probes;
