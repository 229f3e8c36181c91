pub mod debug;
pub mod detect;
pub mod restart;
pub mod restarted;
pub mod runs;
pub mod test_connection;
