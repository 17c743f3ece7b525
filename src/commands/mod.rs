pub mod facts;
pub mod reboot;
pub mod setup;
pub mod swap;
pub mod tasks;
