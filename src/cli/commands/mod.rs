pub mod checkpoints;
pub mod config;
pub mod init;
pub mod resume;
pub mod run;
