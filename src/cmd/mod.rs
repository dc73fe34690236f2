pub mod backends;
pub mod login;
pub mod progress;
pub mod run;
