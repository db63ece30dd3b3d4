//! Headless client for Hangspace
//!
//! A thin shell over [`hangspace_app::Driver`] that reads commands and
//! messages from stdin and logs the screen. All orchestration logic lives in
//! the generic [`hangspace_app::Runtime`].

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod driver;
pub mod input;
pub mod render;
pub mod system_env;

pub use driver::{CliDriver, CliError};
pub use hangspace_app::{App, AppConfig, Runtime};
pub use render::Screen;
pub use system_env::SystemEnv;
