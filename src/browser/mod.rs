//! Chrome integration: launching or attaching to a browser and using a tab as
//! the selection surface and screenshot source.

pub mod config;
pub mod page;
pub mod session;

pub use config::{ConnectionOptions, LaunchOptions};
pub use page::ChromePage;
pub use session::BrowserSession;
