//! Browser automation module
//!
//! The observation builder and action executor that ground the agent in a
//! live page, the capability traits they depend on, and the chromiumoxide
//! adapter that backs them in production.

pub mod cdp;
pub mod driver;
pub mod format;
pub mod humanize;
pub mod observe;
pub mod session;

pub use driver::{BrowserDriver, ContextDriver, ElementState, LoadState, PageDriver};
pub use humanize::Humanize;
pub use observe::{Observation, PageElement, Tab};
pub use session::BrowserSession;
