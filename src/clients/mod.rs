//! Clients for the external services the watcher talks to.

pub mod fcm;
pub mod github;
pub mod webdriver;

pub use fcm::{FcmClient, ServiceAccount};
pub use github::{ContentFile, GitHubClient, Issue};
pub use webdriver::{WebDriverLauncher, WebDriverSession};
