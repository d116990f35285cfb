pub mod navigator;
pub mod routes;

pub use navigator::{NavigationOutcome, Navigator, RedirectReason};
pub use routes::{home_screen_for, login_screen_for, normalize_path, RouteEntry, RouteTable, Screen};
