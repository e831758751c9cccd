//! Blocking client for the Tado thermostat REST API.
//!
//! ```no_run
//! use tado_client::models::tado::Termination;
//!
//! let home = tado_client::login("user@example.com", "password", "client-secret")?;
//! for (id, zone) in home.zones()? {
//!     println!("{} {}: {:.1}", id, zone.name(), zone.inside_temperature()?);
//! }
//! if let Some(zone) = home.zones()?.values().next() {
//!     zone.set_temperature(21.0, Termination::Auto)?;
//! }
//! # Ok::<(), tado_client::TadoError>(())
//! ```

pub mod models {
    pub mod tado;
}

pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod home;
pub mod utils;
pub mod zone;

pub use crate::client::{Method, Session};
pub use crate::config::{ClientConfig, Config};
pub use crate::error::TadoError;
pub use crate::home::Home;
pub use crate::zone::Zone;

/// Log in against the production endpoints and bind to the account's first home.
pub fn login(username: &str, password: &str, client_secret: &str) -> error::Result<Home> {
    login_with(ClientConfig::default(), username, password, client_secret)
}

pub fn login_with(config: ClientConfig, username: &str, password: &str, client_secret: &str) -> error::Result<Home> {
    Session::login_with(config, username, password, client_secret).map(Home::new)
}
