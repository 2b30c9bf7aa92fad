//! The servers file and how a run picks its server from it.
//!
//! A YAML file maps server names to connection details and an expected
//! feature profile; [`resolve_server`] merges the chosen entry with the
//! `--caldav-*` flags.
//!
//! ```
//! use caldav_server_tester::config::{load_servers_file, resolve_server, ServerSelection};
//! use tempfile::TempDir;
//! use std::fs;
//!
//! let dir = TempDir::new().unwrap();
//! let path = dir.path().join("servers.yml");
//! fs::write(&path, "servers:\n  local:\n    url: http://localhost:5232/\n").unwrap();
//!
//! let file = load_servers_file(&path).unwrap();
//! let server = resolve_server(&file, &ServerSelection::default()).unwrap();
//! assert_eq!(server.name, "local");
//! ```

pub mod loader;
pub mod schema;
pub mod server;
pub mod validator;

pub use loader::{
    config_path, default_config_path, load_servers_file, parse_servers, profile_to_features, CONFIG_ENV,
};
pub use schema::{FeatureProfile, FeaturesRef, ServerConfig, ServersFile};
pub use server::{resolve_server, ResolvedServer, ServerSelection};
pub use validator::{validate, validate_servers, ValidationError};
