//! Configuration module for orchestrator
//!
//! Provides YAML configuration loading and parsing for:
//! - Environment variable expansion and file includes
//! - Server configuration (SSL/TLS, security, database, LDAP)
//! - Trust-level profiles

pub mod loader;
pub mod profile;
pub mod server;

pub use loader::{deep_merge, load_yaml_config, load_yaml_file};
pub use profile::{load_profiles, Profile, TrustLevel};
pub use server::{
    DatabaseConfig, LdapConfig, OrchestratorRuntimeConfig, SecurityConfig, SecurityMode,
    ServerConfig, ServerConfigError, SslConfig, SslMode, X509Config,
};
pub use server::ldap::{LdapClient, LdapError};
pub use server::security::{SecurityState, security_middleware};
pub use server::ssl::{setup_ssl_certificates, SslCertPaths, SslError};
