//! Plugin definitions: the version-tagged adapter and classpath discovery.

pub mod adapter;
pub mod discovery;

pub use adapter::{ApiVersion, PluginAdapter, PluginCapabilities, PluginContract};
pub use discovery::PluginDefinitionDiscovery;
