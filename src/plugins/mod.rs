//! Built-in plugins and the trait that groups capabilities under a namespace.

pub mod lights;
pub mod time;

pub use lights::{Light, LightsPlugin};
pub use time::TimePlugin;

use crate::capabilities::Capability;

/// A bundle of capabilities sharing one namespace.
///
/// Implementors own whatever state their capabilities touch and decide how
/// it is synchronized; the registry only calls the functions.
pub trait KernelPlugin: Send + Sync {
    /// Namespace every capability of this plugin is registered under.
    fn namespace(&self) -> &str;

    /// Build the capabilities this plugin exposes.
    fn capabilities(&self) -> Vec<Capability>;
}
