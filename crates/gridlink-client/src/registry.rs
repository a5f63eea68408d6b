//! Static registration of service lists.
//!
//! The configured service-list names are resolved against a compile-time
//! table when the client is built, so a misspelled or missing list is a
//! construction error instead of a runtime surprise deep in a call path.

use tracing::info;

use crate::error::{ClientError, Result};

/// A named group of call bindings.
///
/// Binding crates export these as consts; `calls` names the requests the
/// group covers, mostly for diagnostics.
#[derive(Debug, Clone, Copy)]
pub struct ServiceList {
    /// Name used in `ClientConfig::service_lists`.
    pub name: &'static str,
    /// Requests the group issues through the facade.
    pub calls: &'static [&'static str],
}

/// Table of every service list known to a client.
#[derive(Debug, Clone, Copy, Default)]
pub struct ServiceRegistry {
    lists: &'static [ServiceList],
}

impl ServiceRegistry {
    /// Builds a registry over a static table.
    pub fn new(lists: &'static [ServiceList]) -> Self {
        Self { lists }
    }

    /// Looks up one list by name.
    pub fn get(&self, name: &str) -> Option<&'static ServiceList> {
        self.lists.iter().find(|list| list.name == name)
    }

    /// Resolves configured names against the table; an unknown name is a
    /// configuration error.
    pub fn resolve(&self, names: &[String]) -> Result<Vec<&'static ServiceList>> {
        let mut resolved = Vec::with_capacity(names.len());
        for name in names {
            let list = self.get(name).ok_or_else(|| {
                ClientError::config(format!("unknown service list: {}", name))
            })?;
            info!(
                list = list.name,
                calls = list.calls.len(),
                "service list registered"
            );
            resolved.push(list);
        }
        Ok(resolved)
    }

    /// Names of every registered list.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.lists.iter().map(|list| list.name)
    }
}
