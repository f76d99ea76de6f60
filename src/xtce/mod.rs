//! The XTCE definition model: an immutable, in-memory description of
//! packet structure built from an XTCE document (or the CSV adapter) and
//! shared read-only by any number of packet streams.

pub mod calibrator;
pub mod container;
pub mod criteria;
pub mod encoding;
pub mod parameter;

mod loader;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use tracing::warn;

use crate::{Error, Result};
use container::{ContainerEntry, SequenceContainer};
use parameter::{Parameter, ParameterType};

/// Conventional name of the container describing the CCSDS primary header,
/// used as the parse root unless overridden.
pub const DEFAULT_ROOT_CONTAINER: &str = "CCSDSPacket";

/// An immutable packet definition.
///
/// Holds every parameter type, parameter, and sequence container by name.
/// Building it validates cross-references and the container inheritance
/// forest; after that it never changes, so it can be shared freely across
/// threads.
#[derive(Debug, Clone)]
pub struct PacketDefinition {
    parameter_types: HashMap<String, Arc<ParameterType>>,
    parameters: HashMap<String, Arc<Parameter>>,
    containers: HashMap<String, SequenceContainer>,
    root_container: String,
    space_system: Option<String>,
}

impl PacketDefinition {
    /// Load a definition from an XTCE document on disk.
    ///
    /// # Errors
    /// [`Error::Definition`] for malformed XML, unresolved references,
    /// circular inheritance, or unsupported elements.
    pub fn from_xtce<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_xtce_str(&text)
    }

    /// Load a definition from XTCE document text.
    pub fn from_xtce_str(text: &str) -> Result<Self> {
        let doc = roxmltree::Document::parse(text)
            .map_err(|e| Error::Definition(format!("malformed XML: {e}")))?;
        loader::load(&doc)
    }

    /// Load a flat definition from a CSV document on disk. See
    /// [`crate::csvdef`].
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Self> {
        crate::csvdef::load(std::fs::File::open(path)?)
    }

    /// Assemble and validate a definition from parsed containers.
    ///
    /// The parameter and parameter-type indexes are collected from the
    /// containers' entry lists. Validates that base containers and
    /// container-ref entries resolve and that inheritance is acyclic, and
    /// back-fills each container's inheritor list.
    pub(crate) fn from_parts(
        containers: Vec<SequenceContainer>,
        space_system: Option<String>,
    ) -> Result<Self> {
        let mut by_name: HashMap<String, SequenceContainer> = HashMap::new();
        for container in containers {
            if by_name.contains_key(&container.name) {
                return Err(Error::Definition(format!(
                    "duplicate sequence container name {}",
                    container.name
                )));
            }
            by_name.insert(container.name.clone(), container);
        }

        // Reverse the base links into inheritor lists.
        let mut inheritors: HashMap<String, Vec<String>> = HashMap::new();
        for container in by_name.values() {
            for entry in &container.entries {
                if let ContainerEntry::Container(name) = entry {
                    if !by_name.contains_key(name) {
                        return Err(Error::Definition(format!(
                            "container {} references unknown container {name}",
                            container.name
                        )));
                    }
                }
            }
            if let Some(base) = &container.base_container {
                if !by_name.contains_key(base) {
                    return Err(Error::Definition(format!(
                        "container {} inherits from unknown container {base}",
                        container.name
                    )));
                }
                inheritors
                    .entry(base.clone())
                    .or_default()
                    .push(container.name.clone());
            }
        }
        for (name, mut names) in inheritors {
            names.sort();
            by_name.get_mut(&name).expect("base exists").inheritors = names;
        }

        // Inheritance chains must terminate.
        for container in by_name.values() {
            let mut seen = vec![container.name.as_str()];
            let mut base = container.base_container.as_deref();
            while let Some(name) = base {
                if seen.contains(&name) {
                    return Err(Error::Definition(format!(
                        "circular container inheritance through {name}"
                    )));
                }
                seen.push(name);
                base = by_name[name].base_container.as_deref();
            }
        }

        for container in by_name.values() {
            if container.is_abstract && container.inheritors.is_empty() {
                warn!(
                    container = %container.name,
                    "abstract container has no inheritors and can never be a match"
                );
            }
        }

        let mut parameter_types = HashMap::new();
        let mut parameters: HashMap<String, Arc<Parameter>> = HashMap::new();
        for container in by_name.values() {
            for entry in &container.entries {
                if let ContainerEntry::Parameter(parameter) = entry {
                    if let Some(existing) = parameters.get(&parameter.name) {
                        if !Arc::ptr_eq(existing, parameter) {
                            return Err(Error::Definition(format!(
                                "parameter name {} refers to two different definitions",
                                parameter.name
                            )));
                        }
                    }
                    parameters.insert(parameter.name.clone(), Arc::clone(parameter));
                    parameter_types.insert(
                        parameter.parameter_type.name.clone(),
                        Arc::clone(&parameter.parameter_type),
                    );
                }
            }
        }

        Ok(PacketDefinition {
            parameter_types,
            parameters,
            containers: by_name,
            root_container: DEFAULT_ROOT_CONTAINER.to_string(),
            space_system,
        })
    }

    /// Name of the default parse root.
    #[must_use]
    pub fn root_container_name(&self) -> &str {
        &self.root_container
    }

    /// Override the default parse root.
    ///
    /// # Errors
    /// [`Error::Definition`] if no container has that name.
    pub fn with_root_container(mut self, name: &str) -> Result<Self> {
        if !self.containers.contains_key(name) {
            return Err(Error::Definition(format!(
                "root container {name} is not defined"
            )));
        }
        self.root_container = name.to_string();
        Ok(self)
    }

    #[must_use]
    pub fn space_system_name(&self) -> Option<&str> {
        self.space_system.as_deref()
    }

    #[must_use]
    pub fn parameter_type(&self, name: &str) -> Option<&Arc<ParameterType>> {
        self.parameter_types.get(name)
    }

    #[must_use]
    pub fn parameter(&self, name: &str) -> Option<&Arc<Parameter>> {
        self.parameters.get(name)
    }

    #[must_use]
    pub fn container(&self, name: &str) -> Option<&SequenceContainer> {
        self.containers.get(name)
    }

    pub fn parameter_types(&self) -> impl Iterator<Item = &Arc<ParameterType>> {
        self.parameter_types.values()
    }

    pub fn parameters(&self) -> impl Iterator<Item = &Arc<Parameter>> {
        self.parameters.values()
    }

    pub fn containers(&self) -> impl Iterator<Item = &SequenceContainer> {
        self.containers.values()
    }
}
