// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Component registry with topological construction
//!
//! Components are registered with a name, the names they depend on and a
//! constructor. [`ComponentRegistry::resolve`] orders them with Kahn's
//! algorithm and builds each one exactly once, handing constructors the
//! already-built dependencies. Missing dependencies and cycles fail before
//! anything is constructed.

use std::any::Any;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Component '{0}' is already registered")]
    Duplicate(String),

    #[error("Component '{component}' depends on unregistered '{dependency}'")]
    MissingDependency {
        component: String,
        dependency: String,
    },

    #[error("Dependency cycle among components: {}", .0.join(" -> "))]
    Cycle(Vec<String>),

    #[error("Component '{0}' has not been built")]
    NotBuilt(String),

    #[error("Component '{0}' has a different type than requested")]
    TypeMismatch(String),

    #[error("Failed to construct '{component}': {reason}")]
    Construction { component: String, reason: String },
}

type Constructor =
    Box<dyn Fn(&Components) -> Result<Arc<dyn Any + Send + Sync>, RegistryError> + Send + Sync>;

struct Registration {
    name: String,
    dependencies: Vec<String>,
    constructor: Constructor,
}

/// Built components, looked up by name and type.
#[derive(Default, Clone)]
pub struct Components {
    built: HashMap<String, Arc<dyn Any + Send + Sync>>,
}

impl Components {
    pub fn get<T: Clone + Send + Sync + 'static>(&self, name: &str) -> Result<T, RegistryError> {
        let component = self
            .built
            .get(name)
            .ok_or_else(|| RegistryError::NotBuilt(name.to_string()))?;
        component
            .downcast_ref::<T>()
            .cloned()
            .ok_or_else(|| RegistryError::TypeMismatch(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.built.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.built.len()
    }

    pub fn is_empty(&self) -> bool {
        self.built.is_empty()
    }
}

#[derive(Default)]
pub struct ComponentRegistry {
    registrations: Vec<Registration>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a component. Names are unique.
    pub fn register<T, F>(
        &mut self,
        name: &str,
        dependencies: &[&str],
        constructor: F,
    ) -> Result<(), RegistryError>
    where
        T: Clone + Send + Sync + 'static,
        F: Fn(&Components) -> Result<T, RegistryError> + Send + Sync + 'static,
    {
        if self.position(name).is_some() {
            return Err(RegistryError::Duplicate(name.to_string()));
        }
        self.registrations.push(Registration {
            name: name.to_string(),
            dependencies: dependencies.iter().map(|d| d.to_string()).collect(),
            constructor: erase(constructor),
        });
        Ok(())
    }

    /// Register `name`, overriding any earlier registration of it.
    pub fn replace<T, F>(&mut self, name: &str, dependencies: &[&str], constructor: F)
    where
        T: Clone + Send + Sync + 'static,
        F: Fn(&Components) -> Result<T, RegistryError> + Send + Sync + 'static,
    {
        let registration = Registration {
            name: name.to_string(),
            dependencies: dependencies.iter().map(|d| d.to_string()).collect(),
            constructor: erase(constructor),
        };
        match self.position(name) {
            Some(index) => self.registrations[index] = registration,
            None => self.registrations.push(registration),
        }
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.registrations.iter().position(|r| r.name == name)
    }

    /// Construction order. Ties break by registration order so startup is
    /// deterministic.
    pub fn resolution_order(&self) -> Result<Vec<String>, RegistryError> {
        let index: HashMap<&str, usize> = self
            .registrations
            .iter()
            .enumerate()
            .map(|(i, r)| (r.name.as_str(), i))
            .collect();

        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); self.registrations.len()];
        let mut in_degree: Vec<usize> = vec![0; self.registrations.len()];

        for (i, registration) in self.registrations.iter().enumerate() {
            for dependency in &registration.dependencies {
                let Some(&dep) = index.get(dependency.as_str()) else {
                    return Err(RegistryError::MissingDependency {
                        component: registration.name.clone(),
                        dependency: dependency.clone(),
                    });
                };
                dependents[dep].push(i);
                in_degree[i] += 1;
            }
        }

        let mut queue: VecDeque<usize> = (0..self.registrations.len())
            .filter(|i| in_degree[*i] == 0)
            .collect();
        let mut order = Vec::with_capacity(self.registrations.len());

        while let Some(i) = queue.pop_front() {
            order.push(i);
            for &dependent in &dependents[i] {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    queue.push_back(dependent);
                }
            }
        }

        if order.len() != self.registrations.len() {
            let remaining = (0..self.registrations.len())
                .filter(|i| in_degree[*i] > 0)
                .map(|i| self.registrations[i].name.clone())
                .collect();
            return Err(RegistryError::Cycle(remaining));
        }

        Ok(order
            .into_iter()
            .map(|i| self.registrations[i].name.clone())
            .collect())
    }

    /// Build every component once, dependencies first.
    pub fn resolve(&self) -> Result<Components, RegistryError> {
        let order = self.resolution_order()?;
        let mut components = Components::default();

        for name in order {
            let Some(index) = self.position(&name) else {
                return Err(RegistryError::NotBuilt(name));
            };
            let built = (self.registrations[index].constructor)(&components)?;
            tracing::debug!(component = %name, "Constructed component");
            components.built.insert(name, built);
        }

        Ok(components)
    }
}

fn erase<T, F>(constructor: F) -> Constructor
where
    T: Clone + Send + Sync + 'static,
    F: Fn(&Components) -> Result<T, RegistryError> + Send + Sync + 'static,
{
    Box::new(move |components| {
        let value = constructor(components)?;
        Ok(Arc::new(value) as Arc<dyn Any + Send + Sync>)
    })
}
