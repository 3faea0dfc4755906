// Copyright (c) The rbxjest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{
    DefaultReporter, JsonReporter, JunitReporter, Reporter, ReporterDispatcher, ReporterOptions,
    SummaryReporter,
};
use crate::errors::UnknownReporterError;
use std::{collections::BTreeMap, fmt};

/// Creates a reporter from the shared reporter options.
pub type ReporterFactory = Box<dyn Fn(&ReporterOptions) -> Box<dyn Reporter>>;

/// Maps stable reporter names to factories.
///
/// [`with_builtins`](Self::with_builtins) registers `default`, `summary`, `json` and `junit`.
/// Other reporters can be registered under new names; registering an existing name replaces it.
#[derive(Default)]
pub struct ReporterRegistry {
    factories: BTreeMap<String, ReporterFactory>,
}

impl fmt::Debug for ReporterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.factories.keys()).finish()
    }
}

impl ReporterRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry containing the built-in reporters.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry
            .register(DefaultReporter::NAME, |options| {
                Box::new(DefaultReporter::new(options))
            })
            .register(SummaryReporter::NAME, |options| {
                Box::new(SummaryReporter::new(options))
            })
            .register(JsonReporter::NAME, |options| {
                Box::new(JsonReporter::new(options))
            })
            .register(JunitReporter::NAME, |options| {
                Box::new(JunitReporter::new(options))
            });
        registry
    }

    /// Registers a reporter under `name`.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        factory: impl Fn(&ReporterOptions) -> Box<dyn Reporter> + 'static,
    ) -> &mut Self {
        self.factories.insert(name.into(), Box::new(factory));
        self
    }

    /// Returns true if a reporter is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Returns the registered names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.factories.keys().map(|name| name.as_str())
    }

    /// Creates the reporter registered under `name`.
    pub fn create(
        &self,
        name: &str,
        options: &ReporterOptions,
    ) -> Result<Box<dyn Reporter>, UnknownReporterError> {
        match self.factories.get(name) {
            Some(factory) => Ok(factory(options)),
            None => Err(UnknownReporterError::new(name, self.names())),
        }
    }

    /// Creates a dispatcher for the reporters named in `names`, in order.
    ///
    /// Fails on the first unknown name without creating any reporter.
    pub fn create_all(
        &self,
        names: &[String],
        options: &ReporterOptions,
    ) -> Result<ReporterDispatcher, UnknownReporterError> {
        if let Some(unknown) = names.iter().find(|name| !self.contains(name)) {
            return Err(UnknownReporterError::new(unknown.as_str(), self.names()));
        }
        let reporters = names
            .iter()
            .map(|name| self.create(name, options))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ReporterDispatcher::new(reporters))
    }
}
