//! Plugin-definition discovery over a project classpath.
//!
//! Order of operations:
//! 1. Service-registry lookup for the V2 and V1 contracts.
//! 2. Only when the registry yields nothing: scan class entries whose
//!    simple name ends in `ProcessPluginDefinition`.
//! 3. Two-stage structural check: interface assignability, then presence
//!    of the three required getters. The stages are logged differently so
//!    a class that implements the marker interface but lacks a method is
//!    distinguishable from one that does not implement it at all.
//! 4. Instantiation: the class must be concrete with a public no-arg
//!    constructor, and its getters must evaluate. Broken candidates are
//!    skipped with a warning.
//! 5. V2 results come first; dedup by class name keeps the first seen.

use super::adapter::{ApiVersion, PluginAdapter, REQUIRED_METHODS, V1_CONTRACT, V2_CONTRACT};
use crate::classpath::{Assignability, ClassPath};
use std::collections::HashSet;
use tracing::{debug, info, warn};

pub const DEFINITION_SUFFIX: &str = "ProcessPluginDefinition";

/// Outcome of checking one candidate class against one contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CandidateCheck {
    Accepted(PluginAdapter),
    NotFound,
    NotImplementing,
    /// The contract may be reachable through a supertype missing from
    /// the classpath.
    HierarchyUnresolved,
    /// Implements the interface but lacks required getters.
    MissingMethods(Vec<String>),
    InstantiationFailed(String),
}

pub struct PluginDefinitionDiscovery<'a> {
    classpath: &'a ClassPath,
}

impl<'a> PluginDefinitionDiscovery<'a> {
    pub fn new(classpath: &'a ClassPath) -> Self {
        Self { classpath }
    }

    /// Discover every plugin definition reachable on the classpath.
    pub fn discover(&self) -> Vec<PluginAdapter> {
        let mut v2 = self.classpath.service_entries(V2_CONTRACT);
        let mut v1 = self.classpath.service_entries(V1_CONTRACT);
        let from_registry = !(v2.is_empty() && v1.is_empty());
        if from_registry {
            info!(v2 = v2.len(), v1 = v1.len(), "plugin definitions from service registry");
        } else {
            let scanned: Vec<String> = self
                .classpath
                .class_names()
                .filter(|n| simple_name(n).ends_with(DEFINITION_SUFFIX))
                .collect();
            debug!(candidates = scanned.len(), "service registry empty; scanning classes");
            v2 = scanned.clone();
            v1 = scanned;
        }

        let mut adapters: Vec<PluginAdapter> = Vec::new();
        for (version, candidates) in [(ApiVersion::V2, v2), (ApiVersion::V1, v1)] {
            for fqcn in candidates {
                match self.check_candidate(&fqcn, version) {
                    CandidateCheck::Accepted(a) => adapters.push(a),
                    CandidateCheck::NotFound => {
                        warn!(class = %fqcn, "registered plugin class not found on classpath")
                    }
                    CandidateCheck::NotImplementing => {
                        // Expected during scans: each class is tried against both contracts.
                        debug!(
                            class = %fqcn,
                            contract = ?version.contract(),
                            "does not implement plugin contract"
                        )
                    }
                    CandidateCheck::HierarchyUnresolved if from_registry => warn!(
                        class = %fqcn,
                        api = %version,
                        "class hierarchy not resolvable on classpath; plugin candidate skipped"
                    ),
                    CandidateCheck::HierarchyUnresolved => {
                        debug!(class = %fqcn, api = %version, "class hierarchy not resolvable")
                    }
                    CandidateCheck::MissingMethods(missing) => warn!(
                        class = %fqcn,
                        api = %version,
                        missing = ?missing,
                        "implements interface but missing required methods"
                    ),
                    CandidateCheck::InstantiationFailed(reason) => {
                        warn!(class = %fqcn, api = %version, %reason, "plugin candidate skipped")
                    }
                }
            }
        }

        let mut seen: HashSet<String> = HashSet::new();
        adapters.retain(|a| seen.insert(a.source_identity().to_string()));
        info!(plugins = adapters.len(), "plugin discovery finished");
        adapters
    }

    /// Run the two-stage check and instantiation for one candidate.
    pub fn check_candidate(&self, fqcn: &str, version: ApiVersion) -> CandidateCheck {
        let Some(contract) = version.contract() else {
            return CandidateCheck::NotImplementing;
        };
        let class = match self.classpath.load_class(fqcn) {
            Ok(c) => c,
            Err(crate::error::LintError::ClassNotFound(_)) => return CandidateCheck::NotFound,
            Err(e) => return CandidateCheck::InstantiationFailed(e.to_string()),
        };
        if class.is_interface() {
            return CandidateCheck::NotImplementing;
        }
        match self.classpath.is_assignable(fqcn, contract) {
            Assignability::Yes => {}
            Assignability::No => return CandidateCheck::NotImplementing,
            Assignability::Unknown => return CandidateCheck::HierarchyUnresolved,
        }
        let missing: Vec<String> = REQUIRED_METHODS
            .iter()
            .filter(|(name, desc)| {
                self.classpath
                    .find_concrete_method(fqcn, name, desc)
                    .is_none()
            })
            .map(|(name, _)| name.to_string())
            .collect();
        if !missing.is_empty() {
            return CandidateCheck::MissingMethods(missing);
        }
        if class.is_abstract() {
            return CandidateCheck::InstantiationFailed("class is abstract".into());
        }
        if !class.has_public_no_arg_constructor() {
            return CandidateCheck::InstantiationFailed("no public no-arg constructor".into());
        }
        match PluginAdapter::instantiate(self.classpath, &class, version) {
            Ok(a) => CandidateCheck::Accepted(a),
            Err(e) => CandidateCheck::InstantiationFailed(e.to_string()),
        }
    }
}

fn simple_name(fqcn: &str) -> &str {
    let tail = fqcn.rsplit('.').next().unwrap_or(fqcn);
    tail.rsplit('$').next().unwrap_or(tail)
}
