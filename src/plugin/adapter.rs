//! Version-independent view over a discovered plugin definition.
//!
//! The two DSF plugin APIs expose the same three getters through different
//! interfaces. Discovery evaluates those getters once and stores the values
//! in a capability record tagged with the API version; downstream code only
//! matches on the tag where behavior really differs (listener base types).

use crate::classpath::classfile::ClassFile;
use crate::classpath::eval::{self, Evaluated};
use crate::classpath::ClassPath;
use crate::error::AdapterInvocationError;
use indexmap::IndexMap;
use serde::Serialize;
use std::fmt;

pub const V1_CONTRACT: &str = "dev.dsf.bpe.v1.ProcessPluginDefinition";
pub const V2_CONTRACT: &str = "dev.dsf.bpe.v2.ProcessPluginDefinition";

pub const GET_NAME: (&str, &str) = ("getName", "()Ljava/lang/String;");
pub const GET_PROCESS_MODELS: (&str, &str) = ("getProcessModels", "()Ljava/util/List;");
pub const GET_FHIR_RESOURCES: (&str, &str) =
    ("getFhirResourcesByProcessId", "()Ljava/util/Map;");

/// The structural contract every plugin definition must satisfy.
pub const REQUIRED_METHODS: [(&str, &str); 3] = [GET_NAME, GET_PROCESS_MODELS, GET_FHIR_RESOURCES];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ApiVersion {
    V1,
    V2,
    Unknown,
}

impl ApiVersion {
    /// Fully qualified name of the plugin-definition interface.
    pub fn contract(&self) -> Option<&'static str> {
        match self {
            ApiVersion::V1 => Some(V1_CONTRACT),
            ApiVersion::V2 => Some(V2_CONTRACT),
            ApiVersion::Unknown => None,
        }
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ApiVersion::V1 => "v1",
            ApiVersion::V2 => "v2",
            ApiVersion::Unknown => "unknown",
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
/// Values returned by a plugin definition's getters.
pub struct PluginCapabilities {
    pub name: String,
    pub process_models: Vec<String>,
    pub fhir_resources_by_process_id: IndexMap<String, Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginContract {
    V1(PluginCapabilities),
    V2(PluginCapabilities),
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// A discovered plugin definition. Immutable after construction.
pub struct PluginAdapter {
    contract: PluginContract,
    /// Fully qualified class name; used for naming and reports only.
    source_identity: String,
}

impl PluginAdapter {
    pub fn new(
        version: ApiVersion,
        source_identity: impl Into<String>,
        caps: PluginCapabilities,
    ) -> Option<Self> {
        let contract = match version {
            ApiVersion::V1 => PluginContract::V1(caps),
            ApiVersion::V2 => PluginContract::V2(caps),
            ApiVersion::Unknown => return None,
        };
        Some(Self {
            contract,
            source_identity: source_identity.into(),
        })
    }

    /// Evaluate the three getters of `class` and build an adapter.
    ///
    /// This is the instantiation step: a getter that cannot be evaluated,
    /// returns `null` for the name, or returns the wrong shape fails with
    /// an error naming the method. `null` collections become empty.
    pub fn instantiate(
        classpath: &ClassPath,
        class: &ClassFile,
        version: ApiVersion,
    ) -> Result<Self, AdapterInvocationError> {
        let fqcn = class.this_class.as_str();
        let name = match invoke(classpath, fqcn, GET_NAME)? {
            Evaluated::Str(s) => s,
            other => return Err(shape_error(fqcn, GET_NAME.0, "String", &other)),
        };
        let process_models = match invoke(classpath, fqcn, GET_PROCESS_MODELS)? {
            Evaluated::Null => Vec::new(),
            Evaluated::List(items) => string_list(fqcn, GET_PROCESS_MODELS.0, items)?,
            other => return Err(shape_error(fqcn, GET_PROCESS_MODELS.0, "List", &other)),
        };
        let mut fhir = IndexMap::new();
        match invoke(classpath, fqcn, GET_FHIR_RESOURCES)? {
            Evaluated::Null => {}
            Evaluated::Map(pairs) => {
                for (k, v) in pairs {
                    let key = match k {
                        Evaluated::Str(s) => s,
                        other => {
                            let method = GET_FHIR_RESOURCES.0;
                            return Err(shape_error(fqcn, method, "String key", &other));
                        }
                    };
                    let values = match v {
                        Evaluated::Null => Vec::new(),
                        Evaluated::List(items) => string_list(fqcn, GET_FHIR_RESOURCES.0, items)?,
                        other => {
                            let method = GET_FHIR_RESOURCES.0;
                            return Err(shape_error(fqcn, method, "List value", &other));
                        }
                    };
                    fhir.entry(key).or_insert_with(Vec::new).extend(values);
                }
            }
            other => return Err(shape_error(fqcn, GET_FHIR_RESOURCES.0, "Map", &other)),
        }
        let caps = PluginCapabilities {
            name,
            process_models,
            fhir_resources_by_process_id: fhir,
        };
        Self::new(version, fqcn, caps).ok_or_else(|| {
            AdapterInvocationError::new(fqcn, "<init>", "plugin API version is unknown")
        })
    }

    pub fn api_version(&self) -> ApiVersion {
        match self.contract {
            PluginContract::V1(_) => ApiVersion::V1,
            PluginContract::V2(_) => ApiVersion::V2,
        }
    }

    pub fn capabilities(&self) -> &PluginCapabilities {
        match &self.contract {
            PluginContract::V1(c) | PluginContract::V2(c) => c,
        }
    }

    pub fn contract(&self) -> &PluginContract {
        &self.contract
    }

    pub fn name(&self) -> &str {
        &self.capabilities().name
    }

    pub fn process_model_ids(&self) -> &[String] {
        &self.capabilities().process_models
    }

    pub fn fhir_resources_by_process_id(&self) -> &IndexMap<String, Vec<String>> {
        &self.capabilities().fhir_resources_by_process_id
    }

    pub fn source_identity(&self) -> &str {
        &self.source_identity
    }
}

fn invoke(
    classpath: &ClassPath,
    fqcn: &str,
    (name, descriptor): (&str, &str),
) -> Result<Evaluated, AdapterInvocationError> {
    let (owner, method) = classpath
        .find_concrete_method(fqcn, name, descriptor)
        .ok_or_else(|| AdapterInvocationError::new(fqcn, name, "no concrete implementation"))?;
    eval::evaluate(classpath, &owner, &method)
        .map_err(|reason| AdapterInvocationError::new(fqcn, name, reason))
}

fn string_list(
    fqcn: &str,
    method: &str,
    items: Vec<Evaluated>,
) -> Result<Vec<String>, AdapterInvocationError> {
    items
        .into_iter()
        .map(|it| match it {
            Evaluated::Str(s) => Ok(s),
            other => Err(shape_error(fqcn, method, "String element", &other)),
        })
        .collect()
}

fn shape_error(
    fqcn: &str,
    method: &str,
    expected: &str,
    got: &Evaluated,
) -> AdapterInvocationError {
    AdapterInvocationError::new(fqcn, method, format!("expected {}, got {:?}", expected, got))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classpath::classfile::testing::*;
    use crate::classpath::testing::write_class;
    use crate::classpath::ClassPathRoot;

    fn classpath_with(fqcn: &str, bytes: &[u8]) -> (tempfile::TempDir, ClassPath) {
        let dir = tempfile::tempdir().unwrap();
        write_class(dir.path(), fqcn, bytes);
        let cp = ClassPath::new(vec![ClassPathRoot::Directory(dir.path().to_path_buf())]);
        (dir, cp)
    }

    #[test]
    fn test_instantiate_v2_plugin() {
        let fqcn = "org.example.PingProcessPluginDefinition";
        let bytes = plugin_definition(
            fqcn,
            V2_CONTRACT,
            "dsf-process-ping",
            &["bpe/ping.bpmn"],
            &[
                ("dsfdev_ping", vec!["fhir/ActivityDefinition/ping.xml"]),
                ("dsfdev_pong", vec![]),
            ],
        );
        let (_dir, cp) = classpath_with(fqcn, &bytes);
        let cf = cp.load_class(fqcn).unwrap();
        let adapter = PluginAdapter::instantiate(&cp, &cf, ApiVersion::V2).unwrap();
        assert_eq!(adapter.api_version(), ApiVersion::V2);
        assert_eq!(adapter.name(), "dsf-process-ping");
        assert_eq!(adapter.process_model_ids(), ["bpe/ping.bpmn".to_string()]);
        assert_eq!(adapter.fhir_resources_by_process_id().len(), 2);
        assert!(adapter.fhir_resources_by_process_id()["dsfdev_pong"].is_empty());
        assert_eq!(adapter.source_identity(), fqcn);
    }

    #[test]
    fn test_null_collections_become_empty() {
        let fqcn = "org.example.EmptyProcessPluginDefinition";
        let mut cb = ClassBuilder::new(fqcn).implements(V1_CONTRACT);
        let name = Asm::new(&mut cb).ldc("empty").areturn();
        let models = Asm::new(&mut cb).aconst_null().areturn();
        let fhir = Asm::new(&mut cb).aconst_null().areturn();
        let bytes = cb
            .method(GET_NAME.0, GET_NAME.1, name)
            .method(GET_PROCESS_MODELS.0, GET_PROCESS_MODELS.1, models)
            .method(GET_FHIR_RESOURCES.0, GET_FHIR_RESOURCES.1, fhir)
            .build();
        let (_dir, cp) = classpath_with(fqcn, &bytes);
        let cf = cp.load_class(fqcn).unwrap();
        let adapter = PluginAdapter::instantiate(&cp, &cf, ApiVersion::V1).unwrap();
        assert!(adapter.process_model_ids().is_empty());
        assert!(adapter.fhir_resources_by_process_id().is_empty());
    }

    #[test]
    fn test_null_name_is_an_invocation_error() {
        let fqcn = "org.example.NamelessProcessPluginDefinition";
        let mut cb = ClassBuilder::new(fqcn).implements(V2_CONTRACT);
        let name = Asm::new(&mut cb).aconst_null().areturn();
        let bytes = cb.method(GET_NAME.0, GET_NAME.1, name).build();
        let (_dir, cp) = classpath_with(fqcn, &bytes);
        let cf = cp.load_class(fqcn).unwrap();
        let err = PluginAdapter::instantiate(&cp, &cf, ApiVersion::V2).unwrap_err();
        assert_eq!(err.method, "getName");
    }
}
