//! Build-side registry of external libraries.
//!
//! Externals are never compiled from source: the emitted bundle resolves them
//! at runtime through the handler installed by `runtime/externals.js`. This
//! registry owns the records — what a name is called on the host global,
//! which CDN url backs it, what it depends on — and emits the setup snippet
//! embedded in every bundle.

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// How to obtain one external library at runtime. At least one of `global`
/// or `url` must be present for the runtime load to succeed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalLibrary {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub global: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

impl ExternalLibrary {
    pub fn is_loadable(&self) -> bool {
        self.global.is_some() || self.url.is_some()
    }

    /// Record for a caller-listed name we know nothing else about: served
    /// straight from a CDN that speaks ES modules.
    pub fn from_cdn(name: &str) -> Self {
        ExternalLibrary {
            name: name.to_string(),
            global: None,
            url: Some(format!("https://esm.sh/{}", name)),
            version: None,
            dependencies: Vec::new(),
        }
    }
}

const REACT_VERSION: &str = "18.3.1";

fn default_records() -> Vec<ExternalLibrary> {
    vec![
        ExternalLibrary {
            name: "react".to_string(),
            global: Some("React".to_string()),
            url: Some(format!("https://esm.sh/react@{}", REACT_VERSION)),
            version: Some(REACT_VERSION.to_string()),
            dependencies: Vec::new(),
        },
        ExternalLibrary {
            name: "react-dom".to_string(),
            global: Some("ReactDOM".to_string()),
            url: Some(format!("https://esm.sh/react-dom@{}", REACT_VERSION)),
            version: Some(REACT_VERSION.to_string()),
            dependencies: vec!["react".to_string()],
        },
        ExternalLibrary {
            name: "react-dom/client".to_string(),
            global: Some("ReactDOM".to_string()),
            url: Some(format!("https://esm.sh/react-dom@{}/client", REACT_VERSION)),
            version: Some(REACT_VERSION.to_string()),
            dependencies: vec!["react".to_string()],
        },
    ]
}

/// Registered externals, in registration order. Names register once; later
/// registrations of a known name are ignored.
#[derive(Debug)]
pub struct ExternalRegistry {
    inner: RwLock<RegistryInner>,
}

#[derive(Debug, Default)]
struct RegistryInner {
    records: FxHashMap<String, ExternalLibrary>,
    order: Vec<String>,
}

impl Default for ExternalRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ExternalRegistry {
    pub fn new() -> Self {
        let registry = ExternalRegistry {
            inner: RwLock::new(RegistryInner::default()),
        };
        for record in default_records() {
            registry.register(record);
        }
        registry
    }

    /// Register a record. Returns false (and changes nothing) when the name
    /// is already known.
    pub fn register(&self, record: ExternalLibrary) -> bool {
        let mut inner = self.inner.write();
        if inner.records.contains_key(&record.name) {
            debug!(name = %record.name, "external already registered");
            return false;
        }
        if !record.is_loadable() {
            warn!(name = %record.name, "external has neither global nor url; runtime loads will fail");
        }
        inner.order.push(record.name.clone());
        inner.records.insert(record.name.clone(), record);
        true
    }

    /// Register a bare name with a CDN-backed default record.
    pub fn register_name(&self, name: &str) -> bool {
        if self.is_external(name) {
            return false;
        }
        self.register(ExternalLibrary::from_cdn(name))
    }

    pub fn is_external(&self, name: &str) -> bool {
        self.inner.read().records.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.inner.read().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Records in registration order.
    pub fn records(&self) -> Vec<ExternalLibrary> {
        let inner = self.inner.read();
        inner
            .order
            .iter()
            .filter_map(|name| inner.records.get(name).cloned())
            .collect()
    }

    /// The external-setup section of the bundle: one `register` call per
    /// record, then publication of the `__setupExternals` promise the
    /// bootstrap awaits.
    pub fn setup_snippet(&self) -> String {
        let records = self.records();
        let mut snippet = String::new();
        for record in &records {
            match serde_json::to_string(record) {
                Ok(json) => {
                    snippet.push_str(&format!("globalThis.__externals.register({});\n", json));
                }
                Err(err) => warn!(name = %record.name, %err, "skipping unserializable external"),
            }
        }
        let names: Vec<&str> = records.iter().map(|r| r.name.as_str()).collect();
        let names_json = serde_json::to_string(&names).unwrap_or_else(|_| "[]".to_string());
        snippet.push_str(&format!(
            "globalThis.__setupExternals = globalThis.__externals.setup({});\n",
            names_json
        ));
        snippet
    }
}
