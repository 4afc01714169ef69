//! Collaborator registration
//!
//! A [`CapabilityRegistry`] holds one typed slot per external collaborator.
//! Engines are normally built from an explicit registry; the process-wide
//! instance behind [`global`] exists for binaries that wire collaborators
//! once at startup and must call [`teardown`] before exit.

use crate::docs::DocProposer;
use mend_analysis::ReferenceIndex;
use mend_healing::{Sandbox, TextGenerator};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

/// Collaborator slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CapabilityKind {
    /// Code, test and fix generation
    TextGenerator,
    /// Test execution
    Sandbox,
    /// Documentation proposals
    DocProposer,
    /// Symbol references for PRECISE analysis
    ReferenceIndex,
}

impl CapabilityKind {
    /// Every slot
    pub const ALL: [CapabilityKind; 4] = [
        CapabilityKind::TextGenerator,
        CapabilityKind::Sandbox,
        CapabilityKind::DocProposer,
        CapabilityKind::ReferenceIndex,
    ];
}

impl fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::TextGenerator => "text generator",
            Self::Sandbox => "sandbox",
            Self::DocProposer => "doc proposer",
            Self::ReferenceIndex => "reference index",
        };
        f.write_str(name)
    }
}

/// Typed collaborator slots
#[derive(Clone, Default)]
pub struct CapabilityRegistry {
    generator: Option<Arc<dyn TextGenerator>>,
    sandbox: Option<Arc<dyn Sandbox>>,
    doc_proposer: Option<Arc<dyn DocProposer>>,
    reference_index: Option<Arc<dyn ReferenceIndex>>,
}

impl CapabilityRegistry {
    /// Empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the text generator, returning the one it replaces
    pub fn register_generator(
        &mut self,
        generator: Arc<dyn TextGenerator>,
    ) -> Option<Arc<dyn TextGenerator>> {
        self.generator.replace(generator)
    }

    /// Register the sandbox, returning the one it replaces
    pub fn register_sandbox(&mut self, sandbox: Arc<dyn Sandbox>) -> Option<Arc<dyn Sandbox>> {
        self.sandbox.replace(sandbox)
    }

    /// Register the doc proposer, returning the one it replaces
    pub fn register_doc_proposer(
        &mut self,
        proposer: Arc<dyn DocProposer>,
    ) -> Option<Arc<dyn DocProposer>> {
        self.doc_proposer.replace(proposer)
    }

    /// Register the reference index, returning the one it replaces
    pub fn register_reference_index(
        &mut self,
        index: Arc<dyn ReferenceIndex>,
    ) -> Option<Arc<dyn ReferenceIndex>> {
        self.reference_index.replace(index)
    }

    /// Set the generator
    #[inline]
    #[must_use]
    pub fn with_generator(mut self, generator: Arc<dyn TextGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Set the sandbox
    #[inline]
    #[must_use]
    pub fn with_sandbox(mut self, sandbox: Arc<dyn Sandbox>) -> Self {
        self.sandbox = Some(sandbox);
        self
    }

    /// Set the documentation proposer
    #[inline]
    #[must_use]
    pub fn with_doc_proposer(mut self, proposer: Arc<dyn DocProposer>) -> Self {
        self.doc_proposer = Some(proposer);
        self
    }

    /// Set the reference index
    #[inline]
    #[must_use]
    pub fn with_reference_index(mut self, index: Arc<dyn ReferenceIndex>) -> Self {
        self.reference_index = Some(index);
        self
    }

    /// Registered generator
    #[must_use]
    pub fn generator(&self) -> Option<Arc<dyn TextGenerator>> {
        self.generator.clone()
    }

    /// Registered sandbox
    #[must_use]
    pub fn sandbox(&self) -> Option<Arc<dyn Sandbox>> {
        self.sandbox.clone()
    }

    /// Registered documentation proposer
    #[must_use]
    pub fn doc_proposer(&self) -> Option<Arc<dyn DocProposer>> {
        self.doc_proposer.clone()
    }

    /// Registered reference index
    #[must_use]
    pub fn reference_index(&self) -> Option<Arc<dyn ReferenceIndex>> {
        self.reference_index.clone()
    }

    /// Whether `kind` is registered
    #[must_use]
    pub fn has(&self, kind: CapabilityKind) -> bool {
        match kind {
            CapabilityKind::TextGenerator => self.generator.is_some(),
            CapabilityKind::Sandbox => self.sandbox.is_some(),
            CapabilityKind::DocProposer => self.doc_proposer.is_some(),
            CapabilityKind::ReferenceIndex => self.reference_index.is_some(),
        }
    }

    /// Entries of `required` that are not registered
    #[must_use]
    pub fn missing(&self, required: &[CapabilityKind]) -> Vec<CapabilityKind> {
        required.iter().copied().filter(|k| !self.has(*k)).collect()
    }

    /// Drop every registration
    pub fn teardown(&mut self) {
        self.generator = None;
        self.sandbox = None;
        self.doc_proposer = None;
        self.reference_index = None;
    }
}

impl fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registered: Vec<CapabilityKind> =
            CapabilityKind::ALL.into_iter().filter(|k| self.has(*k)).collect();
        f.debug_struct("CapabilityRegistry")
            .field("registered", &registered)
            .finish()
    }
}

static GLOBAL: Lazy<RwLock<CapabilityRegistry>> =
    Lazy::new(|| RwLock::new(CapabilityRegistry::new()));

/// Install `registry` as the process-wide registry
pub fn init(registry: CapabilityRegistry) {
    tracing::debug!("Installing global capabilities: {:?}", registry);
    *GLOBAL.write() = registry;
}

/// Snapshot of the process-wide registry
#[must_use]
pub fn global() -> CapabilityRegistry {
    GLOBAL.read().clone()
}

/// Clear the process-wide registry
pub fn teardown() {
    GLOBAL.write().teardown();
    tracing::debug!("Global capabilities torn down");
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mend_healing::{GenerationError, SandboxError, TestOutcome};
    use std::time::Duration;

    struct Gen;

    #[async_trait]
    impl TextGenerator for Gen {
        async fn generate(&self, _prompt: &str) -> Result<String, GenerationError> {
            Ok(String::new())
        }
    }

    struct Pass;

    #[async_trait]
    impl Sandbox for Pass {
        async fn run(&self, _: &str, _: &str, _: Duration) -> Result<TestOutcome, SandboxError> {
            Ok(TestOutcome::passed(""))
        }
    }

    #[test]
    fn missing_lists_unregistered_slots() {
        let mut registry = CapabilityRegistry::new();
        let required = [CapabilityKind::TextGenerator, CapabilityKind::Sandbox];
        assert_eq!(registry.missing(&required), required.to_vec());

        assert!(registry.register_generator(Arc::new(Gen)).is_none());
        assert!(registry.register_generator(Arc::new(Gen)).is_some());
        assert_eq!(registry.missing(&required), vec![CapabilityKind::Sandbox]);

        registry.register_sandbox(Arc::new(Pass));
        assert!(registry.missing(&required).is_empty());

        registry.teardown();
        assert!(!registry.has(CapabilityKind::TextGenerator));
    }

    #[test]
    fn global_init_and_teardown() {
        init(CapabilityRegistry::new().with_generator(Arc::new(Gen)));
        assert!(global().has(CapabilityKind::TextGenerator));
        teardown();
        assert!(!global().has(CapabilityKind::TextGenerator));
    }
}
