//! Specialist identifiers, descriptors, and the read-only registry.
//!
//! ```rust
//! use kagents::{SpecialistId, SpecialistRegistry};
//!
//! let registry = SpecialistRegistry::builtin();
//! assert_eq!(registry.ids().len(), 5);
//! assert_eq!(registry.resolve(SpecialistId::Financing).name, "student_aid");
//! assert_eq!(SpecialistId::parse("study_choice"), Some(SpecialistId::StudyChoice));
//! ```

use std::fmt::{Display, Formatter};
use std::sync::Arc;

use kcommon::Registry;
use kprovider::{Augmentation, ReasoningEffort};

use crate::i18n::{self, Language, keys};
use crate::personas;

/// Closed set of specialists. Declaration order is the routing precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SpecialistId {
    Financing,
    StudyChoice,
    AcademicBasics,
    RoleModels,
    Compass,
}

impl SpecialistId {
    pub const ALL: [SpecialistId; 5] = [
        SpecialistId::Financing,
        SpecialistId::StudyChoice,
        SpecialistId::AcademicBasics,
        SpecialistId::RoleModels,
        SpecialistId::Compass,
    ];

    /// General orientation specialist, used whenever routing is inconclusive.
    pub const DEFAULT: SpecialistId = SpecialistId::Compass;

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Financing => "FINANCING",
            Self::StudyChoice => "STUDY_CHOICE",
            Self::AcademicBasics => "ACADEMIC_BASICS",
            Self::RoleModels => "ROLE_MODELS",
            Self::Compass => "COMPASS",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        Self::ALL
            .into_iter()
            .find(|id| id.as_str().eq_ignore_ascii_case(value))
    }

    pub fn label(self, language: Language) -> &'static str {
        let key = match self {
            Self::Financing => keys::LABEL_FINANCING,
            Self::StudyChoice => keys::LABEL_STUDY_CHOICE,
            Self::AcademicBasics => keys::LABEL_ACADEMIC_BASICS,
            Self::RoleModels => keys::LABEL_ROLE_MODELS,
            Self::Compass => keys::LABEL_COMPASS,
        };
        i18n::text(language, key)
    }
}

impl Display for SpecialistId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecialistDescriptor {
    pub id: SpecialistId,
    pub name: &'static str,
    pub persona_prompt: String,
    pub reasoning_effort: ReasoningEffort,
    pub augmentation: Option<Augmentation>,
}

impl SpecialistDescriptor {
    pub fn new(
        id: SpecialistId,
        name: &'static str,
        persona_prompt: impl Into<String>,
        reasoning_effort: ReasoningEffort,
    ) -> Self {
        Self {
            id,
            name,
            persona_prompt: persona_prompt.into(),
            reasoning_effort,
            augmentation: None,
        }
    }

    pub fn with_augmentation(mut self, augmentation: Augmentation) -> Self {
        self.augmentation = Some(augmentation);
        self
    }
}

/// Immutable after startup. Always holds the default specialist, so lookups never fail.
#[derive(Debug, Clone)]
pub struct SpecialistRegistry {
    descriptors: Registry<SpecialistId, Arc<SpecialistDescriptor>>,
    default: Arc<SpecialistDescriptor>,
}

impl SpecialistRegistry {
    pub fn new(default: SpecialistDescriptor) -> Self {
        let default = Arc::new(default);
        let mut descriptors = Registry::new();
        descriptors.insert(default.id, Arc::clone(&default));

        Self {
            descriptors,
            default,
        }
    }

    pub fn builtin() -> Self {
        let mut registry = Self::new(SpecialistDescriptor::new(
            SpecialistId::Compass,
            "compass",
            personas::COMPASS,
            ReasoningEffort::Low,
        ));

        registry.register(
            SpecialistDescriptor::new(
                SpecialistId::Financing,
                "student_aid",
                personas::STUDENT_AID,
                ReasoningEffort::High,
            )
            .with_augmentation(Augmentation::CodeExecution),
        );
        registry.register(
            SpecialistDescriptor::new(
                SpecialistId::StudyChoice,
                "degree_explorer",
                personas::DEGREE_EXPLORER,
                ReasoningEffort::High,
            )
            .with_augmentation(Augmentation::WebSearch),
        );
        registry.register(SpecialistDescriptor::new(
            SpecialistId::AcademicBasics,
            "hidden_curriculum",
            personas::HIDDEN_CURRICULUM,
            ReasoningEffort::High,
        ));
        registry.register(SpecialistDescriptor::new(
            SpecialistId::RoleModels,
            "anti_impostor",
            personas::ANTI_IMPOSTOR,
            ReasoningEffort::High,
        ));

        registry
    }

    pub fn register(&mut self, descriptor: SpecialistDescriptor) -> Option<Arc<SpecialistDescriptor>> {
        let descriptor = Arc::new(descriptor);
        if descriptor.id == self.default.id {
            self.default = Arc::clone(&descriptor);
        }
        self.descriptors.insert(descriptor.id, descriptor)
    }

    pub fn get(&self, id: SpecialistId) -> Option<&Arc<SpecialistDescriptor>> {
        self.descriptors.get(&id)
    }

    /// The descriptor for `id`, or the default specialist when `id` is not registered.
    pub fn resolve(&self, id: SpecialistId) -> &Arc<SpecialistDescriptor> {
        self.descriptors.get(&id).unwrap_or(&self.default)
    }

    pub fn default_id(&self) -> SpecialistId {
        self.default.id
    }

    pub fn default_descriptor(&self) -> &Arc<SpecialistDescriptor> {
        &self.default
    }

    /// Registered ids in declaration order.
    pub fn ids(&self) -> Vec<SpecialistId> {
        SpecialistId::ALL
            .into_iter()
            .filter(|id| self.descriptors.contains_key(id))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_registry_matches_the_specialist_table() {
        let registry = SpecialistRegistry::builtin();
        let expected = [
            (SpecialistId::Financing, ReasoningEffort::High, Some(Augmentation::CodeExecution)),
            (SpecialistId::StudyChoice, ReasoningEffort::High, Some(Augmentation::WebSearch)),
            (SpecialistId::AcademicBasics, ReasoningEffort::High, None),
            (SpecialistId::RoleModels, ReasoningEffort::High, None),
            (SpecialistId::Compass, ReasoningEffort::Low, None),
        ];

        assert_eq!(registry.ids(), SpecialistId::ALL.to_vec());
        for (id, effort, augmentation) in expected {
            let descriptor = registry.get(id).expect("builtin specialist");
            assert_eq!(descriptor.reasoning_effort, effort, "{id}");
            assert_eq!(descriptor.augmentation, augmentation, "{id}");
            assert!(!descriptor.persona_prompt.is_empty());
        }
    }

    #[test]
    fn unknown_ids_resolve_to_the_default_specialist() {
        let registry = SpecialistRegistry::new(SpecialistDescriptor::new(
            SpecialistId::Compass,
            "compass",
            "persona",
            ReasoningEffort::Low,
        ));

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.resolve(SpecialistId::Financing).id, SpecialistId::Compass);
        assert_eq!(registry.ids(), vec![SpecialistId::Compass]);
    }

    #[test]
    fn ids_parse_case_insensitively_and_render_upper_case() {
        assert_eq!(SpecialistId::parse(" role_models "), Some(SpecialistId::RoleModels));
        assert_eq!(SpecialistId::parse("CRISIS"), None);
        assert_eq!(SpecialistId::AcademicBasics.to_string(), "ACADEMIC_BASICS");
    }

    #[test]
    fn labels_are_localized() {
        assert_eq!(SpecialistId::Compass.label(Language::En), "KODA Compass");
        assert_eq!(SpecialistId::Compass.label(Language::De), "KODA Kompass");
    }
}
