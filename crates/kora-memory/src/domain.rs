use kora_core::DomainId;

/// The 14 fixed life domains. Seeded once at store init, immutable after.
///
/// Ids are stable small integers (1..=14); routing, facts, and vectors all
/// reference domains by id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Domain {
    Identity = 1,
    BodyHealth = 2,
    MindEmotions = 3,
    Beliefs = 4,
    KnowledgeSkills = 5,
    Relationships = 6,
    WorkCareer = 7,
    Finances = 8,
    Place = 9,
    Goals = 10,
    Preferences = 11,
    RhythmsRoutines = 12,
    LifeEvents = 13,
    UnconsciousPatterns = 14,
}

pub const ALL_DOMAINS: [Domain; 14] = [
    Domain::Identity,
    Domain::BodyHealth,
    Domain::MindEmotions,
    Domain::Beliefs,
    Domain::KnowledgeSkills,
    Domain::Relationships,
    Domain::WorkCareer,
    Domain::Finances,
    Domain::Place,
    Domain::Goals,
    Domain::Preferences,
    Domain::RhythmsRoutines,
    Domain::LifeEvents,
    Domain::UnconsciousPatterns,
];

impl Domain {
    pub fn id(self) -> DomainId {
        self as DomainId
    }

    pub fn from_id(id: DomainId) -> Option<Self> {
        ALL_DOMAINS.into_iter().find(|d| d.id() == id)
    }

    pub fn name(self) -> &'static str {
        match self {
            Domain::Identity => "Identity",
            Domain::BodyHealth => "Body/Health",
            Domain::MindEmotions => "Mind/Emotions",
            Domain::Beliefs => "Beliefs",
            Domain::KnowledgeSkills => "Knowledge/Skills",
            Domain::Relationships => "Relationships",
            Domain::WorkCareer => "Work/Career",
            Domain::Finances => "Finances",
            Domain::Place => "Place",
            Domain::Goals => "Goals",
            Domain::Preferences => "Preferences",
            Domain::RhythmsRoutines => "Rhythms/Routines",
            Domain::LifeEvents => "Life Events",
            Domain::UnconsciousPatterns => "Unconscious Patterns",
        }
    }
}

impl std::fmt::Display for Domain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_contiguous_1_to_14() {
        for (i, d) in ALL_DOMAINS.iter().enumerate() {
            assert_eq!(d.id(), (i + 1) as i64);
            assert_eq!(Domain::from_id(d.id()), Some(*d));
        }
        assert_eq!(Domain::from_id(0), None);
        assert_eq!(Domain::from_id(15), None);
    }
}
