//! Persona catalog and phase-adjusted panel selection.
//!
//! Personas are read-only catalog entries; the selector picks a bounded
//! subset for each round. Exploration rounds seat the full recommended
//! panel; challenge and convergence rounds drop to `max(2, experts - 1)`
//! so the debate narrows as it matures.

use serde::{Deserialize, Serialize};

/// A synthetic expert persona. Selected, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonaProfile {
    /// Short stable code (e.g. "skeptic").
    pub code: String,
    /// Display name.
    pub name: String,
    /// Behavioral archetype driving the persona's prompt.
    pub archetype: String,
}

impl PersonaProfile {
    pub fn new(code: &str, name: &str, archetype: &str) -> Self {
        Self {
            code: code.to_string(),
            name: name.to_string(),
            archetype: archetype.to_string(),
        }
    }
}

/// Phase of a deliberation, used to adjust panel composition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeliberationPhase {
    /// Broad idea generation — full panel.
    Exploration,
    /// Stress-testing positions — reduced panel.
    Challenge,
    /// Narrowing toward a recommendation — reduced panel.
    Convergence,
}

impl DeliberationPhase {
    /// Phase for a given round within a bounded deliberation.
    pub fn for_round(round: u32, max_rounds: u32) -> Self {
        if round <= 1 {
            Self::Exploration
        } else if round < max_rounds {
            Self::Challenge
        } else {
            Self::Convergence
        }
    }
}

impl std::fmt::Display for DeliberationPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exploration => write!(f, "exploration"),
            Self::Challenge => write!(f, "challenge"),
            Self::Convergence => write!(f, "convergence"),
        }
    }
}

/// Read-only catalog of available personas.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaCatalog {
    personas: Vec<PersonaProfile>,
}

impl PersonaCatalog {
    pub fn new(personas: Vec<PersonaProfile>) -> Self {
        Self { personas }
    }

    /// Built-in default panel.
    pub fn builtin() -> Self {
        Self::new(vec![
            PersonaProfile::new("strategist", "The Strategist", "long-horizon planner"),
            PersonaProfile::new("skeptic", "The Skeptic", "assumption challenger"),
            PersonaProfile::new("pragmatist", "The Pragmatist", "feasibility-first operator"),
            PersonaProfile::new("visionary", "The Visionary", "possibility expander"),
            PersonaProfile::new("analyst", "The Analyst", "evidence weigher"),
            PersonaProfile::new("mediator", "The Mediator", "position synthesizer"),
        ])
    }

    pub fn len(&self) -> usize {
        self.personas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.personas.is_empty()
    }

    pub fn all(&self) -> &[PersonaProfile] {
        &self.personas
    }

    pub fn get(&self, code: &str) -> Option<&PersonaProfile> {
        self.personas.iter().find(|p| p.code == code)
    }
}

/// Chooses a bounded panel for a sub-problem round.
#[derive(Debug, Clone)]
pub struct PanelSelector {
    catalog: PersonaCatalog,
}

impl PanelSelector {
    pub fn new(catalog: PersonaCatalog) -> Self {
        Self { catalog }
    }

    /// Target panel size for a phase given the recommended expert count.
    fn target_size(phase: DeliberationPhase, recommended_experts: u32) -> usize {
        match phase {
            DeliberationPhase::Exploration => recommended_experts as usize,
            DeliberationPhase::Challenge | DeliberationPhase::Convergence => {
                (recommended_experts.saturating_sub(1)).max(2) as usize
            }
        }
    }

    /// Select a panel for the given phase and round.
    ///
    /// Deterministic: rotates through the catalog by round so successive
    /// rounds seat varied but reproducible panels.
    pub fn select(
        &self,
        phase: DeliberationPhase,
        recommended_experts: u32,
        round: u32,
    ) -> Vec<PersonaProfile> {
        let available = self.catalog.len();
        if available == 0 {
            return Vec::new();
        }
        let size = Self::target_size(phase, recommended_experts).min(available);
        let start = (round.saturating_sub(1) as usize) % available;
        self.catalog
            .all()
            .iter()
            .cycle()
            .skip(start)
            .take(size)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_catalog() {
        let catalog = PersonaCatalog::builtin();
        assert_eq!(catalog.len(), 6);
        assert!(catalog.get("skeptic").is_some());
        assert!(catalog.get("nonexistent").is_none());
    }

    #[test]
    fn test_exploration_uses_full_recommendation() {
        let selector = PanelSelector::new(PersonaCatalog::builtin());
        let panel = selector.select(DeliberationPhase::Exploration, 4, 1);
        assert_eq!(panel.len(), 4);
    }

    #[test]
    fn test_later_phases_drop_one_expert() {
        let selector = PanelSelector::new(PersonaCatalog::builtin());
        let panel = selector.select(DeliberationPhase::Challenge, 4, 2);
        assert_eq!(panel.len(), 3);
        let panel = selector.select(DeliberationPhase::Convergence, 5, 5);
        assert_eq!(panel.len(), 4);
    }

    #[test]
    fn test_panel_floor_of_two() {
        let selector = PanelSelector::new(PersonaCatalog::builtin());
        let panel = selector.select(DeliberationPhase::Challenge, 3, 2);
        assert_eq!(panel.len(), 2);
    }

    #[test]
    fn test_bounded_by_available_personas() {
        let catalog = PersonaCatalog::new(vec![
            PersonaProfile::new("a", "A", "x"),
            PersonaProfile::new("b", "B", "y"),
        ]);
        let selector = PanelSelector::new(catalog);
        let panel = selector.select(DeliberationPhase::Exploration, 5, 1);
        assert_eq!(panel.len(), 2);
    }

    #[test]
    fn test_empty_catalog() {
        let selector = PanelSelector::new(PersonaCatalog::new(vec![]));
        assert!(selector.select(DeliberationPhase::Exploration, 4, 1).is_empty());
    }

    #[test]
    fn test_rotation_is_deterministic() {
        let selector = PanelSelector::new(PersonaCatalog::builtin());
        let round2a = selector.select(DeliberationPhase::Challenge, 4, 2);
        let round2b = selector.select(DeliberationPhase::Challenge, 4, 2);
        assert_eq!(round2a, round2b);

        let round3 = selector.select(DeliberationPhase::Challenge, 4, 3);
        assert_ne!(round2a[0].code, round3[0].code);
    }

    #[test]
    fn test_phase_for_round() {
        assert_eq!(
            DeliberationPhase::for_round(1, 4),
            DeliberationPhase::Exploration
        );
        assert_eq!(
            DeliberationPhase::for_round(2, 4),
            DeliberationPhase::Challenge
        );
        assert_eq!(
            DeliberationPhase::for_round(4, 4),
            DeliberationPhase::Convergence
        );
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(DeliberationPhase::Exploration.to_string(), "exploration");
        assert_eq!(DeliberationPhase::Challenge.to_string(), "challenge");
        assert_eq!(DeliberationPhase::Convergence.to_string(), "convergence");
    }
}
