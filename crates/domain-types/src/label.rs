//! Classification labels

use crate::DomainError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Outcome of a classification. Exactly two values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Label {
    /// Cell shows a malaria parasite
    #[serde(rename = "Parasitized", alias = "Infected")]
    Infected,
    /// Healthy cell
    Uninfected,
}

impl Label {
    /// Canonical name, as stored and as listed in the model's class names
    pub fn as_str(&self) -> &'static str {
        self.spelled(LabelSpelling::Parasitized)
    }

    /// Name shown to a caller that picked a spelling for the infected class
    pub fn spelled(&self, spelling: LabelSpelling) -> &'static str {
        match (self, spelling) {
            (Label::Infected, LabelSpelling::Parasitized) => "Parasitized",
            (Label::Infected, LabelSpelling::Infected) => "Infected",
            (Label::Uninfected, _) => "Uninfected",
        }
    }

    /// Whether this is the infected class
    pub fn is_infected(&self) -> bool {
        matches!(self, Label::Infected)
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Label {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Parasitized" | "Infected" => Ok(Label::Infected),
            "Uninfected" => Ok(Label::Uninfected),
            other => Err(DomainError::UnknownLabel(other.to_string())),
        }
    }
}

/// How the infected class is spelled in responses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LabelSpelling {
    #[default]
    Parasitized,
    Infected,
}

impl LabelSpelling {
    /// Pick the spelling from the `use_infected_labels` request flag
    pub fn from_flag(use_infected_labels: bool) -> Self {
        if use_infected_labels {
            LabelSpelling::Infected
        } else {
            LabelSpelling::Parasitized
        }
    }

    /// Label pair description reported alongside results
    pub fn label_type(&self) -> &'static str {
        match self {
            LabelSpelling::Parasitized => "Parasitized/Uninfected",
            LabelSpelling::Infected => "Infected/Uninfected",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spellings() {
        assert_eq!(Label::Infected.spelled(LabelSpelling::Parasitized), "Parasitized");
        assert_eq!(Label::Infected.spelled(LabelSpelling::Infected), "Infected");
        assert_eq!(Label::Uninfected.spelled(LabelSpelling::Infected), "Uninfected");
        assert_eq!(Label::Infected.to_string(), "Parasitized");
    }

    #[test]
    fn test_parse_accepts_both_spellings() {
        assert_eq!("Parasitized".parse::<Label>().unwrap(), Label::Infected);
        assert_eq!("Infected".parse::<Label>().unwrap(), Label::Infected);
        assert_eq!("Uninfected".parse::<Label>().unwrap(), Label::Uninfected);
        assert!("healthy".parse::<Label>().is_err());
    }

    #[test]
    fn test_serde_uses_canonical_name() {
        let json = serde_json::to_string(&Label::Infected).unwrap();
        assert_eq!(json, "\"Parasitized\"");
        let back: Label = serde_json::from_str("\"Infected\"").unwrap();
        assert_eq!(back, Label::Infected);
    }

    #[test]
    fn test_label_type_from_flag() {
        assert_eq!(LabelSpelling::from_flag(true).label_type(), "Infected/Uninfected");
        assert_eq!(LabelSpelling::from_flag(false).label_type(), "Parasitized/Uninfected");
    }
}
