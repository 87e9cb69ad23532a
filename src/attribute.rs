//! The attributes tracked per record.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// A tracked attribute. Every record holds one share per attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Attribute {
    /// Grade point average.
    Gpa,
    /// Age in years.
    Age,
    /// Amount of financial aid received.
    FinancialAid,
}

/// The attribute name is not one of the tracked attributes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid attribute: {0}")]
pub struct UnknownAttribute(pub String);

impl Attribute {
    /// All tracked attributes.
    pub const ALL: [Attribute; 3] = [Attribute::Gpa, Attribute::Age, Attribute::FinancialAid];

    /// The name used in stores and requests.
    pub fn name(&self) -> &'static str {
        match self {
            Attribute::Gpa => "gpa",
            Attribute::Age => "age",
            Attribute::FinancialAid => "financial_aid",
        }
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Attribute {
    type Err = UnknownAttribute;

    /// Parses an attribute name, ignoring case and surrounding whitespace.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_lowercase();
        Attribute::ALL
            .into_iter()
            .find(|attr| attr.name() == name)
            .ok_or_else(|| UnknownAttribute(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!("GPA".parse(), Ok(Attribute::Gpa));
        assert_eq!(" Financial_Aid ".parse(), Ok(Attribute::FinancialAid));
        assert_eq!(
            "height".parse::<Attribute>(),
            Err(UnknownAttribute("height".to_string()))
        );
    }

    #[test]
    fn serde_uses_store_names() {
        let json = serde_json::to_string(&Attribute::FinancialAid).unwrap();
        assert_eq!(json, "\"financial_aid\"");
        for attr in Attribute::ALL {
            assert_eq!(attr.name().parse(), Ok(attr));
        }
    }
}
