//! Meal slot parsing.
//!
//! Meal slots travel through carts and subscriptions as a canonical
//! comma-separated string (`"Breakfast,Dinner"`).

use crate::errors::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// A meal slot a subscription delivers
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MealType {
    /// Morning delivery
    Breakfast,
    /// Midday delivery
    Lunch,
    /// Evening delivery
    Dinner,
}

impl MealType {
    /// Canonical name as stored in the database.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Breakfast => "Breakfast",
            Self::Lunch => "Lunch",
            Self::Dinner => "Dinner",
        }
    }
}

impl fmt::Display for MealType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MealType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "breakfast" => Ok(Self::Breakfast),
            "lunch" => Ok(Self::Lunch),
            "dinner" => Ok(Self::Dinner),
            _ => Err(Error::InvalidMealType {
                value: s.trim().to_string(),
            }),
        }
    }
}

/// Parses a comma-separated list into a sorted, de-duplicated set of slots.
///
/// An empty list is rejected: a subscription always delivers at least one meal.
pub fn parse_meal_types(value: &str) -> Result<Vec<MealType>> {
    let mut meals = value
        .split(',')
        .filter(|part| !part.trim().is_empty())
        .map(MealType::from_str)
        .collect::<Result<Vec<_>>>()?;
    meals.sort_unstable();
    meals.dedup();

    if meals.is_empty() {
        return Err(Error::InvalidMealType {
            value: value.to_string(),
        });
    }
    Ok(meals)
}

/// Formats slots in canonical order.
#[must_use]
pub fn format_meal_types(meals: &[MealType]) -> String {
    let mut sorted = meals.to_vec();
    sorted.sort_unstable();
    sorted.dedup();
    sorted
        .iter()
        .map(|m| m.as_str())
        .collect::<Vec<_>>()
        .join(",")
}

/// Normalises a stored or user-supplied list to canonical form.
pub fn normalize_meal_types(value: &str) -> Result<String> {
    parse_meal_types(value).map(|meals| format_meal_types(&meals))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn test_parse_is_case_insensitive_and_deduplicated() {
        let meals = parse_meal_types("dinner, LUNCH,lunch").unwrap();
        assert_eq!(meals, vec![MealType::Lunch, MealType::Dinner]);
    }

    #[test]
    fn test_normalize_orders_canonically() {
        assert_eq!(
            normalize_meal_types("Dinner,Breakfast").unwrap(),
            "Breakfast,Dinner"
        );
    }

    #[test]
    fn test_rejects_unknown_and_empty() {
        assert!(matches!(
            parse_meal_types("Lunch,Brunch"),
            Err(Error::InvalidMealType { value }) if value == "Brunch"
        ));
        assert!(matches!(
            parse_meal_types(" , "),
            Err(Error::InvalidMealType { .. })
        ));
    }
}
