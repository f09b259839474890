//! Audience filter and predicate AST
//!
//! An `AudienceFilter` is the declarative targeting a caller submits (and the
//! snapshot stored on the campaign row). The resolver compiles it into a
//! `Predicate`, a typed tree that both the SQL interpreter in the database
//! layer and the in-memory `matches` interpreter evaluate identically.

use chrono::{DateTime, Datelike, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::customer::{Customer, Gender};

/// Base audience selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
    /// Every customer in scope
    #[default]
    All,
    /// Customers with at least two recorded visits
    Revisit,
    /// Customers registered within the last 30 days
    New,
    /// An explicit customer id list; overrides demographic filters
    Custom,
}

impl fmt::Display for TargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetType::All => write!(f, "all"),
            TargetType::Revisit => write!(f, "revisit"),
            TargetType::New => write!(f, "new"),
            TargetType::Custom => write!(f, "custom"),
        }
    }
}

impl TargetType {
    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "all" => Some(TargetType::All),
            "revisit" => Some(TargetType::Revisit),
            "new" => Some(TargetType::New),
            "custom" => Some(TargetType::Custom),
            _ => None,
        }
    }
}

/// Ten-year age bucket, anchored to the current calendar year at resolve time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgeBracket {
    Twenties,
    Thirties,
    Forties,
    Fifties,
    SixtyPlus,
}

impl AgeBracket {
    /// Closed birth-year interval `[min, max]` for this bracket.
    ///
    /// A customer aged 20..=29 in `current_year` was born in
    /// `[current_year - 29, current_year - 20]`, and so on. The open-ended
    /// 60+ bucket bottoms out at 1900.
    pub fn birth_year_range(&self, current_year: i32) -> (i32, i32) {
        match self {
            AgeBracket::Twenties => (current_year - 29, current_year - 20),
            AgeBracket::Thirties => (current_year - 39, current_year - 30),
            AgeBracket::Forties => (current_year - 49, current_year - 40),
            AgeBracket::Fifties => (current_year - 59, current_year - 50),
            AgeBracket::SixtyPlus => (1900, current_year - 60),
        }
    }

    /// All brackets, youngest first
    pub fn all() -> [AgeBracket; 5] {
        [
            AgeBracket::Twenties,
            AgeBracket::Thirties,
            AgeBracket::Forties,
            AgeBracket::Fifties,
            AgeBracket::SixtyPlus,
        ]
    }
}

impl fmt::Display for AgeBracket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgeBracket::Twenties => write!(f, "twenties"),
            AgeBracket::Thirties => write!(f, "thirties"),
            AgeBracket::Forties => write!(f, "forties"),
            AgeBracket::Fifties => write!(f, "fifties"),
            AgeBracket::SixtyPlus => write!(f, "sixty_plus"),
        }
    }
}

/// Region constraint: a set of provinces, optionally refined to specific
/// districts within named provinces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RegionFilter {
    /// Selected provinces; a customer matches if their province is listed
    pub provinces: Vec<String>,

    /// `(province, districts)` refinements. When a province appears here,
    /// only the listed districts of it match.
    #[serde(default)]
    pub districts: Vec<(String, Vec<String>)>,
}

impl RegionFilter {
    pub fn is_empty(&self) -> bool {
        self.provinces.is_empty() && self.districts.is_empty()
    }

    /// Districts refining `province`, if any
    fn refinement(&self, province: &str) -> Option<&[String]> {
        self.districts
            .iter()
            .find(|(p, _)| p == province)
            .map(|(_, d)| d.as_slice())
    }
}

/// Declarative audience filter, as submitted by the caller and snapshotted
/// on the campaign row.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AudienceFilter {
    #[serde(default)]
    pub target_type: TargetType,

    /// Gender constraint; `None` matches everyone
    pub gender: Option<Gender>,

    /// Age brackets; empty means no age constraint
    #[serde(default)]
    pub age_brackets: Vec<AgeBracket>,

    /// Region constraint; `None` or empty means no region constraint
    pub region: Option<RegionFilter>,

    /// Explicit recipients for `TargetType::Custom`
    #[serde(default)]
    pub customer_ids: Vec<Uuid>,
}

/// Typed predicate tree evaluated against customers.
///
/// `And([])` is vacuously true and `Or([])` vacuously false, so compilers can
/// emit empty conjunctions without special cases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", content = "args", rename_all = "snake_case")]
pub enum Predicate {
    /// Customer has a non-null phone
    HasPhone,
    GenderIs(Gender),
    /// Closed interval on `birth_year`
    BirthYearBetween(i32, i32),
    VisitCountAtLeast(i32),
    /// `created_at` within the last N days of evaluation time
    CreatedWithinDays(i64),
    ProvinceIs(String),
    /// Province match refined to a district list
    DistrictIn(String, Vec<String>),
    IdIn(Vec<Uuid>),
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
}

impl Predicate {
    /// Evaluate against a customer at `now`.
    ///
    /// Must agree with the SQL interpretation in the database layer; the
    /// resolver's unit tests rely on this interpreter.
    pub fn matches(&self, customer: &Customer, now: DateTime<Utc>) -> bool {
        match self {
            Predicate::HasPhone => customer
                .phone
                .as_deref()
                .map(|p| !p.is_empty())
                .unwrap_or(false),
            Predicate::GenderIs(g) => customer.gender == Some(*g),
            Predicate::BirthYearBetween(min, max) => customer
                .birth_year
                .map(|y| y >= *min && y <= *max)
                .unwrap_or(false),
            Predicate::VisitCountAtLeast(n) => customer.visit_count >= *n,
            Predicate::CreatedWithinDays(days) => {
                customer.created_at >= now - Duration::days(*days)
            }
            Predicate::ProvinceIs(province) => {
                customer.region_province.as_deref() == Some(province.as_str())
            }
            Predicate::DistrictIn(province, districts) => {
                customer.region_province.as_deref() == Some(province.as_str())
                    && customer
                        .region_district
                        .as_deref()
                        .map(|d| districts.iter().any(|x| x == d))
                        .unwrap_or(false)
            }
            Predicate::IdIn(ids) => ids.contains(&customer.id),
            Predicate::And(children) => children.iter().all(|p| p.matches(customer, now)),
            Predicate::Or(children) => children.iter().any(|p| p.matches(customer, now)),
        }
    }
}

impl AudienceFilter {
    /// Compile this filter into a predicate tree.
    ///
    /// `Custom` with explicit ids overrides the demographic filters; the
    /// phone requirement always applies. Age brackets OR together, region
    /// clauses OR together, and the groups are ANDed.
    pub fn compile(&self, now: DateTime<Utc>) -> Predicate {
        let mut clauses = vec![Predicate::HasPhone];

        if self.target_type == TargetType::Custom && !self.customer_ids.is_empty() {
            clauses.push(Predicate::IdIn(self.customer_ids.clone()));
            return Predicate::And(clauses);
        }

        match self.target_type {
            TargetType::Revisit => clauses.push(Predicate::VisitCountAtLeast(2)),
            TargetType::New => clauses.push(Predicate::CreatedWithinDays(30)),
            TargetType::All | TargetType::Custom => {}
        }

        if let Some(gender) = self.gender {
            clauses.push(Predicate::GenderIs(gender));
        }

        if !self.age_brackets.is_empty() {
            let year = now.year();
            let brackets = self
                .age_brackets
                .iter()
                .map(|b| {
                    let (min, max) = b.birth_year_range(year);
                    Predicate::BirthYearBetween(min, max)
                })
                .collect();
            clauses.push(Predicate::Or(brackets));
        }

        if let Some(region) = &self.region {
            if !region.is_empty() {
                let mut region_clauses = Vec::new();
                for province in &region.provinces {
                    match region.refinement(province) {
                        Some(districts) if !districts.is_empty() => {
                            region_clauses.push(Predicate::DistrictIn(
                                province.clone(),
                                districts.to_vec(),
                            ));
                        }
                        _ => region_clauses.push(Predicate::ProvinceIs(province.clone())),
                    }
                }
                clauses.push(Predicate::Or(region_clauses));
            }
        }

        Predicate::And(clauses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn customer(birth_year: Option<i32>) -> Customer {
        Customer {
            id: Uuid::new_v4(),
            store_id: Uuid::new_v4(),
            phone: Some("01012345678".to_string()),
            name: Some("Test".to_string()),
            gender: Some(Gender::Female),
            birth_year,
            region_province: Some("Seoul".to_string()),
            region_district: Some("Gangnam".to_string()),
            visit_count: 3,
            created_at: Utc::now(),
            last_visit_at: None,
        }
    }

    #[test]
    fn test_brackets_disjoint_and_cover() {
        let year = 2026;
        let ranges: Vec<(i32, i32)> = AgeBracket::all()
            .iter()
            .map(|b| b.birth_year_range(year))
            .collect();

        // every range is well formed
        for (min, max) in &ranges {
            assert!(min <= max);
        }

        // adjacent brackets meet without overlap or gap
        for pair in ranges.windows(2) {
            assert_eq!(pair[0].0, pair[1].1 + 1);
        }

        // jointly cover every birth year for ages 20 and up
        assert_eq!(ranges[0].1, year - 20);
        assert_eq!(ranges[4].0, 1900);
    }

    #[test]
    fn test_bracket_boundaries() {
        let (min, max) = AgeBracket::Twenties.birth_year_range(2026);
        assert_eq!((min, max), (1997, 2006));

        let (min, max) = AgeBracket::SixtyPlus.birth_year_range(2026);
        assert_eq!((min, max), (1900, 1966));
    }

    #[test]
    fn test_age_predicate() {
        let now = Utc::now();
        let p = Predicate::BirthYearBetween(1990, 1999);
        assert!(p.matches(&customer(Some(1995)), now));
        assert!(p.matches(&customer(Some(1990)), now));
        assert!(p.matches(&customer(Some(1999)), now));
        assert!(!p.matches(&customer(Some(2000)), now));
        assert!(!p.matches(&customer(None), now));
    }

    #[test]
    fn test_region_or_semantics() {
        let now = Utc::now();
        let p = Predicate::Or(vec![
            Predicate::ProvinceIs("Busan".to_string()),
            Predicate::DistrictIn(
                "Seoul".to_string(),
                vec!["Gangnam".to_string(), "Seocho".to_string()],
            ),
        ]);

        // Seoul customer in a listed district matches
        assert!(p.matches(&customer(Some(1990)), now));

        // Seoul customer in an unlisted district does not
        let mut other = customer(Some(1990));
        other.region_district = Some("Mapo".to_string());
        assert!(!p.matches(&other, now));

        // Busan matches on province alone
        let mut busan = customer(Some(1990));
        busan.region_province = Some("Busan".to_string());
        busan.region_district = None;
        assert!(p.matches(&busan, now));
    }

    #[test]
    fn test_custom_overrides_demographics() {
        let now = Utc::now();
        let target = customer(Some(1960));
        let filter = AudienceFilter {
            target_type: TargetType::Custom,
            gender: Some(Gender::Male),
            age_brackets: vec![AgeBracket::Twenties],
            region: None,
            customer_ids: vec![target.id],
        };

        // demographics would exclude this customer, explicit id wins
        assert!(filter.compile(now).matches(&target, now));
    }

    #[test]
    fn test_compile_requires_phone() {
        let now = Utc::now();
        let filter = AudienceFilter::default();
        let mut no_phone = customer(Some(1990));
        no_phone.phone = None;
        assert!(!filter.compile(now).matches(&no_phone, now));
    }

    #[test]
    fn test_predicate_serde_representation() {
        let p = Predicate::And(vec![
            Predicate::HasPhone,
            Predicate::BirthYearBetween(1990, 1999),
            Predicate::DistrictIn("Seoul".to_string(), vec!["Gangnam".to_string()]),
        ]);

        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(json["op"], "and");
        assert_eq!(json["args"][1]["op"], "birth_year_between");
        assert_eq!(json["args"][1]["args"], serde_json::json!([1990, 1999]));

        let back: Predicate = serde_json::from_value(json).unwrap();
        assert_eq!(back, p);
    }

    #[test]
    fn test_revisit_and_new() {
        let now = Utc::now();

        let revisit = AudienceFilter {
            target_type: TargetType::Revisit,
            ..Default::default()
        }
        .compile(now);
        let mut once = customer(Some(1990));
        once.visit_count = 1;
        assert!(!revisit.matches(&once, now));
        once.visit_count = 2;
        assert!(revisit.matches(&once, now));

        let fresh = AudienceFilter {
            target_type: TargetType::New,
            ..Default::default()
        }
        .compile(now);
        let mut old = customer(Some(1990));
        old.created_at = now - Duration::days(45);
        assert!(!fresh.matches(&old, now));
        old.created_at = now - Duration::days(10);
        assert!(fresh.matches(&old, now));
    }
}
