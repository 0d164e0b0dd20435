use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::path::Path;

use serde::Deserialize;

use crate::errors::Result;

/// Canonicalization rule tables for one target region. Immutable once built;
/// a per-region variant can be loaded from a JSON file.
#[derive(Debug, Clone, Deserialize)]
pub struct RuleSet {
    /// Exact (case-sensitive) street token -> canonical form.
    pub street_mapping: BTreeMap<String, String>,
    /// Lowercased tokens that mark a unit designator. A mapped token is not
    /// replaced when it is itself protected or directly follows a protected
    /// token ("Suite E" stays "Suite E").
    pub protected_tokens: BTreeSet<String>,
    /// Closed vocabulary of street-type suffixes considered regular.
    pub expected_street_types: BTreeSet<String>,
    /// Allow-list of postal codes valid for the region.
    pub expected_postcodes: BTreeSet<String>,
}

impl RuleSet {
    pub fn from_file(path: &Path) -> Result<RuleSet> {
        let file = File::open(path)?;
        Ok(serde_json::from_reader(file)?)
    }

    /// Default tables for the Austin, TX metro extract.
    pub fn austin() -> RuleSet {
        let street_mapping = [
            ("Ave", "Avenue"), ("Ave.", "Avenue"), ("Avene", "Avenue"),
            ("Blvd", "Boulevard"), ("Blvd.", "Boulevard"),
            ("Cv", "Cove"),
            ("Dr", "Drive"), ("Dr.", "Drive"),
            ("hwy", "Highway"), ("Hwy", "Highway"), ("HWY", "Highway"),
            ("Ln", "Lane"),
            ("Pkwy", "Parkway"),
            ("Rd", "Road"),
            ("St", "Street"), ("St.", "Street"), ("street", "Street"),
            ("Ovlk", "Overlook"),
            ("way", "Way"),
            ("N", "North"), ("N.", "North"),
            ("S", "South"), ("S.", "South"),
            ("E", "East"), ("E.", "East"),
            ("W", "West"), ("W.", "West"),
            ("IH35", "Interstate Highway 35"),
            ("IH 35", "Interstate Highway 35"),
            ("I 35", "Interstate Highway 35"),
            ("I-35", "Interstate Highway 35"),
        ];
        let expected_street_types = [
            "Avenue", "Boulevard", "Commons", "Court", "Drive", "Lane",
            "Parkway", "Place", "Road", "Square", "Street", "Trail", "Way",
            "Vista", "Terrace", "Trace", "Valley", "View", "Walk", "Run",
            "Ridge", "Row", "Point", "Plaza", "Path", "Pass", "Park",
            "Overlook", "Meadows", "Loop", "Hollow", "Hill", "Highway",
            "Expressway", "Cove", "Crossing", "Creek", "Circle", "Canyon",
            "Bend",
        ];
        let expected_postcodes = [
            "73301", "73344", "76574", "78602", "78610", "78612", "78613",
            "78615", "78616", "78617", "78619", "78620", "78621", "78626",
            "78628", "78634", "78640", "78641", "78642", "78644", "78645",
            "78646", "78652", "78653", "78654", "78656", "78660", "78663",
            "78664", "78665", "78666", "78669", "78676", "78680", "78681",
            "78682", "78691", "78701", "78702", "78703", "78704", "78705",
            "78712", "78717", "78719", "78721", "78722", "78723", "78724",
            "78725", "78726", "78727", "78728", "78729", "78730", "78731",
            "78732", "78733", "78734", "78735", "78736", "78737", "78738",
            "78739", "78741", "78742", "78744", "78745", "78746", "78747",
            "78748", "78749", "78750", "78751", "78752", "78753", "78754",
            "78756", "78757", "78758", "78759", "78957",
        ];

        RuleSet {
            street_mapping: street_mapping.iter()
                .map(|(abbr, full)| (abbr.to_string(), full.to_string()))
                .collect(),
            protected_tokens: ["suite", "ste", "ste."].iter()
                .map(|token| token.to_string())
                .collect(),
            expected_street_types: expected_street_types.iter()
                .map(|street_type| street_type.to_string())
                .collect(),
            expected_postcodes: expected_postcodes.iter()
                .map(|code| code.to_string())
                .collect(),
        }
    }

    /// Replace abbreviated street tokens with their canonical forms.
    /// Tokens are whitespace-delimited and rejoined with single spaces, so
    /// multi-word table keys ("IH 35") never match a split token; only the
    /// unsplittable aliases ("IH35", "I-35") fire in practice.
    pub fn canonicalize_street(&self, name: &str) -> String {
        let mut words: Vec<String> = name.split_whitespace()
            .map(str::to_string)
            .collect();
        for index in 0..words.len() {
            if !self.street_mapping.contains_key(words[index].as_str()) {
                continue;
            }
            if self.is_protected(&words[index]) {
                continue;
            }
            if index > 0 && self.is_protected(&words[index - 1]) {
                continue;
            }
            words[index] = self.street_mapping[words[index].as_str()].clone();
        }
        words.join(" ")
    }

    /// Keep the prefix before the first hyphen ("78701-1234" -> "78701").
    pub fn canonicalize_postcode<'a>(&self, code: &'a str) -> &'a str {
        match code.split_once('-') {
            Some((prefix, _)) => prefix,
            None => code,
        }
    }

    fn is_protected(&self, token: &str) -> bool {
        self.protected_tokens.contains(&token.to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn street_abbreviations_are_expanded() {
        let rules = RuleSet::austin();
        assert_eq!(rules.canonicalize_street("Guadalupe St"), "Guadalupe Street");
        assert_eq!(rules.canonicalize_street("N Lamar Blvd"), "North Lamar Boulevard");
        assert_eq!(rules.canonicalize_street("W 6th street"), "West 6th Street");
    }

    #[test]
    fn unit_designators_are_protected() {
        let rules = RuleSet::austin();
        assert_eq!(rules.canonicalize_street("Suite E"), "Suite E");
        assert_eq!(rules.canonicalize_street("Burnet Rd Suite E"), "Burnet Road Suite E");
        assert_eq!(rules.canonicalize_street("Ste. W"), "Ste. W");
    }

    #[test]
    fn unknown_tokens_pass_through() {
        let rules = RuleSet::austin();
        assert_eq!(rules.canonicalize_street("Congress Avenue"), "Congress Avenue");
        assert_eq!(rules.canonicalize_street(""), "");
    }

    #[test]
    fn replacement_is_case_sensitive() {
        let rules = RuleSet::austin();
        // "st" is not a table key; only "St", "St." and "street" are.
        assert_eq!(rules.canonicalize_street("Guadalupe st"), "Guadalupe st");
    }

    #[test]
    fn highway_aliases_only_fire_as_single_tokens() {
        let rules = RuleSet::austin();
        assert_eq!(rules.canonicalize_street("IH35"), "Interstate Highway 35");
        assert_eq!(rules.canonicalize_street("I-35"), "Interstate Highway 35");
        // Whitespace-split inputs never present "IH 35" as one token.
        assert_eq!(rules.canonicalize_street("IH 35"), "IH 35");
    }

    #[test]
    fn street_canonicalization_is_idempotent() {
        let rules = RuleSet::austin();
        for name in [
            "Guadalupe St",
            "N Lamar Blvd Suite 200",
            "IH35",
            "Research Blvd.",
            "Suite E",
        ] {
            let once = rules.canonicalize_street(name);
            assert_eq!(rules.canonicalize_street(&once), once);
        }
    }

    #[test]
    fn postcodes_drop_the_plus_four() {
        let rules = RuleSet::austin();
        assert_eq!(rules.canonicalize_postcode("78701-1234"), "78701");
        assert_eq!(rules.canonicalize_postcode("78701"), "78701");
        assert_eq!(rules.canonicalize_postcode("TX 78701-1234"), "TX 78701");
    }

    #[test]
    fn postcode_canonicalization_is_idempotent() {
        let rules = RuleSet::austin();
        for code in ["78701-1234", "78701", "", "a-b-c"] {
            let once = rules.canonicalize_postcode(code);
            assert_eq!(rules.canonicalize_postcode(once), once);
        }
    }

    #[test]
    fn rule_files_override_the_default_region() {
        let json = r#"{
            "street_mapping": {"Str": "Strasse"},
            "protected_tokens": [],
            "expected_street_types": ["Strasse"],
            "expected_postcodes": ["10115"]
        }"#;
        let rules: RuleSet = serde_json::from_str(json).unwrap();
        assert_eq!(rules.canonicalize_street("Invalidenstr Str"), "Invalidenstr Strasse");
        assert!(rules.expected_postcodes.contains("10115"));
    }
}
