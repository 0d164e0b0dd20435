use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{BufRead, BufWriter, Write};
use std::path::{Path, PathBuf};

use log::info;
use regex::Regex;
use serde::Serialize;
use tqdm::tqdm;

use crate::data::osm::{ElementKind, RawElement};
use crate::errors::Result;
use crate::etl::parse_osm::ElementReader;
use crate::etl::Etl;
use crate::keys::{KeyCategory, KeyClassifier};
use crate::rules::RuleSet;

pub const ETL_NAME: &str = "audit";
pub const OUTPUT_FILE_NAME: &str = "audit_report.json";

/// Everything a full audit pass accumulates. Purely additive while the pass
/// runs; read-only afterwards.
#[derive(Debug, Default, PartialEq, Serialize)]
pub struct AuditReport {
    /// Count per element/child tag name (node, way, relation, tag, nd, member).
    pub element_counts: BTreeMap<String, u64>,
    /// Count per key category over every tag in the stream.
    pub key_categories: BTreeMap<KeyCategory, u64>,
    /// Number of addr:street tags on nodes and ways.
    pub street_addresses: u64,
    /// Unexpected street-type suffix -> example full street names.
    pub irregular_street_types: BTreeMap<String, BTreeSet<String>>,
    /// Postcode token outside the allow-list -> example full values.
    pub irregular_postcodes: BTreeMap<String, BTreeSet<String>>,
    /// Distinct contributor uids seen anywhere in the stream.
    pub contributors: BTreeSet<String>,
    /// Nodes whose coordinates fall outside [-90,90] x [-180,180].
    pub out_of_range_positions: u64,
    /// Elements dropped by the walker for missing required attributes.
    pub skipped_elements: u64,
}

pub struct AuditEtl {
    input_path: PathBuf,
    every: usize,
    classifier: KeyClassifier,
    rules: RuleSet,
    suffix_re: Regex,
}

impl AuditEtl {
    pub fn new(input_path: PathBuf, every: usize, rules: RuleSet) -> AuditEtl {
        AuditEtl {
            input_path,
            every: every.max(1),
            classifier: KeyClassifier::new(),
            rules,
            // Last whitespace-delimited token, optionally ending in a period.
            suffix_re: Regex::new(r"\S+\.?$").unwrap(),
        }
    }

    fn scan<R: BufRead>(&self, mut reader: ElementReader<R>) -> Result<AuditReport> {
        let mut report = AuditReport::default();
        for (index, element_res) in tqdm(reader.by_ref()).enumerate() {
            let element = element_res?;
            if index % self.every != 0 {
                continue;
            }
            self.observe(&mut report, &element);
        }
        report.skipped_elements = reader.skipped();
        Ok(report)
    }

    fn observe(&self, report: &mut AuditReport, element: &RawElement) {
        let counts = &mut report.element_counts;
        *counts.entry(element.kind.as_str().to_string()).or_insert(0) += 1;
        if !element.tags.is_empty() {
            *counts.entry("tag".to_string()).or_insert(0) += element.tags.len() as u64;
        }
        if !element.node_refs.is_empty() {
            *counts.entry("nd".to_string()).or_insert(0) += element.node_refs.len() as u64;
        }
        if !element.members.is_empty() {
            *counts.entry("member".to_string()).or_insert(0) += element.members.len() as u64;
        }

        for tag in &element.tags {
            let category = self.classifier.classify(&tag.key);
            *report.key_categories.entry(category).or_insert(0) += 1;
        }

        // Street and postal audits only look at nodes and ways.
        if element.kind != ElementKind::Relation {
            for tag in &element.tags {
                if tag.key == "addr:street" {
                    report.street_addresses += 1;
                    self.audit_street_type(report, &tag.value);
                } else if tag.key == "addr:postcode" {
                    self.audit_postcode(report, &tag.value);
                }
            }
        }

        if let Some(uid) = element.attr("uid") {
            report.contributors.insert(uid.to_string());
        }

        if element.kind == ElementKind::Node {
            let lat = element.attr("lat").and_then(|raw| raw.parse::<f64>().ok());
            let lon = element.attr("lon").and_then(|raw| raw.parse::<f64>().ok());
            if let (Some(lat), Some(lon)) = (lat, lon) {
                let in_range = (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lon);
                if !in_range {
                    report.out_of_range_positions += 1;
                }
            }
        }
    }

    fn audit_street_type(&self, report: &mut AuditReport, street_name: &str) {
        if let Some(found) = self.suffix_re.find(street_name) {
            let street_type = found.as_str();
            if !self.rules.expected_street_types.contains(street_type) {
                report.irregular_street_types
                    .entry(street_type.to_string())
                    .or_default()
                    .insert(street_name.to_string());
            }
        }
    }

    fn audit_postcode(&self, report: &mut AuditReport, postcode: &str) {
        if let Some(found) = self.suffix_re.find(postcode) {
            let token = found.as_str();
            if !self.rules.expected_postcodes.contains(token) {
                report.irregular_postcodes
                    .entry(token.to_string())
                    .or_default()
                    .insert(postcode.to_string());
            }
        }
    }
}

fn print_summary(report: &AuditReport) {
    println!("Element counts:");
    for (name, count) in &report.element_counts {
        println!("  {:<10} {}", name, count);
    }
    println!("Key categories:");
    for (category, count) in &report.key_categories {
        println!("  {:<12} {}", category.as_str(), count);
    }
    println!("Street address tags:    {}", report.street_addresses);
    println!("Distinct contributors:  {}", report.contributors.len());
    println!("Out-of-range positions: {}", report.out_of_range_positions);
    println!("Skipped elements:       {}", report.skipped_elements);
    println!("Irregular street types: {}", report.irregular_street_types.len());
    for (street_type, examples) in &report.irregular_street_types {
        let sample: Vec<&str> = examples.iter().take(3).map(String::as_str).collect();
        println!("  {:<12} e.g. {}", street_type, sample.join(", "));
    }
    println!("Irregular postcodes:    {}", report.irregular_postcodes.len());
    for (token, examples) in &report.irregular_postcodes {
        let sample: Vec<&str> = examples.iter().take(3).map(String::as_str).collect();
        println!("  {:<12} e.g. {}", token, sample.join(", "));
    }
}

impl Etl for AuditEtl {
    type Input = ElementReader<Box<dyn BufRead>>;
    type Output = AuditReport;

    fn etl_name(&self) -> &str {
        ETL_NAME
    }

    fn output_file_name(&self) -> &str {
        OUTPUT_FILE_NAME
    }

    fn extract(&mut self, _dir: &Path) -> Result<Self::Input> {
        ElementReader::open(&self.input_path)
    }

    fn transform(&mut self, input: Self::Input) -> Result<Self::Output> {
        self.scan(input)
    }

    fn load(&mut self, dir: &Path, output: Self::Output) -> Result<()> {
        let file = File::create(self.output_path(dir))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, &output)?;
        writer.flush()?;

        print_summary(&output);
        info!(
            contributors = output.contributors.len(),
            irregular_street_types = output.irregular_street_types.len(),
            irregular_postcodes = output.irregular_postcodes.len(),
            skipped = output.skipped_elements;
            "Audit finished"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const AUDIT_OSM: &str = r#"<osm>
  <node id="1" lat="30.26" lon="-97.74" uid="451048">
    <tag k="addr:street" v="Guadalupe St"/>
    <tag k="addr:postcode" v="78701-1234"/>
    <tag k="amenity?" v="fast_food"/>
  </node>
  <node id="2" lat="95.0" lon="-97.74" uid="26398"/>
  <way id="10" uid="451048">
    <nd ref="1"/>
    <nd ref="2"/>
    <tag k="addr:street" v="Congress Avenue"/>
    <tag k="tiger:county" v="Travis"/>
  </way>
  <relation id="20" uid="7168">
    <member type="way" ref="10" role="outer"/>
    <tag k="addr:street" v="Phantom Rd"/>
  </relation>
</osm>"#;

    fn audit(xml: &str) -> AuditReport {
        let etl = AuditEtl::new(PathBuf::from("unused.osm"), 1, RuleSet::austin());
        etl.scan(ElementReader::from_buf_read(xml.as_bytes())).unwrap()
    }

    #[test]
    fn counts_elements_and_children() {
        let report = audit(AUDIT_OSM);
        assert_eq!(report.element_counts.get("node"), Some(&2));
        assert_eq!(report.element_counts.get("way"), Some(&1));
        assert_eq!(report.element_counts.get("relation"), Some(&1));
        assert_eq!(report.element_counts.get("tag"), Some(&6));
        assert_eq!(report.element_counts.get("nd"), Some(&2));
        assert_eq!(report.element_counts.get("member"), Some(&1));
    }

    #[test]
    fn counts_key_categories_across_all_elements() {
        let report = audit(AUDIT_OSM);
        assert_eq!(report.key_categories.get(&KeyCategory::LowerColon), Some(&5));
        assert_eq!(report.key_categories.get(&KeyCategory::Problemchars), Some(&1));
        assert_eq!(report.key_categories.get(&KeyCategory::Lower), None);
    }

    #[test]
    fn flags_street_types_outside_the_vocabulary() {
        let report = audit(AUDIT_OSM);
        let examples = report.irregular_street_types.get("St").unwrap();
        assert!(examples.contains("Guadalupe St"));
        // "Congress Avenue" ends in an expected type and stays unflagged.
        assert!(!report.irregular_street_types.contains_key("Avenue"));
        // Relation tags are not street-audited.
        assert!(!report.irregular_street_types.contains_key("Rd"));
        assert_eq!(report.street_addresses, 2);
    }

    #[test]
    fn flags_postcodes_outside_the_allow_list() {
        let report = audit(AUDIT_OSM);
        let examples = report.irregular_postcodes.get("78701-1234").unwrap();
        assert!(examples.contains("78701-1234"));
    }

    #[test]
    fn collects_distinct_contributors_from_every_element() {
        let report = audit(AUDIT_OSM);
        assert_eq!(report.contributors.len(), 3);
        assert!(report.contributors.contains("7168"));
    }

    #[test]
    fn counts_out_of_range_positions() {
        let report = audit(AUDIT_OSM);
        assert_eq!(report.out_of_range_positions, 1);
    }

    #[test]
    fn sampling_audits_every_kth_element() {
        let etl = AuditEtl::new(PathBuf::from("unused.osm"), 2, RuleSet::austin());
        let report = etl.scan(ElementReader::from_buf_read(AUDIT_OSM.as_bytes())).unwrap();
        // Elements 0 and 2: the first node and the way.
        assert_eq!(report.element_counts.get("node"), Some(&1));
        assert_eq!(report.element_counts.get("way"), Some(&1));
        assert_eq!(report.element_counts.get("relation"), None);
    }

    #[test]
    fn report_serializes_with_readable_category_keys() {
        let report = audit(AUDIT_OSM);
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["key_categories"]["lower_colon"], serde_json::json!(5));
    }
}
