use std::fs::File;
use std::io::{BufRead, BufWriter, Write};
use std::path::{Path, PathBuf};

use log::{info, warn};
use tqdm::tqdm;

use crate::data::document::NormalizedDocument;
use crate::errors::Result;
use crate::etl::parse_osm::ElementReader;
use crate::etl::Etl;
use crate::keys::KeyClassifier;
use crate::rules::RuleSet;

pub const ETL_NAME: &str = "export";

/// Lazy adapter from raw elements to normalized documents. Relations are
/// dropped, elements that fail to shape are logged and counted, structural
/// reader errors pass through and end the stream.
pub struct DocumentStream<R: BufRead> {
    reader: ElementReader<R>,
    classifier: KeyClassifier,
    rules: RuleSet,
    every: u64,
    seen: u64,
    skipped: u64,
}

impl<R: BufRead> DocumentStream<R> {
    pub fn new(reader: ElementReader<R>, rules: RuleSet, every: usize) -> DocumentStream<R> {
        DocumentStream {
            reader,
            classifier: KeyClassifier::new(),
            rules,
            every: every.max(1) as u64,
            seen: 0,
            skipped: 0,
        }
    }

    /// Elements that reached the reshaper but could not be shaped.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    /// Elements the underlying walker dropped for missing attributes.
    pub fn walker_skipped(&self) -> u64 {
        self.reader.skipped()
    }
}

impl<R: BufRead> Iterator for DocumentStream<R> {
    type Item = Result<NormalizedDocument>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let element = match self.reader.next()? {
                Ok(element) => element,
                Err(err) => return Some(Err(err)),
            };
            let index = self.seen;
            self.seen += 1;
            if index % self.every != 0 {
                continue;
            }
            match NormalizedDocument::shape(&element, &self.classifier, &self.rules) {
                Ok(Some(document)) => return Some(Ok(document)),
                Ok(None) => continue,
                Err(err) => {
                    warn!(
                        id = element.id().unwrap_or(""),
                        err = err.to_string();
                        "Skipping element that failed to shape"
                    );
                    self.skipped += 1;
                    continue;
                },
            }
        }
    }
}

/// Full export pass: walk the input once and write one JSON document per
/// line, named `<input file name>.json` under the run directory.
pub struct ExportEtl {
    input_path: PathBuf,
    output_file_name: String,
    every: usize,
    rules: RuleSet,
}

impl ExportEtl {
    pub fn new(input_path: PathBuf, every: usize, rules: RuleSet) -> ExportEtl {
        let output_file_name = match input_path.file_name() {
            Some(name) => format!("{}.json", name.to_string_lossy()),
            None => "export.json".to_string(),
        };
        ExportEtl {
            input_path,
            output_file_name,
            every,
            rules,
        }
    }
}

impl Etl for ExportEtl {
    type Input = ElementReader<Box<dyn BufRead>>;
    type Output = DocumentStream<Box<dyn BufRead>>;

    fn etl_name(&self) -> &str {
        ETL_NAME
    }

    fn output_file_name(&self) -> &str {
        &self.output_file_name
    }

    fn extract(&mut self, _dir: &Path) -> Result<Self::Input> {
        ElementReader::open(&self.input_path)
    }

    fn transform(&mut self, input: Self::Input) -> Result<Self::Output> {
        Ok(DocumentStream::new(input, self.rules.clone(), self.every))
    }

    fn load(&mut self, dir: &Path, mut output: Self::Output) -> Result<()> {
        let file = File::create(self.output_path(dir))?;
        let mut writer = BufWriter::new(file);
        let mut written: u64 = 0;
        for document_res in tqdm(output.by_ref()) {
            let document = document_res?;
            serde_json::to_writer(&mut writer, &document)?;
            writer.write_all(b"\n")?;
            written += 1;
        }
        writer.flush()?;

        info!(
            written = written,
            shape_skipped = output.skipped(),
            walker_skipped = output.walker_skipped();
            "Export finished"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXPORT_OSM: &str = r#"<osm>
  <node id="1" lat="30.26" lon="-97.74" timestamp="2012-03-28T18:31:23Z" user="bbmiller" uid="451048">
    <tag k="addr:street" v="Guadalupe St"/>
  </node>
  <node id="2" lat="30.27" lon="-97.75" timestamp="not-a-timestamp"/>
  <way id="10">
    <nd ref="1"/>
    <nd ref="2"/>
    <tag k="highway" v="service"/>
  </way>
  <relation id="20">
    <member type="way" ref="10" role="outer"/>
  </relation>
</osm>"#;

    fn stream(xml: &'static str, every: usize) -> DocumentStream<&'static [u8]> {
        DocumentStream::new(
            ElementReader::from_buf_read(xml.as_bytes()),
            RuleSet::austin(),
            every,
        )
    }

    #[test]
    fn streams_shaped_documents_and_drops_relations() {
        let mut documents = stream(EXPORT_OSM, 1);
        let collected: Vec<NormalizedDocument> =
            documents.by_ref().collect::<Result<_>>().unwrap();

        assert_eq!(collected.len(), 2);
        assert_eq!(
            collected[0].address.as_ref().unwrap().get("street").map(String::as_str),
            Some("Guadalupe Street"),
        );
        assert_eq!(collected[1].node_refs, vec!["1", "2"]);
        // The node with the broken timestamp was skipped, not defaulted.
        assert_eq!(documents.skipped(), 1);
        assert_eq!(documents.walker_skipped(), 0);
    }

    #[test]
    fn sampling_exports_every_kth_element() {
        let collected: Vec<NormalizedDocument> =
            stream(EXPORT_OSM, 3).collect::<Result<_>>().unwrap();
        // Elements 0 and 3: the first node and the relation; only the node shapes.
        assert_eq!(collected.len(), 1);
        assert_eq!(collected[0].created.as_ref().unwrap().uid.as_deref(), Some("451048"));
    }

    #[test]
    fn structural_errors_end_the_stream() {
        const TRUNCATED_OSM: &str = r#"<osm><node id="1"/><node id="2">"#;
        let results: Vec<Result<NormalizedDocument>> = stream(TRUNCATED_OSM, 1).collect();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
    }
}
