use std::collections::HashSet;
use std::path::Path;

use log::{debug, info, warn};
use rust_htslib::bam::{self, Read};

use crate::utils::styled_spinner;

/// The fields of an alignment record needed to decide whether a read hit the
/// reference.
pub trait AlignmentRecord {
    fn query_name(&self) -> &[u8];
    fn mapping_quality(&self) -> u8;
    fn is_paired(&self) -> bool;
}

impl AlignmentRecord for bam::Record {
    fn query_name(&self) -> &[u8] {
        self.qname()
    }

    fn mapping_quality(&self) -> u8 {
        self.mapq()
    }

    fn is_paired(&self) -> bool {
        bam::Record::is_paired(self)
    }
}

/// Strip a trailing `/1` or `/2` mate marker from a read name.
pub fn bare_name(name: &str) -> &str {
    name.strip_suffix("/1")
        .or_else(|| name.strip_suffix("/2"))
        .unwrap_or(name)
}

/// Read identifiers accepted during one pass over an alignment.
///
/// A record is accepted when its mapping quality is strictly above the
/// threshold and its bare name has not been seen yet. Multi-mapped reads and
/// both mates of a pair therefore contribute once.
#[derive(Debug, Default)]
pub struct IdentifierSet {
    names: Vec<String>,
    accepted: HashSet<String>,
    mapq: u8,
    mate_suffix: bool,
    records: usize,
    paired: usize,
}

impl IdentifierSet {
    pub fn new(mapq: u8, mate_suffix: bool) -> Self {
        IdentifierSet {
            mapq,
            mate_suffix,
            ..Default::default()
        }
    }

    pub fn accept<R: AlignmentRecord + ?Sized>(&mut self, record: &R) -> bool {
        self.records += 1;
        if record.is_paired() {
            self.paired += 1;
        }
        if record.mapping_quality() <= self.mapq {
            return false;
        }
        let qname = String::from_utf8_lossy(record.query_name());
        let name = bare_name(&qname);
        if self.accepted.contains(name) {
            return false;
        }
        self.accepted.insert(name.to_string());
        if self.mate_suffix {
            self.names.push(format!("{name}/1"));
            self.names.push(format!("{name}/2"));
        } else {
            self.names.push(name.to_string());
        }
        true
    }

    /// Number of distinct reads accepted.
    pub fn len(&self) -> usize {
        self.accepted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accepted.is_empty()
    }

    pub fn records_seen(&self) -> usize {
        self.records
    }

    pub fn into_names(self) -> Vec<String> {
        self.names
    }
}

/// Collect identifiers from in-memory records.
pub fn ids_from_records<'a, R, I>(records: I, mapq: u8, add_mate_suffix: bool) -> Vec<String>
where
    R: AlignmentRecord + 'a,
    I: IntoIterator<Item = &'a R>,
{
    let mut ids = IdentifierSet::new(mapq, add_mate_suffix);
    for record in records {
        ids.accept(record);
    }
    ids.into_names()
}

/// Extract the names of reads aligned to the reference from a SAM or BAM file.
///
/// A path that cannot be opened gives an empty list. A record that fails to
/// parse ends the scan and the names collected so far are returned.
pub fn extract_ids(path: &Path, mapq: u8, add_mate_suffix: bool, threads: usize) -> Vec<String> {
    let mut reader = match bam::Reader::from_path(path) {
        Ok(reader) => reader,
        Err(err) => {
            warn!(
                "Unable to read alignments from {}: {err}",
                path.display()
            );
            return vec![];
        }
    };
    if threads > 1 {
        if let Err(err) = reader.set_threads(threads) {
            debug!("Unable to set htslib threads: {err}");
        }
    }

    let mut ids = IdentifierSet::new(mapq, add_mate_suffix);
    let progress_bar = styled_spinner("Reading alignments");
    for (index, result) in reader.records().enumerate() {
        match result {
            Ok(record) => {
                ids.accept(&record);
            }
            Err(err) => {
                warn!(
                    "Stopped reading {} at record {}: {err}",
                    path.display(),
                    index + 1
                );
                break;
            }
        }
        if index % 10_000 == 0 {
            progress_bar.set_position(index as u64);
        }
    }
    progress_bar.finish_and_clear();

    info!(
        "Extracted {} read names from {} alignments ({} paired)",
        ids.len(),
        ids.records_seen(),
        ids.paired
    );
    if ids.is_empty() && ids.records_seen() > 0 {
        warn!(
            "No alignment in {} has a mapping quality above {mapq}",
            path.display()
        );
    }
    ids.into_names()
}
